//! Port resolution and confirmation prompts.
//!
//! The port comes from the command line or environment, then the config
//! file, and only then from an interactive prompt. Non-interactive runs never
//! prompt: missing input is a usage error.

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    dialoguer::{Confirm, Error as DialoguerError, Input, theme::ColorfulTheme},
    log::debug,
    std::io::IsTerminal,
};

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(CliError::Usage(
            "interactive prompt requires a terminal; pass --port or use --non-interactive".into(),
        )
        .into())
    }
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("prompt cancelled".into()).into()
            } else {
                CliError::Usage(format!("prompt failed: {io_err}")).into()
            }
        },
    }
}

/// Pick the serial port to open.
pub fn resolve_port(cli_port: Option<&str>, config: &Config, non_interactive: bool) -> Result<String> {
    if let Some(port) = cli_port.map(str::trim).filter(|p| !p.is_empty()) {
        debug!("Using port from command line: {port}");
        return Ok(port.to_string());
    }
    if let Some(port) = config.connection.port.as_deref() {
        debug!("Using port from config: {port}");
        return Ok(port.to_string());
    }
    if non_interactive {
        return Err(CliError::Usage(
            "no serial port given; pass --port, set FYGEN_PORT, or add [connection] port to fygen.toml"
                .into(),
        )
        .into());
    }

    ensure_interactive_terminal()?;
    let port: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Serial port")
        .interact_text()
        .map_err(map_prompt_error)?;
    let port = port.trim().to_string();
    if port.is_empty() {
        return Err(CliError::Usage("empty serial port name".into()).into());
    }
    Ok(port)
}

/// Ask for confirmation before an action that alters device memory.
///
/// `--yes` proceeds without asking. A non-interactive run without `--yes` is
/// a usage error.
pub fn confirm(prompt: &str, assume_yes: bool, non_interactive: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    if non_interactive {
        return Err(CliError::Usage(format!(
            "{prompt} Refusing to proceed without confirmation; pass --yes"
        ))
        .into());
    }
    ensure_interactive_terminal()?;
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(true)
        .interact()
        .map_err(map_prompt_error)
}
