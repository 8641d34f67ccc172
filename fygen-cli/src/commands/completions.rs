//! Shell completion generation and installation.

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::{Shell, generate};
use console::style;
use directories::BaseDirs;
use std::env;
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use crate::Cli;

const BIN_NAME: &str = "fygen";

/// Render the completion script for `shell`.
fn render(shell: Shell) -> Vec<u8> {
    let mut buf = Vec::new();
    generate(shell, &mut Cli::command(), BIN_NAME, &mut buf);
    buf
}

/// Generate shell completions to stdout.
pub(crate) fn cmd_completions(shell: Shell) {
    generate(shell, &mut Cli::command(), BIN_NAME, &mut io::stdout());
}

/// Detect the user's current shell from environment.
fn detect_shell_type() -> Option<Shell> {
    if let Ok(shell_path) = env::var("SHELL") {
        return shell_from_path(&shell_path);
    }
    if cfg!(windows) && env::var("PSModulePath").is_ok() {
        return Some(Shell::PowerShell);
    }
    None
}

/// Match the file name of a shell binary.
fn shell_from_path(shell_path: &str) -> Option<Shell> {
    let name = Path::new(shell_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    match name {
        "bash" => Some(Shell::Bash),
        "zsh" => Some(Shell::Zsh),
        "fish" => Some(Shell::Fish),
        "elvish" => Some(Shell::Elvish),
        "pwsh" | "powershell" => Some(Shell::PowerShell),
        _ => None,
    }
}

/// File name the shell looks up completions under.
fn completion_file_name(shell: Shell) -> Option<String> {
    match shell {
        Shell::Bash => Some(BIN_NAME.to_string()),
        Shell::Zsh => Some(format!("_{BIN_NAME}")),
        Shell::Fish => Some(format!("{BIN_NAME}.fish")),
        Shell::Elvish => Some(format!("{BIN_NAME}.elv")),
        Shell::PowerShell => Some(format!("{BIN_NAME}.ps1")),
        _ => None,
    }
}

/// Installation path of the completion script for `shell`.
fn install_path(shell: Shell, dirs: &BaseDirs) -> Result<PathBuf> {
    let file = completion_file_name(shell).context("Unsupported shell for auto-install")?;
    let home = dirs.home_dir();
    let xdg_config = env::var_os("XDG_CONFIG_HOME").map_or_else(|| home.join(".config"), PathBuf::from);

    let dir = match shell {
        Shell::Bash => dirs.data_dir().join("bash-completion").join("completions"),
        Shell::Zsh => home.join(".zfunc"),
        Shell::Fish => xdg_config.join("fish").join("completions"),
        Shell::Elvish => xdg_config.join("elvish").join("lib"),
        _ => match env::var_os("PROFILE") {
            Some(profile) => PathBuf::from(profile)
                .parent()
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
            None => xdg_config.join("powershell").join("completions"),
        },
    };
    Ok(dir.join(file))
}

/// Install shell completions automatically.
pub(crate) fn cmd_completions_install(shell_arg: Option<Shell>) -> Result<()> {
    let shell = match shell_arg {
        Some(s) => s,
        None => detect_shell_type().context(
            "Could not detect your shell. Please specify it explicitly:\n  \
             fygen completions --install bash",
        )?,
    };

    let dirs = BaseDirs::new().context("Could not determine home directory")?;
    let path = install_path(shell, &dirs)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(&path, render(shell))
        .with_context(|| format!("Failed to write completion file: {}", path.display()))?;

    eprintln!(
        "{} Installed {} completions to {}",
        style("✓").green().bold(),
        style(format!("{shell:?}")).cyan(),
        style(path.display()).yellow()
    );

    match shell {
        Shell::Bash => {
            eprintln!(
                "To activate now: {}",
                style(format!("source {}", path.display())).cyan()
            );
        },
        Shell::Zsh => {
            let zshrc = dirs.home_dir().join(".zshrc");
            let fpath_line = "fpath=(~/.zfunc $fpath)";
            let present = fs::read_to_string(&zshrc).is_ok_and(|c| c.contains(fpath_line));
            if !present {
                let mut file = fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&zshrc)
                    .with_context(|| format!("Failed to update {}", zshrc.display()))?;
                writeln!(file, "\n# fygen completions")?;
                writeln!(file, "{fpath_line}")?;
                writeln!(file, "autoload -Uz compinit && compinit")?;
                eprintln!("{} Added fpath to {}", style("✓").green().bold(), zshrc.display());
            }
            eprintln!("Restart your shell or run: {}", style("exec zsh").cyan());
        },
        Shell::PowerShell => {
            eprintln!(
                "Add this to your PowerShell profile: {}",
                style(format!("Import-Module {}", path.display())).cyan()
            );
        },
        _ => eprintln!("Completions load automatically in new sessions."),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_from_path() {
        assert_eq!(shell_from_path("/bin/bash"), Some(Shell::Bash));
        assert_eq!(shell_from_path("/usr/bin/zsh"), Some(Shell::Zsh));
        assert_eq!(shell_from_path("/usr/local/bin/fish"), Some(Shell::Fish));
        assert_eq!(shell_from_path("/usr/bin/pwsh"), Some(Shell::PowerShell));
        assert_eq!(shell_from_path("elvish"), Some(Shell::Elvish));
        assert_eq!(shell_from_path("/usr/bin/tcsh"), None);
        assert_eq!(shell_from_path(""), None);
    }

    #[test]
    fn test_completion_file_names() {
        assert_eq!(completion_file_name(Shell::Bash).as_deref(), Some("fygen"));
        assert_eq!(completion_file_name(Shell::Zsh).as_deref(), Some("_fygen"));
        assert_eq!(completion_file_name(Shell::Fish).as_deref(), Some("fygen.fish"));
        assert_eq!(completion_file_name(Shell::Elvish).as_deref(), Some("fygen.elv"));
        assert_eq!(completion_file_name(Shell::PowerShell).as_deref(), Some("fygen.ps1"));
    }

    #[test]
    fn test_install_paths() {
        let Some(dirs) = BaseDirs::new() else {
            return;
        };
        let bash = install_path(Shell::Bash, &dirs).unwrap();
        assert!(bash.ends_with("bash-completion/completions/fygen"));
        let zsh = install_path(Shell::Zsh, &dirs).unwrap();
        assert!(zsh.ends_with(".zfunc/_fygen"));
        let fish = install_path(Shell::Fish, &dirs).unwrap();
        assert!(fish.ends_with("fish/completions/fygen.fish"));
    }

    #[test]
    fn test_render_mentions_subcommands() {
        for shell in [Shell::Bash, Shell::Zsh, Shell::Fish] {
            let output = String::from_utf8(render(shell)).unwrap();
            assert!(output.contains("fygen"));
            assert!(output.contains("upload"));
        }
        assert!(!render(Shell::PowerShell).is_empty());
        assert!(!render(Shell::Elvish).is_empty());
    }
}
