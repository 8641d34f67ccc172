//! Arbitrary waveform upload and payload preview.

use anyhow::Result;
use console::style;
use fygen::{
    CancelToken, EncodedPayload, Shape, UploadObserver, UploadSession, UploadState,
    WaveformEditor,
};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, Write as _};

use crate::config::Config;
use crate::{Cli, CliError, open_session, prompt, use_fancy_output};

/// Bytes per line of the preview dump.
const PREVIEW_WIDTH: usize = 32;

/// Upload options from the command line.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UploadOptions {
    pub bank: Option<u8>,
    pub shape: Shape,
    pub chunk_size: Option<usize>,
    pub verify_acks: bool,
}

/// Drives the progress bar and forwards Ctrl-C as cancellation.
struct ProgressObserver {
    bar: ProgressBar,
    token: CancelToken,
}

impl ProgressObserver {
    fn new(total: usize, hidden: bool) -> Self {
        let bar = if hidden {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(total as u64);
            #[allow(clippy::unwrap_used)] // Static template string
            bar.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] \
                         {bytes}/{total_bytes} {msg}",
                    )
                    .unwrap()
                    .progress_chars("#>-"),
            );
            bar.set_draw_target(ProgressDrawTarget::stderr());
            bar
        };
        Self {
            bar,
            token: CancelToken::new(),
        }
    }
}

impl UploadObserver for ProgressObserver {
    fn on_state(&mut self, state: UploadState) {
        match state {
            UploadState::Completed => self.bar.finish_with_message("done"),
            UploadState::Cancelled | UploadState::Failed => {
                self.bar.abandon_with_message(state.to_string());
            },
            _ => self.bar.set_message(state.to_string()),
        }
    }

    fn on_progress(&mut self, sent: usize, _total: usize) {
        self.bar.set_position(sent as u64);
    }

    fn is_cancelled(&self) -> bool {
        UploadObserver::is_cancelled(&self.token)
    }
}

/// Render a shape through the editor and encode it.
fn encode_shape(shape: Shape) -> EncodedPayload {
    let mut editor = WaveformEditor::new();
    editor.apply_shape(shape);
    editor.encode()
}

/// Hex dump of a payload, [`PREVIEW_WIDTH`] bytes per line.
fn hex_lines(payload: &EncodedPayload) -> impl Iterator<Item = String> + '_ {
    payload.as_bytes().chunks(PREVIEW_WIDTH).map(|line| {
        line.iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(" ")
    })
}

/// Preview command implementation.
pub(crate) fn cmd_preview(shape: Shape) -> Result<()> {
    let payload = encode_shape(shape);
    let mut out = io::stdout().lock();
    for line in hex_lines(&payload) {
        writeln!(out, "{line}")?;
    }
    out.flush()?;
    Ok(())
}

/// Upload command implementation.
pub(crate) fn cmd_upload(cli: &Cli, config: &Config, options: &UploadOptions) -> Result<()> {
    let bank = options.bank.or(config.upload.bank).unwrap_or(1);
    let mut upload_config = config.upload_config();
    if let Some(chunk_size) = options.chunk_size {
        upload_config = upload_config.with_chunk_size(chunk_size);
    }
    if options.verify_acks {
        upload_config = upload_config.with_verify_acks(true);
    }

    let payload = encode_shape(options.shape);
    let mut upload = UploadSession::new(bank, payload)
        .map_err(CliError::from)?
        .with_config(upload_config);

    let question = format!(
        "Overwrite arbitrary bank {bank} with a {} waveform?",
        options.shape
    );
    if !prompt::confirm(&question, cli.yes, cli.non_interactive)? {
        return Err(CliError::Cancelled("upload declined".into()).into());
    }

    let session = open_session(cli, config)?;
    let mut observer = ProgressObserver::new(upload.total(), cli.quiet || !use_fancy_output());

    let report = upload.run(&session, &mut observer).map_err(CliError::from)?;
    session.disconnect();

    if !cli.quiet {
        eprintln!(
            "{} Uploaded {} bytes to bank {} in {:.1}s",
            style("✓").green().bold(),
            report.bytes_sent,
            report.bank,
            report.elapsed.as_secs_f64()
        );
    }
    Ok(())
}
