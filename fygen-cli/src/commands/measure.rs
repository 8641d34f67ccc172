//! Counter polling command.

use anyhow::Result;
use console::style;
use fygen::poller::DEFAULT_INTERVAL;
use fygen::{Error, Measurement, Poller, Reading};
use log::warn;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use crate::config::Config;
use crate::{Cli, CliError, open_session, was_interrupted};

/// How often the main thread checks for Ctrl-C while waiting.
const INTERRUPT_POLL: Duration = Duration::from_millis(100);

fn json_line(reading: Reading) -> serde_json::Value {
    match reading {
        Reading::Frequency(hz) => serde_json::json!({ "frequency_hz": hz }),
        Reading::Count(n) => serde_json::json!({ "count": n }),
    }
}

/// Measure command implementation.
///
/// Readings go to stdout, one per line. Malformed replies are reported and
/// skipped; a lost link ends the command with a device error.
pub(crate) fn cmd_measure(
    cli: &Cli,
    config: &Config,
    measurement: Measurement,
    interval_ms: Option<u64>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let interval = interval_ms
        .map(Duration::from_millis)
        .or_else(|| config.measure_interval())
        .unwrap_or(DEFAULT_INTERVAL);
    if interval.is_zero() {
        return Err(CliError::Usage("--interval must be greater than 0".into()).into());
    }

    let session = Arc::new(open_session(cli, config)?);
    if !cli.quiet {
        eprintln!(
            "{} Polling {measurement} every {} ms (Ctrl-C to stop)",
            style("📡").cyan(),
            interval.as_millis()
        );
    }

    let (tx, rx) = mpsc::channel();
    let poller = Poller::spawn(Arc::clone(&session), measurement, interval, move |reading| {
        let _ = tx.send(reading);
    })
    .map_err(CliError::from)?;

    let mut received = 0usize;
    let outcome = loop {
        if limit.is_some_and(|n| received >= n) || was_interrupted() {
            break Ok(());
        }
        match rx.recv_timeout(INTERRUPT_POLL) {
            Ok(Ok(reading)) => {
                received += 1;
                if json {
                    println!("{}", json_line(reading));
                } else {
                    println!("{reading}");
                }
            },
            Ok(Err(err @ (Error::LinkClosed | Error::NotConnected))) => {
                break Err(CliError::Device(err));
            },
            Ok(Err(err)) => warn!("{err}"),
            Err(RecvTimeoutError::Timeout) => {},
            Err(RecvTimeoutError::Disconnected) => break Ok(()),
        }
    };

    poller.stop();
    session.disconnect();
    outcome.map_err(Into::into)
}
