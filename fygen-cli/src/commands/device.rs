//! One-shot device commands: model, channel, sweep, trigger, counter reset.

use anyhow::Result;
use console::style;
use fygen::{Channel, DeviceSession, Port, SweepSettings, TriggerSource, Waveform};

use crate::config::Config;
use crate::{Cli, CliError, open_session};

/// Requested channel changes; `None` fields are left alone.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChannelSettings {
    pub channel: Channel,
    pub waveform: Option<Waveform>,
    pub freq: Option<f64>,
    pub amplitude: Option<f64>,
    pub offset: Option<f64>,
    pub duty: Option<f64>,
    pub phase: Option<u16>,
}

impl ChannelSettings {
    fn is_empty(&self) -> bool {
        self.waveform.is_none()
            && self.freq.is_none()
            && self.amplitude.is_none()
            && self.offset.is_none()
            && self.duty.is_none()
            && self.phase.is_none()
    }
}

/// Send every requested setting, in front-panel order.
///
/// Returns a short description of each change for the summary line.
fn apply_channel<P: Port>(
    session: &DeviceSession<P>,
    settings: &ChannelSettings,
) -> fygen::Result<Vec<String>> {
    let ch = settings.channel;
    let mut applied = Vec::new();

    if let Some(waveform) = settings.waveform {
        session.set_waveform(ch, waveform)?;
        applied.push(format!("waveform {waveform:?}"));
    }
    if let Some(hz) = settings.freq {
        session.set_frequency(ch, hz)?;
        applied.push(format!("{hz} Hz"));
    }
    if let Some(volts) = settings.amplitude {
        session.set_amplitude(ch, volts)?;
        applied.push(format!("{volts:.2} Vpp"));
    }
    if let Some(volts) = settings.offset {
        session.set_offset(ch, volts)?;
        applied.push(format!("offset {volts:.2} V"));
    }
    if let Some(percent) = settings.duty {
        session.set_duty_cycle(ch, percent)?;
        applied.push(format!("duty {percent:.1}%"));
    }
    if let Some(degrees) = settings.phase {
        session.set_phase(degrees)?;
        applied.push(format!("phase {degrees}°"));
    }
    Ok(applied)
}

fn done(cli: &Cli, message: &str) {
    if !cli.quiet {
        eprintln!("{} {message}", style("✓").green());
    }
}

/// Model command implementation.
pub(crate) fn cmd_model(cli: &Cli, config: &Config, json: bool) -> Result<()> {
    let session = open_session(cli, config)?;
    let model = session.read_model().map_err(CliError::from)?;
    if json {
        println!(
            "{}",
            serde_json::json!({ "port": session.port_name(), "model": model })
        );
    } else {
        println!("{model}");
    }
    Ok(())
}

/// Channel command implementation.
pub(crate) fn cmd_channel(cli: &Cli, config: &Config, settings: &ChannelSettings) -> Result<()> {
    if settings.is_empty() {
        return Err(CliError::Usage(
            "nothing to set; pass at least one of --waveform, --freq, --amplitude, --offset, \
             --duty, --phase"
                .into(),
        )
        .into());
    }
    if settings.phase.is_some() && settings.channel != Channel::Deputy {
        return Err(CliError::Usage("--phase applies to CH2 only (use --ch 2)".into()).into());
    }

    let session = open_session(cli, config)?;
    let applied = apply_channel(&session, settings).map_err(CliError::from)?;
    done(cli, &format!("{}: {}", settings.channel, applied.join(", ")));
    Ok(())
}

/// Sweep start implementation.
pub(crate) fn cmd_sweep_start(cli: &Cli, config: &Config, settings: &SweepSettings) -> Result<()> {
    let session = open_session(cli, config)?;
    session.configure_sweep(settings).map_err(CliError::from)?;
    session.start_sweep().map_err(CliError::from)?;
    done(
        cli,
        &format!(
            "Sweeping {} Hz to {} Hz over {} s ({:?})",
            settings.begin_hz, settings.end_hz, settings.time_s, settings.mode
        ),
    );
    Ok(())
}

/// Sweep stop implementation.
pub(crate) fn cmd_sweep_stop(cli: &Cli, config: &Config) -> Result<()> {
    let session = open_session(cli, config)?;
    session.stop_sweep().map_err(CliError::from)?;
    done(cli, "Sweep stopped");
    Ok(())
}

/// Trigger command implementation.
pub(crate) fn cmd_trigger(
    cli: &Cli,
    config: &Config,
    source: Option<TriggerSource>,
    cycles: Option<u32>,
) -> Result<()> {
    if source.is_none() && cycles.is_none() {
        return Err(CliError::Usage("nothing to set; pass --source and/or --cycles".into()).into());
    }

    let session = open_session(cli, config)?;
    if let Some(source) = source {
        session.set_trigger_source(source).map_err(CliError::from)?;
    }
    if let Some(cycles) = cycles {
        session.set_trigger_cycles(cycles).map_err(CliError::from)?;
    }
    done(cli, "Trigger configured");
    Ok(())
}

/// Counter reset implementation.
pub(crate) fn cmd_clear_count(cli: &Cli, config: &Config) -> Result<()> {
    let session = open_session(cli, config)?;
    session.clear_count().map_err(CliError::from)?;
    done(cli, "Counter cleared");
    Ok(())
}
