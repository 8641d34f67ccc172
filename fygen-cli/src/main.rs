//! fygen CLI - Command-line tool for FY3200S-class function generators.
//!
//! ## Features
//!
//! - Configure channel waveform, frequency, amplitude, offset, duty and phase
//! - Sweep and trigger setup
//! - Frequency and event counter polling
//! - Arbitrary waveform upload with progress and Ctrl-C cancellation
//! - Offline preview of the encoded upload payload
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use fygen::{
    Channel, DeviceSession, Measurement, NativePort, Shape, SweepMode, TriggerSource, Waveform,
};
use log::debug;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether Ctrl-C was pressed.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

mod commands;
mod config;
mod prompt;

use config::Config;

/// Errors carrying a specific process exit code.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    /// Bad invocation, or input that cannot be prompted for.
    #[error("{0}")]
    Usage(String),
    /// Unusable configuration file.
    #[error("{0}")]
    Config(String),
    /// The device or the link failed.
    #[error(transparent)]
    Device(fygen::Error),
    /// The user aborted.
    #[error("{0}")]
    Cancelled(String),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => 2,
            Self::Config(_) => 3,
            Self::Device(fygen::Error::Cancelled { .. }) | Self::Cancelled(_) => 130,
            Self::Device(_) => 4,
        }
    }
}

impl From<fygen::Error> for CliError {
    fn from(err: fygen::Error) -> Self {
        match err {
            fygen::Error::InvalidArgument(msg) => Self::Usage(msg),
            other => Self::Device(other),
        }
    }
}

/// Map a failed run onto the process exit code.
fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return cli_err.exit_code();
    }
    match err.downcast_ref::<fygen::Error>() {
        Some(fygen::Error::Cancelled { .. }) => 130,
        Some(fygen::Error::InvalidArgument(_)) => 2,
        Some(_) => 4,
        None => 1,
    }
}

/// fygen - Control FY3200S-class two-channel function generators.
///
/// Environment variables:
///   FYGEN_PORT              - Default serial port
///   FYGEN_BAUD              - Default baud rate (default: 9600)
///   FYGEN_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "fygen")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Serial port to use.
    #[arg(short, long, global = true, env = "FYGEN_PORT")]
    port: Option<String>,

    /// Baud rate [default: 9600].
    #[arg(short, long, global = true, env = "FYGEN_BAUD")]
    baud: Option<u32>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "FYGEN_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Answer yes to confirmation prompts.
    #[arg(short = 'y', long, global = true)]
    yes: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Read the device model string.
    Model {
        /// Output as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Configure one output channel.
    Channel {
        /// Channel number (1 = CH1, 2 = CH2).
        #[arg(long = "ch", default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=2))]
        channel: u8,

        /// Waveform name (sine, square, pulse, triangle, ecg, arb1..arb4, ...).
        #[arg(short, long, value_parser = parse_waveform)]
        waveform: Option<Waveform>,

        /// Frequency in Hz.
        #[arg(short, long)]
        freq: Option<f64>,

        /// Amplitude in volts.
        #[arg(short, long)]
        amplitude: Option<f64>,

        /// DC offset in volts.
        #[arg(short, long, allow_negative_numbers = true)]
        offset: Option<f64>,

        /// Duty cycle in percent (0..=99.9).
        #[arg(short, long)]
        duty: Option<f64>,

        /// CH2 phase in degrees (0..=359).
        #[arg(long)]
        phase: Option<u16>,
    },

    /// Control the CH1 frequency sweep.
    Sweep {
        #[command(subcommand)]
        action: SweepAction,
    },

    /// Configure the trigger.
    Trigger {
        /// Trigger source.
        #[arg(long, value_enum)]
        source: Option<TriggerArg>,

        /// Number of cycles per trigger.
        #[arg(long)]
        cycles: Option<u32>,
    },

    /// Poll the frequency or event counter.
    Measure {
        /// Counter to read.
        #[arg(value_enum)]
        what: MeasureArg,

        /// Poll interval in milliseconds [default: 1000].
        #[arg(short, long)]
        interval: Option<u64>,

        /// Stop after this many readings (runs until Ctrl-C if omitted).
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Output readings as JSON lines to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Reset the event counter.
    ClearCount,

    /// Upload a waveform to an arbitrary bank.
    Upload {
        /// Target bank (1..=4).
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=4))]
        bank: Option<u8>,

        /// Preset shape to upload.
        #[arg(short, long, default_value = "sine", value_parser = parse_shape)]
        shape: Shape,

        /// Payload bytes per paced write.
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Check the device's acknowledgements.
        #[arg(long)]
        verify_acks: bool,
    },

    /// Print the encoded upload payload of a shape as hex.
    Preview {
        /// Preset shape to encode.
        #[arg(short, long, default_value = "sine", value_parser = parse_shape)]
        shape: Shape,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions (auto-detected if not specified with --install).
        #[arg(value_enum)]
        shell: Option<Shell>,

        /// Automatically install completions to your shell configuration.
        #[arg(long)]
        install: bool,
    },
}

/// Sweep actions.
#[derive(Subcommand)]
enum SweepAction {
    /// Program the sweep range and start it.
    Start {
        /// Start frequency in Hz.
        #[arg(long, default_value_t = 100.0)]
        begin: f64,

        /// End frequency in Hz.
        #[arg(long, default_value_t = 10_000.0)]
        end: f64,

        /// Sweep duration in seconds (1..=99).
        #[arg(long, default_value_t = 2)]
        time: u8,

        /// Scan mode.
        #[arg(long, value_enum, default_value = "linear")]
        mode: SweepModeArg,
    },
    /// Stop the running sweep.
    Stop,
}

/// Trigger sources.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum TriggerArg {
    /// Front-panel button.
    Manual,
    /// External trigger input.
    External,
    /// CH2 output.
    Ch2,
}

impl From<TriggerArg> for TriggerSource {
    fn from(arg: TriggerArg) -> Self {
        match arg {
            TriggerArg::Manual => TriggerSource::Manual,
            TriggerArg::External => TriggerSource::External,
            TriggerArg::Ch2 => TriggerSource::Ch2,
        }
    }
}

/// Sweep scan modes.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum SweepModeArg {
    /// Linear.
    Linear,
    /// Logarithmic.
    Log,
}

impl From<SweepModeArg> for SweepMode {
    fn from(arg: SweepModeArg) -> Self {
        match arg {
            SweepModeArg::Linear => SweepMode::Linear,
            SweepModeArg::Log => SweepMode::Logarithmic,
        }
    }
}

/// Counters.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum MeasureArg {
    /// Frequency counter.
    Freq,
    /// Event counter.
    Count,
}

impl From<MeasureArg> for Measurement {
    fn from(arg: MeasureArg) -> Self {
        match arg {
            MeasureArg::Freq => Measurement::Frequency,
            MeasureArg::Count => Measurement::Count,
        }
    }
}

/// Parse a waveform name.
fn parse_waveform(s: &str) -> Result<Waveform, String> {
    Waveform::from_name(s.trim()).ok_or_else(|| format!("Unknown waveform: '{s}'"))
}

/// Parse a preset shape name.
fn parse_shape(s: &str) -> Result<Shape, String> {
    s.trim()
        .parse()
        .map_err(|e: fygen::Error| e.to_string())
}

fn main() {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "fygen v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    install_interrupt_handler();

    if let Err(err) = run(&cli) {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        std::process::exit(exit_code(&err));
    }
}

/// First Ctrl-C requests a stop, the second exits.
fn install_interrupt_handler() {
    let installed = ctrlc::set_handler(|| {
        if INTERRUPTED.swap(true, Ordering::Relaxed) {
            std::process::exit(130);
        }
    });
    if let Err(e) = installed {
        debug!("Ctrl-C handler not installed: {e}");
    }
    fygen::set_interrupt_checker(was_interrupted);
}

fn run(cli: &Cli) -> Result<()> {
    // Completions and preview need neither config nor hardware
    match &cli.command {
        Commands::Completions { shell, install } => {
            if *install {
                return commands::completions::cmd_completions_install(*shell);
            }
            let Some(shell) = shell else {
                return Err(CliError::Usage(
                    "specify a shell type, e.g.: fygen completions bash \
                     (or use `fygen completions --install`)"
                        .into(),
                )
                .into());
            };
            commands::completions::cmd_completions(*shell);
            return Ok(());
        },
        Commands::Preview { shape } => return commands::upload::cmd_preview(*shape),
        _ => {},
    }

    let config = match &cli.config_path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load(),
    };

    match &cli.command {
        Commands::Model { json } => commands::device::cmd_model(cli, &config, *json),
        Commands::Channel {
            channel,
            waveform,
            freq,
            amplitude,
            offset,
            duty,
            phase,
        } => {
            let settings = commands::device::ChannelSettings {
                channel: Channel::from_number(*channel).unwrap_or_default(),
                waveform: *waveform,
                freq: *freq,
                amplitude: *amplitude,
                offset: *offset,
                duty: *duty,
                phase: *phase,
            };
            commands::device::cmd_channel(cli, &config, &settings)
        },
        Commands::Sweep { action } => match action {
            SweepAction::Start {
                begin,
                end,
                time,
                mode,
            } => {
                let settings = fygen::SweepSettings {
                    begin_hz: *begin,
                    end_hz: *end,
                    time_s: *time,
                    mode: (*mode).into(),
                };
                commands::device::cmd_sweep_start(cli, &config, &settings)
            },
            SweepAction::Stop => commands::device::cmd_sweep_stop(cli, &config),
        },
        Commands::Trigger { source, cycles } => {
            commands::device::cmd_trigger(cli, &config, source.map(Into::into), *cycles)
        },
        Commands::Measure {
            what,
            interval,
            count,
            json,
        } => commands::measure::cmd_measure(
            cli,
            &config,
            (*what).into(),
            *interval,
            *count,
            *json,
        ),
        Commands::ClearCount => commands::device::cmd_clear_count(cli, &config),
        Commands::Upload {
            bank,
            shape,
            chunk_size,
            verify_acks,
        } => {
            let options = commands::upload::UploadOptions {
                bank: *bank,
                shape: *shape,
                chunk_size: *chunk_size,
                verify_acks: *verify_acks,
            };
            commands::upload::cmd_upload(cli, &config, &options)
        },
        Commands::Completions { .. } | Commands::Preview { .. } => Ok(()),
    }
}

/// Resolve the port and open a session with the configured timing.
fn open_session(cli: &Cli, config: &Config) -> Result<DeviceSession<NativePort>> {
    let port = prompt::resolve_port(cli.port.as_deref(), config, cli.non_interactive)?;
    let baud = cli
        .baud
        .or(config.connection.baud)
        .unwrap_or(fygen::port::DEFAULT_BAUD);

    if !cli.quiet {
        eprintln!(
            "{} Using {} at {} baud",
            style("🔌").cyan(),
            style(&port).bold(),
            baud
        );
    }

    DeviceSession::connect_with(&port, baud, config.session_config())
        .map_err(|e| CliError::from(e).into())
}
