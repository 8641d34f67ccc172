//! Arbitrary-waveform upload.
//!
//! ## Handshake
//!
//! ```text
//! Idle -> Erasing       preamble + bank erase
//!      -> Beginning     begin transfer for the bank
//!      -> Transferring  4096 payload bytes in paced chunks
//!      -> Completed | Cancelled | Failed
//! ```
//!
//! The device gives no acknowledgement beyond pacing by default, so a
//! cancelled or failed upload leaves the bank partially written. Bytes that
//! already reached the device cannot be taken back.

use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use crate::CancelToken;
use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::encoder::EncodedPayload;
use crate::session::{DeviceSession, Link};

/// Number of arbitrary-waveform banks.
pub const BANK_COUNT: u8 = 4;

/// Default payload chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 8;

/// Default bound on waiting for one acknowledgement.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(1);

const ACK_PREAMBLE: &[u8] = b"X";
const ACK_ERASE: &[u8] = b"SE";
const ACK_BEGIN: &[u8] = b"W";
const ACK_BYTE: u8 = b'X';

/// Upload progress through the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UploadState {
    /// Not started.
    #[default]
    Idle,
    /// Erasing the target bank.
    Erasing,
    /// Announcing the transfer.
    Beginning,
    /// Sending payload chunks.
    Transferring,
    /// Every byte was sent.
    Completed,
    /// Stopped on request between chunks.
    Cancelled,
    /// Stopped by an error.
    Failed,
}

impl UploadState {
    /// Whether the session can make no further progress.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Erasing => "erasing",
            Self::Beginning => "beginning",
            Self::Transferring => "transferring",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Raw control frames of the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCommands {
    /// Sent once before the erase, if present.
    pub preamble: Option<Vec<u8>>,
    /// Erases the target bank.
    pub erase: Vec<u8>,
    /// Announces the payload for the target bank.
    pub begin: Vec<u8>,
}

impl UploadCommands {
    /// Frame prefix of the default command set.
    pub const MAGIC: &'static [u8] = b"DDS_WAVE";

    /// Default command set: `DDS_WAVE` followed by one opcode byte.
    ///
    /// Fails with [`Error::InvalidArgument`] unless `bank` is in 1..=4.
    pub fn dds_wave(bank: u8) -> Result<Self> {
        if !(1..=BANK_COUNT).contains(&bank) {
            return Err(Error::InvalidArgument(format!(
                "bank {bank} (expected 1..={BANK_COUNT})"
            )));
        }
        let frame = |opcode: u8| {
            let mut frame = Self::MAGIC.to_vec();
            frame.push(opcode);
            frame
        };
        Ok(Self {
            preamble: Some(frame(0xA5)),
            erase: frame(0xF0 | bank),
            begin: frame(bank),
        })
    }
}

/// Upload tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadConfig {
    /// Payload bytes per paced write.
    pub chunk_size: usize,
    /// Check the device's acknowledgements.
    pub verify_acks: bool,
    /// Bound on waiting for one acknowledgement.
    pub ack_timeout: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            verify_acks: false,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }
}

impl UploadConfig {
    /// Set the chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Enable or disable acknowledgement checks.
    #[must_use]
    pub fn with_verify_acks(mut self, verify: bool) -> Self {
        self.verify_acks = verify;
        self
    }

    /// Set the acknowledgement timeout.
    #[must_use]
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }
}

/// Receives upload events and answers cancellation requests.
///
/// Every method has a default, so an implementor overrides only what it uses.
pub trait UploadObserver {
    /// The session moved to `state`.
    fn on_state(&mut self, _state: UploadState) {}

    /// `sent` of `total` payload bytes reached the device.
    fn on_progress(&mut self, _sent: usize, _total: usize) {}

    /// Polled between chunks; `true` stops the transfer.
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl UploadObserver for () {}

/// Stops on [`CancelToken::cancel`] or on the global interrupt checker.
impl UploadObserver for CancelToken {
    fn is_cancelled(&self) -> bool {
        CancelToken::is_cancelled(self) || crate::is_interrupted_requested()
    }
}

/// Summary of a completed upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReport {
    /// Target bank.
    pub bank: u8,
    /// Payload bytes sent.
    pub bytes_sent: usize,
    /// Number of chunks.
    pub chunks: usize,
    /// Wall time of the handshake and transfer.
    pub elapsed: Duration,
}

/// One upload of one payload to one bank.
///
/// Single use: once it reaches a terminal state, [`UploadSession::run`]
/// refuses to run again. A retry is a new session.
#[derive(Debug, Clone)]
pub struct UploadSession {
    bank: u8,
    payload: EncodedPayload,
    config: UploadConfig,
    commands: UploadCommands,
    state: UploadState,
    sent: usize,
}

impl UploadSession {
    /// Prepare an upload of `payload` into `bank` (1..=4).
    pub fn new(bank: u8, payload: EncodedPayload) -> Result<Self> {
        let commands = UploadCommands::dds_wave(bank)?;
        Ok(Self {
            bank,
            payload,
            config: UploadConfig::default(),
            commands,
            state: UploadState::Idle,
            sent: 0,
        })
    }

    /// Use explicit tuning.
    #[must_use]
    pub fn with_config(mut self, config: UploadConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a different set of control frames.
    #[must_use]
    pub fn with_commands(mut self, commands: UploadCommands) -> Self {
        self.commands = commands;
        self
    }

    /// Target bank.
    pub fn bank(&self) -> u8 {
        self.bank
    }

    /// Current state.
    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Payload bytes already sent.
    pub fn bytes_sent(&self) -> usize {
        self.sent
    }

    /// Payload size.
    pub fn total(&self) -> usize {
        self.payload.len()
    }

    /// Drive the handshake and transfer to a terminal state.
    ///
    /// Holds the link for the whole upload. Fails with
    /// [`Error::NotConnected`] without leaving `Idle` if the session is
    /// closed, and with [`Error::Cancelled`] if the observer asks to stop.
    pub fn run<P: Port>(
        &mut self,
        session: &DeviceSession<P>,
        observer: &mut dyn UploadObserver,
    ) -> Result<UploadReport> {
        if self.state != UploadState::Idle {
            return Err(Error::SessionSpent(self.state));
        }
        if self.config.chunk_size == 0 {
            return Err(Error::InvalidArgument("chunk size 0".into()));
        }
        if !session.is_connected() {
            return Err(Error::NotConnected);
        }
        let mut link = session.lock()?;

        info!(
            "Uploading {} bytes to bank {} on {}",
            self.total(),
            self.bank,
            session.port_name()
        );
        let start = Instant::now();

        match self.drive(&mut link, observer) {
            Ok(()) => {
                self.transition(UploadState::Completed, observer);
                let report = UploadReport {
                    bank: self.bank,
                    bytes_sent: self.sent,
                    chunks: self.total().div_ceil(self.config.chunk_size),
                    elapsed: start.elapsed(),
                };
                info!(
                    "Upload to bank {} complete in {:.1}s",
                    self.bank,
                    report.elapsed.as_secs_f64()
                );
                Ok(report)
            },
            Err(err @ Error::Cancelled { .. }) => {
                self.transition(UploadState::Cancelled, observer);
                warn!(
                    "Upload cancelled after {}/{} bytes; bank {} is partially written",
                    self.sent,
                    self.total(),
                    self.bank
                );
                Err(err)
            },
            Err(err) => {
                self.transition(UploadState::Failed, observer);
                if err.is_link_error() {
                    warn!("Upload to bank {} failed: {err}", self.bank);
                } else {
                    debug!("Upload to bank {} aborted: {err}", self.bank);
                }
                Err(err)
            },
        }
    }

    fn transition(&mut self, state: UploadState, observer: &mut dyn UploadObserver) {
        debug!("Upload state {} -> {state}", self.state);
        self.state = state;
        observer.on_state(state);
    }

    fn drive<P: Port>(
        &mut self,
        link: &mut Link<'_, P>,
        observer: &mut dyn UploadObserver,
    ) -> Result<()> {
        link.clear_input()?;

        self.transition(UploadState::Erasing, observer);
        if let Some(preamble) = &self.commands.preamble {
            link.write_paced(preamble)?;
            expect_ack(link, &self.config, "preamble", ACK_PREAMBLE)?;
        }
        link.write_paced(&self.commands.erase)?;
        expect_ack(link, &self.config, "erase", ACK_ERASE)?;

        self.transition(UploadState::Beginning, observer);
        link.write_paced(&self.commands.begin)?;
        expect_ack(link, &self.config, "begin", ACK_BEGIN)?;

        self.transition(UploadState::Transferring, observer);
        let total = self.payload.len();
        for chunk in self.payload.as_bytes().chunks(self.config.chunk_size) {
            if observer.is_cancelled() {
                return Err(Error::Cancelled {
                    sent: self.sent,
                    total,
                });
            }
            link.write_paced(chunk)?;
            if self.config.verify_acks {
                wait_byte_acks(link, &self.config, chunk.len())?;
            }
            self.sent += chunk.len();
            trace!("Sent {}/{total}", self.sent);
            observer.on_progress(self.sent, total);
        }
        Ok(())
    }
}

fn expect_ack<P: Port>(
    link: &mut Link<'_, P>,
    config: &UploadConfig,
    step: &'static str,
    expected: &[u8],
) -> Result<()> {
    if !config.verify_acks {
        return Ok(());
    }
    let actual = link.read_exact_bytes(expected.len(), config.ack_timeout)?;
    if actual != expected {
        return Err(Error::UnexpectedAck {
            step,
            expected: expected.to_vec(),
            actual,
        });
    }
    trace!("{step} acknowledged");
    Ok(())
}

/// Wait for one `X` per payload byte. Other bytes are skipped.
fn wait_byte_acks<P: Port>(
    link: &mut Link<'_, P>,
    config: &UploadConfig,
    count: usize,
) -> Result<()> {
    let mut acked = 0;
    while acked < count {
        let byte = link.read_exact_bytes(1, config.ack_timeout)?;
        if byte[0] == ACK_BYTE {
            acked += 1;
        } else {
            trace!("Ignoring 0x{:02X} while waiting for payload acks", byte[0]);
        }
    }
    Ok(())
}
