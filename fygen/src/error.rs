//! Error types for fygen.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::upload::UploadState;

/// Result type for fygen operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for fygen operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The serial port could not be opened (missing, or held by another process).
    #[error("Cannot open {port}: {reason}")]
    LinkUnavailable {
        /// Port name/path that failed to open.
        port: String,
        /// Reason reported by the platform.
        reason: String,
    },

    /// The link dropped while an operation was in progress.
    #[error("Link closed")]
    LinkClosed,

    /// No complete reply arrived within the bound.
    #[error("No reply within {0:?}")]
    ResponseTimeout(Duration),

    /// The reply did not match the expected grammar.
    #[error("Malformed reply to '{command}': {reply:?}")]
    MalformedReply {
        /// Command that was answered.
        command: String,
        /// Reply line as received.
        reply: String,
    },

    /// The operation requires an open session.
    #[error("Not connected")]
    NotConnected,

    /// A sample index outside the waveform buffer.
    #[error("Sample index {index} out of range (buffer holds {len} samples)")]
    IndexOutOfRange {
        /// Offending index.
        index: usize,
        /// Buffer length.
        len: usize,
    },

    /// The user aborted an upload. The bank is left partially written.
    #[error("Upload cancelled after {sent}/{total} bytes; bank contents are partial")]
    Cancelled {
        /// Bytes already written to the device.
        sent: usize,
        /// Payload size.
        total: usize,
    },

    /// A parameter outside what the device accepts.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The device answered a handshake step with unexpected bytes.
    #[error("Unexpected acknowledgement during {step}: expected {expected:?}, got {actual:?}")]
    UnexpectedAck {
        /// Handshake step.
        step: &'static str,
        /// Expected bytes.
        expected: Vec<u8>,
        /// Bytes received.
        actual: Vec<u8>,
    },

    /// An upload session that already reached a terminal state was run again.
    #[error("Upload session already finished ({0})")]
    SessionSpent(UploadState),

    /// I/O error on the link.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl Error {
    /// Whether this error originates from the link layer.
    ///
    /// Link-layer errors move an in-flight upload to `Failed`.
    pub fn is_link_error(&self) -> bool {
        match self {
            Self::LinkClosed
            | Self::ResponseTimeout(_)
            | Self::UnexpectedAck { .. }
            | Self::Io(_) => true,
            #[cfg(feature = "native")]
            Self::Serial(_) => true,
            _ => false,
        }
    }

    /// Classify an I/O error raised by the port.
    ///
    /// Errors meaning the other end is gone become [`Error::LinkClosed`].
    pub(crate) fn from_link_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof => Self::LinkClosed,
            _ => Self::Io(err),
        }
    }
}
