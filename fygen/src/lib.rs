//! # fygen
//!
//! A library for controlling FY32xx-class two-channel function generators
//! over their serial line protocol.
//!
//! This crate provides:
//!
//! - A paced ASCII command session with typed replies (frequency, counts)
//! - Channel, sweep and trigger configuration commands
//! - Background measurement polling with cancellation
//! - An editable 2048-point arbitrary waveform with stroke-based undo/redo
//! - 12-bit sample encoding and the bank upload handshake
//!
//! ## Features
//!
//! - `native` (default): serial port support via the `serialport` crate
//! - `serde`: Serialization support for value types
//!
//! ## Example
//!
//! ```rust,no_run
//! use fygen::{DeviceSession, Shape, UploadSession, WaveformEditor};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut editor = WaveformEditor::new();
//!     editor.apply_shape(Shape::Triangle);
//!     editor.draw_line((0, 0.0), (256, 1.0))?;
//!
//!     #[cfg(feature = "native")]
//!     {
//!         let session = DeviceSession::connect("/dev/ttyUSB0", 9600)?;
//!         let mut upload = UploadSession::new(1, editor.encode())?;
//!         let report = upload.run(&session, &mut ())?;
//!         println!("Sent {} bytes", report.bytes_sent);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

pub mod error;
pub mod poller;
pub mod port;
pub mod protocol;
pub mod session;
pub mod upload;
pub mod waveform;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker consulted by long-running uploads.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications).
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

#[cfg(test)]
pub(crate) fn test_set_interrupted(value: bool) {
    static TEST_INTERRUPT_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

    let flag = TEST_INTERRUPT_FLAG
        .get_or_init(|| {
            let shared = Arc::new(AtomicBool::new(false));
            let checker = Arc::clone(&shared);
            set_interrupt_checker(move || checker.load(Ordering::Relaxed));
            shared
        })
        .clone();

    flag.store(value, Ordering::Relaxed);
}

/// Shared stop flag for uploads and poll loops.
///
/// Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether a stop was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::NativePort;
pub use {
    error::{Error, Result},
    poller::{Measurement, Poller, Reading},
    port::{Port, SerialConfig},
    protocol::{
        Channel, EncodedPayload, PAYLOAD_LEN, SweepMode, SweepSettings, TriggerSource, Waveform,
    },
    session::{DeviceSession, Link, SessionConfig},
    upload::{
        UploadCommands, UploadConfig, UploadObserver, UploadReport, UploadSession, UploadState,
    },
    waveform::{SAMPLE_COUNT, Sample, Shape, WaveformBuffer, WaveformEditor},
};

#[cfg(test)]
mod tests {
    use super::*;

    // Sole test touching the global flag
    #[test]
    fn test_interrupt_checker_toggle_true_false() {
        let token = CancelToken::new();

        test_set_interrupted(true);
        assert!(is_interrupted_requested());
        assert!(UploadObserver::is_cancelled(&token));

        test_set_interrupted(false);
        assert!(!is_interrupted_requested());
        assert!(!UploadObserver::is_cancelled(&token));
    }

    #[test]
    fn test_cancel_token_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
