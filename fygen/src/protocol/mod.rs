//! Wire protocol of the generator.
//!
//! - [`command`]: ASCII command lines
//! - [`reply`]: measurement reply parsing
//! - [`encoder`]: binary arbitrary-waveform payload

pub mod command;
pub mod encoder;
pub mod reply;

// Re-export common types
pub use command::{Channel, SweepMode, SweepSettings, TriggerSource, Waveform};
pub use encoder::{EncodedPayload, PAYLOAD_LEN, encode};
