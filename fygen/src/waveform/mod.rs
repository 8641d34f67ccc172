//! Editable arbitrary waveform.
//!
//! A waveform is exactly [`SAMPLE_COUNT`] samples in `[-1.0, 1.0]`. Writes are
//! clamped, never rejected; only an out-of-range index is an error.

pub mod editor;
pub mod history;
pub mod shape;

pub use editor::WaveformEditor;
pub use history::{EditHistory, PointEdit, StrokeEdit};
pub use shape::Shape;

use crate::error::{Error, Result};
use crate::protocol::encoder::{self, EncodedPayload};

/// A normalized sample value.
pub type Sample = f32;

/// Number of points in an arbitrary waveform.
pub const SAMPLE_COUNT: usize = 2048;

/// Clamp a value into the sample range. NaN becomes the midline.
pub fn clamp_sample(value: Sample) -> Sample {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}

/// Fixed-length sample buffer.
#[derive(Clone, PartialEq)]
pub struct WaveformBuffer {
    samples: Box<[Sample; SAMPLE_COUNT]>,
}

impl Default for WaveformBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl WaveformBuffer {
    /// A flat waveform at 0.0.
    pub fn new() -> Self {
        Self {
            samples: Box::new([0.0; SAMPLE_COUNT]),
        }
    }

    /// Build a waveform from a generator function, clamping every value.
    pub fn from_fn(mut f: impl FnMut(usize) -> Sample) -> Self {
        let mut buffer = Self::new();
        for (i, sample) in buffer.samples.iter_mut().enumerate() {
            *sample = clamp_sample(f(i));
        }
        buffer
    }

    /// Always [`SAMPLE_COUNT`].
    #[allow(clippy::unused_self)]
    pub fn len(&self) -> usize {
        SAMPLE_COUNT
    }

    /// Never empty.
    #[allow(clippy::unused_self)]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// All samples, in time order.
    pub fn samples(&self) -> &[Sample; SAMPLE_COUNT] {
        &self.samples
    }

    /// Sample at `index`.
    pub fn get(&self, index: usize) -> Result<Sample> {
        self.samples
            .get(index)
            .copied()
            .ok_or(Error::IndexOutOfRange {
                index,
                len: SAMPLE_COUNT,
            })
    }

    /// Clamp and store `value` at `index`, returning the previous value.
    pub fn set(&mut self, index: usize, value: Sample) -> Result<Sample> {
        let slot = self
            .samples
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange {
                index,
                len: SAMPLE_COUNT,
            })?;
        Ok(std::mem::replace(slot, clamp_sample(value)))
    }

    /// Write a value recorded by the edit history.
    ///
    /// History entries only hold indices and values that passed [`Self::set`].
    pub(crate) fn restore(&mut self, index: usize, value: Sample) {
        if let Some(slot) = self.samples.get_mut(index) {
            *slot = value;
        }
    }

    /// Reset every sample to 0.0.
    pub fn reset(&mut self) {
        self.samples.fill(0.0);
    }

    /// Independent copy for an upload.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// Encode into the device's binary format.
    pub fn encode(&self) -> EncodedPayload {
        encoder::encode(&self.samples)
    }
}

impl std::fmt::Debug for WaveformBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (min, max) = self
            .samples
            .iter()
            .fold((Sample::MAX, Sample::MIN), |(lo, hi), &s| (lo.min(s), hi.max(s)));
        f.debug_struct("WaveformBuffer")
            .field("len", &SAMPLE_COUNT)
            .field("min", &min)
            .field("max", &max)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_flat() {
        let buffer = WaveformBuffer::new();
        assert_eq!(buffer.len(), SAMPLE_COUNT);
        assert!(buffer.samples().iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_set_clamps_instead_of_rejecting() {
        let mut buffer = WaveformBuffer::new();
        assert_eq!(buffer.set(10, 5.0).unwrap(), 0.0);
        assert_eq!(buffer.get(10).unwrap(), 1.0);
        buffer.set(11, -3.0).unwrap();
        assert_eq!(buffer.get(11).unwrap(), -1.0);
        buffer.set(12, f32::NAN).unwrap();
        assert_eq!(buffer.get(12).unwrap(), 0.0);
    }

    #[test]
    fn test_last_index_is_valid() {
        let mut buffer = WaveformBuffer::new();
        assert!(buffer.set(SAMPLE_COUNT - 1, 0.5).is_ok());
    }

    #[test]
    fn test_index_out_of_range() {
        let mut buffer = WaveformBuffer::new();
        let err = buffer.set(2048, 0.5).unwrap_err();
        assert!(matches!(
            err,
            Error::IndexOutOfRange {
                index: 2048,
                len: 2048
            }
        ));
        assert!(buffer.get(5000).is_err());
    }

    #[test]
    fn test_from_fn_clamps() {
        let buffer = WaveformBuffer::from_fn(|i| i as f32);
        assert_eq!(buffer.get(0).unwrap(), 0.0);
        assert_eq!(buffer.get(1).unwrap(), 1.0);
        assert_eq!(buffer.get(2047).unwrap(), 1.0);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut buffer = WaveformBuffer::new();
        let snapshot = buffer.snapshot();
        buffer.set(0, 0.75).unwrap();
        assert_eq!(snapshot.get(0).unwrap(), 0.0);
        assert_ne!(snapshot, buffer);
    }

    #[test]
    fn test_reset() {
        let mut buffer = WaveformBuffer::from_fn(|_| 0.3);
        buffer.reset();
        assert_eq!(buffer, WaveformBuffer::new());
    }
}
