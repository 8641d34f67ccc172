//! Arbitrary-waveform sample encoding.
//!
//! ## Wire format
//!
//! ```text
//! +--------+--------+--------+--------+-----+----------+----------+
//! | s0 lo  | s0 hi  | s1 lo  | s1 hi  | ... | s2047 lo | s2047 hi |
//! +--------+--------+--------+--------+-----+----------+----------+
//! ```
//!
//! Each sample becomes an unsigned 12-bit code, `-1.0 -> 0` and
//! `+1.0 -> 4095`, stored as a little-endian 16-bit word.

use byteorder::{ByteOrder, LittleEndian};

use crate::waveform::{SAMPLE_COUNT, Sample};

/// Encoded payload size in bytes.
pub const PAYLOAD_LEN: usize = SAMPLE_COUNT * 2;

/// Largest 12-bit sample code.
pub const MAX_CODE: u16 = 4095;

/// Code of a 0.0 sample.
pub const MID_CODE: u16 = 2048;

const HALF_SPAN: f32 = MAX_CODE as f32 / 2.0;

/// Map a sample to its 12-bit code (round to nearest, clamped).
pub fn sample_to_code(sample: Sample) -> u16 {
    if sample.is_nan() {
        return MID_CODE;
    }
    let code = ((sample.clamp(-1.0, 1.0) + 1.0) * HALF_SPAN).round();
    code.clamp(0.0, f32::from(MAX_CODE)) as u16
}

/// Map a 12-bit code back to a sample.
pub fn code_to_sample(code: u16) -> Sample {
    f32::from(code.min(MAX_CODE)) / HALF_SPAN - 1.0
}

/// The 4096-byte binary image of a waveform, as sent to the device.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    bytes: Box<[u8; PAYLOAD_LEN]>,
}

impl EncodedPayload {
    /// Raw payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..]
    }

    /// Always [`PAYLOAD_LEN`].
    #[allow(clippy::unused_self)]
    pub fn len(&self) -> usize {
        PAYLOAD_LEN
    }

    /// Never empty.
    #[allow(clippy::unused_self)]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// 12-bit code of sample `index`.
    pub fn code(&self, index: usize) -> Option<u16> {
        let offset = index.checked_mul(2)?;
        self.bytes
            .get(offset..offset + 2)
            .map(LittleEndian::read_u16)
    }

    /// Reference decoder: reconstruct the samples.
    pub fn decode(&self) -> Vec<Sample> {
        self.bytes
            .chunks_exact(2)
            .map(|pair| code_to_sample(LittleEndian::read_u16(pair)))
            .collect()
    }
}

impl std::fmt::Debug for EncodedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedPayload")
            .field("len", &PAYLOAD_LEN)
            .field("head", &&self.bytes[..8])
            .finish()
    }
}

/// Encode a full waveform into the device's binary format.
pub fn encode(samples: &[Sample; SAMPLE_COUNT]) -> EncodedPayload {
    let mut bytes = Box::new([0u8; PAYLOAD_LEN]);
    for (sample, word) in samples.iter().zip(bytes.chunks_exact_mut(2)) {
        LittleEndian::write_u16(word, sample_to_code(*sample));
    }
    EncodedPayload { bytes }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One quantization step: 1/2048 of the [-1, 1] range.
    const STEP: f32 = 2.0 / 2048.0;

    fn samples_from(f: impl Fn(usize) -> f32) -> Box<[f32; SAMPLE_COUNT]> {
        let mut samples = Box::new([0.0f32; SAMPLE_COUNT]);
        for (i, s) in samples.iter_mut().enumerate() {
            *s = f(i);
        }
        samples
    }

    #[test]
    fn test_code_endpoints() {
        assert_eq!(sample_to_code(-1.0), 0);
        assert_eq!(sample_to_code(1.0), MAX_CODE);
        assert_eq!(sample_to_code(0.0), MID_CODE);
        assert_eq!(sample_to_code(7.0), MAX_CODE);
        assert_eq!(sample_to_code(-7.0), 0);
        assert_eq!(sample_to_code(f32::NAN), MID_CODE);
    }

    #[test]
    fn test_payload_length_and_byte_order() {
        // Sample 0 = +1.0 -> 0x0FFF -> (0xFF, 0x0F)
        let samples = samples_from(|i| if i == 0 { 1.0 } else { -1.0 });
        let payload = encode(&samples);

        assert_eq!(payload.as_bytes().len(), 4096);
        assert_eq!(payload.len(), PAYLOAD_LEN);
        assert_eq!(payload.as_bytes()[0], 0xFF);
        assert_eq!(payload.as_bytes()[1], 0x0F);
        assert_eq!(payload.as_bytes()[2], 0x00);
        assert_eq!(payload.as_bytes()[3], 0x00);
        assert_eq!(payload.code(0), Some(0x0FFF));
        assert_eq!(payload.code(SAMPLE_COUNT), None);
    }

    #[test]
    fn test_high_byte_never_exceeds_twelve_bits() {
        let samples = samples_from(|i| ((i as f32) * 0.37).sin() * 1.5);
        let payload = encode(&samples);
        for pair in payload.as_bytes().chunks_exact(2) {
            assert!(pair[1] <= 0x0F);
        }
    }

    #[test]
    fn test_decode_within_one_step() {
        let samples = samples_from(|i| {
            let t = i as f32 / SAMPLE_COUNT as f32;
            (t * std::f32::consts::TAU * 3.0).sin() * 0.9 + (t * 17.0).cos() * 0.1
        });
        let decoded = encode(&samples).decode();

        assert_eq!(decoded.len(), SAMPLE_COUNT);
        for (original, restored) in samples.iter().zip(&decoded) {
            assert!(
                (original - restored).abs() <= STEP,
                "{original} decoded as {restored}"
            );
        }
    }

    #[test]
    fn test_encode_is_deterministic() {
        let samples = samples_from(|i| (i % 97) as f32 / 48.5 - 1.0);
        assert_eq!(encode(&samples), encode(&samples));
    }
}
