//! Preset shapes for seeding the editor.

use std::f32::consts::TAU;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::waveform::{SAMPLE_COUNT, Sample};

/// One period of a standard shape, spread over the whole buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Sine starting at the midline, rising.
    Sine,
    /// High for the first half, low for the second.
    Square,
    /// -1 to +1 and back.
    Triangle,
    /// Linear ramp from -1 to +1.
    Sawtooth,
    /// Midline.
    Flat,
}

impl Shape {
    /// Every preset, in menu order.
    pub const ALL: [Self; 5] = [
        Self::Sine,
        Self::Square,
        Self::Triangle,
        Self::Sawtooth,
        Self::Flat,
    ];

    /// Value of sample `index`.
    pub fn sample(self, index: usize) -> Sample {
        let t = (index % SAMPLE_COUNT) as Sample / SAMPLE_COUNT as Sample;
        match self {
            Self::Sine => (t * TAU).sin(),
            Self::Square => {
                if t < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            },
            Self::Triangle => {
                if t < 0.5 {
                    4.0 * t - 1.0
                } else {
                    3.0 - 4.0 * t
                }
            },
            Self::Sawtooth => 2.0 * t - 1.0,
            Self::Flat => 0.0,
        }
    }

    /// Lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sine => "sine",
            Self::Square => "square",
            Self::Triangle => "triangle",
            Self::Sawtooth => "sawtooth",
            Self::Flat => "flat",
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Shape {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "saw" | "ramp" => return Ok(Self::Sawtooth),
            "dc" | "zero" => return Ok(Self::Flat),
            _ => {},
        }
        Self::ALL
            .into_iter()
            .find(|shape| shape.name() == lower)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown shape: {s}")))
    }
}
