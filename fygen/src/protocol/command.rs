//! ASCII command builders.
//!
//! Every command is a short mnemonic followed by an optional decimal argument,
//! sent as one line terminated by a single line feed. All functions here are
//! pure: they validate arguments and produce the line text without performing
//! any I/O. Frequencies cross this boundary in Hertz and go on the wire in
//! centi-Hertz.

use std::fmt;

use crate::error::{Error, Result};

/// Read the machine model.
pub const READ_MODEL: &str = "a";

/// Poll the frequency counter (integer centi-Hertz reply).
pub const POLL_FREQUENCY: &str = "ce";

/// Poll the event counter (integer reply).
pub const POLL_COUNT: &str = "cc";

/// Reset the event counter (no reply).
pub const CLEAR_COUNT: &str = "bc";

/// Run the configured sweep.
pub const SWEEP_RUN: &str = "br1";

/// Stop/pause a running sweep.
pub const SWEEP_STOP: &str = "br0";

/// Largest value of a 9-digit centi-Hertz field.
pub const MAX_SWEEP_CENTI_HZ: u64 = 999_999_999;

/// Largest trigger cycle count (7-digit field).
pub const MAX_TRIGGER_CYCLES: u32 = 9_999_999;

/// Output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Channel {
    /// CH1, the main channel.
    #[default]
    Main,
    /// CH2, the deputy channel.
    Deputy,
}

impl Channel {
    /// Command prefix letter.
    pub fn prefix(self) -> char {
        match self {
            Self::Main => 'b',
            Self::Deputy => 'd',
        }
    }

    /// Channel from its front-panel number (1 or 2).
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::Main),
            2 => Some(Self::Deputy),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => write!(f, "CH1"),
            Self::Deputy => write!(f, "CH2"),
        }
    }
}

/// Built-in and arbitrary waveforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Waveform {
    /// Sine.
    Sine,
    /// Square.
    Square,
    /// Pulse (main channel only).
    Pulse,
    /// Triangle.
    Triangle,
    /// Rising sawtooth.
    Sawtooth,
    /// Falling sawtooth.
    ReverseSawtooth,
    /// DC level.
    Dc,
    /// Lorentz pulse (preset 1).
    Lorentz,
    /// Multi-tone (preset 2).
    MultiTone,
    /// Periodic random (preset 3).
    PeriodicRandom,
    /// ECG (preset 4).
    Ecg,
    /// Trapezoidal pulse (preset 5).
    Trapezoid,
    /// Sinc pulse (preset 6).
    Sinc,
    /// Narrow pulse (preset 7).
    NarrowPulse,
    /// Gaussian white noise (preset 8).
    GaussianNoise,
    /// AM (preset 9).
    Am,
    /// FM (preset 10).
    Fm,
    /// User waveform stored in bank 1..=4.
    Arbitrary(u8),
}

impl Waveform {
    /// Wire id of this waveform on `channel`.
    ///
    /// The deputy channel has no pulse output, so every id after square is one
    /// lower than on the main channel.
    pub fn id(self, channel: Channel) -> Result<u8> {
        let main_id = match self {
            Self::Sine => 0,
            Self::Square => 1,
            Self::Pulse => 2,
            Self::Triangle => 3,
            Self::Sawtooth => 4,
            Self::ReverseSawtooth => 5,
            Self::Dc => 6,
            Self::Lorentz => 7,
            Self::MultiTone => 8,
            Self::PeriodicRandom => 9,
            Self::Ecg => 10,
            Self::Trapezoid => 11,
            Self::Sinc => 12,
            Self::NarrowPulse => 13,
            Self::GaussianNoise => 14,
            Self::Am => 15,
            Self::Fm => 16,
            Self::Arbitrary(bank @ 1..=4) => 16 + bank,
            Self::Arbitrary(bank) => {
                return Err(Error::InvalidArgument(format!(
                    "arbitrary bank {bank} (expected 1..=4)"
                )));
            },
        };

        match (channel, self) {
            (Channel::Main, _) => Ok(main_id),
            (Channel::Deputy, Self::Pulse) => Err(Error::InvalidArgument(
                "pulse waveform is only available on CH1".into(),
            )),
            (Channel::Deputy, Self::Sine | Self::Square) => Ok(main_id),
            (Channel::Deputy, _) => Ok(main_id - 1),
        }
    }

    /// Parse a waveform name such as `sine`, `ecg` or `arb2`.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        if let Some(bank) = name
            .strip_prefix("arbitrary")
            .or_else(|| name.strip_prefix("arb"))
        {
            return bank.parse().ok().map(Self::Arbitrary);
        }
        Some(match name.as_str() {
            "sine" | "sin" => Self::Sine,
            "square" => Self::Square,
            "pulse" => Self::Pulse,
            "triangle" => Self::Triangle,
            "sawtooth" | "saw" => Self::Sawtooth,
            "reverse-sawtooth" | "rsaw" => Self::ReverseSawtooth,
            "dc" => Self::Dc,
            "lorentz" => Self::Lorentz,
            "multi-tone" | "multitone" => Self::MultiTone,
            "periodic-random" | "random" => Self::PeriodicRandom,
            "ecg" => Self::Ecg,
            "trapezoid" => Self::Trapezoid,
            "sinc" => Self::Sinc,
            "narrow-pulse" => Self::NarrowPulse,
            "noise" | "gaussian-noise" => Self::GaussianNoise,
            "am" => Self::Am,
            "fm" => Self::Fm,
            _ => return None,
        })
    }
}

/// Trigger source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TriggerSource {
    /// Front-panel manual trigger.
    Manual,
    /// External trigger input.
    External,
    /// CH2 output.
    Ch2,
}

impl TriggerSource {
    fn code(self) -> u8 {
        match self {
            Self::Manual => 0,
            Self::External => 1,
            Self::Ch2 => 2,
        }
    }
}

/// Sweep scan mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SweepMode {
    /// Linear sweep.
    #[default]
    Linear,
    /// Logarithmic sweep.
    Logarithmic,
}

/// Sweep parameters, in Hertz and seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SweepSettings {
    /// Start frequency in Hz.
    pub begin_hz: f64,
    /// End frequency in Hz.
    pub end_hz: f64,
    /// Sweep duration in seconds (1..=99).
    pub time_s: u8,
    /// Scan mode.
    pub mode: SweepMode,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            begin_hz: 100.0,
            end_hz: 10_000.0,
            time_s: 2,
            mode: SweepMode::Linear,
        }
    }
}

/// Convert Hertz to the wire unit, rounding to the nearest centi-Hertz.
pub fn hz_to_centi_hz(hz: f64) -> Result<u64> {
    if !hz.is_finite() || hz < 0.0 {
        return Err(Error::InvalidArgument(format!("frequency {hz} Hz")));
    }
    let centi = (hz * 100.0).round();
    if centi > u64::MAX as f64 {
        return Err(Error::InvalidArgument(format!("frequency {hz} Hz")));
    }
    Ok(centi as u64)
}

/// Convert a wire frequency back to Hertz.
pub fn centi_hz_to_hz(centi_hz: u64) -> f64 {
    centi_hz as f64 / 100.0
}

fn finite(what: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Error::InvalidArgument(format!("{what} {value}")))
    }
}

/// Select the output waveform of a channel.
pub fn set_waveform(channel: Channel, waveform: Waveform) -> Result<String> {
    Ok(format!("{}w{}", channel.prefix(), waveform.id(channel)?))
}

/// Set the output frequency of a channel.
pub fn set_frequency(channel: Channel, hz: f64) -> Result<String> {
    Ok(format!("{}f{}", channel.prefix(), hz_to_centi_hz(hz)?))
}

/// Set the amplitude of a channel in volts.
pub fn set_amplitude(channel: Channel, volts: f64) -> Result<String> {
    let volts = finite("amplitude", volts)?;
    if volts < 0.0 {
        return Err(Error::InvalidArgument(format!("amplitude {volts} V")));
    }
    Ok(format!("{}a{volts:.2}", channel.prefix()))
}

/// Set the DC offset of a channel in volts.
pub fn set_offset(channel: Channel, volts: f64) -> Result<String> {
    let volts = finite("offset", volts)?;
    Ok(format!("{}o{volts:.2}", channel.prefix()))
}

/// Set the duty cycle of a channel, in percent with 0.1 % resolution.
pub fn set_duty_cycle(channel: Channel, percent: f64) -> Result<String> {
    let percent = finite("duty cycle", percent)?;
    let tenths = (percent * 10.0).round();
    if !(0.0..=999.0).contains(&tenths) {
        return Err(Error::InvalidArgument(format!(
            "duty cycle {percent}% (expected 0..=99.9)"
        )));
    }
    Ok(format!("{}d{:03}", channel.prefix(), tenths as u16))
}

/// Set the phase of the deputy channel relative to the main one.
pub fn set_phase(degrees: u16) -> Result<String> {
    if degrees >= 360 {
        return Err(Error::InvalidArgument(format!(
            "phase {degrees} degrees (expected 0..360)"
        )));
    }
    Ok(format!("dp{degrees:03}"))
}

/// Select the trigger source.
pub fn set_trigger_source(source: TriggerSource) -> String {
    format!("tt{}", source.code())
}

/// Set the number of cycles emitted per trigger.
pub fn set_trigger_cycles(cycles: u32) -> Result<String> {
    if cycles > MAX_TRIGGER_CYCLES {
        return Err(Error::InvalidArgument(format!(
            "trigger cycles {cycles} (max {MAX_TRIGGER_CYCLES})"
        )));
    }
    Ok(format!("tn{cycles:07}"))
}

fn sweep_centi_hz(hz: f64) -> Result<u64> {
    let centi = hz_to_centi_hz(hz)?;
    if centi > MAX_SWEEP_CENTI_HZ {
        return Err(Error::InvalidArgument(format!(
            "sweep frequency {hz} Hz does not fit the 9-digit field"
        )));
    }
    Ok(centi)
}

/// Set the sweep start frequency.
pub fn set_sweep_begin(hz: f64) -> Result<String> {
    Ok(format!("bb{:09}", sweep_centi_hz(hz)?))
}

/// Set the sweep end frequency.
pub fn set_sweep_end(hz: f64) -> Result<String> {
    Ok(format!("be{:09}", sweep_centi_hz(hz)?))
}

/// Set the sweep duration in seconds.
pub fn set_sweep_time(seconds: u8) -> Result<String> {
    if !(1..=99).contains(&seconds) {
        return Err(Error::InvalidArgument(format!(
            "sweep time {seconds} s (expected 1..=99)"
        )));
    }
    Ok(format!("bt{seconds:02}"))
}

/// Set the sweep scan mode.
pub fn set_sweep_mode(mode: SweepMode) -> String {
    match mode {
        SweepMode::Linear => "bm0".to_string(),
        SweepMode::Logarithmic => "bm1".to_string(),
    }
}

/// The full, ordered command sequence configuring a sweep.
pub fn configure_sweep(settings: &SweepSettings) -> Result<Vec<String>> {
    Ok(vec![
        set_sweep_begin(settings.begin_hz)?,
        set_sweep_end(settings.end_hz)?,
        set_sweep_time(settings.time_s)?,
        set_sweep_mode(settings.mode),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_prefix() {
        assert_eq!(Channel::Main.prefix(), 'b');
        assert_eq!(Channel::Deputy.prefix(), 'd');
        assert_eq!(Channel::from_number(2), Some(Channel::Deputy));
        assert_eq!(Channel::from_number(3), None);
    }

    #[test]
    fn test_waveform_ids_shift_on_deputy() {
        assert_eq!(Waveform::Sine.id(Channel::Deputy).unwrap(), 0);
        assert_eq!(Waveform::Square.id(Channel::Deputy).unwrap(), 1);
        assert_eq!(Waveform::Triangle.id(Channel::Main).unwrap(), 3);
        assert_eq!(Waveform::Triangle.id(Channel::Deputy).unwrap(), 2);
        assert_eq!(Waveform::Arbitrary(1).id(Channel::Main).unwrap(), 17);
        assert_eq!(Waveform::Arbitrary(4).id(Channel::Main).unwrap(), 20);
        assert_eq!(Waveform::Arbitrary(4).id(Channel::Deputy).unwrap(), 19);
    }

    #[test]
    fn test_waveform_invalid_combinations() {
        assert!(Waveform::Pulse.id(Channel::Deputy).is_err());
        assert!(Waveform::Arbitrary(0).id(Channel::Main).is_err());
        assert!(Waveform::Arbitrary(5).id(Channel::Main).is_err());
    }

    #[test]
    fn test_waveform_from_name() {
        assert_eq!(Waveform::from_name("Sine"), Some(Waveform::Sine));
        assert_eq!(Waveform::from_name("arb3"), Some(Waveform::Arbitrary(3)));
        assert_eq!(Waveform::from_name("noise"), Some(Waveform::GaussianNoise));
        assert_eq!(Waveform::from_name("warble"), None);
    }

    #[test]
    fn test_channel_commands() {
        assert_eq!(set_waveform(Channel::Deputy, Waveform::Ecg).unwrap(), "dw9");
        assert_eq!(set_frequency(Channel::Main, 1234.56).unwrap(), "bf123456");
        assert_eq!(set_amplitude(Channel::Main, 5.0).unwrap(), "ba5.00");
        assert_eq!(set_offset(Channel::Deputy, -1.5).unwrap(), "do-1.50");
        assert_eq!(set_duty_cycle(Channel::Main, 50.0).unwrap(), "bd500");
        assert_eq!(set_duty_cycle(Channel::Main, 2.5).unwrap(), "bd025");
        assert_eq!(set_phase(90).unwrap(), "dp090");
    }

    #[test]
    fn test_frequency_rounds_to_centi_hz() {
        // 0.29 * 100 is 28.999... in binary floating point
        assert_eq!(hz_to_centi_hz(0.29).unwrap(), 29);
        assert!(hz_to_centi_hz(-1.0).is_err());
        assert!(hz_to_centi_hz(f64::NAN).is_err());
        assert!((centi_hz_to_hz(123456) - 1234.56).abs() < 1e-9);
    }

    #[test]
    fn test_argument_bounds() {
        assert!(set_duty_cycle(Channel::Main, 100.0).is_err());
        assert!(set_phase(360).is_err());
        assert!(set_amplitude(Channel::Main, -1.0).is_err());
        assert!(set_trigger_cycles(10_000_000).is_err());
        assert_eq!(set_trigger_cycles(1_000_000).unwrap(), "tn1000000");
        assert_eq!(set_trigger_cycles(42).unwrap(), "tn0000042");
        assert_eq!(set_trigger_source(TriggerSource::Ch2), "tt2");
    }

    #[test]
    fn test_sweep_sequence() {
        let settings = SweepSettings {
            begin_hz: 100.0,
            end_hz: 10_000.0,
            time_s: 2,
            mode: SweepMode::Logarithmic,
        };
        assert_eq!(
            configure_sweep(&settings).unwrap(),
            vec!["bb000010000", "be001000000", "bt02", "bm1"]
        );
    }

    #[test]
    fn test_sweep_bounds() {
        assert!(set_sweep_time(0).is_err());
        assert!(set_sweep_time(100).is_err());
        assert!(set_sweep_begin(10_000_000.0).is_err());
        assert_eq!(set_sweep_end(9_999_999.99).unwrap(), "be999999999");
    }
}
