//! Reply parsing.
//!
//! Measurement replies are a single line holding an integer, sometimes padded
//! with leading zeros or surrounded by a unit or label. The first integer token
//! of the line is taken; a fractional token is not an integer reply.

use crate::error::{Error, Result};
use crate::protocol::command::centi_hz_to_hz;

/// Extract the first integer token of a reply line.
pub fn first_integer(reply: &str) -> Option<i64> {
    let bytes = reply.as_bytes();
    let start = bytes.iter().position(u8::is_ascii_digit)?;
    let end = bytes[start..]
        .iter()
        .position(|b| !b.is_ascii_digit())
        .map_or(bytes.len(), |n| start + n);

    // "12.5" is a decimal, not an integer
    if bytes.get(end) == Some(&b'.') && bytes.get(end + 1).is_some_and(u8::is_ascii_digit) {
        return None;
    }

    let negative = start > 0 && bytes[start - 1] == b'-';
    let magnitude: i64 = reply[start..end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Parse a frequency-counter reply (integer centi-Hertz) into Hertz.
pub fn parse_frequency(command: &str, reply: &str) -> Result<f64> {
    match first_integer(reply) {
        Some(centi) if centi >= 0 => Ok(centi_hz_to_hz(centi as u64)),
        _ => Err(malformed(command, reply)),
    }
}

/// Parse an event-counter reply.
pub fn parse_count(command: &str, reply: &str) -> Result<u64> {
    match first_integer(reply) {
        Some(count) if count >= 0 => Ok(count as u64),
        _ => Err(malformed(command, reply)),
    }
}

fn malformed(command: &str, reply: &str) -> Error {
    Error::MalformedReply {
        command: command.to_string(),
        reply: reply.to_string(),
    }
}
