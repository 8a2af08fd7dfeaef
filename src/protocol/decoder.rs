//! # Controller Line Decoder
//!
//! Decodes ASCII lines sent by the wheel base into [`ControllerReading`]s.
//!
//! ## Grammar
//!
//! ```text
//! line     := angle '-' throttle '-' brake [ '-' trailing ]
//! angle    := [+-]? digits ( '.' digits )?
//! trailing := field ( '-' field )*      (last two = gx, gy; before = handbrake; rest = buttons)
//! ```
//!
//! A line with fewer than two trailing fields is a "shifter-less" frame:
//! buttons, handbrake and shifter keep their neutral defaults.

use super::wire::*;
use crate::error::{Result, SimBridgeError};

/// Decode one controller line.
///
/// # Arguments
///
/// * `line` - Raw line, with or without the trailing newline
///
/// # Returns
///
/// * `Result<ControllerReading>` - Decoded reading, or `MalformedLine`
///
/// # Errors
///
/// Returns `MalformedLine` if any field does not match the grammar. Nothing
/// is decoded partially.
///
/// # Examples
///
/// ```
/// use sim_race_bridge::protocol::decoder::decode_line;
///
/// let reading = decode_line("-45.5-200-10-1-0-0-0-100-127").unwrap();
/// assert_eq!(reading.angle, -45.5);
/// assert_eq!(reading.buttons, vec![1, 0, 0]);
/// assert_eq!(reading.shifter_x, 100);
/// ```
pub fn decode_line(line: &str) -> Result<ControllerReading> {
    let line = line.trim();
    if line.is_empty() {
        return Err(SimBridgeError::MalformedLine("empty line".to_string()));
    }

    // The angle may carry a leading sign which is also the field separator
    let (negative, unsigned) = match line.as_bytes()[0] {
        b'-' => (true, &line[1..]),
        b'+' => (false, &line[1..]),
        _ => (false, line),
    };

    let mut fields = unsigned.split(FIELD_SEPARATOR);

    let angle_text = fields.next().unwrap_or_default();
    let magnitude = parse_angle(angle_text)
        .ok_or_else(|| malformed(line, "angle"))?;
    let angle = if negative { -magnitude } else { magnitude };

    let throttle = fields
        .next()
        .and_then(parse_unsigned)
        .ok_or_else(|| malformed(line, "throttle"))?;
    let brake = fields
        .next()
        .and_then(parse_unsigned)
        .ok_or_else(|| malformed(line, "brake"))?;

    let trailing: Vec<&str> = fields.collect();

    let mut reading = ControllerReading {
        angle,
        throttle: clamp_axis(throttle as i64),
        brake: clamp_axis(brake as i64),
        ..ControllerReading::neutral()
    };

    // "a-t-b-" leaves a single empty field behind: shifter-less
    if trailing.len() == 1 && trailing[0].is_empty() {
        return Ok(reading);
    }

    let values = trailing
        .iter()
        .map(|field| parse_unsigned(field))
        .collect::<Option<Vec<u64>>>()
        .ok_or_else(|| malformed(line, "trailing field"))?;

    if values.len() < 2 {
        return Ok(reading);
    }

    let (head, shifter) = values.split_at(values.len() - 2);
    reading.shifter_x = clamp_axis(shifter[0] as i64);
    reading.shifter_y = clamp_axis(shifter[1] as i64);

    if let Some((&handbrake, buttons)) = head.split_last() {
        reading.handbrake = u8::from(handbrake != 0);
        reading.buttons = buttons.iter().map(|&b| u8::from(b != 0)).collect();
    }

    Ok(reading)
}

/// Decode a raw byte line, ignoring invalid UTF-8 sequences.
pub fn decode_bytes(raw: &[u8]) -> Result<ControllerReading> {
    decode_line(&String::from_utf8_lossy(raw))
}

fn malformed(line: &str, field: &str) -> SimBridgeError {
    SimBridgeError::MalformedLine(format!("invalid {} in {:?}", field, line))
}

/// Parse `digits ( '.' digits )?`. Rejects exponents, `inf` and `nan`.
fn parse_angle(text: &str) -> Option<f32> {
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (text, None),
    };

    if !is_digits(int_part) || frac_part.is_some_and(|f| !is_digits(f)) {
        return None;
    }

    text.parse().ok()
}

fn parse_unsigned(text: &str) -> Option<u64> {
    if !is_digits(text) {
        return None;
    }
    text.parse().ok()
}

fn is_digits(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}
