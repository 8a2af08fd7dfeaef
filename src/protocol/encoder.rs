//! # Feedback Line Encoder
//!
//! Encodes [`FeedbackLine`]s into the ASCII response sent to the wheel base.

use bytes::Bytes;

use super::wire::*;

/// Encode a feedback line.
///
/// Produces `rpm;gear;speed;gx;rumble;rpmpct\n`. This is a total function:
/// every field is already typed to its wire range.
///
/// # Examples
///
/// ```
/// use sim_race_bridge::protocol::encoder::encode_feedback;
/// use sim_race_bridge::protocol::wire::FeedbackLine;
///
/// assert_eq!(encode_feedback(&FeedbackLine::NEUTRAL), "0;N;0;127;0;0\n");
/// ```
#[must_use]
pub fn encode_feedback(line: &FeedbackLine) -> String {
    format!(
        "{rpm}{s}{gear}{s}{speed}{s}{gx}{s}{rumble}{s}{pct}{end}",
        rpm = line.rpm,
        gear = line.gear_label(),
        speed = line.speed,
        gx = line.gx,
        rumble = line.rumble,
        pct = line.rpm_pct.min(RPM_PERCENT_MAX),
        s = FEEDBACK_SEPARATOR,
        end = LINE_TERMINATOR,
    )
}

/// Encode a feedback line into a byte buffer ready for the serial port.
#[must_use]
pub fn encode_feedback_frame(line: &FeedbackLine) -> Bytes {
    Bytes::from(encode_feedback(line))
}

/// Encode a controller reading back into its wire form.
///
/// Used by the wheel simulator in tests and by diagnostics. Shifter-less
/// readings are still written with their handbrake and shifter fields.
#[must_use]
pub fn encode_controller_line(reading: &ControllerReading) -> String {
    let mut fields: Vec<String> = Vec::with_capacity(reading.buttons.len() + 6);
    fields.push(reading.angle.to_string());
    fields.push(reading.throttle.to_string());
    fields.push(reading.brake.to_string());
    fields.extend(reading.buttons.iter().map(|b| b.to_string()));
    fields.push(reading.handbrake.to_string());
    fields.push(reading.shifter_x.to_string());
    fields.push(reading.shifter_y.to_string());

    let mut line = fields.join(&FIELD_SEPARATOR.to_string());
    line.push(LINE_TERMINATOR);
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decoder::decode_line;

    #[test]
    fn test_encode_neutral_line() {
        assert_eq!(encode_feedback(&FeedbackLine::NEUTRAL), "0;N;0;127;0;0\n");
    }

    #[test]
    fn test_encode_reverse_and_forward_gears() {
        let mut line = FeedbackLine {
            rpm: 7200,
            gear: -1,
            speed: 12,
            gx: 100,
            rumble: 200,
            rpm_pct: 53,
        };
        assert_eq!(encode_feedback(&line), "7200;R;12;100;200;53\n");

        line.gear = 4;
        assert_eq!(encode_feedback(&line), "7200;4;12;100;200;53\n");
    }

    #[test]
    fn test_encode_caps_rpm_percent() {
        let line = FeedbackLine {
            rpm_pct: 250,
            ..FeedbackLine::NEUTRAL
        };
        assert_eq!(encode_feedback(&line), "0;N;0;127;0;100\n");
    }

    #[test]
    fn test_encode_frame_bytes() {
        let frame = encode_feedback_frame(&FeedbackLine::NEUTRAL);
        assert_eq!(&frame[..], b"0;N;0;127;0;0\n");
        assert!(frame.is_ascii());
    }

    #[test]
    fn test_controller_line_round_trip() {
        for line in [
            "-45.5-200-10-1-0-0-0-100-127",
            "0-0-0-0-127-127",
            "12.75-255-0-1-1-1-1-1-0-255",
            "-3-17-99-0-1-0-1-30-220",
        ] {
            let decoded = decode_line(line).unwrap();
            let encoded = encode_controller_line(&decoded);
            assert_eq!(encoded.trim_end(), line, "re-encoding changed {:?}", line);
            assert_eq!(decode_line(&encoded).unwrap(), decoded);
        }
    }
}
