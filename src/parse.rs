//! Binary decoders for Z_Motion BLE notification payloads.
//!
//! All functions here are pure and safe to call from any context.
//!
//! # Data frame layout
//!
//! ```text
//! byte 0       : stream mode tag (0, 1 or 2)
//! bytes 1..N   : little-endian i16 channels, 2 bytes each
//! ```
//!
//! | Mode | Channels (frame order) | Scale | Length |
//! |---|---|---|---|
//! | 0 | accX..Z, gyrX..Z, magX..Z | ÷100 | 19 B |
//! | 1 | accX..Z, yaw, pitch, roll | ÷100 | 13 B |
//! | 2 | accX..Z, qW, qX, qY, qZ | acc ÷100, quaternion ÷16384 | 15 B |
//!
//! Every value is rounded to [`FIELD_PRECISION`] decimal digits.

use crate::error::DecodeError;
use crate::protocol::{
    frame_len, round_to, FIELD_LEN, FIELD_PRECISION, LINEAR_SCALE, QUATERNION_SCALE, TAG_LEN,
};
use crate::types::{MotionReading, Orientation, StreamMode, Vector3};

/// Read a little-endian signed 16-bit integer from `data` at byte `offset`.
///
/// # Panics
/// Panics if `offset + 1 >= data.len()`.
fn read_i16_le(data: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([data[offset], data[offset + 1]])
}

/// Decode one data-characteristic notification.
///
/// The tag byte must equal `mode`; any other tag is a [`DecodeError::Desync`],
/// which the session treats as fatal.  Bytes past the mode's frame length are
/// ignored.
///
/// ```
/// # use zmotion_rs::parse::decode_frame;
/// # use zmotion_rs::types::StreamMode;
/// let frame = [0x01, 0xC8, 0x00, 0x64, 0x00, 0x9C, 0xFF, 0x10, 0x27, 0x00, 0x00, 0xF0, 0xD8];
/// let reading = decode_frame(StreamMode::Euler, &frame).unwrap();
/// assert_eq!(reading.channels(), vec![2.0, 1.0, -1.0, 100.0, 0.0, -100.0]);
/// ```
pub fn decode_frame(mode: StreamMode, data: &[u8]) -> Result<MotionReading, DecodeError> {
    let Some(&tag) = data.first() else {
        return Err(DecodeError::Empty);
    };
    if tag != mode.tag() {
        return Err(DecodeError::Desync {
            expected: mode,
            received: tag,
        });
    }
    let expected = frame_len(mode);
    if data.len() < expected {
        return Err(DecodeError::Truncated {
            expected,
            actual: data.len(),
        });
    }

    // Channel `i` lives at bytes [1 + 2i, 3 + 2i).
    let channel = |i: usize, scale: f64| {
        round_to(
            read_i16_le(data, TAG_LEN + i * FIELD_LEN) as f64 / scale,
            FIELD_PRECISION,
        )
    };
    let linear = |i: usize| channel(i, LINEAR_SCALE);
    let triple = |first: usize| Vector3 {
        x: linear(first),
        y: linear(first + 1),
        z: linear(first + 2),
    };

    let orientation = match mode {
        StreamMode::Inertial => Orientation::Inertial {
            rotation_speed: triple(3),
            magnetic_field: triple(6),
        },
        StreamMode::Euler => Orientation::Euler {
            yaw: linear(3),
            pitch: linear(4),
            roll: linear(5),
        },
        StreamMode::Quaternion => Orientation::Quaternion {
            w: channel(3, QUATERNION_SCALE),
            x: channel(4, QUATERNION_SCALE),
            y: channel(5, QUATERNION_SCALE),
            z: channel(6, QUATERNION_SCALE),
        },
    };

    Ok(MotionReading {
        acceleration: triple(0),
        orientation,
    })
}

/// Decode a Battery Level notification into a percentage.
///
/// The payload is an unsigned little-endian integer of any width up to
/// 8 bytes (the SIG characteristic is a single byte).  No scaling.
/// Returns `None` for an empty or over-long payload.
pub fn parse_battery_level(data: &[u8]) -> Option<u64> {
    if data.is_empty() || data.len() > 8 {
        return None;
    }
    Some(
        data.iter()
            .rev()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(mode: StreamMode, raw: &[i16]) -> Vec<u8> {
        let mut out = vec![mode.tag()];
        for v in raw {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    #[test]
    fn inertial_channels_are_hundredths() {
        let raw = [981, -12, 0, 32767, -32768, 150, 4000, -4000, 1];
        let reading = decode_frame(StreamMode::Inertial, &frame(StreamMode::Inertial, &raw))
            .unwrap();
        let values = reading.channels();
        assert_eq!(values.len(), 9);
        for (v, r) in values.iter().zip(raw) {
            assert!((v - r as f64 / 100.0).abs() <= 0.005, "{v} vs {r}");
        }
        match reading.orientation {
            Orientation::Inertial { rotation_speed, magnetic_field } => {
                assert_eq!(rotation_speed.x, 327.67);
                assert_eq!(magnetic_field.z, 0.01);
            }
            other => panic!("unexpected orientation {other:?}"),
        }
    }

    #[test]
    fn quaternion_channels_use_q14_scale() {
        let raw = [100, 200, 300, 16384, -8192, 1, -16384];
        let reading = decode_frame(StreamMode::Quaternion, &frame(StreamMode::Quaternion, &raw))
            .unwrap();
        let values = reading.channels();
        for (v, r) in values[3..].iter().zip(&raw[3..]) {
            assert!((v - *r as f64 / 16384.0).abs() <= 0.0001, "{v} vs {r}");
        }
        assert_eq!(values[..3], [1.0, 2.0, 3.0]);
    }

    #[test]
    fn quaternion_ties_round_to_even() {
        let raw = [0, 0, 0, 128, -128, 384, 16384];
        let reading = decode_frame(StreamMode::Quaternion, &frame(StreamMode::Quaternion, &raw))
            .unwrap();
        assert_eq!(reading.channels()[3..], [0.007812, -0.007812, 0.023438, 1.0]);
    }

    #[test]
    fn reference_quaternion_frame() {
        let data = [
            0x02, 0xC8, 0x00, 0x64, 0x00, 0x00, 0x80, 0x00, 0x40, 0x00, 0x00, 0x00, 0x00, 0x40,
            0x9C,
        ];
        let reading = decode_frame(StreamMode::Quaternion, &data).unwrap();
        assert_eq!(
            reading.channels(),
            vec![2.0, 1.0, -327.68, 1.0, 0.0, 0.0, -1.558594]
        );
    }

    #[test]
    fn mismatched_tag_is_desync() {
        for mode in StreamMode::ALL {
            for other in StreamMode::ALL.into_iter().filter(|m| *m != mode) {
                let data = frame(other, &[0; 9]);
                let err = decode_frame(mode, &data).unwrap_err();
                assert!(err.is_fatal());
                assert_eq!(
                    err,
                    DecodeError::Desync {
                        expected: mode,
                        received: other.tag()
                    }
                );
            }
        }
        let err = decode_frame(StreamMode::Inertial, &[0x07; 19]).unwrap_err();
        assert!(matches!(err, DecodeError::Desync { received: 7, .. }));
    }

    #[test]
    fn short_and_empty_frames_are_not_fatal() {
        let err = decode_frame(StreamMode::Euler, &[0x01, 0x00, 0x00]).unwrap_err();
        assert_eq!(err, DecodeError::Truncated { expected: 13, actual: 3 });
        assert!(!err.is_fatal());
        assert_eq!(decode_frame(StreamMode::Euler, &[]), Err(DecodeError::Empty));
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut data = frame(StreamMode::Euler, &[1, 2, 3, 4, 5, 6]);
        data.extend([0xAA, 0xBB]);
        let reading = decode_frame(StreamMode::Euler, &data).unwrap();
        assert_eq!(reading.channels(), vec![0.01, 0.02, 0.03, 0.04, 0.05, 0.06]);
    }

    #[test]
    fn battery_level_is_unsigned_le() {
        assert_eq!(parse_battery_level(&[87]), Some(87));
        assert_eq!(parse_battery_level(&[0x64, 0x00]), Some(100));
        assert_eq!(parse_battery_level(&[0xFF]), Some(255));
        assert_eq!(parse_battery_level(&[]), None);
    }
}
