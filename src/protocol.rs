//! GATT UUIDs, wire-format constants, and CSV schema for Z_Motion sensors.
//!
//! The sensor exposes a Nordic-UART-style stream service (`6e40xxxx-…`) for
//! configuration and telemetry, plus the standard Bluetooth SIG battery
//! service.

use uuid::Uuid;

use crate::types::StreamMode;

// ── Characteristics ───────────────────────────────────────────────────────────

/// Stream control characteristic.
///
/// The host writes a single byte selecting the [`StreamMode`]; see
/// [`encode_stream_config`].
pub const CONTROL_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);

/// Stream data characteristic.
///
/// Every notification carries one telemetry frame: a mode tag byte followed by
/// little-endian `i16` fields.  Decoded by [`crate::parse::decode_frame`].
pub const DATA_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// Bluetooth SIG Battery Level characteristic (`0x2A19`).
///
/// Unsigned little-endian percentage, usually a single byte.
pub const BATTERY_LEVEL_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

// ── Scaling ───────────────────────────────────────────────────────────────────

/// Divisor applied to acceleration, gyroscope, magnetometer and Euler angle
/// channels (raw units are hundredths).
pub const LINEAR_SCALE: f64 = 100.0;

/// Divisor applied to quaternion components (Q14 fixed point).
pub const QUATERNION_SCALE: f64 = 16384.0;

/// Decimal digits kept on every decoded channel value.
pub const FIELD_PRECISION: u32 = 6;

/// Decimal digits kept on the elapsed-time column.
pub const ELAPSED_PRECISION: u32 = 4;

// ── Frame geometry ────────────────────────────────────────────────────────────

/// Size in bytes of the mode tag at the start of every data frame.
pub const TAG_LEN: usize = 1;

/// Size in bytes of one encoded channel value.
pub const FIELD_LEN: usize = 2;

/// Number of channels in a frame for the given mode.
///
/// | mode | channels |
/// |---|---|
/// | 0 | acc XYZ + gyro XYZ + mag XYZ |
/// | 1 | acc XYZ + yaw, pitch, roll |
/// | 2 | acc XYZ + quaternion WXYZ |
pub const fn field_count(mode: StreamMode) -> usize {
    match mode {
        StreamMode::Inertial => 9,
        StreamMode::Euler => 6,
        StreamMode::Quaternion => 7,
    }
}

/// Total frame length in bytes for the given mode (19 / 13 / 15).
pub const fn frame_len(mode: StreamMode) -> usize {
    TAG_LEN + field_count(mode) * FIELD_LEN
}

// ── CSV schema ────────────────────────────────────────────────────────────────

/// Header row for [`StreamMode::Inertial`] recordings.
pub const INERTIAL_COLUMNS: [&str; 10] = [
    "t",
    "raw_acceleration_x",
    "raw_acceleration_y",
    "raw_acceleration_z",
    "rotation_speed_x",
    "rotation_speed_y",
    "rotation_speed_z",
    "magnetic_field_x",
    "magnetic_field_y",
    "magnetic_field_z",
];

/// Header row for [`StreamMode::Euler`] recordings.
pub const EULER_COLUMNS: [&str; 7] = [
    "t",
    "raw_acceleration_x",
    "raw_acceleration_y",
    "raw_acceleration_z",
    "yaw",
    "pitch",
    "roll",
];

/// Header row for [`StreamMode::Quaternion`] recordings.
pub const QUATERNION_COLUMNS: [&str; 8] = [
    "t",
    "raw_acceleration_x",
    "raw_acceleration_y",
    "raw_acceleration_z",
    "quaternion_w",
    "quaternion_x",
    "quaternion_y",
    "quaternion_z",
];

/// Column names (elapsed time first) written as the header of every epoch file.
pub fn column_names(mode: StreamMode) -> &'static [&'static str] {
    match mode {
        StreamMode::Inertial => &INERTIAL_COLUMNS,
        StreamMode::Euler => &EULER_COLUMNS,
        StreamMode::Quaternion => &QUATERNION_COLUMNS,
    }
}

// ── Control ───────────────────────────────────────────────────────────────────

/// Encode the stream-mode configuration written to [`CONTROL_CHARACTERISTIC`].
///
/// A single little-endian byte holding the 0-based mode.
///
/// ```
/// # use zmotion_rs::protocol::encode_stream_config;
/// # use zmotion_rs::types::StreamMode;
/// assert_eq!(encode_stream_config(StreamMode::Quaternion), [0x02]);
/// ```
pub fn encode_stream_config(mode: StreamMode) -> [u8; 1] {
    [mode.tag()]
}

/// Round `value` to `digits` decimal places, ties to even.
pub fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round_ties_even() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_lengths_match_wire_layout() {
        assert_eq!(frame_len(StreamMode::Inertial), 19);
        assert_eq!(frame_len(StreamMode::Euler), 13);
        assert_eq!(frame_len(StreamMode::Quaternion), 15);
    }

    #[test]
    fn header_has_one_column_per_field_plus_time() {
        for mode in StreamMode::ALL {
            let cols = column_names(mode);
            assert_eq!(cols.len(), field_count(mode) + 1);
            assert_eq!(cols[0], "t");
        }
    }

    #[test]
    fn rounding_keeps_requested_digits() {
        assert_eq!(round_to(1.234_567_89, 6), 1.234_568);
        assert_eq!(round_to(-0.000_04, 4), -0.0);
        assert_eq!(round_to(2.718_28, 4), 2.7183);
        // Exact binary ties go to the even neighbour.
        assert_eq!(round_to(0.5, 0), 0.0);
        assert_eq!(round_to(2.5, 0), 2.0);
        assert_eq!(round_to(-0.0078125, 6), -0.007812);
    }
}
