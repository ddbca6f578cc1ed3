use std::fmt;

/// Channel layout the sensor streams, fixed for the lifetime of a session.
///
/// The discriminant is the on-wire value: it is written to the control
/// characteristic and echoed back as the tag byte of every data frame.
/// The command line uses the 1-based numbering (`1..=3`), see
/// [`StreamMode::from_selector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamMode {
    /// Acceleration + rotation speed + magnetic field (9 channels).
    Inertial = 0,
    /// Acceleration + yaw / pitch / roll (6 channels).
    Euler = 1,
    /// Acceleration + orientation quaternion WXYZ (7 channels).
    Quaternion = 2,
}

impl StreamMode {
    /// Every mode, in wire order.
    pub const ALL: [StreamMode; 3] = [Self::Inertial, Self::Euler, Self::Quaternion];

    /// Wire tag (0-based).
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Map a wire tag back to a mode.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    /// Map the operator-facing 1-based selector to a mode.
    pub fn from_selector(selector: u8) -> Option<Self> {
        selector.checked_sub(1).and_then(Self::from_tag)
    }

    /// Human-readable channel description shown at startup.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Inertial => {
                "Acceleration (X, Y, Z) + Rotation Speed (X, Y, Z) + Magnetic Field (X, Y, Z)"
            }
            Self::Euler => "Acceleration (X, Y, Z) + Euler angles (Y, P, R)",
            Self::Quaternion => "Acceleration (X, Y, Z) + Quaternion (W, X, Y, Z)",
        }
    }
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// A 3-axis measurement in physical units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Mode-specific channels that follow the acceleration triple in a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Orientation {
    /// Mode 0: rotation speed (°/s) and magnetic field.
    Inertial {
        rotation_speed: Vector3,
        magnetic_field: Vector3,
    },
    /// Mode 1: Euler angles in degrees.
    Euler { yaw: f64, pitch: f64, roll: f64 },
    /// Mode 2: unit quaternion.
    Quaternion { w: f64, x: f64, y: f64, z: f64 },
}

/// One decoded data frame, before it is stamped with an elapsed time.
///
/// Produced by [`crate::parse::decode_frame`]; every value is already scaled
/// and rounded to [`crate::protocol::FIELD_PRECISION`] digits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionReading {
    /// Raw (gravity-included) acceleration.
    pub acceleration: Vector3,
    pub orientation: Orientation,
}

impl MotionReading {
    /// Stream mode this reading was decoded for.
    pub fn mode(&self) -> StreamMode {
        match self.orientation {
            Orientation::Inertial { .. } => StreamMode::Inertial,
            Orientation::Euler { .. } => StreamMode::Euler,
            Orientation::Quaternion { .. } => StreamMode::Quaternion,
        }
    }

    /// Channel values in frame order (acceleration first).
    pub fn channels(&self) -> Vec<f64> {
        let a = self.acceleration;
        let mut out = vec![a.x, a.y, a.z];
        match self.orientation {
            Orientation::Inertial {
                rotation_speed: g,
                magnetic_field: m,
            } => out.extend([g.x, g.y, g.z, m.x, m.y, m.z]),
            Orientation::Euler { yaw, pitch, roll } => out.extend([yaw, pitch, roll]),
            Orientation::Quaternion { w, x, y, z } => out.extend([w, x, y, z]),
        }
        out
    }
}

/// A reading stamped with seconds elapsed since the session's reference time.
///
/// This is the unit the recorder persists: one CSV row per sample, elapsed
/// time in the first column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    /// Seconds since the reference timestamp, rounded to 4 digits.
    pub elapsed: f64,
    pub reading: MotionReading,
}

impl TelemetrySample {
    /// Elapsed time followed by the channel values.
    pub fn fields(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(10);
        out.push(self.elapsed);
        out.extend(self.reading.channels());
        out
    }

    /// Fields rendered as CSV cells.
    pub fn to_record(&self) -> Vec<String> {
        self.fields().into_iter().map(format_decimal).collect()
    }
}

/// Render a value as a plain decimal number, always with a fractional part.
///
/// `2.0` → `"2.0"`, `-0.5` → `"-0.5"`, `0.000001` → `"0.000001"`.
pub fn format_decimal(value: f64) -> String {
    let s = value.to_string();
    if s.contains('.') || !value.is_finite() {
        s
    } else {
        format!("{s}.0")
    }
}

/// Outcome of a best-effort GATT operation (write / subscribe / unsubscribe).
///
/// Failures are logged by the connection layer and reported here instead of
/// being propagated, so callers can decide whether to escalate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpStatus {
    Ok,
    Failed(String),
}

impl OpStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, OpStatus::Ok)
    }
}

/// Result of one configure + subscribe pass after a (re)connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupReport {
    /// Stream-mode byte written to the control characteristic.
    pub stream_config: OpStatus,
    /// Battery level notifications enabled.
    pub battery: OpStatus,
    /// Telemetry notifications enabled.
    pub data: OpStatus,
}

impl SetupReport {
    /// `true` when every step was confirmed by the transport.
    pub fn is_complete(&self) -> bool {
        self.stream_config.is_ok() && self.battery.is_ok() && self.data.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_is_one_based() {
        assert_eq!(StreamMode::from_selector(1), Some(StreamMode::Inertial));
        assert_eq!(StreamMode::from_selector(3), Some(StreamMode::Quaternion));
        assert_eq!(StreamMode::from_selector(0), None);
        assert_eq!(StreamMode::from_selector(4), None);
    }

    #[test]
    fn decimal_format_always_has_fraction() {
        assert_eq!(format_decimal(2.0), "2.0");
        assert_eq!(format_decimal(-327.68), "-327.68");
        assert_eq!(format_decimal(0.000_001), "0.000001");
        assert_eq!(format_decimal(0.0), "0.0");
    }

    #[test]
    fn sample_fields_start_with_elapsed_time() {
        let sample = TelemetrySample {
            elapsed: 1.5,
            reading: MotionReading {
                acceleration: Vector3 { x: 1.0, y: 2.0, z: 3.0 },
                orientation: Orientation::Euler {
                    yaw: 10.0,
                    pitch: 20.0,
                    roll: 30.0,
                },
            },
        };
        assert_eq!(sample.fields(), vec![1.5, 1.0, 2.0, 3.0, 10.0, 20.0, 30.0]);
        assert_eq!(sample.reading.mode(), StreamMode::Euler);
        assert_eq!(sample.to_record()[0], "1.5");
    }
}
