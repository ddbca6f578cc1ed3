//! # zmotion-rs
//!
//! Async acquisition engine for [6TRON](https://6tron.io) Z_Motion inertial
//! sensors over Bluetooth Low Energy.
//!
//! The engine finds a sensor by advertised name, connects, selects a stream
//! mode, decodes the binary telemetry frames and records operator-controlled
//! epochs to CSV files.  Lost links are re-established indefinitely; elapsed
//! time and the active recording epoch survive reconnects.
//!
//! ## Stream modes
//!
//! | Mode | Selector | Channels | Frame |
//! |---|---|---|---|
//! | [`StreamMode::Inertial`](types::StreamMode::Inertial) | 1 | acc + gyro + mag | 19 B |
//! | [`StreamMode::Euler`](types::StreamMode::Euler) | 2 | acc + yaw/pitch/roll | 13 B |
//! | [`StreamMode::Quaternion`](types::StreamMode::Quaternion) | 3 | acc + quaternion | 15 B |
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use zmotion_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SessionConfig {
//!         sensor_name: "6TRON Sensor 1".into(),
//!         stream_mode: StreamMode::Quaternion,
//!         ..Default::default()
//!     };
//!     let recorder = Arc::new(Recorder::new(RecorderConfig {
//!         output_dir: "acquired_data".into(),
//!         file_prefix: "1_".into(),
//!         stream_mode: config.stream_mode,
//!     }));
//!
//!     let scanner = Scanner::first_adapter(ScanLock::new(), false).await?;
//!     let mut session = Session::new(BleSensor::new(scanner), config, Some(recorder.clone()));
//!
//!     recorder.activate();
//!     recorder.start_capture()?;
//!     session
//!         .run_until(async { tokio::signal::ctrl_c().await.ok(); })
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`prelude`] | One-line glob import of the most commonly needed types |
//! | [`scanner`] | Name-based BLE discovery and the [`scanner::ScanLock`] handle |
//! | [`connection`] | The [`connection::SensorLink`] seam and its `btleplug` implementation |
//! | [`parse`] | Byte-to-sample decoders for telemetry and battery notifications |
//! | [`recorder`] | Recording state machine and epoch CSV files |
//! | [`session`] | Connect / configure / subscribe / monitor / reconnect loop |
//! | [`protocol`] | GATT UUIDs, scales, frame geometry and CSV schema |
//! | [`types`] | Stream modes, readings and samples |
//! | [`error`] | Error taxonomy |
//! | `commands` | Raw keystroke commands (feature `cli`) |

#[cfg(feature = "cli")]
pub mod commands;
pub mod connection;
pub mod error;
pub mod parse;
pub mod protocol;
pub mod recorder;
pub mod scanner;
pub mod session;
pub mod types;

// ── Prelude ───────────────────────────────────────────────────────────────────

/// Convenience re-exports for downstream crates.
pub mod prelude {
    // ── Engine ────────────────────────────────────────────────────────────────
    pub use crate::connection::{BleSensor, Notification, SensorLink};
    pub use crate::recorder::{load_recording, Recorder, RecorderConfig, RecordingState};
    pub use crate::scanner::{ScanLock, Scanner};
    pub use crate::session::{Session, SessionConfig};

    // ── Data types ────────────────────────────────────────────────────────────
    pub use crate::error::{ConnectError, DecodeError, RecorderError, SessionError};
    pub use crate::types::{
        MotionReading, OpStatus, Orientation, SetupReport, StreamMode, TelemetrySample, Vector3,
    };
}
