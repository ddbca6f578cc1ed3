//! Error taxonomy for the acquisition engine.
//!
//! Only [`DecodeError::Desync`] is fatal to a session.  Everything else is
//! recoverable: connect failures are retried, persistence failures drop the
//! sample, malformed frames are skipped.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::StreamMode;

/// Why a data frame could not be decoded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame's tag byte names a different stream mode than the session
    /// configured.  Framing can no longer be trusted.
    #[error("stream mode mismatch: frame tag {received} <-> configured {}", expected.tag())]
    Desync { expected: StreamMode, received: u8 },

    /// The frame is shorter than the layout for its mode.
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// Zero-length notification.
    #[error("empty frame")]
    Empty,
}

impl DecodeError {
    /// `true` when the session must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DecodeError::Desync { .. })
    }
}

/// A failed connection attempt.  Every variant is retried by the session.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("no Bluetooth adapter found")]
    NoAdapter,

    /// No advertisement matched the sensor name before the scan timed out.
    #[error("sensor {0:?} not found")]
    NotFound(String),

    /// The adapter refused to scan (powered off, not ready, …).
    #[error("scan for sensor {name:?} failed: {source}")]
    Scan {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// The transport reported an error while connecting.
    #[error("error connecting to sensor {name}: {source}")]
    Transport {
        name: String,
        #[source]
        source: btleplug::Error,
    },

    #[error("timeout when connecting to sensor {name} after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    /// Configuration/subscription was not confirmed and the session runs with
    /// `strict_setup`.
    #[error("setup of sensor {0} was not confirmed")]
    SetupIncomplete(String),
}

/// Recording state machine errors.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// `start_capture` before the session activated the recorder.
    #[error("recorder is not activated yet")]
    NotActivated,

    #[error("a recording epoch is already engaged")]
    AlreadyEngaged,

    #[error("no recording epoch is engaged")]
    NotEngaged,

    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Reasons a running session stops by itself.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("protocol desync: {0}")]
    Desync(DecodeError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn scan_error_keeps_adapter_cause() {
        let err = ConnectError::Scan {
            name: "6TRON Sensor 1".into(),
            source: anyhow::anyhow!("adapter not ready"),
        };
        assert_eq!(
            err.to_string(),
            "scan for sensor \"6TRON Sensor 1\" failed: adapter not ready"
        );
        assert_eq!(err.source().unwrap().to_string(), "adapter not ready");
    }

    #[test]
    fn only_desync_is_fatal() {
        let desync = DecodeError::Desync {
            expected: StreamMode::Euler,
            received: 2,
        };
        assert!(desync.is_fatal());
        assert!(!DecodeError::Empty.is_fatal());
        assert!(!DecodeError::Truncated { expected: 13, actual: 3 }.is_fatal());
    }
}
