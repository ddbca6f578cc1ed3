//! Recording state machine and CSV persistence.
//!
//! ```text
//!   Idle ──activate()──▶ Armed ──start_capture()──▶ Engaged
//!                          ▲                          │
//!                          └──────stop_capture()──────┘
//! ```
//!
//! Each `start_capture` opens a new *epoch*: the counter increments and the
//! samples go to `{prefix}{epoch}.csv` in the output directory.  The file is
//! created with a header row on first use and appended to afterwards; it is
//! never truncated or deleted.
//!
//! The recorder is shared between the session task (which calls
//! [`Recorder::write`] from notification dispatch) and the keystroke thread
//! (which toggles capture), so all state lives behind one mutex.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};

use crate::error::RecorderError;
use crate::protocol::column_names;
use crate::types::{StreamMode, TelemetrySample};

/// Where and how epoch files are written.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub output_dir: PathBuf,
    /// Prepended to the epoch number to form the file name.
    pub file_prefix: String,
    /// Selects the header row.
    pub stream_mode: StreamMode,
}

/// Observable recorder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    /// Session not up yet; capture commands are refused.
    Idle,
    /// Session up, not recording.
    Armed,
    /// Recording epoch `epoch`.
    Engaged { epoch: u32 },
}

/// Result of [`Recorder::toggle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Started { epoch: u32, path: PathBuf },
    Stopped { epoch: u32 },
}

struct Inner {
    activated: bool,
    engaged: bool,
    epoch: u32,
    path: Option<PathBuf>,
    writer: Option<csv::Writer<File>>,
}

/// Epoch-based CSV recorder.  Cheap to share behind an `Arc`.
pub struct Recorder {
    config: RecorderConfig,
    inner: Mutex<Inner>,
}

impl Recorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                activated: false,
                engaged: false,
                epoch: 0,
                path: None,
                writer: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves plain flags behind; keep going.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Idle → Armed.  Called once the session is streaming; later calls are
    /// no-ops.
    pub fn activate(&self) {
        let mut inner = self.lock();
        if !inner.activated {
            inner.activated = true;
            debug!("recorder activated");
        }
    }

    pub fn is_activated(&self) -> bool {
        self.lock().activated
    }

    pub fn is_engaged(&self) -> bool {
        self.lock().engaged
    }

    pub fn state(&self) -> RecordingState {
        let inner = self.lock();
        match (inner.activated, inner.engaged) {
            (false, _) => RecordingState::Idle,
            (true, false) => RecordingState::Armed,
            (true, true) => RecordingState::Engaged { epoch: inner.epoch },
        }
    }

    /// Number of the most recent epoch (`0` before the first capture).
    pub fn epoch(&self) -> u32 {
        self.lock().epoch
    }

    /// File name for `epoch`: `{output_dir}/{prefix}{epoch}.csv`.
    pub fn epoch_path(&self, epoch: u32) -> PathBuf {
        self.config
            .output_dir
            .join(format!("{}{}.csv", self.config.file_prefix, epoch))
    }

    /// Armed → Engaged on a fresh epoch.
    ///
    /// The epoch counter advances even if the file cannot be opened; in that
    /// case the recorder stays Armed and the error is returned.
    pub fn start_capture(&self) -> Result<PathBuf, RecorderError> {
        self.start_locked(&mut self.lock())
    }

    /// Engaged → Armed.  The epoch file stays on disk.
    pub fn stop_capture(&self) -> Result<u32, RecorderError> {
        Self::stop_locked(&mut self.lock())
    }

    /// Flip between Armed and Engaged, the way the space bar does.
    ///
    /// Decision and transition happen under one lock, so a concurrent
    /// `stop_capture` cannot slip in between.
    pub fn toggle(&self) -> Result<Transition, RecorderError> {
        let mut inner = self.lock();
        if inner.engaged {
            Self::stop_locked(&mut inner).map(|epoch| Transition::Stopped { epoch })
        } else {
            let path = self.start_locked(&mut inner)?;
            Ok(Transition::Started {
                epoch: inner.epoch,
                path,
            })
        }
    }

    fn start_locked(&self, inner: &mut Inner) -> Result<PathBuf, RecorderError> {
        if !inner.activated {
            return Err(RecorderError::NotActivated);
        }
        if inner.engaged {
            return Err(RecorderError::AlreadyEngaged);
        }
        inner.epoch += 1;
        let path = self.epoch_path(inner.epoch);
        let writer = open_epoch_file(&path, column_names(self.config.stream_mode))?;
        inner.writer = Some(writer);
        inner.path = Some(path.clone());
        inner.engaged = true;
        info!("Recording data in file {} …", path.display());
        Ok(path)
    }

    fn stop_locked(inner: &mut Inner) -> Result<u32, RecorderError> {
        if !inner.engaged {
            return Err(RecorderError::NotEngaged);
        }
        inner.engaged = false;
        if let Some(writer) = inner.writer.as_mut() {
            if let Err(e) = writer.flush() {
                warn!("flush failed on stop: {e}");
            }
        }
        match &inner.path {
            Some(path) => info!("Stopped epoch {} ({}).", inner.epoch, path.display()),
            None => info!("Stopped epoch {}.", inner.epoch),
        }
        Ok(inner.epoch)
    }

    /// Append `sample` to the current epoch file.
    ///
    /// Silently discarded unless the recorder is both activated and engaged.
    /// Returns `true` when the row reached the file; write failures are
    /// logged and the sample is dropped.
    pub fn write(&self, sample: &TelemetrySample) -> bool {
        let mut inner = self.lock();
        if !(inner.activated && inner.engaged) {
            return false;
        }
        let Inner { path, writer, .. } = &mut *inner;
        let Some(writer) = writer.as_mut() else {
            return false;
        };
        let result = writer
            .write_record(sample.to_record())
            .and_then(|()| writer.flush().map_err(csv::Error::from));
        match result {
            Ok(()) => true,
            Err(e) => {
                let shown = path.as_deref().unwrap_or(Path::new("?")).display();
                warn!("Error writing CSV file {shown}: {e}");
                false
            }
        }
    }
}

/// Open `path` for appending, writing `header` first if the file is new.
fn open_epoch_file(path: &Path, header: &[&str]) -> Result<csv::Writer<File>, RecorderError> {
    let io_err = |source| RecorderError::Io {
        path: path.to_owned(),
        source,
    };
    let is_new = !path.is_file();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    if is_new {
        writer
            .write_record(header)
            .and_then(|()| writer.flush().map_err(csv::Error::from))
            .map_err(|source| RecorderError::Csv {
                path: path.to_owned(),
                source,
            })?;
    }
    Ok(writer)
}

/// Contents of one epoch file.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl Recording {
    /// Values of one named column, e.g. `"t"` or `"quaternion_w"`.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().filter_map(|r| r.get(idx).copied()).collect())
    }
}

/// Read back an epoch file written by [`Recorder`].
pub fn load_recording(path: impl AsRef<Path>) -> Result<Recording, RecorderError> {
    let path = path.as_ref();
    let csv_err = |source| RecorderError::Csv {
        path: path.to_owned(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let columns = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(str::to_owned)
        .collect();
    let rows = reader
        .deserialize::<Vec<f64>>()
        .collect::<Result<_, _>>()
        .map_err(csv_err)?;
    Ok(Recording { columns, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MotionReading, Orientation, Vector3};

    fn recorder(dir: &Path, mode: StreamMode) -> Recorder {
        Recorder::new(RecorderConfig {
            output_dir: dir.to_owned(),
            file_prefix: "1_".into(),
            stream_mode: mode,
        })
    }

    fn sample(elapsed: f64, w: f64) -> TelemetrySample {
        TelemetrySample {
            elapsed,
            reading: MotionReading {
                acceleration: Vector3 { x: 2.0, y: 1.0, z: -0.5 },
                orientation: Orientation::Quaternion { w, x: 0.0, y: 0.0, z: 0.0 },
            },
        }
    }

    #[test]
    fn writes_are_dropped_until_activated_and_engaged() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder(dir.path(), StreamMode::Quaternion);
        assert_eq!(rec.state(), RecordingState::Idle);
        assert!(!rec.write(&sample(0.1, 1.0)));
        assert!(matches!(rec.start_capture(), Err(RecorderError::NotActivated)));
        assert_eq!(rec.epoch(), 0);

        rec.activate();
        assert_eq!(rec.state(), RecordingState::Armed);
        assert!(!rec.write(&sample(0.2, 1.0)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn start_stop_start_opens_two_epochs() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder(dir.path(), StreamMode::Quaternion);
        rec.activate();

        let first = rec.start_capture().unwrap();
        assert_eq!(rec.state(), RecordingState::Engaged { epoch: 1 });
        assert!(rec.write(&sample(0.5, 1.0)));
        assert_eq!(rec.stop_capture().unwrap(), 1);
        assert!(!rec.write(&sample(0.6, 1.0)));

        let second = rec.start_capture().unwrap();
        assert_eq!(rec.state(), RecordingState::Engaged { epoch: 2 });
        assert!(rec.write(&sample(0.7, 0.5)));

        assert_eq!(first, dir.path().join("1_1.csv"));
        assert_eq!(second, dir.path().join("1_2.csv"));
        assert_eq!(load_recording(&first).unwrap().rows, vec![vec![0.5, 2.0, 1.0, -0.5, 1.0, 0.0, 0.0, 0.0]]);
        assert_eq!(load_recording(&second).unwrap().rows, vec![vec![0.7, 2.0, 1.0, -0.5, 0.5, 0.0, 0.0, 0.0]]);
    }

    #[test]
    fn file_round_trip_keeps_header_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder(dir.path(), StreamMode::Quaternion);
        rec.activate();
        let path = rec.start_capture().unwrap();
        for i in 0..5 {
            assert!(rec.write(&sample(i as f64 * 0.25, 1.0)));
        }

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("t,raw_acceleration_x,raw_acceleration_y,raw_acceleration_z,quaternion_w,quaternion_x,quaternion_y,quaternion_z")
        );
        assert_eq!(lines.next(), Some("0.0,2.0,1.0,-0.5,1.0,0.0,0.0,0.0"));

        let recording = load_recording(&path).unwrap();
        assert_eq!(recording.rows.len(), 5);
        assert_eq!(recording.column("t").unwrap(), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn existing_file_is_appended_without_second_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1_1.csv");
        std::fs::write(&path, "t,a\n9.0,9.0\n").unwrap();

        let rec = recorder(dir.path(), StreamMode::Quaternion);
        rec.activate();
        rec.start_capture().unwrap();
        assert!(rec.write(&sample(1.0, 1.0)));

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert_eq!(text.lines().filter(|l| l.starts_with('t')).count(), 1);
    }

    #[test]
    fn toggle_alternates() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder(dir.path(), StreamMode::Euler);
        rec.activate();
        assert!(matches!(rec.toggle().unwrap(), Transition::Started { epoch: 1, .. }));
        assert_eq!(rec.toggle().unwrap(), Transition::Stopped { epoch: 1 });
        assert!(matches!(rec.toggle().unwrap(), Transition::Started { epoch: 2, .. }));
        assert!(matches!(rec.start_capture(), Err(RecorderError::AlreadyEngaged)));
    }

    #[test]
    fn unwritable_directory_keeps_recorder_armed() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder(&dir.path().join("missing"), StreamMode::Euler);
        rec.activate();
        assert!(matches!(rec.start_capture(), Err(RecorderError::Io { .. })));
        assert_eq!(rec.state(), RecordingState::Armed);
        assert_eq!(rec.epoch(), 1);
        assert!(!rec.write(&sample(0.0, 1.0)));
    }

    #[test]
    fn toggling_from_another_thread_while_writing() {
        let dir = tempfile::tempdir().unwrap();
        let rec = std::sync::Arc::new(recorder(dir.path(), StreamMode::Quaternion));
        rec.activate();

        let toggler = {
            let rec = rec.clone();
            std::thread::spawn(move || {
                let mut started = Vec::new();
                for _ in 0..40 {
                    if let Transition::Started { epoch, .. } = rec.toggle().unwrap() {
                        started.push(epoch);
                    }
                    std::thread::yield_now();
                }
                started
            })
        };
        let mut i = 0;
        while !toggler.is_finished() {
            rec.write(&sample(i as f64 * 0.001, 1.0));
            i += 1;
        }
        let started = toggler.join().unwrap();

        assert_eq!(started, (1..=20).collect::<Vec<_>>());
        assert_eq!(rec.state(), RecordingState::Armed);
        for epoch in started {
            let text = std::fs::read_to_string(rec.epoch_path(epoch)).unwrap();
            let headers = text.lines().filter(|l| l.starts_with("t,")).count();
            assert_eq!(headers, 1, "epoch {epoch}");
            assert!(text.starts_with("t,raw_acceleration_x"), "epoch {epoch}");
            let recording = load_recording(rec.epoch_path(epoch)).unwrap();
            assert!(recording.rows.iter().all(|r| r.len() == 8));
        }
    }

    #[test]
    fn malformed_cells_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "t,yaw\n0.5,oops\n").unwrap();
        assert!(matches!(load_recording(&path), Err(RecorderError::Csv { .. })));
    }
}
