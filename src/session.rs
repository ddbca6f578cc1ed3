//! Session orchestration: connect → configure → subscribe → monitor → reconnect.
//!
//! A [`Session`] owns one [`SensorLink`], the stream mode, the reference
//! timestamp and (optionally) the shared [`Recorder`].  Everything runs on
//! the caller's task: notification dispatch and liveness polling are
//! multiplexed with `tokio::select!`, so decoding and recording never run
//! concurrently with each other or with the supervising loop.
//!
//! Reconnects replace the link only.  The reference timestamp and the
//! recorder (including an engaged epoch) carry over, so elapsed time keeps
//! counting from the first connection and samples keep landing in the same
//! file.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use log::{debug, error, info, warn};
use tokio::time::{Instant, MissedTickBehavior};

use crate::connection::{Notification, NotificationStream, SensorLink};
use crate::error::{ConnectError, SessionError};
use crate::parse::{decode_frame, parse_battery_level};
use crate::protocol::{
    encode_stream_config, round_to, BATTERY_LEVEL_CHARACTERISTIC, CONTROL_CHARACTERISTIC,
    DATA_CHARACTERISTIC, ELAPSED_PRECISION,
};
use crate::recorder::Recorder;
use crate::types::{SetupReport, StreamMode, TelemetrySample};

// ── SessionConfig ─────────────────────────────────────────────────────────────

/// Configuration for [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Exact advertised name of the sensor.
    pub sensor_name: String,
    /// Channel layout requested from the sensor.  Default: quaternion.
    pub stream_mode: StreamMode,
    /// BLE scan window per connection attempt.  Default: 5 s.
    pub scan_timeout: Duration,
    /// Hard timeout on the transport connect call.  Default: 10 s.
    pub connect_timeout: Duration,
    /// Liveness polling period.  Default: 1 s.
    pub liveness_interval: Duration,
    /// Log every discovered device, the GATT table and each decoded row.
    pub verbose: bool,
    /// Treat an unconfirmed configure/subscribe pass as a failed attempt and
    /// reconnect, instead of logging it and streaming anyway.
    pub strict_setup: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sensor_name: "6TRON Sensor 1".into(),
            stream_mode: StreamMode::Quaternion,
            scan_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            liveness_interval: Duration::from_secs(1),
            verbose: false,
            strict_setup: false,
        }
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// One sensor, one stream mode, one epoch sequence, for the whole process.
pub struct Session<L: SensorLink> {
    link: L,
    config: SessionConfig,
    recorder: Option<Arc<Recorder>>,
    reference: Option<Instant>,
    last_setup: Option<SetupReport>,
    battery_level: Option<u64>,
    connections: u32,
    samples: u64,
}

impl<L: SensorLink> Session<L> {
    /// Build a session.  Pass `None` as `recorder` to monitor without
    /// persisting anything.
    pub fn new(link: L, config: SessionConfig, recorder: Option<Arc<Recorder>>) -> Self {
        Self {
            link,
            config,
            recorder,
            reference: None,
            last_setup: None,
            battery_level: None,
            connections: 0,
            samples: 0,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Outcome of the most recent configure/subscribe pass.
    pub fn last_setup(&self) -> Option<&SetupReport> {
        self.last_setup.as_ref()
    }

    /// Last battery percentage reported by the sensor.
    pub fn battery_level(&self) -> Option<u64> {
        self.battery_level
    }

    /// Successful connections so far (1 + number of reconnects).
    pub fn connections(&self) -> u32 {
        self.connections
    }

    /// Decoded data frames so far.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Run until `shutdown` resolves or the protocol desyncs, then tear the
    /// link down.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), SessionError>
    where
        F: Future<Output = ()>,
    {
        let outcome = tokio::select! {
            // A desync detected in the same poll as shutdown still wins.
            biased;
            result = self.run() => result,
            () = shutdown => {
                info!("Shutdown requested.");
                Ok(())
            }
        };
        self.teardown().await;
        outcome
    }

    /// Drive the session.  Only returns on protocol desync; the link is left
    /// as-is (see [`Session::run_until`] for teardown).
    pub async fn run(&mut self) -> Result<(), SessionError> {
        let mut notifications = self.establish().await;

        if self.reference.is_none() {
            self.reference = Some(Instant::now());
        }
        if let Some(recorder) = &self.recorder {
            recorder.activate();
            info!("Press [space] to start recording data …");
            info!("Press [q] / [ctrl+c] to quit …");
        }

        let mut ticker = tokio::time::interval(self.config.liveness_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                next = next_notification(&mut notifications) => match next {
                    Some(notification) => self.dispatch(notification)?,
                    None => {
                        debug!("notification stream ended");
                        notifications = None;
                    }
                },
                _ = ticker.tick() => {
                    if !self.link.is_alive().await {
                        warn!("Sensor {} disconnected!", self.config.sensor_name);
                        info!("Reconnecting …");
                        notifications = self.establish().await;
                    }
                }
            }
        }
    }

    /// Route one notification to its handler.
    fn dispatch(&mut self, notification: Notification) -> Result<(), SessionError> {
        if notification.uuid == DATA_CHARACTERISTIC {
            return self.on_telemetry(&notification.value);
        }
        if notification.uuid == BATTERY_LEVEL_CHARACTERISTIC {
            self.on_battery_level(&notification.value);
            return Ok(());
        }
        debug!("Unknown notification from {}", notification.uuid);
        Ok(())
    }

    fn on_battery_level(&mut self, data: &[u8]) {
        match parse_battery_level(data) {
            Some(level) => {
                info!("[{}] Battery level: {level} %", self.config.sensor_name);
                self.battery_level = Some(level);
            }
            None => debug!("unreadable battery payload {data:02x?}"),
        }
    }

    fn on_telemetry(&mut self, data: &[u8]) -> Result<(), SessionError> {
        let reading = match decode_frame(self.config.stream_mode, data) {
            Ok(reading) => reading,
            Err(e) if e.is_fatal() => {
                error!("{e}");
                return Err(SessionError::Desync(e));
            }
            Err(e) => {
                warn!("Dropping frame: {e}");
                return Ok(());
            }
        };

        let elapsed = self
            .reference
            .map_or(0.0, |r| round_to(r.elapsed().as_secs_f64(), ELAPSED_PRECISION));
        let sample = TelemetrySample { elapsed, reading };
        self.samples += 1;

        if self.config.verbose {
            info!("{:?}", sample.fields());
        }
        if let Some(recorder) = &self.recorder {
            recorder.write(&sample);
        }
        Ok(())
    }

    /// Connect (retrying forever), configure and subscribe.  Returns the new
    /// link's notification stream.
    async fn establish(&mut self) -> Option<NotificationStream> {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            match self.try_establish().await {
                Ok(stream) => {
                    self.connections += 1;
                    return stream;
                }
                Err(e) => {
                    warn!("{e}");
                    warn!(
                        "Unable to connect to BLE sensor {} (attempt {attempt})",
                        self.config.sensor_name
                    );
                }
            }
        }
    }

    async fn try_establish(&mut self) -> Result<Option<NotificationStream>, ConnectError> {
        let name = self.config.sensor_name.clone();
        // A discovery attempt always spans the full scan window, even when
        // the adapter fails right away.
        let window_end = Instant::now() + self.config.scan_timeout;
        let address = match self.link.discover(&name, self.config.scan_timeout).await {
            Ok(Some(address)) => address,
            Ok(None) => {
                tokio::time::sleep_until(window_end).await;
                return Err(ConnectError::NotFound(name));
            }
            Err(source) => {
                tokio::time::sleep_until(window_end).await;
                return Err(ConnectError::Scan { name, source });
            }
        };

        self.link
            .connect(&address, self.config.connect_timeout)
            .await?;

        if self.config.verbose {
            info!("Services:");
            for line in self.link.services() {
                info!("{line}");
            }
        }

        let report = self.configure().await;
        let complete = report.is_complete();
        if !complete {
            warn!("Sensor setup not confirmed: {report:?}");
        }
        self.last_setup = Some(report);
        if !complete && self.config.strict_setup {
            self.link.disconnect().await;
            return Err(ConnectError::SetupIncomplete(name));
        }

        Ok(self.link.notifications().await)
    }

    /// Write the stream mode and enable both notification channels.
    async fn configure(&mut self) -> SetupReport {
        let mode = self.config.stream_mode;
        info!("Applying stream config {} ({mode})", mode.tag());
        let stream_config = self
            .link
            .write_char(CONTROL_CHARACTERISTIC, &encode_stream_config(mode))
            .await;
        let battery = self.link.subscribe(BATTERY_LEVEL_CHARACTERISTIC).await;
        let data = self.link.subscribe(DATA_CHARACTERISTIC).await;
        SetupReport {
            stream_config,
            battery,
            data,
        }
    }

    async fn teardown(&mut self) {
        if self.link.is_alive().await {
            self.link.unsubscribe(DATA_CHARACTERISTIC).await;
            self.link.unsubscribe(BATTERY_LEVEL_CHARACTERISTIC).await;
        }
        self.link.disconnect().await;
        if let Some(recorder) = &self.recorder {
            if recorder.is_engaged() {
                recorder.stop_capture().ok();
            }
        }
        info!("Disconnected from {}.", self.config.sensor_name);
    }
}

/// Next item of `stream`, or pend forever when there is no stream.
async fn next_notification(stream: &mut Option<NotificationStream>) -> Option<Notification> {
    match stream {
        Some(s) => s.next().await,
        None => std::future::pending().await,
    }
}
