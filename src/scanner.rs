//! Discovery of a sensor by its advertised name.
//!
//! [`Scanner::find`] listens to the adapter's advertisement events for the
//! whole scan window and returns the first device whose local name matches
//! exactly.  Scans are serialised through a [`ScanLock`] so that several
//! sensor sessions sharing an adapter never scan at the same time.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use log::{debug, info};
use tokio::sync::Mutex;

use crate::error::ConnectError;

// ── ScanLock ──────────────────────────────────────────────────────────────────

/// Mutual-exclusion handle for adapter scans.
///
/// Clones share the same lock.  Hand one clone to every [`Scanner`] that
/// must not overlap with the others.
#[derive(Clone, Default)]
pub struct ScanLock(Arc<Mutex<()>>);

impl ScanLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other scanner holds the lock.
    pub async fn acquire(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.0.lock().await
    }
}

// ── DiscoveredDevice ──────────────────────────────────────────────────────────

/// A sensor found during a scan.
#[derive(Clone, Debug)]
pub struct DiscoveredDevice {
    /// Advertised local name.
    pub name: String,
    /// Platform BLE identifier.
    /// • Linux — a Bluetooth MAC address (`AA:BB:CC:DD:EE:FF`)
    /// • macOS / Windows — a UUID string
    pub address: String,
    pub(crate) peripheral: Peripheral,
}

// ── Discovery bookkeeping ─────────────────────────────────────────────────────

/// What [`DiscoveryLog::observe`] concluded about one advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sighting {
    /// Address/name pair already seen during this scan.
    Repeat,
    /// Never seen before, name does not match.
    New,
    /// Never seen before and this is the first device matching the name.
    Match,
    /// Never seen before, matches the name, but an earlier match already won.
    LateMatch,
}

/// Tracks advertisements seen during a single scan window.
///
/// Kept separate from the BLE plumbing so the selection rule (exact name
/// match, first one wins) is testable on its own.
#[derive(Debug)]
pub struct DiscoveryLog {
    target: String,
    seen: HashSet<(String, Option<String>)>,
    found: Option<String>,
}

impl DiscoveryLog {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            seen: HashSet::new(),
            found: None,
        }
    }

    /// Record one advertisement.
    pub fn observe(&mut self, address: &str, name: Option<&str>) -> Sighting {
        let key = (address.to_owned(), name.map(str::to_owned));
        if !self.seen.insert(key) {
            return Sighting::Repeat;
        }
        if name != Some(self.target.as_str()) {
            return Sighting::New;
        }
        if self.found.is_some() {
            return Sighting::LateMatch;
        }
        self.found = Some(address.to_owned());
        Sighting::Match
    }

    /// Address of the first matching device, if any.
    pub fn found(&self) -> Option<&str> {
        self.found.as_deref()
    }
}

// ── Scanner ───────────────────────────────────────────────────────────────────

/// BLE scanner bound to one adapter.
#[derive(Clone)]
pub struct Scanner {
    adapter: Adapter,
    lock: ScanLock,
    verbose: bool,
}

impl Scanner {
    /// Open the first Bluetooth adapter on the system.
    ///
    /// On macOS, `CBCentralManager` needs a moment to reach the *poweredOn*
    /// state after initialisation; we wait up to 3 s for that.
    pub async fn first_adapter(lock: ScanLock, verbose: bool) -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(ConnectError::NoAdapter)?;

        #[cfg(target_os = "macos")]
        {
            use btleplug::api::CentralState;

            let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
            loop {
                match adapter.adapter_state().await {
                    Ok(CentralState::PoweredOn) => break,
                    Ok(state) if tokio::time::Instant::now() >= deadline => {
                        log::warn!("macOS: adapter still in state {state:?} after 3 s, proceeding anyway");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("macOS: adapter_state() error: {e}");
                        break;
                    }
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            tokio::time::sleep(Duration::from_millis(300)).await;
        }

        Ok(Self::new(adapter, lock, verbose))
    }

    pub fn new(adapter: Adapter, lock: ScanLock, verbose: bool) -> Self {
        Self {
            adapter,
            lock,
            verbose,
        }
    }

    /// Listen for advertisements for `timeout` and return the first device
    /// whose local name equals `name`.
    ///
    /// `Ok(None)` means nothing matched: a normal outcome the caller retries.
    /// `Err` is reserved for adapter failures.
    pub async fn find(&self, name: &str, timeout: Duration) -> Result<Option<DiscoveredDevice>> {
        let _guard = self.lock.acquire().await;

        let mut events = self.adapter.events().await?;
        info!("Scanning BLE peripherals ({} s) …", timeout.as_secs_f32());
        self.adapter.start_scan(ScanFilter::default()).await?;

        let mut log = DiscoveryLog::new(name);
        let mut winner: Option<Peripheral> = None;
        let deadline = tokio::time::Instant::now() + timeout;

        // Devices already cached by the adapter may not advertise again.
        for p in self.adapter.peripherals().await.unwrap_or_default() {
            self.inspect(&p, &mut log, &mut winner).await;
        }

        while let Ok(Some(event)) = tokio::time::timeout_at(deadline, events.next()).await {
            let id = match event {
                CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                _ => continue,
            };
            if let Some(p) = self.peripheral(&id).await {
                self.inspect(&p, &mut log, &mut winner).await;
            }
        }

        self.adapter.stop_scan().await.ok();

        Ok(winner.map(|peripheral| DiscoveredDevice {
            name: name.to_owned(),
            address: log.found().unwrap_or_default().to_owned(),
            peripheral,
        }))
    }

    async fn peripheral(&self, id: &PeripheralId) -> Option<Peripheral> {
        match self.adapter.peripheral(id).await {
            Ok(p) => Some(p),
            Err(e) => {
                debug!("peripheral {id:?} vanished: {e}");
                None
            }
        }
    }

    async fn inspect(
        &self,
        p: &Peripheral,
        log: &mut DiscoveryLog,
        winner: &mut Option<Peripheral>,
    ) {
        let props = p.properties().await.ok().flatten().unwrap_or_default();
        let address = p.id().to_string();
        let local_name = props.local_name.as_deref();

        match log.observe(&address, local_name) {
            Sighting::Repeat => {}
            sighting => {
                let rssi = props.rssi.map_or_else(|| "?".to_owned(), |r| r.to_string());
                if self.verbose {
                    info!("New device: {address} - RSSI: {rssi} - {local_name:?}");
                } else {
                    debug!("New device: {address} - RSSI: {rssi} - {local_name:?}");
                }
                if sighting == Sighting::Match {
                    info!("{} sensor found ({address})", local_name.unwrap_or_default());
                    *winner = Some(p.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_exact_match_wins() {
        let mut log = DiscoveryLog::new("6TRON Sensor 1");
        assert_eq!(log.observe("AA", Some("Other")), Sighting::New);
        assert_eq!(log.observe("BB", None), Sighting::New);
        assert_eq!(log.observe("CC", Some("6TRON Sensor 1")), Sighting::Match);
        assert_eq!(log.observe("DD", Some("6TRON Sensor 1")), Sighting::LateMatch);
        assert_eq!(log.found(), Some("CC"));
    }

    #[test]
    fn name_match_is_exact() {
        let mut log = DiscoveryLog::new("6TRON Sensor 1");
        assert_eq!(log.observe("AA", Some("6TRON Sensor 10")), Sighting::New);
        assert_eq!(log.observe("BB", Some("6tron sensor 1")), Sighting::New);
        assert_eq!(log.found(), None);
    }

    #[test]
    fn repeated_advertisements_are_reported_once() {
        let mut log = DiscoveryLog::new("x");
        assert_eq!(log.observe("AA", Some("y")), Sighting::New);
        assert_eq!(log.observe("AA", Some("y")), Sighting::Repeat);
        // A name update for the same address counts as a new sighting.
        assert_eq!(log.observe("AA", Some("x")), Sighting::Match);
    }

    #[tokio::test]
    async fn scan_lock_is_exclusive_across_clones() {
        let lock = ScanLock::new();
        let other = lock.clone();
        let guard = lock.acquire().await;
        assert!(other.0.try_lock().is_err());
        drop(guard);
        assert!(other.0.try_lock().is_ok());
    }
}
