//! Connection management for a single sensor.
//!
//! [`SensorLink`] is the seam between the session orchestrator and the
//! wireless transport.  [`BleSensor`] implements it on top of `btleplug`;
//! tests drive the orchestrator through scripted implementations.
//!
//! Every GATT operation after `connect` is best-effort: failures are logged
//! and reported as [`OpStatus::Failed`] instead of being propagated.

use std::collections::{BTreeSet, HashMap};
use std::pin::Pin;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use btleplug::api::{CharPropFlags, Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use futures::{Stream, StreamExt};
use log::{debug, info, warn};
use uuid::Uuid;

use crate::error::ConnectError;
use crate::scanner::{DiscoveredDevice, Scanner};
use crate::types::OpStatus;

/// One inbound notification, tagged with the characteristic it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub uuid: Uuid,
    pub value: Vec<u8>,
}

/// Stream of notifications from every subscribed characteristic of the
/// current connection.  Ends when the link drops.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Notification> + Send>>;

/// Lifecycle of one sensor link: discovery, connect, configure, subscribe,
/// liveness polling, teardown.
#[async_trait]
pub trait SensorLink: Send {
    /// Scan for a device advertising `name` and return its address.
    ///
    /// `Ok(None)` is a normal miss; `Err` is an adapter failure.  Both are
    /// retried by the session.
    async fn discover(&mut self, name: &str, timeout: Duration) -> Result<Option<String>>;

    /// Connect to a previously discovered address, replacing any current link.
    async fn connect(&mut self, address: &str, timeout: Duration) -> Result<(), ConnectError>;

    /// Transport-reported link state.  Polled by the session.
    async fn is_alive(&self) -> bool;

    async fn write_char(&self, uuid: Uuid, bytes: &[u8]) -> OpStatus;

    async fn subscribe(&self, uuid: Uuid) -> OpStatus;

    async fn unsubscribe(&self, uuid: Uuid) -> OpStatus;

    /// Notification stream of the current link, `None` when not connected.
    async fn notifications(&self) -> Option<NotificationStream>;

    /// Tear the link down.  Safe to call repeatedly and on a dead link.
    async fn disconnect(&mut self);

    /// One line per GATT service / characteristic, for diagnostics.
    fn services(&self) -> Vec<String> {
        Vec::new()
    }
}

// ── BleSensor ─────────────────────────────────────────────────────────────────

/// A live link to one peripheral.
struct SensorConnection {
    address: String,
    peripheral: Peripheral,
    chars: BTreeSet<Characteristic>,
}

/// `btleplug` implementation of [`SensorLink`].
pub struct BleSensor {
    scanner: Scanner,
    /// Devices returned by past scans, keyed by address.
    discovered: HashMap<String, DiscoveredDevice>,
    link: Option<SensorConnection>,
}

impl BleSensor {
    pub fn new(scanner: Scanner) -> Self {
        Self {
            scanner,
            discovered: HashMap::new(),
            link: None,
        }
    }

    fn find_char(&self, uuid: Uuid) -> Result<(&Peripheral, &Characteristic), String> {
        let link = self.link.as_ref().ok_or_else(|| "not connected".to_owned())?;
        let c = link
            .chars
            .iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| format!("characteristic {uuid} not found"))?;
        Ok((&link.peripheral, c))
    }
}

#[async_trait]
impl SensorLink for BleSensor {
    async fn discover(&mut self, name: &str, timeout: Duration) -> Result<Option<String>> {
        let Some(device) = self.scanner.find(name, timeout).await? else {
            return Ok(None);
        };
        let address = device.address.clone();
        self.discovered.insert(address.clone(), device);
        Ok(Some(address))
    }

    async fn connect(&mut self, address: &str, timeout: Duration) -> Result<(), ConnectError> {
        self.disconnect().await;

        let device = self
            .discovered
            .get(address)
            .ok_or_else(|| ConnectError::NotFound(address.to_owned()))?;
        let name = device.name.clone();
        let peripheral = device.peripheral.clone();

        info!("Connecting to sensor ({address}) …");
        match tokio::time::timeout(timeout, peripheral.connect()).await {
            Err(_) => return Err(ConnectError::Timeout { name, timeout }),
            Ok(Err(source)) => return Err(ConnectError::Transport { name, source }),
            Ok(Ok(())) => {}
        }

        // BlueZ signals connection completion before the remote GATT cache is
        // populated; discovering too early returns an empty set.
        #[cfg(target_os = "linux")]
        tokio::time::sleep(Duration::from_millis(600)).await;

        match tokio::time::timeout(Duration::from_secs(15), peripheral.discover_services()).await
        {
            Err(_) => {
                peripheral.disconnect().await.ok();
                return Err(ConnectError::Timeout {
                    name,
                    timeout: Duration::from_secs(15),
                });
            }
            Ok(Err(source)) => {
                peripheral.disconnect().await.ok();
                return Err(ConnectError::Transport { name, source });
            }
            Ok(Ok(())) => {}
        }

        info!("Connected to {name} ({address})");
        self.link = Some(SensorConnection {
            address: address.to_owned(),
            chars: peripheral.characteristics(),
            peripheral,
        });
        Ok(())
    }

    async fn is_alive(&self) -> bool {
        match &self.link {
            Some(link) => link.peripheral.is_connected().await.unwrap_or(false),
            None => false,
        }
    }

    async fn write_char(&self, uuid: Uuid, bytes: &[u8]) -> OpStatus {
        let (peripheral, c) = match self.find_char(uuid) {
            Ok(found) => found,
            Err(e) => {
                warn!("Error writing characteristic {uuid}: {e}");
                return OpStatus::Failed(e);
            }
        };
        let write_type = if c.properties.contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        debug!("write {uuid} <- {bytes:02x?}");
        match peripheral.write(c, bytes, write_type).await {
            Ok(()) => OpStatus::Ok,
            Err(e) => {
                warn!("Error writing characteristic {uuid}: {e}");
                OpStatus::Failed(e.to_string())
            }
        }
    }

    async fn subscribe(&self, uuid: Uuid) -> OpStatus {
        let result = match self.find_char(uuid) {
            Ok((peripheral, c)) => peripheral.subscribe(c).await.map_err(|e| e.to_string()),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => OpStatus::Ok,
            Err(e) => {
                warn!("Error enabling notifications for {uuid}: {e}");
                OpStatus::Failed(e)
            }
        }
    }

    async fn unsubscribe(&self, uuid: Uuid) -> OpStatus {
        let result = match self.find_char(uuid) {
            Ok((peripheral, c)) => peripheral.unsubscribe(c).await.map_err(|e| e.to_string()),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => OpStatus::Ok,
            Err(e) => {
                warn!("Error stopping notifications for {uuid}: {e}");
                OpStatus::Failed(e)
            }
        }
    }

    async fn notifications(&self) -> Option<NotificationStream> {
        let link = self.link.as_ref()?;
        match link.peripheral.notifications().await {
            Ok(stream) => Some(Box::pin(stream.map(|n| Notification {
                uuid: n.uuid,
                value: n.value,
            }))),
            Err(e) => {
                warn!("Could not get notification stream: {e}");
                None
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            if let Err(e) = link.peripheral.disconnect().await {
                debug!("Error when disconnecting {}: {e}", link.address);
            }
        }
    }

    fn services(&self) -> Vec<String> {
        let Some(link) = &self.link else {
            return Vec::new();
        };
        let mut lines = Vec::new();
        for service in link.peripheral.services() {
            lines.push(format!("service {}", service.uuid));
            for c in &service.characteristics {
                lines.push(format!("\tcharacteristic {} {:?}", c.uuid, c.properties));
            }
        }
        lines
    }
}
