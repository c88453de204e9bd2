/*!
 * Per-device, per-client connection sessions.
 *
 * Each exposed device keeps its own session map keyed by [`ClientIdentity`].
 * A session exists only while the client is connected; disconnecting drops
 * it together with any per-client weather settings.
 */
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use barn_core::types::DriverId;
use barn_devices::{Barn, DeviceCategory, Result};

/// A logical client: peer address plus the client-chosen ClientID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientIdentity {
    /// Peer address
    pub address: IpAddr,
    /// ClientID request parameter
    pub client_id: u32,
}

impl ClientIdentity {
    /// Create an identity
    pub fn new(address: IpAddr, client_id: u32) -> Self {
        Self { address, client_id }
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.address, self.client_id)
    }
}

/// State of one connected client on one device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSession {
    /// Always true while the session exists
    pub connected: bool,
    /// Client-specific averaging window, observing conditions only
    pub average_period: f64,
}

impl Default for DeviceSession {
    fn default() -> Self {
        Self {
            connected: true,
            average_period: 0.0,
        }
    }
}

/// A device as exposed over the protocol, with its client sessions
#[derive(Debug)]
pub struct ProtocolDevice {
    id: DriverId,
    category: DeviceCategory,
    device_number: u32,
    sessions: DashMap<ClientIdentity, DeviceSession>,
}

impl ProtocolDevice {
    /// Create a device with no sessions
    pub fn new(id: DriverId, category: DeviceCategory, device_number: u32) -> Self {
        Self {
            id,
            category,
            device_number,
            sessions: DashMap::new(),
        }
    }

    /// Driver id backing this device
    pub fn id(&self) -> &DriverId {
        &self.id
    }

    /// Device category
    pub fn category(&self) -> DeviceCategory {
        self.category
    }

    /// Device number assigned at startup
    pub fn device_number(&self) -> u32 {
        self.device_number
    }

    /// Whether the client holds a connected session
    pub fn is_connected(&self, client: &ClientIdentity) -> bool {
        self.sessions
            .get(client)
            .map(|session| session.connected)
            .unwrap_or(false)
    }

    /// Open a session for the client; an existing session is kept as is
    pub fn connect(&self, client: ClientIdentity) {
        let mut session = self.sessions.entry(client).or_default();
        session.connected = true;
        info!(category = %self.category, id = %self.id, client = %client, "Client connected");
    }

    /// Drop the client's session
    pub fn disconnect(&self, client: &ClientIdentity) {
        if self.sessions.remove(client).is_some() {
            info!(category = %self.category, id = %self.id, client = %client, "Client disconnected");
        }
    }

    /// Client-specific averaging window, if the client is connected
    pub fn average_period(&self, client: &ClientIdentity) -> Option<f64> {
        self.sessions
            .get(client)
            .filter(|session| session.connected)
            .map(|session| session.average_period)
    }

    /// Set the client's averaging window; false if the client is not connected
    pub fn set_average_period(&self, client: &ClientIdentity, period: f64) -> bool {
        match self.sessions.get_mut(client) {
            Some(mut session) if session.connected => {
                session.average_period = period;
                debug!(id = %self.id, client = %client, period, "Set client average period");
                true
            }
            _ => false,
        }
    }

    /// Number of connected clients
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

/// Every exposed device, fixed at startup
#[derive(Debug, Default)]
pub struct SessionTable {
    devices: BTreeMap<(DeviceCategory, DriverId), Arc<ProtocolDevice>>,
}

impl SessionTable {
    /// Expose every driver currently registered in the barn
    pub fn from_barn(barn: &Barn) -> Result<Self> {
        let mut table = Self::default();
        table.expose(DeviceCategory::SafetyMonitor, barn.monitors().ids()?);
        table.expose(DeviceCategory::ObservingConditions, barn.weather().ids()?);
        Ok(table)
    }

    fn expose(&mut self, category: DeviceCategory, ids: Vec<DriverId>) {
        for (device_number, id) in (0u32..).zip(ids) {
            debug!(category = %category, id = %id, device_number, "Exposing device");
            let device = ProtocolDevice::new(id.clone(), category, device_number);
            self.devices.insert((category, id), Arc::new(device));
        }
    }

    /// The exposed device for a driver id
    pub fn get(&self, category: DeviceCategory, id: &DriverId) -> Option<Arc<ProtocolDevice>> {
        self.devices.get(&(category, id.clone())).cloned()
    }

    /// Exposed devices of a category in device-number order
    pub fn devices(&self, category: DeviceCategory) -> Vec<Arc<ProtocolDevice>> {
        let mut devices: Vec<_> = self
            .devices
            .iter()
            .filter(|((device_category, _), _)| *device_category == category)
            .map(|(_, device)| Arc::clone(device))
            .collect();
        devices.sort_by_key(|device| device.device_number());
        devices
    }

    /// Number of exposed devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether nothing is exposed
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
