/*!
 * Server application state.
 *
 * Shared by every handler: the driver registry, the session table fixed at
 * startup, the transaction counter and the server's management metadata.
 */
use std::sync::Arc;

use barn_core::config::GeneralConfig;
use barn_devices::{Barn, Driver, DriverSet, ObservingConditions, SafetyMonitor};

use crate::envelope::{Envelope, Reply, TransactionCounter};
use crate::error::{ApiError, Result};
use crate::session::{ClientIdentity, ProtocolDevice, SessionTable};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Driver registry
    barn: Arc<Barn>,

    /// Devices exposed at startup and their client sessions
    sessions: SessionTable,

    /// ServerTransactionID source
    transactions: TransactionCounter,

    /// Name, manufacturer and location for the management API
    general: GeneralConfig,
}

/// A device resolved from its device number
#[derive(Debug)]
pub struct Resolved<D> {
    /// Protocol view with client sessions
    pub device: Arc<ProtocolDevice>,
    /// The driver behind it
    pub driver: Arc<D>,
}

impl<D> Resolved<D> {
    /// Fail with [`ApiError::NotConnected`] unless the client holds a session
    pub fn require_connected(&self, client: &ClientIdentity) -> Result<()> {
        if self.device.is_connected(client) {
            Ok(())
        } else {
            Err(ApiError::NotConnected)
        }
    }
}

impl AppState {
    /// Create state exposing every driver currently in the barn
    pub fn new(barn: Arc<Barn>, general: GeneralConfig) -> Result<Self> {
        let sessions = SessionTable::from_barn(&barn)?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                barn,
                sessions,
                transactions: TransactionCounter::new(),
                general,
            }),
        })
    }

    /// The driver registry
    pub fn barn(&self) -> &Arc<Barn> {
        &self.inner.barn
    }

    /// The session table
    pub fn sessions(&self) -> &SessionTable {
        &self.inner.sessions
    }

    /// Management metadata
    pub fn general(&self) -> &GeneralConfig {
        &self.inner.general
    }

    /// The last ServerTransactionID handed out
    pub fn last_transaction_id(&self) -> u32 {
        self.inner.transactions.current()
    }

    /// Wrap a reply in an envelope, consuming one ServerTransactionID
    pub fn envelope(&self, client_transaction_id: u32, reply: Reply) -> Envelope {
        self.inner.transactions.envelope(client_transaction_id, reply)
    }

    /// Resolve a safety monitor by device number
    pub fn monitor(&self, device_number: u32) -> Result<Resolved<SafetyMonitor>> {
        self.resolve(self.inner.barn.monitors(), device_number)
    }

    /// Resolve a weather station by device number
    pub fn station(&self, device_number: u32) -> Result<Resolved<ObservingConditions>> {
        self.resolve(self.inner.barn.weather(), device_number)
    }

    fn resolve<D: Driver + 'static>(
        &self,
        drivers: &DriverSet<D>,
        device_number: u32,
    ) -> Result<Resolved<D>> {
        let id = drivers.id_at(i64::from(device_number))?;
        let device = self
            .inner
            .sessions
            .get(drivers.category(), &id)
            .ok_or(ApiError::DeviceNotFound)?;
        let driver = drivers.get(&id)?;
        Ok(Resolved { device, driver })
    }
}
