/*!
 * Driver trait and shared driver types.
 *
 * A driver is the gateway's view of one physical (or simulated) device:
 * it owns the last observed state and knows how to refresh it.
 */
use std::fmt::{self, Debug};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use barn_core::types::DriverId;

/// Error type for driver and registry operations
#[derive(Error, Debug)]
pub enum DeviceError {
    /// A device number does not address a registered driver
    #[error("Device index {0} is out of range")]
    IndexOutOfRange(i64),

    /// No driver is registered under the id
    #[error("Driver {0} not found")]
    NotFound(DriverId),

    /// A driver with the same id is already registered
    #[error("Driver {0} already registered")]
    AlreadyRegistered(DriverId),

    /// The driver was configured without a usable URL
    #[error("Invalid URL provided")]
    InvalidUrl,

    /// Averaging periods cannot be negative
    #[error("Average period must not be negative, got {0}")]
    InvalidPeriod(f64),

    /// Transport failure talking to an upstream source
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The upstream source answered with a non-success status
    #[error("HTTP request failed with status code {0}")]
    HttpStatus(u16),

    /// The upstream payload could not be decoded
    #[error("Failed to parse weather data: {0}")]
    Parse(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A registry lock was poisoned by a panicking writer
    #[error("Failed to acquire {0} lock on driver registry")]
    LockPoisoned(&'static str),
}

/// Result type for driver operations
pub type Result<T> = std::result::Result<T, DeviceError>;

/// The Alpaca device categories served by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceCategory {
    /// Binary safe/unsafe indicator
    SafetyMonitor,
    /// Weather station
    ObservingConditions,
}

impl DeviceCategory {
    /// Lowercase name used in URL paths
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SafetyMonitor => "safetymonitor",
            Self::ObservingConditions => "observingconditions",
        }
    }

    /// Name used for `DeviceType` in the management API
    pub fn device_type(&self) -> &'static str {
        match self {
            Self::SafetyMonitor => "SafetyMonitor",
            Self::ObservingConditions => "ObservingConditions",
        }
    }
}

impl fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a configured driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverInfo {
    /// Configuration id, unique per category
    pub id: DriverId,
    /// Display name
    pub name: String,
    /// Description
    pub description: String,
}

impl DriverInfo {
    /// Create driver info
    pub fn new(id: impl Into<DriverId>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
        }
    }
}

/// A source of device state that can be refreshed on demand
#[async_trait]
pub trait Driver: Send + Sync + Debug {
    /// Identity of the driver
    fn info(&self) -> &DriverInfo;

    /// The category this driver is served under
    fn category(&self) -> DeviceCategory;

    /// Short name of the backing implementation ("http", "file", "dummy")
    fn kind(&self) -> &'static str;

    /// Configuration id
    fn id(&self) -> &DriverId {
        &self.info().id
    }

    /// Display name
    fn name(&self) -> &str {
        &self.info().name
    }

    /// Description
    fn description(&self) -> &str {
        &self.info().description
    }

    /// Pull fresh state from the backing source
    async fn refresh(&self) -> Result<()>;

    /// One-line rendering of the current state, for logs
    async fn state_summary(&self) -> String;
}

/// The instant drivers report before their first successful refresh
pub fn zero_time() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
