/*!
 * Alpaca Barn Devices
 *
 * This crate provides the drivers behind the gateway (safety monitors and
 * weather stations), the registry that orders them into device numbers,
 * and the UDP discovery responder.
 */

#![warn(missing_docs)]

pub mod device;
pub mod discovery;
pub mod monitor;
pub mod registry;
pub mod rule;
pub mod sensor;
pub mod weather;

mod transport;

pub use device::{DeviceCategory, DeviceError, Driver, DriverInfo, Result};
pub use monitor::{MonitorReading, SafetyMonitor};
pub use registry::{Barn, DriverSet, RegistryEvent};
pub use rule::SafetyMatchingRule;
pub use sensor::{Sensor, SensorAvailability};
pub use weather::{ObservingConditions, WeatherCondition};

/// Alpaca Barn devices crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
