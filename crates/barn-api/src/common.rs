/*!
 * Operations shared by every device category.
 */
use std::time::Duration;

use axum::http::Method;
use tracing::debug;

use barn_devices::Driver;

use crate::envelope::{Reply, Value};
use crate::error::{ApiError, Result};
use crate::request::DeviceRequest;
use crate::state::Resolved;

/// Upper bound on a refresh performed on behalf of a client
pub const ACTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Static metadata of a device category
#[derive(Debug, Clone, Copy)]
pub struct CategoryProfile {
    /// `driverinfo` value
    pub driver_info: &'static str,
    /// `supportedactions` value
    pub supported_actions: &'static [&'static str],
    /// `interfaceversion` value
    pub interface_version: i32,
}

/// Operations every Alpaca device answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommonOperation {
    /// GET connected
    Connected,
    /// GET connecting
    Connecting,
    /// GET name
    Name,
    /// GET description
    Description,
    /// GET driverinfo
    DriverInfo,
    /// GET driverversion
    DriverVersion,
    /// GET supportedactions
    SupportedActions,
    /// GET interfaceversion
    InterfaceVersion,
    /// PUT connected
    SetConnected,
    /// PUT connect
    Connect,
    /// PUT disconnect
    Disconnect,
}

impl CommonOperation {
    /// Match a method and lowercase operation name
    pub fn parse(method: &Method, name: &str) -> Option<Self> {
        let operation = match (method, name) {
            (&Method::GET, "connected") => Self::Connected,
            (&Method::GET, "connecting") => Self::Connecting,
            (&Method::GET, "name") => Self::Name,
            (&Method::GET, "description") => Self::Description,
            (&Method::GET, "driverinfo") => Self::DriverInfo,
            (&Method::GET, "driverversion") => Self::DriverVersion,
            (&Method::GET, "supportedactions") => Self::SupportedActions,
            (&Method::GET, "interfaceversion") => Self::InterfaceVersion,
            (&Method::PUT, "connected") => Self::SetConnected,
            (&Method::PUT, "connect") => Self::Connect,
            (&Method::PUT, "disconnect") => Self::Disconnect,
            _ => return None,
        };
        Some(operation)
    }

    /// Run the operation. None of these are gated on a connection.
    pub fn handle<D: Driver>(
        self,
        profile: &CategoryProfile,
        resolved: &Resolved<D>,
        request: &DeviceRequest,
    ) -> Result<Reply> {
        let device = &resolved.device;
        let client = request.client;

        let reply = match self {
            Self::Connected => Reply::value(device.is_connected(&client)),
            Self::Connecting => Reply::value(false),
            Self::Name => Reply::value(resolved.driver.name()),
            Self::Description => Reply::value(resolved.driver.description()),
            Self::DriverInfo => Reply::value(profile.driver_info),
            Self::DriverVersion => Reply::value(crate::VERSION),
            Self::SupportedActions => Reply::Value(Value::TextList(
                profile.supported_actions.iter().map(ToString::to_string).collect(),
            )),
            Self::InterfaceVersion => Reply::value(profile.interface_version),
            Self::SetConnected => {
                if parse_connected(&request.params.get_or_empty("Connected"))? {
                    device.connect(client);
                } else {
                    device.disconnect(&client);
                }
                Reply::Empty
            }
            Self::Connect => {
                device.connect(client);
                Reply::Empty
            }
            Self::Disconnect => {
                device.disconnect(&client);
                Reply::Empty
            }
        };
        Ok(reply)
    }
}

fn parse_connected(value: &str) -> Result<bool> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        debug!(value, "Rejecting Connected value");
        Err(ApiError::validation("Invalid request"))
    }
}

/// Normalize an operation path segment
pub fn operation_name(segment: &str) -> String {
    segment.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_respects_method() {
        assert_eq!(
            CommonOperation::parse(&Method::GET, "connected"),
            Some(CommonOperation::Connected)
        );
        assert_eq!(
            CommonOperation::parse(&Method::PUT, "connected"),
            Some(CommonOperation::SetConnected)
        );
        assert_eq!(CommonOperation::parse(&Method::PUT, "name"), None);
        assert_eq!(CommonOperation::parse(&Method::GET, "connect"), None);
    }

    #[test]
    fn test_parse_connected() {
        assert!(parse_connected("TRUE").unwrap());
        assert!(!parse_connected("false").unwrap());
        assert!(parse_connected("yes").is_err());
        assert!(parse_connected("").is_err());
    }

    #[test]
    fn test_operation_name() {
        assert_eq!(operation_name("IsSafe"), "issafe");
    }
}
