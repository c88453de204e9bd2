/*!
 * The `safetymonitor` device API.
 */
use axum::extract::{Path, State};
use axum::http::Method;
use tracing::debug;

use barn_core::utils::with_timeout;
use barn_devices::sensor::TIMESTAMP;
use barn_devices::{Driver, SafetyMonitor};

use crate::common::{operation_name, CategoryProfile, CommonOperation, ACTION_TIMEOUT};
use crate::envelope::{Envelope, Reply, StateEntry};
use crate::error::{ApiError, Result};
use crate::request::{AlpacaRequest, DeviceRequest};
use crate::state::{AppState, Resolved};

/// Static metadata of safety monitors
pub const PROFILE: CategoryProfile = CategoryProfile {
    driver_info: "Alpaca Barn safety monitor",
    supported_actions: &["RawValue"],
    interface_version: 2,
};

/// Operations of the safety monitor interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyMonitorOperation {
    /// Shared device operation
    Common(CommonOperation),
    /// GET issafe
    IsSafe,
    /// GET devicestate
    DeviceState,
    /// PUT action
    Action,
}

impl SafetyMonitorOperation {
    /// Match a method and lowercase operation name
    pub fn parse(method: &Method, name: &str) -> Option<Self> {
        if let Some(common) = CommonOperation::parse(method, name) {
            return Some(Self::Common(common));
        }
        match (method, name) {
            (&Method::GET, "issafe") => Some(Self::IsSafe),
            (&Method::GET, "devicestate") => Some(Self::DeviceState),
            (&Method::PUT, "action") => Some(Self::Action),
            _ => None,
        }
    }
}

/// Handle `/api/v1/safetymonitor/{device_id}/{operation}`
pub async fn handle(
    State(state): State<AppState>,
    Path((device_id, operation)): Path<(String, String)>,
    request: AlpacaRequest,
) -> Result<Envelope> {
    let method = request.method.clone();
    let request = DeviceRequest::validate(&device_id, request)?;
    let resolved = state.monitor(request.device_number)?;
    let operation = SafetyMonitorOperation::parse(&method, &operation_name(&operation))
        .ok_or(ApiError::UnsupportedOperation)?;

    let reply = dispatch(operation, &resolved, &request).await?;
    Ok(state.envelope(request.client_transaction_id, reply))
}

async fn dispatch(
    operation: SafetyMonitorOperation,
    resolved: &Resolved<SafetyMonitor>,
    request: &DeviceRequest,
) -> Result<Reply> {
    let monitor = &resolved.driver;

    match operation {
        SafetyMonitorOperation::Common(common) => common.handle(&PROFILE, resolved, request),
        SafetyMonitorOperation::IsSafe => {
            // A client that is not connected is told "unsafe" rather than refused.
            let safe = resolved.device.is_connected(&request.client) && monitor.is_safe().await;
            Ok(Reply::value(safe))
        }
        SafetyMonitorOperation::DeviceState => {
            resolved.require_connected(&request.client)?;
            let reading = monitor.reading().await;
            Ok(Reply::value(vec![
                StateEntry::new("IsSafe", reading.safe),
                StateEntry::new(TIMESTAMP, reading.timestamp),
            ]))
        }
        SafetyMonitorOperation::Action => {
            resolved.require_connected(&request.client)?;
            let action = request.params.get_or_empty("Action");
            if !action.eq_ignore_ascii_case("RawValue") {
                return Err(ApiError::UnsupportedOperation);
            }
            refresh_for_client(monitor).await;
            Ok(Reply::value(monitor.raw_value().await))
        }
    }
}

async fn refresh_for_client(monitor: &SafetyMonitor) {
    match with_timeout(ACTION_TIMEOUT, monitor.refresh()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(id = %monitor.id(), "RawValue refresh failed: {}", e),
        Err(e) => debug!(id = %monitor.id(), "RawValue refresh failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(
            SafetyMonitorOperation::parse(&Method::GET, "issafe"),
            Some(SafetyMonitorOperation::IsSafe)
        );
        assert_eq!(
            SafetyMonitorOperation::parse(&Method::PUT, "action"),
            Some(SafetyMonitorOperation::Action)
        );
        assert_eq!(
            SafetyMonitorOperation::parse(&Method::GET, "name"),
            Some(SafetyMonitorOperation::Common(CommonOperation::Name))
        );
        assert_eq!(SafetyMonitorOperation::parse(&Method::PUT, "issafe"), None);
        assert_eq!(SafetyMonitorOperation::parse(&Method::GET, "temperature"), None);
    }
}
