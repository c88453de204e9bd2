/*!
 * The `observingconditions` device API.
 *
 * Sensor reads consult the sensor table first: a sensor this gateway does
 * not measure answers with a NotImplemented envelope instead of a value.
 */
use std::iter;

use axum::extract::{Path, State};
use axum::http::Method;
use tracing::{error, info};

use barn_core::utils::with_timeout;
use barn_devices::sensor::TIMESTAMP;
use barn_devices::{Driver, ObservingConditions, Sensor, SensorAvailability};

use crate::common::{operation_name, CategoryProfile, CommonOperation, ACTION_TIMEOUT};
use crate::envelope::{Envelope, Reply, StateEntry};
use crate::error::{ApiError, Result};
use crate::request::{AlpacaRequest, DeviceRequest};
use crate::state::{AppState, Resolved};

/// Static metadata of weather stations
pub const PROFILE: CategoryProfile = CategoryProfile {
    driver_info: "Alpaca Barn observing conditions",
    supported_actions: &["Refresh"],
    interface_version: 2,
};

/// Operations of the observing conditions interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservingConditionsOperation {
    /// Shared device operation
    Common(CommonOperation),
    /// GET averageperiod
    AveragePeriod,
    /// PUT averageperiod
    SetAveragePeriod,
    /// GET of one sensor property
    Sensor(Sensor),
    /// GET sensordescription
    SensorDescription,
    /// GET timesincelastupdate
    TimeSinceLastUpdate,
    /// GET devicestate
    DeviceState,
    /// PUT action
    Action,
    /// PUT refresh
    Refresh,
}

impl ObservingConditionsOperation {
    /// Match a method and lowercase operation name
    pub fn parse(method: &Method, name: &str) -> Option<Self> {
        if let Some(common) = CommonOperation::parse(method, name) {
            return Some(Self::Common(common));
        }
        match (method, name) {
            (&Method::GET, "averageperiod") => Some(Self::AveragePeriod),
            (&Method::GET, "sensordescription") => Some(Self::SensorDescription),
            (&Method::GET, "timesincelastupdate") => Some(Self::TimeSinceLastUpdate),
            (&Method::GET, "devicestate") => Some(Self::DeviceState),
            (&Method::GET, name) => Sensor::from_name(name)
                .filter(Sensor::is_measurement)
                .map(Self::Sensor),
            (&Method::PUT, "averageperiod") => Some(Self::SetAveragePeriod),
            (&Method::PUT, "action") => Some(Self::Action),
            (&Method::PUT, "refresh") => Some(Self::Refresh),
            _ => None,
        }
    }
}

/// Handle `/api/v1/observingconditions/{device_id}/{operation}`
pub async fn handle(
    State(state): State<AppState>,
    Path((device_id, operation)): Path<(String, String)>,
    request: AlpacaRequest,
) -> Result<Envelope> {
    let method = request.method.clone();
    let request = DeviceRequest::validate(&device_id, request)?;
    let resolved = state.station(request.device_number)?;
    let operation = ObservingConditionsOperation::parse(&method, &operation_name(&operation))
        .ok_or(ApiError::UnsupportedOperation)?;

    let reply = dispatch(operation, &resolved, &request).await?;
    Ok(state.envelope(request.client_transaction_id, reply))
}

async fn dispatch(
    operation: ObservingConditionsOperation,
    resolved: &Resolved<ObservingConditions>,
    request: &DeviceRequest,
) -> Result<Reply> {
    use ObservingConditionsOperation as Op;

    if let Op::Common(common) = operation {
        return common.handle(&PROFILE, resolved, request);
    }
    resolved.require_connected(&request.client)?;

    let station = &resolved.driver;
    let client = &request.client;

    match operation {
        Op::Common(_) => Err(ApiError::UnsupportedOperation),
        Op::AveragePeriod => {
            let period = match resolved.device.average_period(client) {
                Some(period) => period,
                None => station.average_period().await,
            };
            Ok(Reply::value(period))
        }
        Op::SetAveragePeriod => {
            let period = parse_average_period(&request.params.get_or_empty("AveragePeriod"))?;
            if !resolved.device.set_average_period(client, period) {
                return Err(ApiError::internal("Failed to set average period"));
            }
            info!(
                id = %station.id(),
                client = %client,
                period,
                "Set client-specific average period"
            );
            Ok(Reply::Empty)
        }
        Op::Sensor(sensor) => {
            if !sensor.is_enabled() {
                return Ok(Reply::NotImplemented(format!(
                    "Sensor {} is not supported by this device",
                    sensor.name()
                )));
            }
            Ok(Reply::value(station.value(sensor).await))
        }
        Op::SensorDescription => {
            let name = request.params.get_or_empty("SensorName");
            if name.is_empty() {
                return Err(ApiError::validation("SensorName parameter is required"));
            }
            match Sensor::availability(&name) {
                SensorAvailability::Enabled(sensor) => Ok(Reply::value(sensor.description())),
                SensorAvailability::Disabled(_) => Ok(unsupported_sensor(&name)),
                SensorAvailability::Unknown => Err(ApiError::SensorNotFound(name)),
            }
        }
        Op::TimeSinceLastUpdate => {
            let name = request.params.get_or_empty("SensorName");
            if !name.is_empty() {
                match Sensor::availability(&name) {
                    SensorAvailability::Enabled(_) => {}
                    SensorAvailability::Disabled(_) => return Ok(unsupported_sensor(&name)),
                    SensorAvailability::Unknown => return Err(ApiError::SensorNotFound(name)),
                }
            }
            Ok(Reply::value(station.time_since_last_update().await))
        }
        Op::DeviceState => {
            let condition = station.condition().await;
            let last_refresh = station.last_refresh().await;
            let states = Sensor::enabled_measurements()
                .map(|sensor| StateEntry::new(sensor.name(), condition.value(sensor)))
                .chain(iter::once(StateEntry::new(TIMESTAMP, last_refresh)))
                .collect::<Vec<_>>();
            Ok(Reply::value(states))
        }
        Op::Action => {
            let action = request.params.get_or_empty("Action");
            if !action.eq_ignore_ascii_case("Refresh") {
                return Err(ApiError::UnsupportedOperation);
            }
            refresh_for_client(station).await?;
            Ok(Reply::Empty)
        }
        Op::Refresh => {
            refresh_for_client(station).await?;
            Ok(Reply::Empty)
        }
    }
}

fn unsupported_sensor(name: &str) -> Reply {
    Reply::NotImplemented(format!("Sensor '{}' is not supported by this device", name))
}

fn parse_average_period(value: &str) -> Result<f64> {
    if value.is_empty() {
        return Err(ApiError::validation("AveragePeriod parameter is required"));
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|period| period.is_finite() && *period >= 0.0)
        .ok_or_else(|| ApiError::validation("Invalid AveragePeriod value"))
}

async fn refresh_for_client(station: &ObservingConditions) -> Result<()> {
    let outcome = match with_timeout(ACTION_TIMEOUT, station.refresh()).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    outcome.map_err(|e| {
        error!(id = %station.id(), name = station.name(), "Failed to refresh: {}", e);
        ApiError::driver("Failed to refresh weather data")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sensor_properties() {
        assert_eq!(
            ObservingConditionsOperation::parse(&Method::GET, "temperature"),
            Some(ObservingConditionsOperation::Sensor(Sensor::Temperature))
        );
        assert_eq!(
            ObservingConditionsOperation::parse(&Method::GET, "starfwhm"),
            Some(ObservingConditionsOperation::Sensor(Sensor::StarFwhm))
        );
        assert_eq!(
            ObservingConditionsOperation::parse(&Method::GET, "averageperiod"),
            Some(ObservingConditionsOperation::AveragePeriod)
        );
        assert_eq!(
            ObservingConditionsOperation::parse(&Method::PUT, "averageperiod"),
            Some(ObservingConditionsOperation::SetAveragePeriod)
        );
        assert_eq!(ObservingConditionsOperation::parse(&Method::PUT, "temperature"), None);
        assert_eq!(ObservingConditionsOperation::parse(&Method::GET, "issafe"), None);
    }

    #[test]
    fn test_parse_average_period() {
        assert_eq!(parse_average_period("0.5").unwrap(), 0.5);
        assert_eq!(parse_average_period("0").unwrap(), 0.0);
        assert_eq!(
            parse_average_period("").unwrap_err().to_string(),
            "AveragePeriod parameter is required"
        );
        assert_eq!(
            parse_average_period("soon").unwrap_err().to_string(),
            "Invalid AveragePeriod value"
        );
        assert_eq!(
            parse_average_period("-1").unwrap_err().to_string(),
            "Invalid AveragePeriod value"
        );
    }
}
