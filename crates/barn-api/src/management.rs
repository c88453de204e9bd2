/*!
 * The Alpaca management API.
 *
 * Management requests are never rejected: a missing or malformed
 * ClientTransactionID is echoed as 0.
 */
use axum::extract::{RawQuery, State};

use barn_devices::{DeviceCategory, Driver, DriverSet};

use crate::envelope::{ConfiguredDevice, Envelope, Reply, ServerDescription, Value};
use crate::request::Params;
use crate::state::AppState;

/// Alpaca API versions served
pub const API_VERSIONS: [u32; 1] = [1];

fn transaction_id(query: Option<String>) -> u32 {
    let pairs = query
        .and_then(|query| serde_urlencoded::from_str(&query).ok())
        .unwrap_or_default();
    Params::from_pairs(pairs).transaction_id_or_zero()
}

/// `GET /`
pub async fn root() -> &'static str {
    "Alpaca Barn server"
}

/// `GET /management/apiversions`
pub async fn api_versions(State(state): State<AppState>, RawQuery(query): RawQuery) -> Envelope {
    let reply = Reply::Value(Value::IntList(API_VERSIONS.to_vec()));
    state.envelope(transaction_id(query), reply)
}

/// `GET /management/v1/description`
pub async fn description(State(state): State<AppState>, RawQuery(query): RawQuery) -> Envelope {
    let general = state.general();
    let description = ServerDescription {
        server_name: general.server_name.clone(),
        manufacturer: general.manufacturer.clone(),
        manufacturer_version: format!("Version:{}", crate::VERSION),
        location: general.location.clone(),
    };
    state.envelope(transaction_id(query), Reply::Value(Value::Description(description)))
}

/// `GET /management/v1/configureddevices`
pub async fn configured_devices(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Envelope {
    let barn = state.barn();
    let mut devices = configured(&state, barn.monitors());
    devices.extend(configured(&state, barn.weather()));
    state.envelope(transaction_id(query), Reply::Value(Value::Devices(devices)))
}

fn configured<D: Driver + 'static>(state: &AppState, drivers: &DriverSet<D>) -> Vec<ConfiguredDevice> {
    let category: DeviceCategory = drivers.category();
    state
        .sessions()
        .devices(category)
        .into_iter()
        .filter_map(|device| {
            let driver = drivers.get(device.id()).ok()?;
            Some(ConfiguredDevice {
                device_name: driver.name().to_string(),
                device_type: category.device_type().to_string(),
                device_number: device.device_number(),
                unique_id: device.id().to_string(),
            })
        })
        .collect()
}
