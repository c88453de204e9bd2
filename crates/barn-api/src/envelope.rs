/*!
 * The Alpaca response envelope.
 *
 * Every successful protocol response is a JSON object carrying the echoed
 * client transaction id, a fresh server transaction id, an error number and
 * message, and for property reads a `Value`.
 */
use std::sync::atomic::{AtomicU32, Ordering};

use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// ErrorNumber for a property or method the device does not implement
pub const NOT_IMPLEMENTED: i32 = 0x400;

/// One `{Name, Value}` entry of a device state listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateEntry {
    /// Property name
    #[serde(rename = "Name")]
    pub name: String,
    /// Property value
    #[serde(rename = "Value")]
    pub value: StateValue,
}

impl StateEntry {
    /// Create an entry
    pub fn new(name: impl Into<String>, value: impl Into<StateValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Value of a device state entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StateValue {
    /// Boolean property
    Bool(bool),
    /// Numeric property
    Float(f64),
    /// Timestamp
    Time(DateTime<Utc>),
}

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for StateValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<DateTime<Utc>> for StateValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Time(value)
    }
}

/// One entry of `/management/v1/configureddevices`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfiguredDevice {
    /// Display name
    pub device_name: String,
    /// Alpaca device type
    pub device_type: String,
    /// Device number within its type
    pub device_number: u32,
    /// Stable identifier (the driver id)
    #[serde(rename = "UniqueID")]
    pub unique_id: String,
}

/// Body of `/management/v1/description`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerDescription {
    /// Server name
    pub server_name: String,
    /// Manufacturer
    pub manufacturer: String,
    /// `Version:` followed by the crate version
    pub manufacturer_version: String,
    /// Free-form location
    pub location: String,
}

/// The `Value` member of an envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i32),
    /// Floating point
    Float(f64),
    /// String
    Text(String),
    /// List of strings
    TextList(Vec<String>),
    /// List of unsigned integers
    IntList(Vec<u32>),
    /// Device state listing
    States(Vec<StateEntry>),
    /// Configured devices
    Devices(Vec<ConfiguredDevice>),
    /// Server description
    Description(ServerDescription),
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<StateEntry>> for Value {
    fn from(value: Vec<StateEntry>) -> Self {
        Self::States(value)
    }
}

/// Outcome of an operation, before it is wrapped in an envelope
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// A property value
    Value(Value),
    /// Success without a value (PUT operations)
    Empty,
    /// The operation exists but is not implemented for this device
    NotImplemented(String),
}

impl Reply {
    /// A property value
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }
}

/// The JSON body of every successful protocol response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    /// Returned value, absent for PUT and not-implemented responses
    #[serde(rename = "Value", skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Echo of the request's ClientTransactionID
    #[serde(rename = "ClientTransactionID")]
    pub client_transaction_id: u32,
    /// Server-wide response counter
    #[serde(rename = "ServerTransactionID")]
    pub server_transaction_id: u32,
    /// Zero on success
    #[serde(rename = "ErrorNumber")]
    pub error_number: i32,
    /// Empty on success
    #[serde(rename = "ErrorMessage")]
    pub error_message: String,
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// The process-wide ServerTransactionID source
#[derive(Debug, Default)]
pub struct TransactionCounter(AtomicU32);

impl TransactionCounter {
    /// Create a counter; the first id handed out is 1
    pub fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Take the next id
    pub fn next(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }

    /// The last id handed out
    pub fn current(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    /// Wrap a reply in an envelope, consuming one id
    pub fn envelope(&self, client_transaction_id: u32, reply: Reply) -> Envelope {
        let (value, error_number, error_message) = match reply {
            Reply::Value(value) => (Some(value), 0, String::new()),
            Reply::Empty => (None, 0, String::new()),
            Reply::NotImplemented(message) => (None, NOT_IMPLEMENTED, message),
        };

        Envelope {
            value,
            client_transaction_id,
            server_transaction_id: self.next(),
            error_number,
            error_message,
        }
    }
}
