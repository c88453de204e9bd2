/*!
 * Error types for the Alpaca protocol server.
 *
 * Every variant is answered with a plain-text body, never an envelope.
 */
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use barn_devices::DeviceError;

/// Message returned for operations the device does not understand
pub const UNSUPPORTED_OPERATION: &str = "The device did not understand which operation was being requested or insufficient information was given to complete the operation.";

/// Errors that abort a protocol request
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed or missing request parameter
    #[error("{0}")]
    Validation(String),

    /// The device number addresses no exposed device
    #[error("Device not found")]
    DeviceNotFound,

    /// The client has not connected to the device
    #[error("Not connected")]
    NotConnected,

    /// The operation or action name is not recognized
    #[error("{}", UNSUPPORTED_OPERATION)]
    UnsupportedOperation,

    /// A sensor name that is not in the sensor table
    #[error("Sensor '{0}' not found")]
    SensorNotFound(String),

    /// A driver failed while serving the request
    #[error("{0}")]
    Driver(String),

    /// Server-side failure unrelated to the request
    #[error("{0}")]
    Internal(String),
}

/// Result type for protocol handlers
pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a driver error
    pub fn driver<S: Into<String>>(msg: S) -> Self {
        Self::Driver(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// HTTP status the error is answered with
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Driver(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<DeviceError> for ApiError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::IndexOutOfRange(_) | DeviceError::NotFound(_) => Self::DeviceNotFound,
            DeviceError::LockPoisoned(_) => Self::Internal(err.to_string()),
            other => Self::Driver(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}
