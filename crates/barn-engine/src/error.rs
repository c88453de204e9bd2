/*!
 * Error types for the Alpaca Barn engine crate.
 */
use thiserror::Error;

/// Error type for engine operations
#[derive(Error, Debug)]
pub enum Error {
    /// Scheduler error
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Device error
    #[error("Device error: {0}")]
    Device(#[from] barn_devices::DeviceError),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new scheduler error
    pub fn scheduler<S: AsRef<str>>(msg: S) -> Self {
        Error::Scheduler(msg.as_ref().to_string())
    }
}
