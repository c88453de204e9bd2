/*!
 * Alpaca Barn API
 *
 * This crate implements the ASCOM Alpaca REST protocol on top of the
 * drivers in [`barn_devices`]: request validation, per-client connection
 * sessions, the response envelope and the management and device routes.
 */

#![warn(missing_docs)]

pub mod common;
pub mod envelope;
pub mod error;
pub mod management;
pub mod observingconditions;
pub mod request;
pub mod router;
pub mod safetymonitor;
pub mod session;
pub mod state;

pub use envelope::{Envelope, Reply, TransactionCounter, Value};
pub use error::{ApiError, Result};
pub use request::{AlpacaRequest, DeviceRequest, Params};
pub use router::{create_router, serve};
pub use session::{ClientIdentity, DeviceSession, ProtocolDevice, SessionTable};
pub use state::AppState;

/// Alpaca Barn API crate version, reported as the driver version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
