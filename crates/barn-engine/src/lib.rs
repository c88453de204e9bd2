/*!
 * Alpaca Barn Engine
 *
 * This crate keeps driver state fresh: it runs the periodic refresh loop
 * over every driver registered in a [`barn_devices::Barn`].
 */

#![warn(missing_docs)]

pub mod error;
pub mod scheduler;

pub use error::{Error, Result};
pub use scheduler::RefreshScheduler;

/// Alpaca Barn engine crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
