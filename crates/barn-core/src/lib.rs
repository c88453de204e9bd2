/*!
 * Alpaca Barn Core
 *
 * This crate provides the shared foundation for the Alpaca Barn gateway,
 * including configuration loading, error types, logging setup and the
 * identifiers used to address drivers.
 */

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod types;
pub mod utils;

/// Alpaca Barn core crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
