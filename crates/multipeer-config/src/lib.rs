//! # multipeer-config
//!
//! Configuration for the multipeer relay. Reads from `multipeer.toml` and
//! environment variables, with environment taking precedence.

pub mod loader;
pub mod logging;
pub mod schema;

pub use loader::ConfigLoader;
pub use logging::init_logging;
pub use schema::{
    ConfigWarning, DuplicatePolicy, LoggingConfig, MultipeerConfig, RelayConfig, WarningSeverity,
};
