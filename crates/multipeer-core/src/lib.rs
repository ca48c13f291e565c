//! # multipeer-core
//!
//! Shared vocabulary for the multipeer relay: the peer value object, lifecycle
//! states, application-facing events, and the unified error type.
//! Every other crate in the workspace builds on these definitions.

pub mod error;
pub mod event;
pub mod types;

pub use error::{MultipeerError, Result};
pub use event::{EventBus, PeerEvent};
pub use types::*;
