//! # multipeer-relay
//!
//! Event-driven adapter over a native multipeer framework.
//!
//! The platform binding implements [`NativeTransport`]. A
//! [`MultipeerConnection`] subscribes to its named events, keeps the known and
//! connected peer registries, and republishes everything as
//! [`multipeer_core::PeerEvent`]s. Discovery, encryption and transport stay
//! on the native side.
//!
pub mod loopback;
pub mod native;
pub mod registry;
pub mod relay;

pub use loopback::{DeliveryMode, LoopbackTransport, NativeCall};
pub use native::{Completer, Completion, EventHandler, NativeTransport, PlatformEvent, Subscription};
pub use registry::{Discovery, PeerRegistry};
pub use relay::{DiagnosticSink, DropReason, Dropped, MultipeerConnection};
