//! The seam between the relay and the platform's multipeer framework.
//!
//! A platform binding implements [`NativeTransport`]: it delivers named
//! events to subscribed handlers and carries out outbound commands. Discovery,
//! encryption and framing all live behind this trait.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use multipeer_core::{Metadata, MultipeerError, PeerId, Result};

/// Callback invoked with the JSON payload of a platform event.
pub type EventHandler = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

/// Handle for one registered event handler, returned by
/// [`NativeTransport::subscribe`] and handed back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

impl Subscription {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Inbound platform event kinds, in the order the relay subscribes to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformEvent {
    PeerFound,
    PeerLost,
    PeerConnecting,
    PeerConnected,
    PeerDisconnected,
    StreamOpened,
    InviteReceived,
    DataReceived,
}

impl PlatformEvent {
    pub const ALL: [PlatformEvent; 8] = [
        PlatformEvent::PeerFound,
        PlatformEvent::PeerLost,
        PlatformEvent::PeerConnecting,
        PlatformEvent::PeerConnected,
        PlatformEvent::PeerDisconnected,
        PlatformEvent::StreamOpened,
        PlatformEvent::InviteReceived,
        PlatformEvent::DataReceived,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            PlatformEvent::PeerFound => "PeerFound",
            PlatformEvent::PeerLost => "PeerLost",
            PlatformEvent::PeerConnecting => "PeerConnecting",
            PlatformEvent::PeerConnected => "PeerConnected",
            PlatformEvent::PeerDisconnected => "PeerDisconnected",
            PlatformEvent::StreamOpened => "StreamOpened",
            PlatformEvent::InviteReceived => "InviteReceived",
            PlatformEvent::DataReceived => "DataReceived",
        }
    }

    /// Full platform event name, e.g. `RCTMultipeerConnectivityPeerFound`.
    pub fn name(self, prefix: &str) -> String {
        format!("{prefix}{}", self.suffix())
    }

    /// Reverse lookup of a full platform event name.
    pub fn from_name(prefix: &str, name: &str) -> Option<Self> {
        let suffix = name.strip_prefix(prefix)?;
        Self::ALL.into_iter().find(|kind| kind.suffix() == suffix)
    }
}

impl std::fmt::Display for PlatformEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Native side of a command's completion. Dropping it unanswered resolves
/// the paired [`Completion`] with [`MultipeerError::CompletionDropped`].
#[derive(Debug)]
pub struct Completer {
    tx: oneshot::Sender<Result<()>>,
}

impl Completer {
    pub fn complete(self, result: Result<()>) {
        // The caller may have dropped its Completion; that is fine.
        let _ = self.tx.send(result);
    }

    pub fn succeed(self) {
        self.complete(Ok(()));
    }

    pub fn fail(self, reason: impl Into<String>) {
        self.complete(Err(MultipeerError::Transport(reason.into())));
    }
}

/// Caller side of a command's completion.
///
/// The command has already been dispatched when this is returned; awaiting
/// it is optional. Resolves to `Ok(())` when the native layer reports
/// success, or to the error it reported.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<Result<()>>,
}

impl Completion {
    pub fn channel() -> (Completer, Completion) {
        let (tx, rx) = oneshot::channel();
        (Completer { tx }, Completion { rx })
    }

    /// A completion that is already resolved.
    pub fn resolved(result: Result<()>) -> Self {
        let (completer, completion) = Self::channel();
        completer.complete(result);
        completion
    }

    pub async fn wait(self) -> Result<()> {
        self.await
    }

    /// Non-blocking check. `None` while the native layer has not answered.
    pub fn try_result(&mut self) -> Option<Result<()>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(MultipeerError::CompletionDropped)),
        }
    }
}

impl Future for Completion {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(MultipeerError::CompletionDropped)))
    }
}

/// A platform multipeer framework, as seen by the relay.
///
/// Handlers may be invoked from any thread; the relay synchronizes its own
/// state. Outbound commands must not block: they hand the work to the
/// platform and answer the [`Completer`] whenever the platform reports back.
pub trait NativeTransport: Send + Sync {
    /// Register a handler for the named platform event.
    fn subscribe(&self, event: &str, handler: EventHandler) -> Subscription;

    /// Remove a handler previously registered with [`subscribe`](Self::subscribe).
    fn unsubscribe(&self, subscription: Subscription);

    fn send(&self, peer_ids: Vec<PeerId>, data: serde_json::Value, done: Completer);

    fn broadcast(&self, data: serde_json::Value, done: Completer);

    /// Dispatch a connection request. Completion reports dispatch, not acceptance.
    fn invite(&self, peer_id: PeerId, done: Completer);

    fn rsvp(&self, invite_id: String, accept: bool, done: Completer);

    fn advertise(&self, channel: &str, info: Metadata);

    fn browse(&self, channel: &str);

    fn end_advertise(&self);

    fn end_browse(&self);
}
