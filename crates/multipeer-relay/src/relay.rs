use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use multipeer_config::{DuplicatePolicy, RelayConfig};
use multipeer_core::{
    EventBus, LifecycleTransition, Metadata, MultipeerError, Peer, PeerEvent, PeerId, PeerState,
    Recipient,
};

use crate::native::{Completion, EventHandler, NativeTransport, PlatformEvent, Subscription};
use crate::registry::{Discovery, PeerRegistry};

/// Why an inbound event was dropped instead of being relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The event names a peer that is not in the known registry.
    UnknownPeer,
    /// The payload carries no `peer.id`.
    MissingPeerId,
}

/// An inbound event the relay did not surface to the application.
#[derive(Debug, Clone, PartialEq)]
pub struct Dropped {
    pub event: PlatformEvent,
    pub peer_id: Option<PeerId>,
    pub reason: DropReason,
}

/// Observer for dropped inbound events. Installing one does not change
/// what the relay publishes.
pub type DiagnosticSink = Arc<dyn Fn(&Dropped) + Send + Sync>;

/// State shared with the platform event handlers.
struct Inner {
    instance: Uuid,
    registry: PeerRegistry,
    bus: EventBus,
    duplicate_policy: DuplicatePolicy,
    diagnostics: RwLock<Option<DiagnosticSink>>,
    disposed: AtomicBool,
}

/// Event-driven view of a native multipeer session.
///
/// On construction it subscribes one handler per platform event name. Each
/// inbound event is resolved against the peer registry, applied, and
/// re-published as a [`PeerEvent`]. Outbound commands are handed straight to
/// the native layer; the registry only changes when the resulting inbound
/// events arrive.
///
/// Subscriptions are owned by this value and removed by [`dispose`](Self::dispose)
/// or on drop.
pub struct MultipeerConnection {
    inner: Arc<Inner>,
    transport: Arc<dyn NativeTransport>,
    prefix: String,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl MultipeerConnection {
    pub fn new(transport: Arc<dyn NativeTransport>, config: &RelayConfig) -> Self {
        let inner = Arc::new(Inner {
            instance: Uuid::new_v4(),
            registry: PeerRegistry::new(config.event_capacity),
            bus: EventBus::new(config.event_capacity.max(1)),
            duplicate_policy: config.duplicate_discovery,
            diagnostics: RwLock::new(None),
            disposed: AtomicBool::new(false),
        });

        let subscriptions = PlatformEvent::ALL
            .into_iter()
            .map(|kind| {
                let weak: Weak<Inner> = Arc::downgrade(&inner);
                let handler: EventHandler = Arc::new(move |payload: Value| {
                    if let Some(inner) = weak.upgrade() {
                        inner.handle(kind, payload);
                    }
                });
                transport.subscribe(&kind.name(&config.event_prefix), handler)
            })
            .collect::<Vec<_>>();

        info!(
            instance = %inner.instance,
            prefix = %config.event_prefix,
            handlers = subscriptions.len(),
            "multipeer connection created"
        );

        Self {
            inner,
            transport,
            prefix: config.event_prefix.clone(),
            subscriptions: Mutex::new(subscriptions),
        }
    }

    /// Install (or replace) the sink that observes dropped inbound events.
    pub fn set_diagnostics(&self, sink: DiagnosticSink) {
        *self.inner.diagnostics.write() = Some(sink);
    }

    pub fn clear_diagnostics(&self) {
        *self.inner.diagnostics.write() = None;
    }

    /// Subscribe to application events.
    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.inner.bus.subscribe()
    }

    /// Subscribe to per-peer lifecycle transitions.
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleTransition> {
        self.inner.registry.subscribe_lifecycle()
    }

    pub fn event_bus(&self) -> EventBus {
        self.inner.bus.clone()
    }

    pub fn event_prefix(&self) -> &str {
        &self.prefix
    }

    // ── Queries ────────────────────────────────────────────────

    /// Snapshot of every peer discovered and not yet lost.
    pub fn all_peers(&self) -> HashMap<PeerId, Peer> {
        self.inner.registry.known()
    }

    /// Snapshot of peers currently connected.
    pub fn connected_peers(&self) -> HashMap<PeerId, Peer> {
        self.inner.registry.connected()
    }

    pub fn peer(&self, id: &str) -> Option<Peer> {
        self.inner.registry.get(id)
    }

    pub fn peer_state(&self, id: &str) -> Option<PeerState> {
        self.inner.registry.state(id)
    }

    pub fn is_connected(&self, id: &str) -> bool {
        self.inner.registry.is_connected(id)
    }

    pub fn peer_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn connected_count(&self) -> usize {
        self.inner.registry.connected_len()
    }

    // ── Commands ───────────────────────────────────────────────

    /// Send `data` to the given peers. Recipients may be peers or raw ids;
    /// they are normalized to ids before reaching the native layer.
    pub fn send<I, R>(&self, recipients: I, data: Value) -> Completion
    where
        I: IntoIterator<Item = R>,
        R: Into<Recipient>,
    {
        if self.is_disposed() {
            return Completion::resolved(Err(MultipeerError::Disposed));
        }
        let peer_ids: Vec<PeerId> = recipients
            .into_iter()
            .map(|r| r.into().into_id())
            .collect();
        debug!(recipients = ?peer_ids, "sending data");
        let (done, completion) = Completion::channel();
        self.transport.send(peer_ids, data, done);
        completion
    }

    /// Send `data` to every connected peer.
    pub fn broadcast(&self, data: Value) -> Completion {
        if self.is_disposed() {
            return Completion::resolved(Err(MultipeerError::Disposed));
        }
        debug!(connected = self.connected_count(), "broadcasting data");
        let (done, completion) = Completion::channel();
        self.transport.broadcast(data, done);
        completion
    }

    /// Ask a peer to connect. Completion reports dispatch only; acceptance
    /// shows up later as `peerConnecting` / `peerConnected`.
    pub fn invite(&self, peer_id: impl Into<PeerId>) -> Completion {
        if self.is_disposed() {
            return Completion::resolved(Err(MultipeerError::Disposed));
        }
        let peer_id = peer_id.into();
        debug!(peer_id = %peer_id, "inviting peer");
        let (done, completion) = Completion::channel();
        self.transport.invite(peer_id, done);
        completion
    }

    /// Answer a received invite.
    pub fn rsvp(&self, invite_id: impl Into<String>, accept: bool) -> Completion {
        if self.is_disposed() {
            return Completion::resolved(Err(MultipeerError::Disposed));
        }
        let invite_id = invite_id.into();
        debug!(invite_id = %invite_id, accept, "answering invite");
        let (done, completion) = Completion::channel();
        self.transport.rsvp(invite_id, accept, done);
        completion
    }

    pub fn advertise(&self, channel: &str, info: Metadata) {
        if self.is_disposed() {
            warn!(channel, "advertise after dispose ignored");
            return;
        }
        info!(channel, "advertising");
        self.transport.advertise(channel, info);
    }

    pub fn end_advertise(&self) {
        if self.is_disposed() {
            return;
        }
        info!("advertising stopped");
        self.transport.end_advertise();
    }

    pub fn browse(&self, channel: &str) {
        if self.is_disposed() {
            warn!(channel, "browse after dispose ignored");
            return;
        }
        info!(channel, "browsing");
        self.transport.browse(channel);
    }

    pub fn end_browse(&self) {
        if self.is_disposed() {
            return;
        }
        info!("browsing stopped");
        self.transport.end_browse();
    }

    // ── Lifecycle ──────────────────────────────────────────────

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Remove every platform subscription. Later inbound events are not
    /// processed and later commands resolve to [`MultipeerError::Disposed`].
    /// Registry snapshots stay readable. Calling it again is a no-op.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        for subscription in &subscriptions {
            self.transport.unsubscribe(*subscription);
        }
        info!(
            instance = %self.inner.instance,
            removed = subscriptions.len(),
            "multipeer connection disposed"
        );
    }
}

impl Drop for MultipeerConnection {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Inner {
    fn handle(&self, kind: PlatformEvent, payload: Value) {
        if self.disposed.load(Ordering::Acquire) {
            debug!(event = %kind, "event after dispose ignored");
            return;
        }
        debug!(event = %kind, payload = %payload, "platform event");

        match kind {
            // Stream events are relayed without resolving a sender.
            PlatformEvent::StreamOpened => self.bus.publish(PeerEvent::StreamOpened { payload }),
            PlatformEvent::PeerFound => {
                let Some(peer_id) = self.require_peer_id(kind, &payload) else {
                    return;
                };
                let info = peer_info_of(&payload);
                match self.registry.discover(&peer_id, info, self.duplicate_policy) {
                    Discovery::Added(peer) | Discovery::Refreshed(peer) => {
                        self.bus.publish(PeerEvent::PeerFound { peer });
                    }
                    Discovery::Ignored => {}
                }
            }
            PlatformEvent::PeerLost => {
                let Some(peer_id) = self.require_peer_id(kind, &payload) else {
                    return;
                };
                match self.registry.lose(&peer_id) {
                    Some(_) => self.bus.publish(PeerEvent::PeerLost { peer_id }),
                    None => self.drop_event(kind, Some(peer_id), DropReason::UnknownPeer),
                }
            }
            PlatformEvent::PeerConnecting => {
                let Some(peer_id) = self.require_peer_id(kind, &payload) else {
                    return;
                };
                match self.registry.mark_connecting(&peer_id) {
                    Some(_) => self.bus.publish(PeerEvent::PeerConnecting { payload }),
                    None => self.drop_event(kind, Some(peer_id), DropReason::UnknownPeer),
                }
            }
            PlatformEvent::PeerConnected => {
                let Some(peer_id) = self.require_peer_id(kind, &payload) else {
                    return;
                };
                match self.registry.mark_connected(&peer_id) {
                    Some(_) => self.bus.publish(PeerEvent::PeerConnected { payload }),
                    None => self.drop_event(kind, Some(peer_id), DropReason::UnknownPeer),
                }
            }
            PlatformEvent::PeerDisconnected => {
                let Some(peer_id) = self.require_peer_id(kind, &payload) else {
                    return;
                };
                match self.registry.mark_disconnected(&peer_id) {
                    Some(_) => self.bus.publish(PeerEvent::PeerDisconnected { payload }),
                    None => self.drop_event(kind, Some(peer_id), DropReason::UnknownPeer),
                }
            }
            PlatformEvent::InviteReceived | PlatformEvent::DataReceived => {
                let Some(peer_id) = self.require_peer_id(kind, &payload) else {
                    return;
                };
                let Some(sender) = self.registry.get(&peer_id) else {
                    self.drop_event(kind, Some(peer_id), DropReason::UnknownPeer);
                    return;
                };
                let event = if kind == PlatformEvent::InviteReceived {
                    PeerEvent::Invite { sender, payload }
                } else {
                    PeerEvent::Data { sender, payload }
                };
                self.bus.publish(event);
            }
        }
    }

    fn require_peer_id(&self, kind: PlatformEvent, payload: &Value) -> Option<PeerId> {
        let peer_id = peer_id_of(payload);
        if peer_id.is_none() {
            self.drop_event(kind, None, DropReason::MissingPeerId);
        }
        peer_id
    }

    fn drop_event(&self, event: PlatformEvent, peer_id: Option<PeerId>, reason: DropReason) {
        warn!(event = %event, peer_id = ?peer_id, reason = ?reason, "dropping platform event");
        let sink = self.diagnostics.read().clone();
        if let Some(sink) = sink {
            sink(&Dropped {
                event,
                peer_id,
                reason,
            });
        }
    }
}

fn peer_id_of(payload: &Value) -> Option<PeerId> {
    payload
        .get("peer")?
        .get("id")?
        .as_str()
        .map(str::to_string)
}

fn peer_info_of(payload: &Value) -> Metadata {
    payload
        .get("peer")
        .and_then(|p| p.get("info"))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}
