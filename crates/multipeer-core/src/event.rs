use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

use crate::types::{Peer, PeerId};

/// Application-facing events published by the relay.
///
/// The serde tag carries the stable application event name
/// (`peerFound`, `peerLost`, `invite`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum PeerEvent {
    // ── Discovery ──────────────────────────────────────────────
    PeerFound {
        peer: Peer,
    },
    /// Carries only the identifier; the peer is being torn down.
    PeerLost {
        #[serde(rename = "peerId")]
        peer_id: PeerId,
    },

    // ── Connection lifecycle (raw platform payload) ────────────
    PeerConnecting {
        payload: serde_json::Value,
    },
    PeerConnected {
        payload: serde_json::Value,
    },
    PeerDisconnected {
        payload: serde_json::Value,
    },
    StreamOpened {
        payload: serde_json::Value,
    },

    // ── Sender-resolved events ─────────────────────────────────
    Invite {
        sender: Peer,
        payload: serde_json::Value,
    },
    Data {
        sender: Peer,
        payload: serde_json::Value,
    },
}

impl PeerEvent {
    /// The application event name, matching the serde tag.
    pub fn name(&self) -> &'static str {
        match self {
            PeerEvent::PeerFound { .. } => "peerFound",
            PeerEvent::PeerLost { .. } => "peerLost",
            PeerEvent::PeerConnecting { .. } => "peerConnecting",
            PeerEvent::PeerConnected { .. } => "peerConnected",
            PeerEvent::PeerDisconnected { .. } => "peerDisconnected",
            PeerEvent::StreamOpened { .. } => "streamOpened",
            PeerEvent::Invite { .. } => "invite",
            PeerEvent::Data { .. } => "data",
        }
    }
}

/// A broadcast-based event bus for application consumers.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<PeerEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, event: PeerEvent) {
        trace!(event = event.name(), "publishing peer event");
        // Ignore send errors (no subscribers).
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
