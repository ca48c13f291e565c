use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier for a remote peer, unique within a session.
pub type PeerId = String;

/// Discovery metadata supplied by the platform (key-value pairs).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A remote participant discovered on the network.
///
/// This is a plain value: it carries no observers and no reference back to
/// the registry that tracks it. Lifecycle changes are published by the
/// registry (see [`LifecycleTransition`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    /// Metadata attached by the remote side when it advertised itself.
    #[serde(default)]
    pub info: Metadata,
    /// When this peer was first seen by the local registry.
    pub discovered_at: DateTime<Utc>,
}

impl Peer {
    pub fn new(id: impl Into<PeerId>, info: Metadata) -> Self {
        Self {
            id: id.into(),
            info,
            discovered_at: Utc::now(),
        }
    }

    /// Look up a string-valued metadata entry.
    pub fn info_str(&self, key: &str) -> Option<&str> {
        self.info.get(key).and_then(|v| v.as_str())
    }
}

/// Where a peer sits in its lifecycle.
///
/// found → connecting → connected → disconnected → lost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerState {
    Found,
    Connecting,
    Connected,
    Disconnected,
    Lost,
}

impl std::fmt::Display for PeerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PeerState::Found => "found",
            PeerState::Connecting => "connecting",
            PeerState::Connected => "connected",
            PeerState::Disconnected => "disconnected",
            PeerState::Lost => "lost",
        };
        f.write_str(s)
    }
}

/// A state transition for one peer, pushed to lifecycle subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleTransition {
    pub peer_id: PeerId,
    pub state: PeerState,
}

/// A message recipient, addressed either by a peer value or by its raw id.
#[derive(Debug, Clone, PartialEq)]
pub enum Recipient {
    Peer(Peer),
    Id(PeerId),
}

impl Recipient {
    pub fn id(&self) -> &str {
        match self {
            Recipient::Peer(peer) => &peer.id,
            Recipient::Id(id) => id,
        }
    }

    /// Normalize to the identifier the native layer expects.
    pub fn into_id(self) -> PeerId {
        match self {
            Recipient::Peer(peer) => peer.id,
            Recipient::Id(id) => id,
        }
    }
}

impl From<Peer> for Recipient {
    fn from(peer: Peer) -> Self {
        Recipient::Peer(peer)
    }
}

impl From<&Peer> for Recipient {
    fn from(peer: &Peer) -> Self {
        Recipient::Peer(peer.clone())
    }
}

impl From<PeerId> for Recipient {
    fn from(id: PeerId) -> Self {
        Recipient::Id(id)
    }
}

impl From<&str> for Recipient {
    fn from(id: &str) -> Self {
        Recipient::Id(id.to_string())
    }
}
