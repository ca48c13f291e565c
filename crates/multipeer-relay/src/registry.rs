use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info};

use multipeer_config::DuplicatePolicy;
use multipeer_core::{LifecycleTransition, Metadata, Peer, PeerId, PeerState};

struct Entry {
    peer: Peer,
    state: PeerState,
}

/// Both registries live behind one lock so that `connected ⊆ known`
/// holds at every point another thread can observe.
#[derive(Default)]
struct Tables {
    known: HashMap<PeerId, Entry>,
    connected: HashMap<PeerId, Peer>,
}

/// Outcome of a discovery event.
#[derive(Debug, Clone, PartialEq)]
pub enum Discovery {
    /// First sighting; the peer was inserted.
    Added(Peer),
    /// Already known; metadata replaced under [`DuplicatePolicy::Refresh`].
    Refreshed(Peer),
    /// Already known; left untouched under [`DuplicatePolicy::Ignore`].
    Ignored,
}

/// Known and connected peers, keyed by identifier.
///
/// Every mutation that changes a peer's lifecycle state is pushed to
/// lifecycle subscribers after the lock is released. Lookups that miss
/// change nothing and return `None`.
pub struct PeerRegistry {
    tables: Mutex<Tables>,
    lifecycle: broadcast::Sender<LifecycleTransition>,
}

impl PeerRegistry {
    pub fn new(capacity: usize) -> Self {
        let (lifecycle, _) = broadcast::channel(capacity.max(1));
        Self {
            tables: Mutex::new(Tables::default()),
            lifecycle,
        }
    }

    /// Subscribe to lifecycle transitions of every peer.
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleTransition> {
        self.lifecycle.subscribe()
    }

    pub fn discover(&self, id: &str, info: Metadata, policy: DuplicatePolicy) -> Discovery {
        let outcome = {
            let mut guard = self.tables.lock();
            let tables = &mut *guard;
            match tables.known.get_mut(id) {
                Some(entry) => match policy {
                    DuplicatePolicy::Ignore => Discovery::Ignored,
                    DuplicatePolicy::Refresh => {
                        entry.peer.info = info;
                        let peer = entry.peer.clone();
                        if let Some(connected) = tables.connected.get_mut(id) {
                            *connected = peer.clone();
                        }
                        Discovery::Refreshed(peer)
                    }
                },
                None => {
                    let peer = Peer::new(id, info);
                    tables.known.insert(
                        id.to_string(),
                        Entry {
                            peer: peer.clone(),
                            state: PeerState::Found,
                        },
                    );
                    Discovery::Added(peer)
                }
            }
        };

        match &outcome {
            Discovery::Added(peer) => {
                info!(peer_id = %peer.id, "registered peer");
                self.signal(id, PeerState::Found);
            }
            Discovery::Refreshed(peer) => debug!(peer_id = %peer.id, "refreshed peer metadata"),
            Discovery::Ignored => debug!(peer_id = id, "duplicate discovery ignored"),
        }
        outcome
    }

    /// Remove a peer from both registries. Returns the removed peer.
    ///
    /// The peer is pruned before the `Lost` transition is published, so an
    /// observer of that transition never finds it in either snapshot.
    pub fn lose(&self, id: &str) -> Option<Peer> {
        let removed = {
            let mut tables = self.tables.lock();
            let entry = tables.known.remove(id)?;
            tables.connected.remove(id);
            entry.peer
        };
        info!(peer_id = id, "removed peer");
        self.signal(id, PeerState::Lost);
        Some(removed)
    }

    pub fn mark_connecting(&self, id: &str) -> Option<Peer> {
        let peer = {
            let mut tables = self.tables.lock();
            let entry = tables.known.get_mut(id)?;
            entry.state = PeerState::Connecting;
            entry.peer.clone()
        };
        self.signal(id, PeerState::Connecting);
        Some(peer)
    }

    pub fn mark_connected(&self, id: &str) -> Option<Peer> {
        let peer = {
            let mut tables = self.tables.lock();
            let entry = tables.known.get_mut(id)?;
            entry.state = PeerState::Connected;
            let peer = entry.peer.clone();
            tables.connected.insert(id.to_string(), peer.clone());
            peer
        };
        info!(peer_id = id, "peer connected");
        self.signal(id, PeerState::Connected);
        Some(peer)
    }

    pub fn mark_disconnected(&self, id: &str) -> Option<Peer> {
        let peer = {
            let mut tables = self.tables.lock();
            let entry = tables.known.get_mut(id)?;
            entry.state = PeerState::Disconnected;
            let peer = entry.peer.clone();
            tables.connected.remove(id);
            peer
        };
        info!(peer_id = id, "peer disconnected");
        self.signal(id, PeerState::Disconnected);
        Some(peer)
    }

    pub fn get(&self, id: &str) -> Option<Peer> {
        self.tables.lock().known.get(id).map(|e| e.peer.clone())
    }

    pub fn state(&self, id: &str) -> Option<PeerState> {
        self.tables.lock().known.get(id).map(|e| e.state)
    }

    pub fn is_connected(&self, id: &str) -> bool {
        self.tables.lock().connected.contains_key(id)
    }

    /// Snapshot of every known peer.
    pub fn known(&self) -> HashMap<PeerId, Peer> {
        self.tables
            .lock()
            .known
            .iter()
            .map(|(id, e)| (id.clone(), e.peer.clone()))
            .collect()
    }

    /// Snapshot of connected peers.
    pub fn connected(&self) -> HashMap<PeerId, Peer> {
        self.tables.lock().connected.clone()
    }

    pub fn len(&self) -> usize {
        self.tables.lock().known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.lock().known.is_empty()
    }

    pub fn connected_len(&self) -> usize {
        self.tables.lock().connected.len()
    }

    fn signal(&self, id: &str, state: PeerState) {
        // No lifecycle subscribers is not an error.
        let _ = self.lifecycle.send(LifecycleTransition {
            peer_id: id.to_string(),
            state,
        });
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new(1024)
    }
}
