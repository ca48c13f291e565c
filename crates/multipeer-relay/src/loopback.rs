//! In-memory [`NativeTransport`].
//!
//! Handlers are stored per event name and invoked synchronously by
//! [`LoopbackTransport::emit`]. Outbound commands are recorded as
//! [`NativeCall`]s and answered according to the [`DeliveryMode`]. Useful for
//! tests and for hosts that feed platform events in by hand.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use multipeer_core::{Metadata, MultipeerError, PeerId};

use crate::native::{Completer, EventHandler, NativeTransport, Subscription};

/// An outbound command as it reached the native layer.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeCall {
    Send {
        peer_ids: Vec<PeerId>,
        data: serde_json::Value,
    },
    Broadcast {
        data: serde_json::Value,
    },
    Invite {
        peer_id: PeerId,
    },
    Rsvp {
        invite_id: String,
        accept: bool,
    },
    Advertise {
        channel: String,
        info: Metadata,
    },
    Browse {
        channel: String,
    },
    EndAdvertise,
    EndBrowse,
}

/// How command completions are answered.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DeliveryMode {
    /// Answer every completion with success.
    #[default]
    Succeed,
    /// Answer every completion with a transport error.
    Fail(String),
    /// Keep completers until [`LoopbackTransport::take_held`] is called.
    Hold,
}

#[derive(Default)]
struct State {
    next_subscription: u64,
    handlers: HashMap<String, Vec<(Subscription, EventHandler)>>,
    calls: Vec<NativeCall>,
    mode: DeliveryMode,
    held: Vec<Completer>,
}

#[derive(Default)]
pub struct LoopbackTransport {
    state: Mutex<State>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: DeliveryMode) -> Self {
        let transport = Self::default();
        transport.set_mode(mode);
        transport
    }

    pub fn set_mode(&self, mode: DeliveryMode) {
        self.state.lock().mode = mode;
    }

    /// Deliver a platform event to every handler subscribed to `name`.
    /// Returns how many handlers ran.
    pub fn emit(&self, name: &str, payload: serde_json::Value) -> usize {
        // Handlers run outside the lock so they may call back into the transport.
        let handlers: Vec<EventHandler> = self
            .state
            .lock()
            .handlers
            .get(name)
            .map(|hs| hs.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();
        debug!(event = name, handlers = handlers.len(), "loopback emit");
        for handler in &handlers {
            handler(payload.clone());
        }
        handlers.len()
    }

    pub fn handler_count(&self, name: &str) -> usize {
        self.state.lock().handlers.get(name).map_or(0, Vec::len)
    }

    /// Total live subscriptions across all event names.
    pub fn subscription_count(&self) -> usize {
        self.state.lock().handlers.values().map(Vec::len).sum()
    }

    pub fn calls(&self) -> Vec<NativeCall> {
        self.state.lock().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<NativeCall> {
        std::mem::take(&mut self.state.lock().calls)
    }

    /// Completers kept under [`DeliveryMode::Hold`], oldest first.
    pub fn take_held(&self) -> Vec<Completer> {
        std::mem::take(&mut self.state.lock().held)
    }

    fn record(&self, call: NativeCall, done: Option<Completer>) {
        let mut state = self.state.lock();
        state.calls.push(call);
        let Some(done) = done else {
            return;
        };
        match state.mode.clone() {
            DeliveryMode::Succeed => done.succeed(),
            DeliveryMode::Fail(reason) => done.complete(Err(MultipeerError::Transport(reason))),
            DeliveryMode::Hold => state.held.push(done),
        }
    }
}

impl NativeTransport for LoopbackTransport {
    fn subscribe(&self, event: &str, handler: EventHandler) -> Subscription {
        let mut state = self.state.lock();
        state.next_subscription += 1;
        let subscription = Subscription::new(state.next_subscription);
        state
            .handlers
            .entry(event.to_string())
            .or_default()
            .push((subscription, handler));
        subscription
    }

    fn unsubscribe(&self, subscription: Subscription) {
        let mut state = self.state.lock();
        for handlers in state.handlers.values_mut() {
            handlers.retain(|(s, _)| *s != subscription);
        }
        state.handlers.retain(|_, hs| !hs.is_empty());
    }

    fn send(&self, peer_ids: Vec<PeerId>, data: serde_json::Value, done: Completer) {
        self.record(NativeCall::Send { peer_ids, data }, Some(done));
    }

    fn broadcast(&self, data: serde_json::Value, done: Completer) {
        self.record(NativeCall::Broadcast { data }, Some(done));
    }

    fn invite(&self, peer_id: PeerId, done: Completer) {
        self.record(NativeCall::Invite { peer_id }, Some(done));
    }

    fn rsvp(&self, invite_id: String, accept: bool, done: Completer) {
        self.record(NativeCall::Rsvp { invite_id, accept }, Some(done));
    }

    fn advertise(&self, channel: &str, info: Metadata) {
        self.record(
            NativeCall::Advertise {
                channel: channel.to_string(),
                info,
            },
            None,
        );
    }

    fn browse(&self, channel: &str) {
        self.record(
            NativeCall::Browse {
                channel: channel.to_string(),
            },
            None,
        );
    }

    fn end_advertise(&self) {
        self.record(NativeCall::EndAdvertise, None);
    }

    fn end_browse(&self) {
        self.record(NativeCall::EndBrowse, None);
    }
}
