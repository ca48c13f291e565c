#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use tokio::sync::broadcast;

    use multipeer_config::{DuplicatePolicy, RelayConfig};
    use multipeer_core::{Metadata, MultipeerError, PeerEvent, PeerState, Recipient};
    use multipeer_relay::*;

    const PREFIX: &str = "RCTMultipeerConnectivity";

    fn setup() -> (Arc<LoopbackTransport>, MultipeerConnection) {
        setup_with(RelayConfig::default())
    }

    fn setup_with(config: RelayConfig) -> (Arc<LoopbackTransport>, MultipeerConnection) {
        let transport = Arc::new(LoopbackTransport::new());
        let connection = MultipeerConnection::new(transport.clone(), &config);
        (transport, connection)
    }

    fn emit(transport: &LoopbackTransport, kind: PlatformEvent, payload: Value) {
        transport.emit(&kind.name(PREFIX), payload);
    }

    fn found(transport: &LoopbackTransport, id: &str, name: &str) {
        emit(
            transport,
            PlatformEvent::PeerFound,
            json!({"peer": {"id": id, "info": {"name": name}}}),
        );
    }

    fn peer_only(id: &str) -> Value {
        json!({"peer": {"id": id}})
    }

    fn drain(rx: &mut broadcast::Receiver<PeerEvent>) -> Vec<PeerEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    fn assert_subset(connection: &MultipeerConnection) {
        let known = connection.all_peers();
        for id in connection.connected_peers().keys() {
            assert!(known.contains_key(id), "{id} connected but not known");
        }
    }

    // ── Construction / disposal ────────────────────────────────

    #[test]
    fn test_subscribes_one_handler_per_event() {
        let (transport, _connection) = setup();
        assert_eq!(transport.subscription_count(), PlatformEvent::ALL.len());
        for kind in PlatformEvent::ALL {
            assert_eq!(transport.handler_count(&kind.name(PREFIX)), 1);
        }
    }

    #[test]
    fn test_default_prefix_matches_native_event_names() {
        let (transport, connection) = setup();
        assert_eq!(connection.event_prefix(), "RCTMultipeerConnectivity");
        assert_eq!(transport.handler_count("RCTMultipeerConnectivityPeerFound"), 1);

        let ran = transport.emit("RCTMultipeerConnectivityPeerFound", peer_only("A"));
        assert_eq!(ran, 1);
        assert_eq!(connection.peer_count(), 1);
    }

    #[test]
    fn test_custom_prefix() {
        let config = RelayConfig {
            event_prefix: "MultipeerConnectivity".into(),
            ..RelayConfig::default()
        };
        let (transport, connection) = setup_with(config);
        assert_eq!(connection.event_prefix(), "MultipeerConnectivity");
        assert_eq!(transport.handler_count("MultipeerConnectivityPeerFound"), 1);
        assert_eq!(transport.handler_count("RCTMultipeerConnectivityPeerFound"), 0);
    }

    #[test]
    fn test_dispose_removes_subscriptions() {
        let (transport, connection) = setup();
        found(&transport, "A", "x");
        connection.dispose();
        assert!(connection.is_disposed());
        assert_eq!(transport.subscription_count(), 0);

        // Nothing is delivered any more; snapshots stay readable.
        assert_eq!(transport.emit(&PlatformEvent::PeerFound.name(PREFIX), peer_only("B")), 0);
        assert_eq!(connection.peer_count(), 1);

        connection.dispose();
        assert_eq!(transport.subscription_count(), 0);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let (transport, connection) = setup();
        drop(connection);
        assert_eq!(transport.subscription_count(), 0);
    }

    // ── Discovery / loss ───────────────────────────────────────

    #[test]
    fn test_fresh_discovery_emits_peer_found_once() {
        let (transport, connection) = setup();
        let mut rx = connection.subscribe();
        found(&transport, "A", "x");

        assert!(connection.all_peers().contains_key("A"));
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            PeerEvent::PeerFound { peer } => {
                assert_eq!(peer.id, "A");
                assert_eq!(peer.info_str("name"), Some("x"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(connection.peer_state("A"), Some(PeerState::Found));
    }

    #[test]
    fn test_discovery_without_info() {
        let (transport, connection) = setup();
        emit(&transport, PlatformEvent::PeerFound, peer_only("A"));
        assert!(connection.peer("A").unwrap().info.is_empty());
    }

    #[test]
    fn test_duplicate_discovery_refresh() {
        let (transport, connection) = setup();
        found(&transport, "A", "old");
        emit(&transport, PlatformEvent::PeerConnected, peer_only("A"));
        let mut rx = connection.subscribe();

        found(&transport, "A", "new");
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], PeerEvent::PeerFound { peer } if peer.info_str("name") == Some("new")));
        assert_eq!(connection.peer_count(), 1);
        assert!(connection.is_connected("A"));
        assert_eq!(connection.peer_state("A"), Some(PeerState::Connected));
    }

    #[test]
    fn test_duplicate_discovery_ignore() {
        let config = RelayConfig {
            duplicate_discovery: DuplicatePolicy::Ignore,
            ..RelayConfig::default()
        };
        let (transport, connection) = setup_with(config);
        found(&transport, "A", "old");
        let mut rx = connection.subscribe();

        found(&transport, "A", "new");
        assert!(drain(&mut rx).is_empty());
        assert_eq!(connection.peer("A").unwrap().info_str("name"), Some("old"));
    }

    #[test]
    fn test_loss_of_known_peer_clears_both_registries() {
        let (transport, connection) = setup();
        found(&transport, "A", "x");
        emit(&transport, PlatformEvent::PeerConnected, peer_only("A"));
        assert!(connection.is_connected("A"));
        let mut rx = connection.subscribe();

        emit(&transport, PlatformEvent::PeerLost, peer_only("A"));
        assert!(connection.all_peers().is_empty());
        assert!(connection.connected_peers().is_empty());
        assert_eq!(drain(&mut rx), vec![PeerEvent::PeerLost { peer_id: "A".into() }]);
    }

    #[test]
    fn test_loss_of_unknown_peer_is_silent() {
        let (transport, connection) = setup();
        found(&transport, "A", "x");
        let mut rx = connection.subscribe();
        let mut lifecycle = connection.subscribe_lifecycle();

        emit(&transport, PlatformEvent::PeerLost, peer_only("ghost"));
        assert_eq!(connection.peer_count(), 1);
        assert!(drain(&mut rx).is_empty());
        assert!(lifecycle.try_recv().is_err());
    }

    // ── Connection lifecycle ───────────────────────────────────

    #[test]
    fn test_full_lifecycle_scenario() {
        let (transport, connection) = setup();
        let mut rx = connection.subscribe();

        found(&transport, "A", "x");
        assert_eq!(connection.all_peers().len(), 1);
        assert!(connection.connected_peers().is_empty());

        emit(&transport, PlatformEvent::PeerConnecting, peer_only("A"));
        assert!(connection.connected_peers().is_empty());
        assert_subset(&connection);

        emit(&transport, PlatformEvent::PeerConnected, peer_only("A"));
        assert_eq!(connection.connected_count(), 1);
        assert_subset(&connection);

        emit(&transport, PlatformEvent::PeerDisconnected, peer_only("A"));
        assert!(connection.connected_peers().is_empty());
        assert!(connection.all_peers().contains_key("A"));
        assert_eq!(connection.peer_state("A"), Some(PeerState::Disconnected));

        emit(&transport, PlatformEvent::PeerLost, peer_only("A"));
        assert!(connection.all_peers().is_empty());
        assert!(connection.connected_peers().is_empty());

        let names: Vec<&str> = drain(&mut rx).iter().map(PeerEvent::name).collect();
        assert_eq!(
            names,
            vec!["peerFound", "peerConnecting", "peerConnected", "peerDisconnected", "peerLost"]
        );
    }

    #[test]
    fn test_connection_events_carry_raw_payload() {
        let (transport, connection) = setup();
        found(&transport, "A", "x");
        let mut rx = connection.subscribe();
        let payload = json!({"peer": {"id": "A"}, "extra": 1});

        emit(&transport, PlatformEvent::PeerConnecting, payload.clone());
        assert_eq!(drain(&mut rx), vec![PeerEvent::PeerConnecting { payload }]);
    }

    #[test]
    fn test_lifecycle_transitions_are_published() {
        let (transport, connection) = setup();
        let mut lifecycle = connection.subscribe_lifecycle();

        found(&transport, "A", "x");
        emit(&transport, PlatformEvent::PeerConnecting, peer_only("A"));
        emit(&transport, PlatformEvent::PeerConnected, peer_only("A"));
        emit(&transport, PlatformEvent::PeerDisconnected, peer_only("A"));
        emit(&transport, PlatformEvent::PeerLost, peer_only("A"));

        let states: Vec<PeerState> = std::iter::from_fn(|| lifecycle.try_recv().ok())
            .inspect(|t| assert_eq!(t.peer_id, "A"))
            .map(|t| t.state)
            .collect();
        assert_eq!(
            states,
            vec![
                PeerState::Found,
                PeerState::Connecting,
                PeerState::Connected,
                PeerState::Disconnected,
                PeerState::Lost,
            ]
        );
    }

    #[test]
    fn test_connection_events_for_unknown_peer_are_dropped() {
        let (transport, connection) = setup();
        let mut rx = connection.subscribe();

        for kind in [
            PlatformEvent::PeerConnecting,
            PlatformEvent::PeerConnected,
            PlatformEvent::PeerDisconnected,
        ] {
            emit(&transport, kind, peer_only("ghost"));
        }
        assert!(connection.all_peers().is_empty());
        assert!(connection.connected_peers().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    // ── Invite / data / stream ─────────────────────────────────

    #[test]
    fn test_invite_attaches_sender() {
        let (transport, connection) = setup();
        found(&transport, "B", "bee");
        let mut rx = connection.subscribe();
        let payload = json!({"peer": {"id": "B"}, "invite": {"id": "inv-1"}});

        emit(&transport, PlatformEvent::InviteReceived, payload.clone());
        match drain(&mut rx).as_slice() {
            [PeerEvent::Invite { sender, payload: p }] => {
                assert_eq!(sender.id, "B");
                assert_eq!(sender.info_str("name"), Some("bee"));
                assert_eq!(p, &payload);
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn test_invite_from_unknown_peer_is_dropped() {
        let (transport, connection) = setup();
        let mut rx = connection.subscribe();
        emit(&transport, PlatformEvent::InviteReceived, json!({"peer": {"id": "B"}, "invite": {"id": "inv-1"}}));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_data_resolves_sender_or_drops() {
        let (transport, connection) = setup();
        found(&transport, "A", "x");
        let mut rx = connection.subscribe();

        emit(&transport, PlatformEvent::DataReceived, json!({"peer": {"id": "A"}, "data": "hi"}));
        emit(&transport, PlatformEvent::DataReceived, json!({"peer": {"id": "Z"}, "data": "lost"}));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], PeerEvent::Data { sender, payload } if sender.id == "A" && payload["data"] == "hi"));
    }

    #[test]
    fn test_stream_opened_passes_through_unresolved() {
        let (transport, connection) = setup();
        let mut rx = connection.subscribe();
        let payload = json!({"peer": {"id": "never-seen"}, "stream": {"name": "s1"}});

        emit(&transport, PlatformEvent::StreamOpened, payload.clone());
        assert_eq!(drain(&mut rx), vec![PeerEvent::StreamOpened { payload }]);
    }

    // ── Diagnostics ────────────────────────────────────────────

    #[test]
    fn test_diagnostics_observe_drops() {
        let (transport, connection) = setup();
        let seen: Arc<Mutex<Vec<Dropped>>> = Arc::default();
        let sink = seen.clone();
        connection.set_diagnostics(Arc::new(move |d: &Dropped| sink.lock().push(d.clone())));

        emit(&transport, PlatformEvent::PeerConnected, peer_only("ghost"));
        emit(&transport, PlatformEvent::DataReceived, json!({"data": "no peer"}));

        let seen = seen.lock().clone();
        assert_eq!(
            seen,
            vec![
                Dropped {
                    event: PlatformEvent::PeerConnected,
                    peer_id: Some("ghost".into()),
                    reason: DropReason::UnknownPeer,
                },
                Dropped {
                    event: PlatformEvent::DataReceived,
                    peer_id: None,
                    reason: DropReason::MissingPeerId,
                },
            ]
        );
    }

    #[test]
    fn test_clear_diagnostics() {
        let (transport, connection) = setup();
        let count = Arc::new(Mutex::new(0usize));
        let sink = count.clone();
        connection.set_diagnostics(Arc::new(move |_: &Dropped| *sink.lock() += 1));
        emit(&transport, PlatformEvent::PeerLost, peer_only("ghost"));
        connection.clear_diagnostics();
        emit(&transport, PlatformEvent::PeerLost, peer_only("ghost"));
        assert_eq!(*count.lock(), 1);
    }

    // ── Queries ────────────────────────────────────────────────

    #[test]
    fn test_snapshots_do_not_alias_registry() {
        let (transport, connection) = setup();
        found(&transport, "A", "x");
        let mut snapshot = connection.all_peers();
        snapshot.remove("A");
        assert!(connection.all_peers().contains_key("A"));
    }

    // ── Commands ───────────────────────────────────────────────

    #[tokio::test]
    async fn test_send_normalizes_recipients() {
        let (transport, connection) = setup();
        found(&transport, "idA", "x");
        let peer_a = connection.peer("idA").unwrap();

        let recipients: Vec<Recipient> = vec![(&peer_a).into(), "idB".into()];
        connection.send(recipients, json!({"msg": "hello"})).await.unwrap();

        assert_eq!(
            transport.calls(),
            vec![NativeCall::Send {
                peer_ids: vec!["idA".into(), "idB".into()],
                data: json!({"msg": "hello"}),
            }]
        );
    }

    #[tokio::test]
    async fn test_send_with_plain_ids() {
        let (transport, connection) = setup();
        connection.send(["x", "y"], json!(1)).wait().await.unwrap();
        assert!(matches!(&transport.calls()[0], NativeCall::Send { peer_ids, .. } if peer_ids == &["x", "y"]));
    }

    #[tokio::test]
    async fn test_commands_do_not_touch_registry() {
        let (transport, connection) = setup();
        connection.invite("A").await.unwrap();
        connection.rsvp("inv-1", true).await.unwrap();
        connection.broadcast(json!("all")).await.unwrap();
        assert!(connection.all_peers().is_empty());
        assert_eq!(
            transport.take_calls(),
            vec![
                NativeCall::Invite { peer_id: "A".into() },
                NativeCall::Rsvp { invite_id: "inv-1".into(), accept: true },
                NativeCall::Broadcast { data: json!("all") },
            ]
        );
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces_through_completion() {
        let transport = Arc::new(LoopbackTransport::with_mode(DeliveryMode::Fail("unreachable".into())));
        let connection = MultipeerConnection::new(transport.clone(), &RelayConfig::default());

        let err = connection.send(["A"], json!(null)).await.unwrap_err();
        assert!(err.is_transport());
        assert!(err.to_string().contains("unreachable"));
        assert!(connection.invite("A").await.is_err());
    }

    #[tokio::test]
    async fn test_completion_may_arrive_later() {
        let transport = Arc::new(LoopbackTransport::with_mode(DeliveryMode::Hold));
        let connection = MultipeerConnection::new(transport.clone(), &RelayConfig::default());

        let mut completion = connection.invite("A");
        assert!(completion.try_result().is_none());

        let held = transport.take_held();
        assert_eq!(held.len(), 1);
        for done in held {
            done.succeed();
        }
        assert!(completion.await.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_completer_reports_error() {
        let transport = Arc::new(LoopbackTransport::with_mode(DeliveryMode::Hold));
        let connection = MultipeerConnection::new(transport.clone(), &RelayConfig::default());
        let completion = connection.broadcast(json!({}));
        drop(transport.take_held());
        assert!(matches!(completion.await, Err(MultipeerError::CompletionDropped)));
    }

    #[tokio::test]
    async fn test_unawaited_command_is_still_dispatched() {
        let (transport, connection) = setup();
        drop(connection.invite("A"));
        assert_eq!(transport.calls(), vec![NativeCall::Invite { peer_id: "A".into() }]);
    }

    #[test]
    fn test_advertise_and_browse_are_fire_and_forget() {
        let (transport, connection) = setup();
        let mut info = Metadata::new();
        info.insert("name".into(), json!("me"));

        connection.advertise("chat", info.clone());
        connection.browse("chat");
        connection.end_advertise();
        connection.end_browse();

        assert_eq!(
            transport.calls(),
            vec![
                NativeCall::Advertise { channel: "chat".into(), info },
                NativeCall::Browse { channel: "chat".into() },
                NativeCall::EndAdvertise,
                NativeCall::EndBrowse,
            ]
        );
    }

    #[tokio::test]
    async fn test_commands_after_dispose() {
        let (transport, connection) = setup();
        connection.dispose();

        assert!(matches!(connection.send(["A"], json!(1)).await, Err(MultipeerError::Disposed)));
        assert!(matches!(connection.invite("A").await, Err(MultipeerError::Disposed)));
        connection.browse("chat");
        assert!(transport.calls().is_empty());
    }

    // ── Concurrency ────────────────────────────────────────────

    #[test]
    fn test_concurrent_delivery_preserves_subset_invariant() {
        let (transport, connection) = setup();
        let threads: Vec<_> = (0..4)
            .map(|t| {
                let transport = transport.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let id = format!("p{t}-{i}");
                        let name = |k: PlatformEvent| k.name(PREFIX);
                        transport.emit(&name(PlatformEvent::PeerFound), json!({"peer": {"id": id}}));
                        transport.emit(&name(PlatformEvent::PeerConnected), json!({"peer": {"id": id}}));
                        if i % 2 == 0 {
                            transport.emit(&name(PlatformEvent::PeerLost), json!({"peer": {"id": id}}));
                        }
                    }
                })
            })
            .collect();
        for handle in threads {
            handle.join().unwrap();
        }
        assert_subset(&connection);
        assert_eq!(connection.peer_count(), 100);
        assert_eq!(connection.connected_count(), 100);
    }
}
