//! Membership Module Tests
//!
//! Validates the registry's set semantics, queue lifecycle and wire format.

#[cfg(test)]
mod tests {
    use crate::membership::registry::{MembershipRegistry, QueueError};
    use crate::peer::types::{Peer, PeerKind};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn peer(port: u16) -> Peer {
        Peer::new("127.0.0.1", port).unwrap()
    }

    fn streamed(port: u16) -> Peer {
        peer(port).with_kind(PeerKind::Streamed)
    }

    // ============================================================
    // SET SEMANTICS TESTS
    // ============================================================

    #[test]
    fn test_append_is_idempotent() {
        let registry = MembershipRegistry::new();

        assert!(registry.append(peer(5000)));
        assert!(!registry.append(peer(5000)));
        assert!(!registry.append(streamed(5000)));

        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_count_after_distinct_appends() {
        let registry = MembershipRegistry::new();

        for port in 5000..5010 {
            registry.append(peer(port));
        }

        assert_eq!(registry.count(), 10);
    }

    #[test]
    fn test_delete_then_contains_is_false() {
        let registry = MembershipRegistry::new();
        registry.append(peer(5000));
        registry.append(peer(5001));

        assert!(registry.delete(&peer(5000)));
        assert!(!registry.contains(&peer(5000)));
        assert!(registry.contains(&peer(5001)));
        assert!(!registry.delete(&peer(5000)), "Second delete is a no-op");
    }

    #[test]
    fn test_lookup_uses_value_identity() {
        let registry = MembershipRegistry::new();
        registry.append(streamed(5000));

        // A freshly built value with another kind still finds the entry
        assert!(registry.contains(&peer(5000)));
        assert_eq!(registry.get(&peer(5000)).unwrap().kind(), PeerKind::Streamed);
    }

    #[test]
    fn test_snapshot_preserves_registration_order() {
        let registry = MembershipRegistry::new();
        registry.append(peer(5003));
        registry.append(peer(5001));
        registry.append(peer(5002));

        let ports: Vec<u16> = registry.snapshot().iter().map(|p| p.port()).collect();
        assert_eq!(ports, vec![5003, 5001, 5002]);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let registry = MembershipRegistry::new();
        registry.append(peer(5000));

        let snapshot = registry.snapshot();
        registry.append(peer(5001));
        registry.clear();

        assert_eq!(snapshot.len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_appends_have_no_duplicates() {
        let registry = Arc::new(MembershipRegistry::new());
        let mut handles = vec![];

        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(std::thread::spawn(move || {
                for port in 6000..6050 {
                    registry.append(peer(port));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.count(), 50);
    }

    // ============================================================
    // DELIVERY QUEUE TESTS
    // ============================================================

    #[test]
    fn test_direct_peer_has_no_queue() {
        let registry = MembershipRegistry::new();
        registry.append(peer(5000));

        assert!(registry.queue_for(&peer(5000)).is_none());
        assert!(registry.take_stream(&peer(5000)).is_none());
    }

    #[test]
    fn test_queue_for_unknown_peer_is_none() {
        let registry = MembershipRegistry::new();
        assert!(registry.queue_for(&streamed(5000)).is_none());
    }

    #[tokio::test]
    async fn test_streamed_peer_queue_delivers_in_order() {
        let registry = MembershipRegistry::new();
        registry.append(streamed(5000));

        let queue = registry.queue_for(&peer(5000)).expect("streamed peer has a queue");
        queue.push(b"one".to_vec()).unwrap();
        queue.push(b"two".to_vec()).unwrap();

        let mut stream = registry.take_stream(&peer(5000)).unwrap();
        assert_eq!(stream.recv().await.unwrap(), b"one".to_vec());
        assert_eq!(stream.recv().await.unwrap(), b"two".to_vec());
    }

    #[test]
    fn test_stream_can_only_be_taken_once() {
        let registry = MembershipRegistry::new();
        registry.append(streamed(5000));

        assert!(registry.take_stream(&peer(5000)).is_some());
        assert!(registry.take_stream(&peer(5000)).is_none());
    }

    #[test]
    fn test_full_queue_rejects_push() {
        let registry = MembershipRegistry::with_queue_capacity(1);
        registry.append(streamed(5000));

        let queue = registry.queue_for(&peer(5000)).unwrap();
        queue.push(b"first".to_vec()).unwrap();

        assert_eq!(queue.push(b"second".to_vec()), Err(QueueError::Full));
    }

    #[tokio::test]
    async fn test_delete_closes_queue() {
        let registry = MembershipRegistry::new();
        registry.append(streamed(5000));

        let queue = registry.queue_for(&peer(5000)).unwrap();
        let mut stream = registry.take_stream(&peer(5000)).unwrap();

        registry.delete(&peer(5000));
        drop(queue);

        assert!(stream.recv().await.is_none(), "Stream ends once the peer is removed");
    }

    #[test]
    fn test_delete_generation_ignores_newer_registration() {
        let registry = MembershipRegistry::new();
        registry.append(streamed(5000));
        let old = registry.take_stream(&peer(5000)).unwrap();

        registry.delete(&peer(5000));
        registry.append(streamed(5000));

        assert!(!registry.delete_generation(&old.peer, old.generation));
        assert!(registry.contains(&peer(5000)));
    }

    // ============================================================
    // WIRE FORMAT TESTS
    // ============================================================

    #[test]
    fn test_wire_format_round_trip() {
        let registry = MembershipRegistry::new();
        registry.append(peer(5000));
        registry.append(streamed(5001));
        registry.append(Peer::new("10.0.0.3", 7000).unwrap());

        let bytes = registry.to_wire_format().unwrap();
        let decoded = MembershipRegistry::from_wire_format(&bytes).unwrap();

        let expected: HashSet<Peer> = registry.snapshot().into_iter().collect();
        let actual: HashSet<Peer> = decoded.iter().cloned().collect();
        assert_eq!(expected, actual);

        let kinds: Vec<PeerKind> = decoded.iter().map(|p| p.kind()).collect();
        assert!(kinds.contains(&PeerKind::Streamed));
    }

    #[test]
    fn test_wire_format_accepts_plain_records() {
        let bytes = br#"[{"address":"10.0.0.1","port":5000},{"address":"10.0.0.2","port":5001}]"#;
        let decoded = MembershipRegistry::from_wire_format(bytes).unwrap();

        assert_eq!(decoded.len(), 2);
        assert!(decoded.iter().all(|p| p.kind() == PeerKind::Direct));
    }

    #[test]
    fn test_empty_registry_encodes_empty_list() {
        let registry = MembershipRegistry::new();
        assert_eq!(registry.to_wire_format().unwrap(), b"[]".to_vec());
    }

    #[test]
    fn test_malformed_wire_format_fails() {
        assert!(MembershipRegistry::from_wire_format(b"{not json").is_err());
        assert!(MembershipRegistry::from_wire_format(br#"[{"address":1}]"#).is_err());
    }

    #[test]
    fn test_wire_format_rejects_invalid_peers() {
        let invalid: [&[u8]; 4] = [
            br#"[{"address":"","port":5000}]"#,
            br#"[{"address":"127.0.0.1","port":0}]"#,
            br#"[{"address":"a/b?c","port":80}]"#,
            br#"[{"address":"127.0.0.1","port":5000},{"address":"","port":0}]"#,
        ];

        for bytes in invalid {
            assert!(
                MembershipRegistry::from_wire_format(bytes).is_err(),
                "Accepted {}",
                String::from_utf8_lossy(bytes)
            );
        }
    }

    #[test]
    fn test_wire_format_keeps_kind_of_valid_peers() {
        let decoded = MembershipRegistry::from_wire_format(
            br#"[{"address":"127.0.0.1","port":5000,"kind":"streamed"}]"#,
        )
        .unwrap();

        assert_eq!(decoded, vec![streamed(5000)]);
        assert!(decoded[0].is_streamed());
    }
}
