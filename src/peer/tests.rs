//! Peer Module Tests
//!
//! Covers identity construction, validation and the value-equality rules the registry relies on.

#[cfg(test)]
mod tests {
    use crate::peer::types::{Peer, PeerError, PeerKind, WILDCARD_ADDRESS};
    use std::collections::HashSet;

    // ============================================================
    // CONSTRUCTION TESTS
    // ============================================================

    #[test]
    fn test_peer_creation() {
        let peer = Peer::new("127.0.0.1", 5000).unwrap();

        assert_eq!(peer.address(), "127.0.0.1");
        assert_eq!(peer.port(), 5000);
        assert_eq!(peer.kind(), PeerKind::Direct);
    }

    #[test]
    fn test_peer_rejects_empty_address() {
        assert!(matches!(Peer::new("", 5000), Err(PeerError::BadAddress(_))));
        assert!(matches!(Peer::new("   ", 5000), Err(PeerError::BadAddress(_))));
    }

    #[test]
    fn test_peer_rejects_malformed_address() {
        assert!(matches!(
            Peer::new("bad host", 5000),
            Err(PeerError::BadAddress(_))
        ));
        assert!(matches!(
            Peer::new("host/path", 80),
            Err(PeerError::BadAddress(_))
        ));
    }

    #[test]
    fn test_peer_rejects_port_zero() {
        assert!(matches!(Peer::new("localhost", 0), Err(PeerError::BadPort(_))));
    }

    #[test]
    fn test_peer_parse() {
        let peer = Peer::parse("10.0.0.7:6001").unwrap();
        assert_eq!(peer.address(), "10.0.0.7");
        assert_eq!(peer.port(), 6001);

        let parsed: Peer = "localhost:7000".parse().unwrap();
        assert_eq!(parsed, Peer::new("localhost", 7000).unwrap());
    }

    #[test]
    fn test_peer_parse_rejects_bad_input() {
        assert!(matches!(Peer::parse("no-port"), Err(PeerError::BadAddress(_))));
        assert!(matches!(Peer::parse("host:99999"), Err(PeerError::BadPort(_))));
        assert!(matches!(Peer::parse("host:abc"), Err(PeerError::BadPort(_))));
        assert!(matches!(Peer::parse(":5000"), Err(PeerError::BadAddress(_))));
    }

    // ============================================================
    // SELF DISCOVERY TESTS
    // ============================================================

    #[test]
    fn test_resolve_self_routable_uses_wildcard() {
        let me = Peer::resolve_self(5000, true).unwrap();

        assert_eq!(me.address(), WILDCARD_ADDRESS);
        assert_eq!(me.port(), 5000);
    }

    #[test]
    fn test_resolve_self_local_is_not_loopback_ip() {
        let me = Peer::resolve_self(5000, false).unwrap();

        assert_eq!(me.port(), 5000);
        assert_ne!(me.address(), "127.0.0.1");
        assert_ne!(me.address(), WILDCARD_ADDRESS);
    }

    // ============================================================
    // IDENTITY TESTS
    // ============================================================

    #[test]
    fn test_peer_equality_ignores_kind() {
        let direct = Peer::new("127.0.0.1", 5000).unwrap();
        let streamed = Peer::new("127.0.0.1", 5000)
            .unwrap()
            .with_kind(PeerKind::Streamed);

        assert_eq!(direct, streamed);
        assert!(streamed.is_streamed());
    }

    #[test]
    fn test_peer_inequality() {
        let a = Peer::new("127.0.0.1", 5000).unwrap();
        let b = Peer::new("127.0.0.1", 5001).unwrap();
        let c = Peer::new("127.0.0.2", 5000).unwrap();

        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_peer_hash_follows_identity() {
        let mut set = HashSet::new();
        set.insert(Peer::new("node-a", 5000).unwrap());
        set.insert(
            Peer::new("node-a", 5000)
                .unwrap()
                .with_kind(PeerKind::Streamed),
        );
        set.insert(Peer::new("node-b", 5000).unwrap());

        assert_eq!(set.len(), 2, "Same address and port should hash identically");
    }

    #[test]
    fn test_peer_display_and_hostname() {
        let peer = Peer::new("192.168.1.10", 8080).unwrap();

        assert_eq!(peer.to_string(), "192.168.1.10:8080");
        assert_eq!(peer.hostname(), "http://192.168.1.10:8080");
        assert_eq!(peer.key(), "192.168.1.10:8080");
    }

    // ============================================================
    // SERIALIZATION TESTS
    // ============================================================

    #[test]
    fn test_peer_json_without_kind_defaults_to_direct() {
        let peer: Peer = serde_json::from_str(r#"{"address":"10.0.0.1","port":5000}"#).unwrap();

        assert_eq!(peer.kind(), PeerKind::Direct);
        assert_eq!(peer, Peer::new("10.0.0.1", 5000).unwrap());
    }

    #[test]
    fn test_peer_kind_parse() {
        assert_eq!("streamed".parse::<PeerKind>().unwrap(), PeerKind::Streamed);
        assert_eq!("Direct".parse::<PeerKind>().unwrap(), PeerKind::Direct);
        assert!("browser".parse::<PeerKind>().is_err());
    }
}
