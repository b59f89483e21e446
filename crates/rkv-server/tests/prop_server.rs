// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PROPERTY-BASED TESTS — rkv-server
//
// Invariants of the apply path that must hold for every input: version parsing
// either succeeds or fails with one of its three message shapes, applied
// entries never move the consistent index backwards, and arbitrary payloads
// never fail with anything but a defensive-invariant error.
//
// Run: cargo test --release -p rkv-server --test prop_server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use proptest::prelude::*;
use rkv_server::error::{MSG_INVALID_IDENTIFIER, MSG_NOT_DOTTED_TRI, MSG_PARSE_INT};
use rkv_server::request::PutRequest;
use rkv_server::{
    Backend, ConfState, ErrorKind, InternalRequest, LogEntry, Member, RaftCluster, Request,
    Server, Version,
};

fn server() -> Server {
    let backend = Backend::temporary().unwrap();
    let mut cluster = RaftCluster::new(1);
    cluster.set_backend(backend.clone());
    cluster
        .add_member(Member::new(1, "m1", vec!["http://127.0.0.1:2380".into()]), true)
        .unwrap();
    Server::new(1, cluster, backend).unwrap()
}

// ─────────────────────────────────────────────────────────────────
// VERSION PROPERTIES
// ─────────────────────────────────────────────────────────────────

proptest! {
    /// PROPERTY: every dotted triple of non-negative numbers parses and prints back
    #[test]
    fn prop_version_triple_round_trips(major in 0i64..1000, minor in 0i64..1000, patch in 0i64..1000) {
        let text = format!("{major}.{minor}.{patch}");
        let v = Version::parse(&text).unwrap();
        prop_assert_eq!(&v, &Version::new(major, minor, patch));
        prop_assert_eq!(v.to_string(), text);
    }

    /// PROPERTY: a parse failure always carries one of the known message fragments
    #[test]
    fn prop_version_errors_are_classified(input in ".{0,24}") {
        if let Err(err) = Version::parse(&input) {
            let msg = err.to_string();
            prop_assert!(
                msg.contains(MSG_NOT_DOTTED_TRI)
                    || msg.contains(MSG_PARSE_INT)
                    || msg.contains(MSG_INVALID_IDENTIFIER),
                "unclassified message: {}", msg
            );
        }
    }

    /// PROPERTY: ordering ignores build metadata
    #[test]
    fn prop_version_metadata_ignored(minor in 0i64..50, meta in "[0-9A-Za-z]{1,8}") {
        let plain = Version::parse(&format!("3.{minor}.0")).unwrap();
        let tagged = Version::parse(&format!("3.{minor}.0+{meta}")).unwrap();
        prop_assert_eq!(plain.cmp(&tagged), std::cmp::Ordering::Equal);
    }
}

// ─────────────────────────────────────────────────────────────────
// APPLY PROPERTIES
// ─────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// PROPERTY: random payloads only ever fail as defensive invariants
    #[test]
    fn prop_garbage_payload_only_fails_defensively(data in prop::collection::vec(any::<u8>(), 1..64)) {
        let mut s = server();
        if let Err(err) = s.apply(&[LogEntry::normal(1, 1, data)], &mut ConfState::default()) {
            prop_assert_eq!(err.kind(), ErrorKind::DefensiveInvariant);
        }
    }

    /// PROPERTY: the consistent index is the maximum applied index
    #[test]
    fn prop_consistent_index_is_monotonic(indices in prop::collection::vec(1u64..100, 1..12)) {
        let mut s = server();
        let mut max = 0;
        for (n, index) in indices.into_iter().enumerate() {
            let req = InternalRequest::new(
                n as u64,
                Request::Put(PutRequest {
                    key: format!("k{n}").into_bytes(),
                    value: vec![1],
                    ..Default::default()
                }),
            );
            s.apply(
                &[LogEntry::normal(1, index, req.encode().unwrap())],
                &mut ConfState::default(),
            )
            .unwrap();
            max = max.max(index);
            prop_assert_eq!(s.consistent_index().consistent_index(), max);
        }
    }
}
