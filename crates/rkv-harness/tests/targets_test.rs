// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TARGET TESTS — rkv-harness
//
// Drives both fuzz targets end to end with hand-built inputs.
// Run: cargo test -p rkv-harness --test targets_test
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::panic::{self, AssertUnwindSafe};

use rkv_harness::oracle::panic_message;
use rkv_harness::seed::{entries_input, request_input, InputBuilder};
use rkv_harness::{EntryApplyTarget, HarnessConfig, InternalRequestApplyTarget, Status};
use rkv_server::request::{
    ClusterMemberAttrSetRequest, ClusterVersionSetRequest, DowngradeInfoSetRequest,
    LeaseGrantRequest, PutRequest,
};
use rkv_server::{Attributes, InternalRequest, LogEntry, Request};

fn entry_target() -> EntryApplyTarget {
    EntryApplyTarget::new(HarnessConfig::default())
}

fn request_target() -> InternalRequestApplyTarget {
    InternalRequestApplyTarget::new(HarnessConfig::default())
}

fn put(id: u64, key: &[u8]) -> InternalRequest {
    InternalRequest::new(
        id,
        Request::Put(PutRequest {
            key: key.to_vec(),
            value: b"v".to_vec(),
            ..Default::default()
        }),
    )
}

fn version_set(ver: &str) -> InternalRequest {
    InternalRequest::new(
        1,
        Request::ClusterVersionSet(ClusterVersionSetRequest { ver: ver.into() }),
    )
}

// ─────────────────────────────────────────────────────────────────
// ENTRY APPLY TARGET
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_entry_count_without_entries_is_rejected() {
    let target = entry_target();
    assert_eq!(target.run(&[5]).unwrap(), Status::Rejected);
    assert_eq!(target.apply_calls(), 0);
}

#[test]
fn test_single_well_formed_entry_is_applied_once() {
    let target = entry_target();
    let payload = put(1, b"k").encode().unwrap();
    let data = entries_input(&[LogEntry::normal(1, 1, payload)]);

    assert_eq!(target.run(&data).unwrap(), Status::Executed);
    assert_eq!(target.apply_calls(), 1);
}

#[test]
fn test_undecodable_payload_is_suppressed() {
    let target = entry_target();
    let data = entries_input(&[LogEntry::normal(1, 1, vec![0xde, 0xad])]);
    assert_eq!(target.run(&data).unwrap(), Status::Executed);
}

#[test]
fn test_empty_payload_anywhere_rejects_whole_input() {
    let target = entry_target();
    let good = LogEntry::normal(1, 1, put(1, b"k").encode().unwrap());
    let empty = LogEntry::normal(1, 2, Vec::new());
    let data = entries_input(&[good, empty]);
    assert_eq!(target.run(&data).unwrap(), Status::Rejected);
    assert_eq!(target.apply_calls(), 0);
}

#[test]
fn test_entry_count_is_first_byte_mod_20() {
    let target = entry_target();
    let entry = LogEntry::normal(1, 1, vec![1]);
    // 41 % 20 == 1, so one entry suffices and trailing bytes are ignored.
    let data = InputBuilder::new()
        .int(41)
        .entry(&entry)
        .raw(&[9, 9, 9])
        .finish();
    assert_eq!(target.run(&data).unwrap(), Status::Executed);

    // 42 % 20 == 2, and there is only one entry.
    let mut short = data.clone();
    short[0] = 42;
    short.truncate(short.len() - 3);
    assert_eq!(target.run(&short).unwrap(), Status::Rejected);
}

#[test]
fn test_entry_apply_unlisted_failure_propagates() {
    let target = entry_target();
    let payload = version_set("9.9.9").encode().unwrap();
    let data = entries_input(&[LogEntry::normal(1, 1, payload)]);

    let payload = panic::catch_unwind(AssertUnwindSafe(|| target.run(&data))).unwrap_err();
    assert!(panic_message(&*payload).contains("invalid downgrade"));
}

#[test]
fn test_entry_storage_released_on_every_exit() {
    let root = tempfile::tempdir().unwrap();
    let target = EntryApplyTarget::new(HarnessConfig {
        temp_dir_root: Some(root.path().to_path_buf()),
        ..Default::default()
    });

    let defect = entries_input(&[LogEntry::normal(1, 1, version_set("9.9.9").encode().unwrap())]);
    assert!(panic::catch_unwind(AssertUnwindSafe(|| target.run(&defect))).is_err());

    let suppressed = entries_input(&[LogEntry::normal(1, 1, vec![1, 2])]);
    assert_eq!(target.run(&suppressed).unwrap(), Status::Executed);

    let executed = entries_input(&[LogEntry::normal(1, 1, put(1, b"k").encode().unwrap())]);
    assert_eq!(target.run(&executed).unwrap(), Status::Executed);

    assert_eq!(target.apply_calls(), 3);
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

// ─────────────────────────────────────────────────────────────────
// REQUEST APPLY TARGET
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_guarded_request_with_false_gate_never_applies() {
    let target = request_target();
    let data = request_input(&version_set("3.6.0"), false);
    assert_eq!(target.run(&data).unwrap(), Status::Rejected);
    assert_eq!(target.apply_calls(), 0);
}

#[test]
fn test_guarded_request_with_missing_gate_is_rejected() {
    let target = request_target();
    let data = InputBuilder::new().request(&version_set("3.6.0")).finish();
    assert_eq!(target.run(&data).unwrap(), Status::Rejected);
}

#[test]
fn test_exact_downgrade_message_is_suppressed() {
    let target = request_target();
    let data = request_input(&version_set("3.7.0"), true);
    assert_eq!(target.run(&data).unwrap(), Status::Executed);
    assert_eq!(target.apply_calls(), 1);
}

#[test]
fn test_malformed_versions_are_suppressed() {
    let target = request_target();
    for ver in ["3.6", "3.six.0", "3.6.0-b@d", "", "v3.6.0"] {
        let data = request_input(&version_set(ver), true);
        assert_eq!(target.run(&data).unwrap(), Status::Executed, "{ver:?}");
    }
}

#[test]
fn test_unknown_member_attr_set_propagates() {
    let target = request_target();
    let req = InternalRequest::new(
        1,
        Request::ClusterMemberAttrSet(ClusterMemberAttrSetRequest {
            member_id: 0xbeef,
            attributes: Attributes::default(),
        }),
    );
    let data = request_input(&req, true);
    let payload = panic::catch_unwind(AssertUnwindSafe(|| target.run(&data))).unwrap_err();
    assert!(panic_message(&*payload).contains("member unknown"));

    // The poisoned context is rebuilt on the next call.
    let data = request_input(&put(2, b"after"), true);
    assert_eq!(target.run(&data).unwrap(), Status::Executed);
}

#[test]
fn test_downgrade_to_foreign_version_propagates() {
    let target = request_target();
    let req = InternalRequest::new(
        1,
        Request::DowngradeInfoSet(DowngradeInfoSetRequest {
            enabled: true,
            ver: "3.4.0".into(),
        }),
    );
    assert_eq!(target.run(&request_input(&req, true)).unwrap(), Status::Executed);

    // With a downgrade to 3.4 enabled, this 3.6 server may not set any version.
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        target.run(&request_input(&version_set("3.4.0"), true))
    }));
    let payload = result.unwrap_err();
    assert!(panic_message(&*payload).contains("not allowed to join"));
}

#[test]
fn test_unguarded_requests_need_no_gate() {
    let target = request_target();
    let req = InternalRequest::new(1, Request::LeaseGrant(LeaseGrantRequest { id: 3, ttl: 30 }));
    let data = InputBuilder::new().request(&req).finish();
    assert_eq!(target.run(&data).unwrap(), Status::Executed);
}

#[test]
fn test_shared_context_keeps_state_between_calls() {
    let target = request_target();
    target.run(&request_input(&put(1, b"first"), false)).unwrap();
    target.run(&request_input(&put(2, b"second"), false)).unwrap();

    let keys = target
        .with_context(|ctx| ctx.server().kv().len().unwrap())
        .unwrap();
    assert_eq!(keys, 2);
}

#[test]
fn test_reset_option_isolates_calls() {
    let target = InternalRequestApplyTarget::new(HarnessConfig {
        reset_shared_context: true,
        ..Default::default()
    });
    target.run(&request_input(&put(1, b"first"), false)).unwrap();
    target.run(&request_input(&put(2, b"second"), false)).unwrap();

    let keys = target
        .with_context(|ctx| ctx.server().kv().len().unwrap())
        .unwrap();
    assert_eq!(keys, 1);
}

#[test]
fn test_truncated_request_is_rejected() {
    let target = request_target();
    let mut data = request_input(&put(1, b"key"), false);
    data.truncate(data.len() - 1);
    assert_eq!(target.run(&data).unwrap(), Status::Rejected);
}

#[test]
fn test_shared_storage_lives_as_long_as_the_target() {
    let root = tempfile::tempdir().unwrap();
    let target = InternalRequestApplyTarget::new(HarnessConfig {
        temp_dir_root: Some(root.path().to_path_buf()),
        ..Default::default()
    });
    target.run(&request_input(&put(1, b"k"), false)).unwrap();
    target.run(&request_input(&put(2, b"k"), false)).unwrap();
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 1);

    drop(target);
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}
