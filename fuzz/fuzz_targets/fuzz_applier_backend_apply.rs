//! Fuzz target: one internal request through Applier::apply
//!
//! Requests share one long-lived server, so earlier inputs build the state
//! later ones run against. Cluster-metadata requests need one extra gate byte.
//!
//! Run: cargo +nightly fuzz run fuzz_applier_backend_apply -- -max_len=1024

#![no_main]
use libfuzzer_sys::{fuzz_target, Corpus};
use rkv_harness::Status;

fuzz_target!(|data: &[u8]| -> Corpus {
    match rkv_harness::fuzz_applier_backend_apply(data) {
        Status::Rejected => Corpus::Reject,
        Status::Executed => Corpus::Keep,
    }
});
