//! Fuzz target: committed log entries through Server::apply
//!
//! First byte mod 20 picks the entry count; each entry is decoded from the
//! rest of the input and applied on a fresh single-member server.
//!
//! Run: cargo +nightly fuzz run fuzz_apply -- -max_len=4096

#![no_main]
use libfuzzer_sys::{fuzz_target, Corpus};
use rkv_harness::Status;

fuzz_target!(|data: &[u8]| -> Corpus {
    match rkv_harness::fuzz_apply(data) {
        Status::Rejected => Corpus::Reject,
        Status::Executed => Corpus::Keep,
    }
});
