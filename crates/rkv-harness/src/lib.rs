// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RKV - APPLY PATH FUZZ HARNESS
//
// Decodes raw fuzzer bytes into log entries or internal requests, stands up a
// throwaway server around the sled backend, calls the apply path, and tells
// already-handled failures apart from real defects.
//
// Targets return Status::Rejected (0) for inputs that never reached apply and
// Status::Executed (1) otherwise. Defects unwind out of the target.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod config;
pub mod consumer;
pub mod error;
pub mod harness;
pub mod logging;
pub mod oracle;
pub mod predicate;
pub mod seed;
pub mod targets;

pub use config::HarnessConfig;
pub use consumer::{ByteConsumer, ConsumeError, Generate, DECODER_FORMAT_VERSION, MAX_REPEATED};
pub use error::{ConfigError, HarnessError};
pub use harness::{HarnessContext, HarnessServerBuilder};
pub use oracle::{
    install_panic_filter, PanicOracle, Verdict, ENTRY_APPLY_ORACLE, REQUEST_APPLY_ORACLE,
};
pub use targets::{
    fuzz_applier_backend_apply, fuzz_apply, EntryApplyTarget, InternalRequestApplyTarget, Status,
    ENTRY_COUNT_MODULUS,
};
