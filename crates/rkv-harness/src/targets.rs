// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RKV - FUZZ TARGETS
//
// fuzz_apply:                 N entries -> Server::apply on a fresh context
// fuzz_applier_backend_apply: 1 request -> Applier::apply on a shared context
//
// Both return Status::Rejected when the input never reached apply, and
// Status::Executed when apply ran and either succeeded or failed in a way
// the oracle suppresses. Anything else unwinds out of the target.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

use rkv_server::{ConfState, InternalRequest, LogEntry};

use crate::config::HarnessConfig;
use crate::consumer::ByteConsumer;
use crate::error::HarnessError;
use crate::harness::{HarnessContext, HarnessServerBuilder};
use crate::oracle::{ENTRY_APPLY_ORACLE, REQUEST_APPLY_ORACLE};
use crate::{logging, oracle, predicate};

/// Entry count is the first input byte modulo this.
pub const ENTRY_COUNT_MODULUS: u8 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Rejected = 0,
    Executed = 1,
}

impl Status {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Decode the entry list for `fuzz_apply`. `None` means the input is rejected:
/// truncated, an entry with an empty payload, or zero entries.
pub fn decode_entries(data: &[u8]) -> Option<Vec<LogEntry>> {
    let mut input = ByteConsumer::new(data);
    let count = input.int().ok()? % ENTRY_COUNT_MODULUS;

    let mut entries = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let entry: LogEntry = input.generate().ok()?;
        if entry.data.is_empty() {
            return None;
        }
        entries.push(entry);
    }

    if entries.is_empty() {
        None
    } else {
        Some(entries)
    }
}

/// Decode the request for `fuzz_applier_backend_apply`, including the gate
/// byte for guarded variants.
pub fn decode_request(data: &[u8]) -> Option<InternalRequest> {
    let mut input = ByteConsumer::new(data);
    let req: InternalRequest = input.generate().ok()?;
    if predicate::accept(&req.request, &mut input) {
        Some(req)
    } else {
        None
    }
}

/// Applies entry batches, each on its own throwaway context.
pub struct EntryApplyTarget {
    config: HarnessConfig,
    apply_calls: AtomicU64,
}

impl EntryApplyTarget {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            apply_calls: AtomicU64::new(0),
        }
    }

    /// Number of times `Server::apply` has been invoked.
    pub fn apply_calls(&self) -> u64 {
        self.apply_calls.load(Ordering::Relaxed)
    }

    pub fn run(&self, data: &[u8]) -> Result<Status, HarnessError> {
        let Some(entries) = decode_entries(data) else {
            return Ok(Status::Rejected);
        };

        let mut ctx = HarnessServerBuilder::new(&self.config).build()?;
        self.apply_calls.fetch_add(1, Ordering::Relaxed);
        ENTRY_APPLY_ORACLE.check(|| {
            ctx.server_mut()
                .apply(&entries, &mut ConfState::default())
        });
        Ok(Status::Executed)
    }
}

/// Applies single requests against one long-lived context, so state built by
/// earlier inputs is visible to later ones.
pub struct InternalRequestApplyTarget {
    config: HarnessConfig,
    context: Mutex<Option<HarnessContext>>,
    apply_calls: AtomicU64,
}

impl InternalRequestApplyTarget {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            context: Mutex::new(None),
            apply_calls: AtomicU64::new(0),
        }
    }

    /// Number of times `Applier::apply` has been invoked.
    pub fn apply_calls(&self) -> u64 {
        self.apply_calls.load(Ordering::Relaxed)
    }

    pub fn run(&self, data: &[u8]) -> Result<Status, HarnessError> {
        let Some(req) = decode_request(data) else {
            return Ok(Status::Rejected);
        };

        // A defect re-raised below poisons the lock and drops the context
        // while unwinding; the next call starts from a fresh one.
        let mut slot = self.context.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ctx = match slot.take() {
            Some(ctx) if !self.config.reset_shared_context => ctx,
            _ => HarnessServerBuilder::new(&self.config).build()?,
        };

        self.apply_calls.fetch_add(1, Ordering::Relaxed);
        REQUEST_APPLY_ORACLE.check(|| ctx.server_mut().applier().apply(&req, true));

        *slot = Some(ctx);
        Ok(Status::Executed)
    }

    /// Inspect the shared context, if one has been built.
    pub fn with_context<R>(&self, f: impl FnOnce(&HarnessContext) -> R) -> Option<R> {
        let slot = self.context.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref().map(f)
    }
}

fn process_config() -> &'static HarnessConfig {
    static CONFIG: OnceLock<HarnessConfig> = OnceLock::new();
    CONFIG.get_or_init(|| match HarnessConfig::resolve() {
        Ok(config) => {
            logging::init(&config);
            oracle::install_panic_filter();
            config
        }
        Err(err) => panic!("invalid harness configuration: {err}"),
    })
}

fn unwrap_status(result: Result<Status, HarnessError>) -> Status {
    match result {
        Ok(status) => status,
        Err(err) => panic!("harness setup failed: {err}"),
    }
}

/// Process-wide entry target configured from the environment.
pub fn fuzz_apply(data: &[u8]) -> Status {
    static TARGET: OnceLock<EntryApplyTarget> = OnceLock::new();
    let target = TARGET.get_or_init(|| EntryApplyTarget::new(process_config().clone()));
    unwrap_status(target.run(data))
}

/// Process-wide request target. Its context lives until the process exits
/// and its storage directory is left behind (see `HarnessConfig::temp_dir_root`).
pub fn fuzz_applier_backend_apply(data: &[u8]) -> Status {
    static TARGET: OnceLock<InternalRequestApplyTarget> = OnceLock::new();
    let target =
        TARGET.get_or_init(|| InternalRequestApplyTarget::new(process_config().clone()));
    unwrap_status(target.run(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_count_wraps() {
        // 21 % 20 == 1 entry: term, index, type, 1-byte payload.
        let mut data = vec![21];
        data.extend_from_slice(&[0; 16]);
        data.push(0);
        data.extend_from_slice(&1u32.to_be_bytes());
        data.push(7);
        assert_eq!(decode_entries(&data).map(|e| e.len()), Some(1));
    }

    #[test]
    fn test_zero_count_and_empty_payload_reject() {
        assert!(decode_entries(&[20]).is_none());
        assert!(decode_entries(&[]).is_none());

        let mut data = vec![1];
        data.extend_from_slice(&[0; 17]);
        data.extend_from_slice(&0u32.to_be_bytes());
        assert!(decode_entries(&data).is_none());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::Rejected.code(), 0);
        assert_eq!(Status::Executed.code(), 1);
    }
}
