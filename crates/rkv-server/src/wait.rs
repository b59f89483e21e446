//! Pending operation registry: proposers register an id and receive the apply
//! outcome once the matching entry is applied.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio::sync::oneshot;

use crate::applier::ApplyResult;
use crate::server::ConfChangeResponse;

#[derive(Debug)]
pub enum Completion {
    Request(ApplyResult),
    ConfChange(ConfChangeResponse),
}

#[derive(Default)]
pub struct Wait {
    pending: Mutex<HashMap<u64, oneshot::Sender<Completion>>>,
}

impl Wait {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `id`. Returns `None` when `id` is already pending.
    pub fn register(&self, id: u64) -> Option<oneshot::Receiver<Completion>> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.contains_key(&id) {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        pending.insert(id, tx);
        Some(rx)
    }

    /// Deliver `completion` to whoever registered `id`. Returns whether
    /// anyone was registered.
    pub fn trigger(&self, id: u64, completion: Completion) -> bool {
        let sender = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        match sender {
            // A dropped receiver means the proposer gave up; nothing to do.
            Some(tx) => {
                let _ = tx.send(completion);
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, id: u64) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
