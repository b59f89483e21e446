//! Leases and the keys attached to them.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::backend::{Backend, TREE_LEASE};
use crate::error::StorageError;
use crate::request::LeaseId;

/// Leases shorter than this are extended to it.
pub const MIN_LEASE_TTL: i64 = 5;
/// Largest TTL a lease may be granted with (seconds).
pub const MAX_LEASE_TTL: i64 = 9_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub id: LeaseId,
    pub ttl: i64,
    pub keys: BTreeSet<Vec<u8>>,
}

pub struct Lessor {
    backend: Backend,
    leases: BTreeMap<LeaseId, Lease>,
}

fn lease_key(id: LeaseId) -> [u8; 8] {
    id.to_be_bytes()
}

impl Lessor {
    pub fn new(backend: Backend) -> Result<Self, StorageError> {
        let leases = backend
            .scan::<Lease>(TREE_LEASE)?
            .into_iter()
            .map(|(_, lease)| (lease.id, lease))
            .collect();
        Ok(Self { backend, leases })
    }

    pub fn lookup(&self, id: LeaseId) -> Option<&Lease> {
        self.leases.get(&id)
    }

    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }

    /// Store a new lease. The TTL is raised to `MIN_LEASE_TTL` if shorter.
    pub fn grant(&mut self, id: LeaseId, ttl: i64) -> Result<Lease, StorageError> {
        let lease = Lease {
            id,
            ttl: ttl.max(MIN_LEASE_TTL),
            keys: BTreeSet::new(),
        };
        self.backend.put(TREE_LEASE, &lease_key(id), &lease)?;
        self.leases.insert(id, lease.clone());
        Ok(lease)
    }

    /// Remove a lease, returning it so its keys can be deleted.
    pub fn revoke(&mut self, id: LeaseId) -> Result<Option<Lease>, StorageError> {
        let Some(lease) = self.leases.remove(&id) else {
            return Ok(None);
        };
        self.backend.delete(TREE_LEASE, &lease_key(id))?;
        Ok(Some(lease))
    }

    pub fn attach(&mut self, id: LeaseId, key: &[u8]) -> Result<(), StorageError> {
        if let Some(lease) = self.leases.get_mut(&id) {
            if lease.keys.insert(key.to_vec()) {
                self.backend.put(TREE_LEASE, &lease_key(id), &*lease)?;
            }
        }
        Ok(())
    }

    pub fn detach(&mut self, id: LeaseId, key: &[u8]) -> Result<(), StorageError> {
        if let Some(lease) = self.leases.get_mut(&id) {
            if lease.keys.remove(key) {
                self.backend.put(TREE_LEASE, &lease_key(id), &*lease)?;
            }
        }
        Ok(())
    }
}
