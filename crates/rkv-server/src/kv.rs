//! Key space with a single store-wide revision counter.

use serde::{Deserialize, Serialize};

use crate::backend::{Backend, TREE_KEY, TREE_META};
use crate::codec;
use crate::error::StorageError;
use crate::request::LeaseId;

const KEY_CURRENT_REVISION: &[u8] = b"currentRevision";
const KEY_COMPACTED_REVISION: &[u8] = b"compactedRevision";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub create_revision: i64,
    pub mod_revision: i64,
    pub version: i64,
    pub value: Vec<u8>,
    pub lease: LeaseId,
}

pub struct KvStore {
    backend: Backend,
    revision: i64,
    compacted: i64,
}

impl KvStore {
    pub fn new(backend: Backend) -> Result<Self, StorageError> {
        let revision = backend.get_u64(TREE_META, KEY_CURRENT_REVISION)?.unwrap_or(1) as i64;
        let compacted = backend.get_u64(TREE_META, KEY_COMPACTED_REVISION)?.unwrap_or(0) as i64;
        Ok(Self {
            backend,
            revision,
            compacted,
        })
    }

    pub fn revision(&self) -> i64 {
        self.revision
    }

    pub fn compacted_revision(&self) -> i64 {
        self.compacted
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<KeyValue>, StorageError> {
        self.backend.get(TREE_KEY, key)
    }

    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.backend.tree(TREE_KEY)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Write `key`, returning the new revision and the previous value.
    pub fn put(
        &mut self,
        key: &[u8],
        value: &[u8],
        lease: LeaseId,
    ) -> Result<(i64, Option<KeyValue>), StorageError> {
        let prev = self.get(key)?;
        let rev = self.revision.saturating_add(1);
        let kv = match &prev {
            Some(p) => KeyValue {
                key: key.to_vec(),
                create_revision: p.create_revision,
                mod_revision: rev,
                version: p.version.saturating_add(1),
                value: value.to_vec(),
                lease,
            },
            None => KeyValue {
                key: key.to_vec(),
                create_revision: rev,
                mod_revision: rev,
                version: 1,
                value: value.to_vec(),
                lease,
            },
        };
        self.backend.put(TREE_KEY, key, &kv)?;
        self.bump(rev)?;
        Ok((rev, prev))
    }

    /// Delete `key`, or the range `[key, range_end)`; a `range_end` of `[0]`
    /// extends the range to the end of the key space.
    pub fn delete_range(
        &mut self,
        key: &[u8],
        range_end: &[u8],
    ) -> Result<(i64, Vec<KeyValue>), StorageError> {
        let tree = self.backend.tree(TREE_KEY)?;
        let mut deleted = Vec::new();

        if range_end.is_empty() {
            if let Some(raw) = tree.remove(key)? {
                deleted.push(codec::decode(&raw)?);
            }
        } else {
            let keys: Vec<sled::IVec> = if range_end == [0] {
                tree.range(key..).keys().collect::<Result<_, _>>()?
            } else if range_end > key {
                tree.range(key..range_end).keys().collect::<Result<_, _>>()?
            } else {
                Vec::new()
            };
            for k in keys {
                if let Some(raw) = tree.remove(&k)? {
                    deleted.push(codec::decode(&raw)?);
                }
            }
        }

        if deleted.is_empty() {
            return Ok((self.revision, deleted));
        }
        let rev = self.revision.saturating_add(1);
        self.bump(rev)?;
        Ok((rev, deleted))
    }

    /// Delete exactly these keys, e.g. the ones attached to a revoked lease.
    pub fn delete_keys<'a>(
        &mut self,
        keys: impl IntoIterator<Item = &'a Vec<u8>>,
    ) -> Result<usize, StorageError> {
        let mut removed = 0;
        for key in keys {
            if self.backend.delete(TREE_KEY, key)? {
                removed += 1;
            }
        }
        if removed > 0 {
            let rev = self.revision.saturating_add(1);
            self.bump(rev)?;
        }
        Ok(removed)
    }

    /// Record `revision` as compacted. Callers check it against the current
    /// and compacted revisions first.
    pub fn compact(&mut self, revision: i64) -> Result<(), StorageError> {
        self.compacted = revision;
        self.backend
            .put_u64(TREE_META, KEY_COMPACTED_REVISION, revision as u64)
    }

    fn bump(&mut self, rev: i64) -> Result<(), StorageError> {
        self.revision = rev;
        self.backend
            .put_u64(TREE_META, KEY_CURRENT_REVISION, rev as u64)
    }
}
