// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RKV - STORAGE BACKEND
//
// sled embedded database holding every piece of applied state, one named
// tree per concern. Values are bincode-encoded; integers are big-endian so
// that sled's byte ordering matches numeric ordering.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};
use sled::{Db, IVec, Tree};

use crate::codec;
use crate::error::StorageError;

pub const TREE_META: &str = "meta";
pub const TREE_MEMBERS: &str = "members";
pub const TREE_MEMBERS_REMOVED: &str = "members_removed";
pub const TREE_CLUSTER: &str = "cluster";
pub const TREE_KEY: &str = "key";
pub const TREE_LEASE: &str = "lease";
pub const TREE_ALARM: &str = "alarm";
pub const TREE_AUTH: &str = "auth";

/// Handle to the backend database. Cloning shares the same database.
#[derive(Clone)]
pub struct Backend {
    db: Db,
}

impl Backend {
    /// Open or create a backend at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::Config::new()
            .path(path.as_ref())
            .mode(sled::Mode::HighThroughput)
            .open()?;
        Ok(Self { db })
    }

    /// In-memory backend removed when the last handle drops.
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Create the metadata tree holding the consistent index and revisions.
    pub fn create_meta_tree(&self) -> Result<(), StorageError> {
        self.db.open_tree(TREE_META)?;
        Ok(())
    }

    pub fn has_tree(&self, name: &str) -> bool {
        self.db
            .tree_names()
            .iter()
            .any(|existing| existing.as_ref() == name.as_bytes())
    }

    pub fn tree(&self, name: &str) -> Result<Tree, StorageError> {
        Ok(self.db.open_tree(name)?)
    }

    pub fn get_raw(&self, tree: &str, key: &[u8]) -> Result<Option<IVec>, StorageError> {
        Ok(self.tree(tree)?.get(key)?)
    }

    pub fn put_raw(&self, tree: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.tree(tree)?.insert(key, value)?;
        Ok(())
    }

    pub fn delete(&self, tree: &str, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.tree(tree)?.remove(key)?.is_some())
    }

    pub fn get<T: DeserializeOwned>(&self, tree: &str, key: &[u8]) -> Result<Option<T>, StorageError> {
        match self.get_raw(tree, key)? {
            Some(bytes) => Ok(Some(codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put<T: Serialize>(&self, tree: &str, key: &[u8], value: &T) -> Result<(), StorageError> {
        let bytes = codec::encode(value)?;
        self.put_raw(tree, key, &bytes)
    }

    pub fn get_u64(&self, tree: &'static str, key: &[u8]) -> Result<Option<u64>, StorageError> {
        match self.get_raw(tree, key)? {
            Some(bytes) => {
                let arr: [u8; 8] =
                    bytes
                        .as_ref()
                        .try_into()
                        .map_err(|_| StorageError::Corrupt {
                            tree,
                            detail: format!("expected 8-byte integer, got {} bytes", bytes.len()),
                        })?;
                Ok(Some(u64::from_be_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    pub fn put_u64(&self, tree: &str, key: &[u8], value: u64) -> Result<(), StorageError> {
        self.put_raw(tree, key, &value.to_be_bytes())
    }

    /// Every entry of a tree in key order.
    pub fn scan<T: DeserializeOwned>(&self, tree: &str) -> Result<Vec<(IVec, T)>, StorageError> {
        let mut out = Vec::new();
        for item in self.tree(tree)?.iter() {
            let (key, value) = item?;
            out.push((key, codec::decode(&value)?));
        }
        Ok(out)
    }

    /// Force buffered writes to disk.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}
