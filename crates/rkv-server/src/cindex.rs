//! Consistent index: the last log position whose effects reached the backend.
//!
//! Entries at or below the consistent index are replays after a restart; their
//! key-space effects are already in the backend and must not be applied twice.

use crate::backend::{Backend, TREE_META};
use crate::codec;
use crate::entry::ConfState;
use crate::error::StorageError;

const KEY_CONSISTENT_INDEX: &[u8] = b"consistent_index";
const KEY_TERM: &[u8] = b"term";
const KEY_CONF_STATE: &[u8] = b"confState";

pub struct ConsistentIndex {
    backend: Backend,
    index: u64,
    term: u64,
}

impl ConsistentIndex {
    /// Bind to `backend`, loading whatever index was last saved there.
    pub fn new(backend: Backend) -> Result<Self, StorageError> {
        let index = backend.get_u64(TREE_META, KEY_CONSISTENT_INDEX)?.unwrap_or(0);
        let term = backend.get_u64(TREE_META, KEY_TERM)?.unwrap_or(0);
        Ok(Self {
            backend,
            index,
            term,
        })
    }

    pub fn consistent_index(&self) -> u64 {
        self.index
    }

    pub fn term(&self) -> u64 {
        self.term
    }

    pub fn set_consistent_index(&mut self, index: u64, term: u64) {
        self.index = index;
        self.term = term;
    }

    /// Write the in-memory index to the meta tree. The stored index only grows.
    pub fn unsafe_save(&self) -> Result<(), StorageError> {
        if self.index == 0 {
            return Ok(());
        }
        let stored = self
            .backend
            .get_u64(TREE_META, KEY_CONSISTENT_INDEX)?
            .unwrap_or(0);
        if self.index <= stored {
            return Ok(());
        }
        self.backend
            .put_u64(TREE_META, KEY_CONSISTENT_INDEX, self.index)?;
        self.backend.put_u64(TREE_META, KEY_TERM, self.term)
    }
}

/// Work done right before a backend commit.
#[derive(Default)]
pub struct BackendHooks {
    conf_state: Option<ConfState>,
    conf_state_dirty: bool,
}

impl BackendHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_conf_state(&mut self, conf_state: ConfState) {
        self.conf_state = Some(conf_state);
        self.conf_state_dirty = true;
    }

    pub fn on_pre_commit(
        &mut self,
        backend: &Backend,
        cindex: &ConsistentIndex,
    ) -> Result<(), StorageError> {
        cindex.unsafe_save()?;
        if self.conf_state_dirty {
            if let Some(cs) = &self.conf_state {
                backend.put_raw(TREE_META, KEY_CONF_STATE, &codec::encode(cs)?)?;
            }
            self.conf_state_dirty = false;
        }
        Ok(())
    }
}

/// Conf state saved by the last commit, if any.
pub fn load_conf_state(backend: &Backend) -> Result<Option<ConfState>, StorageError> {
    backend.get(TREE_META, KEY_CONF_STATE)
}
