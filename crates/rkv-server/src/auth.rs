//! Authentication on/off switch.

use crate::backend::{Backend, TREE_AUTH};
use crate::error::StorageError;

const KEY_AUTH_ENABLED: &[u8] = b"authEnabled";

pub struct AuthStore {
    backend: Backend,
    enabled: bool,
}

impl AuthStore {
    pub fn new(backend: Backend) -> Result<Self, StorageError> {
        let enabled = matches!(
            backend.get_raw(TREE_AUTH, KEY_AUTH_ENABLED)?.as_deref(),
            Some([1])
        );
        Ok(Self { backend, enabled })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn enable(&mut self) -> Result<(), StorageError> {
        self.set(true)
    }

    pub fn disable(&mut self) -> Result<(), StorageError> {
        self.set(false)
    }

    fn set(&mut self, enabled: bool) -> Result<(), StorageError> {
        if self.enabled == enabled {
            return Ok(());
        }
        self.backend
            .put_raw(TREE_AUTH, KEY_AUTH_ENABLED, &[u8::from(enabled)])?;
        self.enabled = enabled;
        tracing::info!(enabled, "authentication status changed");
        Ok(())
    }
}
