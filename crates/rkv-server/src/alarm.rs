//! Cluster alarms raised per member.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::backend::{Backend, TREE_ALARM};
use crate::error::StorageError;
use crate::membership::MemberId;
use crate::request::AlarmType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlarmMember {
    pub member_id: MemberId,
    pub alarm: AlarmType,
}

impl AlarmMember {
    fn storage_key(&self) -> [u8; 9] {
        let mut key = [0u8; 9];
        key[..8].copy_from_slice(&self.member_id.to_be_bytes());
        key[8] = self.alarm as u8;
        key
    }
}

pub struct AlarmStore {
    backend: Backend,
    active: BTreeSet<AlarmMember>,
}

impl AlarmStore {
    pub fn new(backend: Backend) -> Result<Self, StorageError> {
        let active = backend
            .scan::<AlarmMember>(TREE_ALARM)?
            .into_iter()
            .map(|(_, m)| m)
            .collect();
        Ok(Self { backend, active })
    }

    /// Raise an alarm. Returns `None` if it was already active.
    pub fn activate(
        &mut self,
        member_id: MemberId,
        alarm: AlarmType,
    ) -> Result<Option<AlarmMember>, StorageError> {
        let m = AlarmMember { member_id, alarm };
        if !self.active.insert(m) {
            return Ok(None);
        }
        self.backend.put(TREE_ALARM, &m.storage_key(), &m)?;
        tracing::warn!(member_id = %format!("{:x}", member_id), alarm = ?alarm, "alarm raised");
        Ok(Some(m))
    }

    /// Clear an alarm. Returns `None` if it was not active.
    pub fn deactivate(
        &mut self,
        member_id: MemberId,
        alarm: AlarmType,
    ) -> Result<Option<AlarmMember>, StorageError> {
        let m = AlarmMember { member_id, alarm };
        if !self.active.remove(&m) {
            return Ok(None);
        }
        self.backend.delete(TREE_ALARM, &m.storage_key())?;
        Ok(Some(m))
    }

    /// Active alarms of type `alarm`; `AlarmType::None` lists all of them.
    pub fn get(&self, alarm: AlarmType) -> Vec<AlarmMember> {
        self.active
            .iter()
            .filter(|m| alarm == AlarmType::None || m.alarm == alarm)
            .copied()
            .collect()
    }

    pub fn is_active(&self, alarm: AlarmType) -> bool {
        self.active.iter().any(|m| m.alarm == alarm)
    }
}
