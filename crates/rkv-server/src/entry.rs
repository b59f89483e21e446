//! Committed log entries and configuration changes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::membership::MemberId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    /// Payload is an encoded `InternalRequest`.
    Normal,
    /// Payload is an encoded `ConfChange`.
    ConfChange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub term: u64,
    pub index: u64,
    pub entry_type: EntryType,
    pub data: Vec<u8>,
}

impl LogEntry {
    pub fn normal(term: u64, index: u64, data: Vec<u8>) -> Self {
        Self {
            term,
            index,
            entry_type: EntryType::Normal,
            data,
        }
    }

    pub fn conf_change(term: u64, index: u64, data: Vec<u8>) -> Self {
        Self {
            term,
            index,
            entry_type: EntryType::ConfChange,
            data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfChangeType {
    AddNode,
    RemoveNode,
    UpdateNode,
    AddLearnerNode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfChange {
    /// Pending operation id the proposer waits on.
    pub id: u64,
    pub change_type: ConfChangeType,
    pub node_id: MemberId,
    /// Encoded `Member` for add and update changes; empty for removals.
    pub context: Vec<u8>,
}

/// Voter and learner sets after the last applied configuration change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfState {
    pub voters: BTreeSet<MemberId>,
    pub learners: BTreeSet<MemberId>,
}

impl ConfState {
    pub fn apply_conf_change(&mut self, cc: &ConfChange) {
        match cc.change_type {
            ConfChangeType::AddNode => {
                self.learners.remove(&cc.node_id);
                self.voters.insert(cc.node_id);
            }
            ConfChangeType::AddLearnerNode => {
                if !self.voters.contains(&cc.node_id) {
                    self.learners.insert(cc.node_id);
                }
            }
            ConfChangeType::RemoveNode => {
                self.voters.remove(&cc.node_id);
                self.learners.remove(&cc.node_id);
            }
            ConfChangeType::UpdateNode => {}
        }
    }
}
