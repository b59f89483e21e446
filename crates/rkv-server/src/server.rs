// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RKV - SERVER
//
// Owns every piece of state the apply path touches and applies batches of
// committed log entries in order. Normal entries carry an InternalRequest;
// conf-change entries carry a ConfChange whose context is the member.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use tracing::{debug, info, warn};

use crate::alarm::AlarmStore;
use crate::applier::Applier;
use crate::auth::AuthStore;
use crate::backend::Backend;
use crate::cindex::{load_conf_state, BackendHooks, ConsistentIndex};
use crate::codec::must_decode;
use crate::entry::{ConfChange, ConfChangeType, ConfState, EntryType, LogEntry};
use crate::error::{ApplyError, StorageError};
use crate::kv::KvStore;
use crate::lease::Lessor;
use crate::membership::{Member, MemberId, MembershipError, RaftCluster};
use crate::request::InternalRequest;
use crate::wait::{Completion, Wait};

/// Where the server stands after an `apply` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedProgress {
    pub applied_term: u64,
    pub applied_index: u64,
    /// The local member was removed by one of the applied entries.
    pub should_stop: bool,
}

/// Delivered to whoever proposed a configuration change.
#[derive(Debug, Clone)]
pub struct ConfChangeResponse {
    pub members: Vec<Member>,
    pub err: Option<MembershipError>,
}

pub struct Server {
    id: MemberId,
    cluster: RaftCluster,
    backend: Backend,
    consistent_index: ConsistentIndex,
    hooks: BackendHooks,
    wait: Wait,
    kv: KvStore,
    lessor: Lessor,
    alarms: AlarmStore,
    auth: AuthStore,
    applied_index: u64,
    applied_term: u64,
}

impl Server {
    /// Assemble a server over `backend`. The cluster is bound to the same
    /// backend so membership changes above the consistent index persist.
    pub fn new(id: MemberId, mut cluster: RaftCluster, backend: Backend) -> Result<Self, ApplyError> {
        backend.create_meta_tree()?;
        cluster.set_backend(backend.clone());

        let consistent_index = ConsistentIndex::new(backend.clone())?;
        let applied_index = consistent_index.consistent_index();
        let applied_term = consistent_index.term();

        Ok(Self {
            id,
            cluster,
            kv: KvStore::new(backend.clone())?,
            lessor: Lessor::new(backend.clone())?,
            alarms: AlarmStore::new(backend.clone())?,
            auth: AuthStore::new(backend.clone())?,
            consistent_index,
            hooks: BackendHooks::new(),
            wait: Wait::new(),
            backend,
            applied_index,
            applied_term,
        })
    }

    pub fn id(&self) -> MemberId {
        self.id
    }

    pub fn cluster(&self) -> &RaftCluster {
        &self.cluster
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn consistent_index(&self) -> &ConsistentIndex {
        &self.consistent_index
    }

    pub fn wait(&self) -> &Wait {
        &self.wait
    }

    pub fn kv(&self) -> &KvStore {
        &self.kv
    }

    pub fn lessor(&self) -> &Lessor {
        &self.lessor
    }

    pub fn alarms(&self) -> &AlarmStore {
        &self.alarms
    }

    pub fn auth(&self) -> &AuthStore {
        &self.auth
    }

    pub fn applied_index(&self) -> u64 {
        self.applied_index
    }

    pub fn applied_term(&self) -> u64 {
        self.applied_term
    }

    /// Conf state written by the last commit.
    pub fn saved_conf_state(&self) -> Result<Option<ConfState>, StorageError> {
        load_conf_state(&self.backend)
    }

    /// Borrow the stores as an applier for single requests.
    pub fn applier(&mut self) -> Applier<'_> {
        Applier {
            cluster: &mut self.cluster,
            kv: &mut self.kv,
            lessor: &mut self.lessor,
            alarms: &mut self.alarms,
            auth: &mut self.auth,
        }
    }

    /// Apply committed entries in log order, then commit.
    pub fn apply(
        &mut self,
        entries: &[LogEntry],
        conf_state: &mut ConfState,
    ) -> Result<AppliedProgress, ApplyError> {
        let mut should_stop = false;

        for entry in entries {
            debug!(
                index = entry.index,
                term = entry.term,
                entry_type = ?entry.entry_type,
                "applying entry"
            );

            match entry.entry_type {
                EntryType::Normal => self.apply_entry_normal(entry)?,
                EntryType::ConfChange => {
                    should_stop |= self.apply_entry_conf_change(entry, conf_state)?;
                }
            }
            self.applied_index = entry.index;
            self.applied_term = entry.term;
        }

        self.commit()?;
        Ok(AppliedProgress {
            applied_term: self.applied_term,
            applied_index: self.applied_index,
            should_stop,
        })
    }

    /// Returns whether the entry is new to the backend, advancing the
    /// consistent index if so.
    fn advance_consistent_index(&mut self, entry: &LogEntry) -> bool {
        if entry.index > self.consistent_index.consistent_index() {
            self.consistent_index
                .set_consistent_index(entry.index, entry.term);
            true
        } else {
            false
        }
    }

    fn apply_entry_normal(&mut self, entry: &LogEntry) -> Result<(), ApplyError> {
        let should_apply_backend = self.advance_consistent_index(entry);

        // Leaders append an empty entry when they take office.
        if entry.data.is_empty() {
            debug!(term = entry.term, index = entry.index, "applied empty entry");
            return Ok(());
        }

        let req: InternalRequest = must_decode("unmarshal", &entry.data)?;
        let id = req.header.id;
        let result = self.applier().apply(&req, should_apply_backend)?;

        if let Some(err) = &result.err {
            debug!(id, error = %err, "request refused");
        }
        self.wait.trigger(id, Completion::Request(result));
        Ok(())
    }

    /// Returns true when the local member removed itself.
    fn apply_entry_conf_change(
        &mut self,
        entry: &LogEntry,
        conf_state: &mut ConfState,
    ) -> Result<bool, ApplyError> {
        let should_apply_backend = self.advance_consistent_index(entry);

        let cc: ConfChange = must_decode("unmarshal conf change", &entry.data)?;
        let (removed_self, err) = self.apply_conf_change(&cc, conf_state, should_apply_backend)?;

        self.wait.trigger(
            cc.id,
            Completion::ConfChange(ConfChangeResponse {
                members: self.cluster.members(),
                err,
            }),
        );
        Ok(removed_self)
    }

    fn apply_conf_change(
        &mut self,
        cc: &ConfChange,
        conf_state: &mut ConfState,
        should_apply_backend: bool,
    ) -> Result<(bool, Option<MembershipError>), ApplyError> {
        let member = match cc.change_type {
            ConfChangeType::RemoveNode => None,
            _ => Some(must_decode::<Member>("unmarshal member", &cc.context)?),
        };

        if let Err(err) = self.cluster.validate_configuration_change(cc, member.as_ref()) {
            warn!(node_id = %format!("{:x}", cc.node_id), error = %err, "rejected configuration change");
            return Ok((false, Some(err)));
        }

        conf_state.apply_conf_change(cc);
        self.hooks.set_conf_state(conf_state.clone());

        match (cc.change_type, member) {
            (ConfChangeType::RemoveNode, _) => {
                self.cluster.remove_member(cc.node_id, should_apply_backend)?;
                if cc.node_id == self.id {
                    info!(local_member_id = %format!("{:x}", self.id), "local member removed");
                    return Ok((true, None));
                }
            }
            (ConfChangeType::UpdateNode, Some(m)) => {
                self.cluster
                    .update_raft_attributes(m.id, m.raft_attributes, should_apply_backend)?;
            }
            (ConfChangeType::AddNode | ConfChangeType::AddLearnerNode, Some(mut m)) => {
                m.raft_attributes.is_learner = cc.change_type == ConfChangeType::AddLearnerNode;
                if m.id == self.id {
                    info!(local_member_id = %format!("{:x}", self.id), "added local member");
                }
                self.cluster.add_member(m, should_apply_backend)?;
            }
            (_, None) => {
                return Err(ApplyError::invariant(
                    "member context",
                    "missing for add or update change",
                ));
            }
        }
        Ok((false, None))
    }

    /// Persist the consistent index and any pending conf state.
    pub fn commit(&mut self) -> Result<(), ApplyError> {
        self.hooks.on_pre_commit(&self.backend, &self.consistent_index)?;
        Ok(())
    }

    /// Commit, then flush the backend to disk.
    pub fn sync(&mut self) -> Result<(), ApplyError> {
        self.commit()?;
        self.backend.flush()?;
        Ok(())
    }
}
