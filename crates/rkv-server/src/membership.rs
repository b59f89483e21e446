// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RKV - CLUSTER MEMBERSHIP
//
// The member list, removed-id tombstones, cluster version and downgrade state.
// The in-memory view is always updated; the backend copy only when the caller
// passes should_apply_backend (entries above the consistent index).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::backend::{Backend, TREE_CLUSTER, TREE_MEMBERS, TREE_MEMBERS_REMOVED};
use crate::entry::{ConfChange, ConfChangeType};
use crate::error::{ApplyError, StorageError};
use crate::version::{must_detect_downgrade, Version, SERVER_VERSION};

pub type MemberId = u64;

const KEY_CLUSTER_VERSION: &[u8] = b"clusterVersion";
const KEY_DOWNGRADE: &[u8] = b"downgrade";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    pub name: String,
    pub client_urls: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftAttributes {
    pub peer_urls: Vec<String>,
    pub is_learner: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub raft_attributes: RaftAttributes,
    pub attributes: Attributes,
}

impl Member {
    pub fn new(id: MemberId, name: impl Into<String>, peer_urls: Vec<String>) -> Self {
        Self {
            id,
            raft_attributes: RaftAttributes {
                peer_urls,
                is_learner: false,
            },
            attributes: Attributes {
                name: name.into(),
                client_urls: Vec::new(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DowngradeInfo {
    pub enabled: bool,
    pub target_version: String,
}

/// Why a configuration change was refused. Reported to the proposer; the
/// entry is still considered applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MembershipError {
    #[error("membership: ID removed")]
    IdRemoved(MemberId),
    #[error("membership: ID exists")]
    IdExists(MemberId),
    #[error("membership: ID not found")]
    IdNotFound(MemberId),
    #[error("membership: peerURL exists")]
    PeerUrlExists(String),
    #[error("membership: context member id {context:x} does not match change node id {node:x}")]
    IdMismatch { node: MemberId, context: MemberId },
}

pub struct RaftCluster {
    local_id: MemberId,
    members: BTreeMap<MemberId, Member>,
    removed: BTreeSet<MemberId>,
    version: Option<Version>,
    downgrade: DowngradeInfo,
    backend: Option<Backend>,
}

impl RaftCluster {
    pub fn new(local_id: MemberId) -> Self {
        Self {
            local_id,
            members: BTreeMap::new(),
            removed: BTreeSet::new(),
            version: None,
            downgrade: DowngradeInfo::default(),
            backend: None,
        }
    }

    pub fn set_backend(&mut self, backend: Backend) {
        self.backend = Some(backend);
    }

    /// Reload the backend copy of membership into memory.
    pub fn recover(&mut self) -> Result<(), ApplyError> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };

        self.members = backend
            .scan::<Member>(TREE_MEMBERS)?
            .into_iter()
            .map(|(_, m)| (m.id, m))
            .collect();
        self.removed = backend
            .scan::<MemberId>(TREE_MEMBERS_REMOVED)?
            .into_iter()
            .map(|(_, id)| id)
            .collect();

        if let Some(raw) = backend.get_raw(TREE_CLUSTER, KEY_CLUSTER_VERSION)? {
            let text = String::from_utf8_lossy(&raw);
            self.version = Some(Version::parse(&text)?);
        }
        if let Some(d) = backend.get::<DowngradeInfo>(TREE_CLUSTER, KEY_DOWNGRADE)? {
            self.downgrade = d;
        }

        info!(
            local_member_id = %format!("{:x}", self.local_id),
            members = self.members.len(),
            removed = self.removed.len(),
            "recovered cluster membership from backend"
        );
        Ok(())
    }

    pub fn member(&self, id: MemberId) -> Option<&Member> {
        self.members.get(&id)
    }

    pub fn members(&self) -> Vec<Member> {
        self.members.values().cloned().collect()
    }

    pub fn is_removed(&self, id: MemberId) -> bool {
        self.removed.contains(&id)
    }

    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    pub fn downgrade_info(&self) -> &DowngradeInfo {
        &self.downgrade
    }

    fn backend_for(&self, should_apply_backend: bool) -> Option<&Backend> {
        if should_apply_backend {
            self.backend.as_ref()
        } else {
            None
        }
    }

    pub fn add_member(&mut self, member: Member, should_apply_backend: bool) -> Result<(), ApplyError> {
        if let Some(backend) = self.backend_for(should_apply_backend) {
            save_member(backend, &member)?;
        }
        info!(
            added_peer_id = %format!("{:x}", member.id),
            added_peer_peer_urls = ?member.raft_attributes.peer_urls,
            added_peer_is_learner = member.raft_attributes.is_learner,
            "added member"
        );
        self.members.insert(member.id, member);
        Ok(())
    }

    pub fn remove_member(&mut self, id: MemberId, should_apply_backend: bool) -> Result<(), ApplyError> {
        if let Some(backend) = self.backend_for(should_apply_backend) {
            backend.delete(TREE_MEMBERS, &id.to_be_bytes())?;
            backend.put(TREE_MEMBERS_REMOVED, &id.to_be_bytes(), &id)?;
        }
        if self.members.remove(&id).is_none() {
            warn!(removed_member_id = %format!("{:x}", id), "skipped removing already removed member");
        } else {
            info!(removed_member_id = %format!("{:x}", id), "removed member");
        }
        self.removed.insert(id);
        Ok(())
    }

    pub fn update_attributes(
        &mut self,
        id: MemberId,
        attributes: Attributes,
        should_apply_backend: bool,
    ) -> Result<(), ApplyError> {
        let backend = self.backend_for(should_apply_backend).cloned();
        if let Some(member) = self.members.get_mut(&id) {
            member.attributes = attributes;
            if let Some(backend) = backend {
                save_member(&backend, member)?;
            }
            return Ok(());
        }
        if self.removed.contains(&id) {
            warn!(member_id = %format!("{:x}", id), "skipped updating attributes of removed member");
            return Ok(());
        }
        Err(ApplyError::UnknownMember(id))
    }

    pub fn update_raft_attributes(
        &mut self,
        id: MemberId,
        raft_attributes: RaftAttributes,
        should_apply_backend: bool,
    ) -> Result<(), ApplyError> {
        let backend = self.backend_for(should_apply_backend).cloned();
        if let Some(member) = self.members.get_mut(&id) {
            member.raft_attributes = raft_attributes;
            if let Some(backend) = backend {
                save_member(&backend, member)?;
            }
            info!(updated_remote_peer_id = %format!("{:x}", id), "updated member");
            return Ok(());
        }
        if self.removed.contains(&id) {
            warn!(member_id = %format!("{:x}", id), "skipped updating raft attributes of removed member");
            return Ok(());
        }
        Err(ApplyError::UnknownMember(id))
    }

    /// Set the cluster version. Rejected versions leave the cluster untouched.
    pub fn set_version(&mut self, version: Version, should_apply_backend: bool) -> Result<(), ApplyError> {
        must_detect_downgrade(&SERVER_VERSION, Some(&version), &self.downgrade)?;

        match &self.version {
            Some(old) => info!(from = %old, to = %version, "updated cluster version"),
            None => info!(to = %version, "set initial cluster version"),
        }
        if let Some(backend) = self.backend_for(should_apply_backend) {
            backend.put_raw(TREE_CLUSTER, KEY_CLUSTER_VERSION, version.to_string().as_bytes())?;
        }
        self.version = Some(version);
        Ok(())
    }

    /// Record downgrade state. An enabled downgrade must name a valid target.
    pub fn set_downgrade_info(
        &mut self,
        downgrade: DowngradeInfo,
        should_apply_backend: bool,
    ) -> Result<(), ApplyError> {
        if downgrade.enabled {
            let target = Version::parse(&downgrade.target_version)?;
            info!(
                target_version = %target,
                server_version = %SERVER_VERSION,
                "the server is ready to downgrade"
            );
        }
        if let Some(backend) = self.backend_for(should_apply_backend) {
            backend.put(TREE_CLUSTER, KEY_DOWNGRADE, &downgrade)?;
        }
        self.downgrade = downgrade;
        Ok(())
    }

    /// Check a configuration change against current membership. `member` is
    /// the decoded change context for add and update changes.
    pub fn validate_configuration_change(
        &self,
        cc: &ConfChange,
        member: Option<&Member>,
    ) -> Result<(), MembershipError> {
        let id = cc.node_id;
        if self.removed.contains(&id) {
            return Err(MembershipError::IdRemoved(id));
        }

        match cc.change_type {
            ConfChangeType::AddNode | ConfChangeType::AddLearnerNode => {
                if self.members.contains_key(&id) {
                    return Err(MembershipError::IdExists(id));
                }
                if let Some(m) = member {
                    self.check_member(id, m)?;
                }
            }
            ConfChangeType::RemoveNode => {
                if !self.members.contains_key(&id) {
                    return Err(MembershipError::IdNotFound(id));
                }
            }
            ConfChangeType::UpdateNode => {
                if !self.members.contains_key(&id) {
                    return Err(MembershipError::IdNotFound(id));
                }
                if let Some(m) = member {
                    self.check_member(id, m)?;
                }
            }
        }
        Ok(())
    }

    fn check_member(&self, id: MemberId, member: &Member) -> Result<(), MembershipError> {
        if member.id != id {
            return Err(MembershipError::IdMismatch {
                node: id,
                context: member.id,
            });
        }
        for other in self.members.values().filter(|m| m.id != id) {
            if let Some(url) = member
                .raft_attributes
                .peer_urls
                .iter()
                .find(|u| other.raft_attributes.peer_urls.contains(u))
            {
                return Err(MembershipError::PeerUrlExists(url.clone()));
            }
        }
        Ok(())
    }
}

fn save_member(backend: &Backend, member: &Member) -> Result<(), StorageError> {
    backend.put(TREE_MEMBERS, &member.id.to_be_bytes(), member)
}
