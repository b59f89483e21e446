//! Internal requests: the payload of a normal log entry.

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::membership::{Attributes, MemberId};

pub type LeaseId = i64;

/// Lease id meaning "no lease attached".
pub const NO_LEASE: LeaseId = 0;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    /// Pending operation id the proposer waits on.
    pub id: u64,
    pub username: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutRequest {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub lease: LeaseId,
    pub prev_kv: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRangeRequest {
    pub key: Vec<u8>,
    /// Empty deletes `key` alone; `[0]` deletes everything from `key` on.
    pub range_end: Vec<u8>,
    pub prev_kv: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionRequest {
    pub revision: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseGrantRequest {
    pub id: LeaseId,
    pub ttl: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRevokeRequest {
    pub id: LeaseId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmAction {
    Get,
    Activate,
    Deactivate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AlarmType {
    None,
    Nospace,
    Corrupt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRequest {
    pub action: AlarmAction,
    pub member_id: MemberId,
    pub alarm: AlarmType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterVersionSetRequest {
    pub ver: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMemberAttrSetRequest {
    pub member_id: MemberId,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DowngradeInfoSetRequest {
    pub enabled: bool,
    pub ver: String,
}

/// Exactly one operation per internal request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Put(PutRequest),
    DeleteRange(DeleteRangeRequest),
    Compaction(CompactionRequest),
    LeaseGrant(LeaseGrantRequest),
    LeaseRevoke(LeaseRevokeRequest),
    Alarm(AlarmRequest),
    AuthEnable,
    AuthDisable,
    ClusterVersionSet(ClusterVersionSetRequest),
    ClusterMemberAttrSet(ClusterMemberAttrSetRequest),
    DowngradeInfoSet(DowngradeInfoSetRequest),
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::Put(_) => "put",
            Request::DeleteRange(_) => "delete_range",
            Request::Compaction(_) => "compaction",
            Request::LeaseGrant(_) => "lease_grant",
            Request::LeaseRevoke(_) => "lease_revoke",
            Request::Alarm(_) => "alarm",
            Request::AuthEnable => "auth_enable",
            Request::AuthDisable => "auth_disable",
            Request::ClusterVersionSet(_) => "cluster_version_set",
            Request::ClusterMemberAttrSet(_) => "cluster_member_attr_set",
            Request::DowngradeInfoSet(_) => "downgrade_info_set",
        }
    }

    /// Cluster-metadata operations. These are applied even when the entry is
    /// being replayed below the consistent index, because membership state is
    /// rebuilt from the log.
    pub fn is_membership(&self) -> bool {
        matches!(
            self,
            Request::ClusterVersionSet(_)
                | Request::ClusterMemberAttrSet(_)
                | Request::DowngradeInfoSet(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalRequest {
    pub header: RequestHeader,
    pub request: Request,
}

impl InternalRequest {
    pub fn new(id: u64, request: Request) -> Self {
        Self {
            header: RequestHeader {
                id,
                username: String::new(),
            },
            request,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        codec::encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        codec::decode(bytes)
    }
}
