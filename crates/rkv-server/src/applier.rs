// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RKV - BACKEND APPLIER
//
// Applies one InternalRequest to the backend. Two kinds of failure exist:
// 1. ApplyError: the apply itself failed. Returned as Err.
// 2. RequestError: the request was refused by a store rule. Returned inside
//    Ok so the waiting client sees it.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use tracing::{debug, info};

use crate::alarm::{AlarmMember, AlarmStore};
use crate::auth::AuthStore;
use crate::error::{ApplyError, RequestError};
use crate::kv::{KeyValue, KvStore};
use crate::lease::{Lessor, MAX_LEASE_TTL};
use crate::membership::{DowngradeInfo, RaftCluster};
use crate::request::{
    AlarmAction, AlarmRequest, AlarmType, ClusterMemberAttrSetRequest, ClusterVersionSetRequest,
    CompactionRequest, DeleteRangeRequest, DowngradeInfoSetRequest, InternalRequest,
    LeaseGrantRequest, LeaseRevokeRequest, PutRequest, Request, NO_LEASE,
};
use crate::version::Version;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Put {
        revision: i64,
        prev_kv: Option<KeyValue>,
    },
    DeleteRange {
        revision: i64,
        deleted: i64,
        prev_kvs: Vec<KeyValue>,
    },
    Compaction {
        revision: i64,
    },
    LeaseGrant {
        id: i64,
        ttl: i64,
    },
    LeaseRevoke {
        revision: i64,
    },
    Alarm {
        alarms: Vec<AlarmMember>,
    },
    AuthEnable,
    AuthDisable,
    Membership,
}

/// Outcome handed to the proposer. `response` is `None` when the request was
/// skipped or refused.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyResult {
    pub response: Option<Response>,
    pub err: Option<RequestError>,
}

impl ApplyResult {
    fn ok(response: Response) -> Self {
        Self {
            response: Some(response),
            err: None,
        }
    }

    fn refused(err: RequestError) -> Self {
        Self {
            response: None,
            err: Some(err),
        }
    }
}

pub struct Applier<'a> {
    pub(crate) cluster: &'a mut RaftCluster,
    pub(crate) kv: &'a mut KvStore,
    pub(crate) lessor: &'a mut Lessor,
    pub(crate) alarms: &'a mut AlarmStore,
    pub(crate) auth: &'a mut AuthStore,
}

impl Applier<'_> {
    /// Apply `req`. With `should_apply_backend` false (a replayed entry at or
    /// below the consistent index) only membership requests take effect.
    pub fn apply(
        &mut self,
        req: &InternalRequest,
        should_apply_backend: bool,
    ) -> Result<ApplyResult, ApplyError> {
        debug!(
            id = req.header.id,
            request = req.request.name(),
            should_apply_backend,
            "applying internal request"
        );

        match &req.request {
            Request::ClusterVersionSet(r) => {
                return self.cluster_version_set(r, should_apply_backend);
            }
            Request::ClusterMemberAttrSet(r) => {
                return self.cluster_member_attr_set(r, should_apply_backend);
            }
            Request::DowngradeInfoSet(r) => {
                return self.downgrade_info_set(r, should_apply_backend);
            }
            _ => {}
        }

        if !should_apply_backend {
            return Ok(ApplyResult::default());
        }

        if let Some(err) = self.alarm_refusal(&req.request) {
            return Ok(ApplyResult::refused(err));
        }

        match &req.request {
            Request::Put(r) => self.put(r),
            Request::DeleteRange(r) => self.delete_range(r),
            Request::Compaction(r) => self.compaction(r),
            Request::LeaseGrant(r) => self.lease_grant(r),
            Request::LeaseRevoke(r) => self.lease_revoke(r),
            Request::Alarm(r) => self.alarm(r),
            Request::AuthEnable => {
                self.auth.enable()?;
                Ok(ApplyResult::ok(Response::AuthEnable))
            }
            Request::AuthDisable => {
                self.auth.disable()?;
                Ok(ApplyResult::ok(Response::AuthDisable))
            }
            Request::ClusterVersionSet(_)
            | Request::ClusterMemberAttrSet(_)
            | Request::DowngradeInfoSet(_) => Ok(ApplyResult::default()),
        }
    }

    /// A CORRUPT alarm freezes the key space and leases; NOSPACE blocks
    /// anything that could grow the database.
    fn alarm_refusal(&self, request: &Request) -> Option<RequestError> {
        if self.alarms.is_active(AlarmType::Corrupt)
            && matches!(
                request,
                Request::Put(_)
                    | Request::DeleteRange(_)
                    | Request::Compaction(_)
                    | Request::LeaseGrant(_)
                    | Request::LeaseRevoke(_)
            )
        {
            return Some(RequestError::Corrupt);
        }
        if self.alarms.is_active(AlarmType::Nospace)
            && matches!(request, Request::Put(_) | Request::LeaseGrant(_))
        {
            return Some(RequestError::NoSpace);
        }
        None
    }

    fn put(&mut self, r: &PutRequest) -> Result<ApplyResult, ApplyError> {
        if r.key.is_empty() {
            return Ok(ApplyResult::refused(RequestError::EmptyKey));
        }
        if r.lease != NO_LEASE && self.lessor.lookup(r.lease).is_none() {
            return Ok(ApplyResult::refused(RequestError::LeaseNotFound));
        }

        let (revision, prev) = self.kv.put(&r.key, &r.value, r.lease)?;
        if let Some(p) = &prev {
            if p.lease != NO_LEASE && p.lease != r.lease {
                self.lessor.detach(p.lease, &r.key)?;
            }
        }
        if r.lease != NO_LEASE {
            self.lessor.attach(r.lease, &r.key)?;
        }

        Ok(ApplyResult::ok(Response::Put {
            revision,
            prev_kv: if r.prev_kv { prev } else { None },
        }))
    }

    fn delete_range(&mut self, r: &DeleteRangeRequest) -> Result<ApplyResult, ApplyError> {
        let (revision, deleted) = self.kv.delete_range(&r.key, &r.range_end)?;
        for kv in deleted.iter().filter(|kv| kv.lease != NO_LEASE) {
            self.lessor.detach(kv.lease, &kv.key)?;
        }
        Ok(ApplyResult::ok(Response::DeleteRange {
            revision,
            deleted: deleted.len() as i64,
            prev_kvs: if r.prev_kv { deleted } else { Vec::new() },
        }))
    }

    fn compaction(&mut self, r: &CompactionRequest) -> Result<ApplyResult, ApplyError> {
        if r.revision <= self.kv.compacted_revision() {
            return Ok(ApplyResult::refused(RequestError::Compacted));
        }
        if r.revision > self.kv.revision() {
            return Ok(ApplyResult::refused(RequestError::FutureRevision));
        }
        self.kv.compact(r.revision)?;
        info!(revision = r.revision, "compacted key space");
        Ok(ApplyResult::ok(Response::Compaction {
            revision: self.kv.revision(),
        }))
    }

    fn lease_grant(&mut self, r: &LeaseGrantRequest) -> Result<ApplyResult, ApplyError> {
        if r.id == NO_LEASE {
            return Ok(ApplyResult::refused(RequestError::LeaseNotFound));
        }
        if self.lessor.lookup(r.id).is_some() {
            return Ok(ApplyResult::refused(RequestError::LeaseExists));
        }
        if r.ttl > MAX_LEASE_TTL {
            return Ok(ApplyResult::refused(RequestError::LeaseTtlTooLarge));
        }
        let lease = self.lessor.grant(r.id, r.ttl)?;
        Ok(ApplyResult::ok(Response::LeaseGrant {
            id: lease.id,
            ttl: lease.ttl,
        }))
    }

    fn lease_revoke(&mut self, r: &LeaseRevokeRequest) -> Result<ApplyResult, ApplyError> {
        let Some(lease) = self.lessor.revoke(r.id)? else {
            return Ok(ApplyResult::refused(RequestError::LeaseNotFound));
        };
        self.kv.delete_keys(&lease.keys)?;
        Ok(ApplyResult::ok(Response::LeaseRevoke {
            revision: self.kv.revision(),
        }))
    }

    fn alarm(&mut self, r: &AlarmRequest) -> Result<ApplyResult, ApplyError> {
        let alarms = match r.action {
            AlarmAction::Get => self.alarms.get(r.alarm),
            AlarmAction::Activate => {
                if r.alarm == AlarmType::None {
                    Vec::new()
                } else {
                    self.alarms
                        .activate(r.member_id, r.alarm)?
                        .into_iter()
                        .collect()
                }
            }
            AlarmAction::Deactivate => self
                .alarms
                .deactivate(r.member_id, r.alarm)?
                .into_iter()
                .collect(),
        };
        Ok(ApplyResult::ok(Response::Alarm { alarms }))
    }

    fn cluster_version_set(
        &mut self,
        r: &ClusterVersionSetRequest,
        should_apply_backend: bool,
    ) -> Result<ApplyResult, ApplyError> {
        let version = Version::parse(&r.ver)?;
        self.cluster.set_version(version.clone(), should_apply_backend)?;

        let downgrade = self.cluster.downgrade_info();
        if downgrade.enabled && Version::parse(&downgrade.target_version)? == version {
            info!(version = %version, "cluster reached downgrade target; downgrade finished");
            self.cluster
                .set_downgrade_info(DowngradeInfo::default(), should_apply_backend)?;
        }
        Ok(ApplyResult::ok(Response::Membership))
    }

    fn cluster_member_attr_set(
        &mut self,
        r: &ClusterMemberAttrSetRequest,
        should_apply_backend: bool,
    ) -> Result<ApplyResult, ApplyError> {
        self.cluster
            .update_attributes(r.member_id, r.attributes.clone(), should_apply_backend)?;
        Ok(ApplyResult::ok(Response::Membership))
    }

    fn downgrade_info_set(
        &mut self,
        r: &DowngradeInfoSetRequest,
        should_apply_backend: bool,
    ) -> Result<ApplyResult, ApplyError> {
        let info = if r.enabled {
            DowngradeInfo {
                enabled: true,
                target_version: r.ver.clone(),
            }
        } else {
            DowngradeInfo::default()
        };
        self.cluster.set_downgrade_info(info, should_apply_backend)?;
        Ok(ApplyResult::ok(Response::Membership))
    }
}
