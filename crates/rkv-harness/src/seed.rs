//! Writes typed values in the decoder's wire format, for hand-made seed
//! corpora and tests.

use rkv_server::entry::{EntryType, LogEntry};
use rkv_server::request::{AlarmAction, AlarmType, InternalRequest, Request};

use crate::consumer::MAX_REPEATED;

#[derive(Debug, Default, Clone)]
pub struct InputBuilder {
    buf: Vec<u8>,
}

impl InputBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn int(mut self, v: u8) -> Self {
        self.buf.push(v);
        self
    }

    pub fn bool(self, v: bool) -> Self {
        self.int(u8::from(v))
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u64(mut self, v: u64) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn i64(mut self, v: i64) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn bytes(self, v: &[u8]) -> Self {
        let mut this = self.u32(len_u32(v.len()));
        this.buf.extend_from_slice(v);
        this
    }

    pub fn string(self, v: &str) -> Self {
        self.bytes(v.as_bytes())
    }

    pub fn raw(mut self, v: &[u8]) -> Self {
        self.buf.extend_from_slice(v);
        self
    }

    pub fn entry(self, e: &LogEntry) -> Self {
        let tag = match e.entry_type {
            EntryType::Normal => 0,
            EntryType::ConfChange => 1,
        };
        self.u64(e.term).u64(e.index).int(tag).bytes(&e.data)
    }

    pub fn request(self, req: &InternalRequest) -> Self {
        let b = self.u64(req.header.id).string(&req.header.username);
        match &req.request {
            Request::Put(r) => b
                .int(0)
                .bytes(&r.key)
                .bytes(&r.value)
                .i64(r.lease)
                .bool(r.prev_kv),
            Request::DeleteRange(r) => b.int(1).bytes(&r.key).bytes(&r.range_end).bool(r.prev_kv),
            Request::Compaction(r) => b.int(2).i64(r.revision),
            Request::LeaseGrant(r) => b.int(3).i64(r.id).i64(r.ttl),
            Request::LeaseRevoke(r) => b.int(4).i64(r.id),
            Request::Alarm(r) => b
                .int(5)
                .int(alarm_action_tag(r.action))
                .u64(r.member_id)
                .int(alarm_type_tag(r.alarm)),
            Request::AuthEnable => b.int(6),
            Request::AuthDisable => b.int(7),
            Request::ClusterVersionSet(r) => b.int(8).string(&r.ver),
            Request::ClusterMemberAttrSet(r) => {
                // The decoder reads the count modulo MAX_REPEATED; longer lists
                // are truncated to what it will actually see.
                let count = len_u32(r.attributes.client_urls.len()) % MAX_REPEATED;
                let urls = &r.attributes.client_urls[..count as usize];
                let mut b = b
                    .int(9)
                    .u64(r.member_id)
                    .string(&r.attributes.name)
                    .u32(count);
                for url in urls {
                    b = b.string(url);
                }
                b
            }
            Request::DowngradeInfoSet(r) => b.int(10).bool(r.enabled).string(&r.ver),
        }
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

fn len_u32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

fn alarm_action_tag(action: AlarmAction) -> u8 {
    match action {
        AlarmAction::Get => 0,
        AlarmAction::Activate => 1,
        AlarmAction::Deactivate => 2,
    }
}

fn alarm_type_tag(alarm: AlarmType) -> u8 {
    match alarm {
        AlarmType::None => 0,
        AlarmType::Nospace => 1,
        AlarmType::Corrupt => 2,
    }
}

/// Input for `fuzz_apply` holding exactly `entries`.
pub fn entries_input(entries: &[LogEntry]) -> Vec<u8> {
    let count = u8::try_from(entries.len()).unwrap_or(u8::MAX);
    entries
        .iter()
        .fold(InputBuilder::new().int(count), |b, e| b.entry(e))
        .finish()
}

/// Input for `fuzz_applier_backend_apply`; guarded variants get `gate` as
/// their extra byte.
pub fn request_input(req: &InternalRequest, gate: bool) -> Vec<u8> {
    let b = InputBuilder::new().request(req);
    if req.request.is_membership() {
        b.bool(gate).finish()
    } else {
        b.finish()
    }
}
