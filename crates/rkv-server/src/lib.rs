// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RKV - SERVER STATE MACHINE
//
// The apply path of a replicated key-value store: committed log entries are
// turned into state mutations (Server::apply) and single internal requests are
// applied to the backend (Applier::apply). Consensus, WAL, and transport live
// elsewhere; this crate only sees what the log already committed.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod alarm;
pub mod applier;
pub mod auth;
pub mod backend;
pub mod cindex;
pub mod codec;
pub mod entry;
pub mod error;
pub mod kv;
pub mod lease;
pub mod membership;
pub mod request;
pub mod server;
pub mod version;
pub mod wait;

pub use applier::{ApplyResult, Applier, Response};
pub use backend::Backend;
pub use cindex::{BackendHooks, ConsistentIndex};
pub use entry::{ConfChange, ConfChangeType, ConfState, EntryType, LogEntry};
pub use error::{ApplyError, ErrorKind, RequestError, StorageError};
pub use membership::{Attributes, DowngradeInfo, Member, MemberId, RaftAttributes, RaftCluster};
pub use request::{InternalRequest, Request, RequestHeader};
pub use server::{AppliedProgress, ConfChangeResponse, Server};
pub use version::{Version, VersionError, SERVER_VERSION};
