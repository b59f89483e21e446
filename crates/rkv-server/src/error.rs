//! Error types for the apply path.
//!
//! `ApplyError` is what the apply functions fail with. Every variant maps to
//! exactly one `ErrorKind`, so callers classify failures by tag instead of by
//! rendered message. `RequestError` is different: it is a per-request response
//! error handed to the waiting client, and never fails the apply call itself.

use thiserror::Error;

use crate::membership::MemberId;
use crate::version::{Version, VersionError};

/// Marker phrase carried by every defensive-invariant message.
pub const MSG_DEFENSIVE_INVARIANT: &str = "should never fail";
/// Fragment of the message for a version string without three dotted parts.
pub const MSG_NOT_DOTTED_TRI: &str = "is not in dotted-tri format";
/// Fragment of the message for a non-numeric version component.
pub const MSG_PARSE_INT: &str = "ParseInt: parsing";
/// Fragment of the message for a bad pre-release or metadata identifier.
pub const MSG_INVALID_IDENTIFIER: &str = "is not a valid semver identifier";
/// Message for a cluster version above what this server binary supports.
pub const MSG_INVALID_DOWNGRADE: &str =
    "invalid downgrade; server version is lower than determined cluster version";

pub type Result<T> = std::result::Result<T, ApplyError>;

/// Tag identifying the class of an `ApplyError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A condition the state machine assumes consensus makes impossible.
    DefensiveInvariant,
    MalformedVersion,
    IntegerParse,
    InvalidSemverIdentifier,
    InvalidDowngrade,
    DowngradeNotAllowed,
    UnknownMember,
    Storage,
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("{context} should never fail: {detail}")]
    DefensiveInvariant {
        context: &'static str,
        detail: String,
    },

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("invalid downgrade; server version is lower than determined cluster version")]
    InvalidDowngrade { server: Version, cluster: Version },

    #[error("invalid downgrade; server version is not allowed to join when downgrade is enabled")]
    DowngradeNotAllowed { server: Version, target: Version },

    #[error("failed to update; member unknown: {0:x}")]
    UnknownMember(MemberId),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ApplyError {
    pub fn invariant(context: &'static str, detail: impl Into<String>) -> Self {
        ApplyError::DefensiveInvariant {
            context,
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApplyError::DefensiveInvariant { .. } => ErrorKind::DefensiveInvariant,
            ApplyError::Version(VersionError::NotDottedTriple(_)) => ErrorKind::MalformedVersion,
            ApplyError::Version(VersionError::ParseInt { .. }) => ErrorKind::IntegerParse,
            ApplyError::Version(VersionError::InvalidIdentifier { .. }) => {
                ErrorKind::InvalidSemverIdentifier
            }
            ApplyError::InvalidDowngrade { .. } => ErrorKind::InvalidDowngrade,
            ApplyError::DowngradeNotAllowed { .. } => ErrorKind::DowngradeNotAllowed,
            ApplyError::UnknownMember(_) => ErrorKind::UnknownMember,
            ApplyError::Storage(_) => ErrorKind::Storage,
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sled: {0}")]
    Sled(#[from] sled::Error),

    #[error("codec: {0}")]
    Codec(#[from] bincode::Error),

    #[error("corrupt value in tree {tree}: {detail}")]
    Corrupt { tree: &'static str, detail: String },
}

/// Response error delivered to the client waiting on a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("key is not provided")]
    EmptyKey,
    #[error("requested lease not found")]
    LeaseNotFound,
    #[error("lease already exists")]
    LeaseExists,
    #[error("too large lease TTL")]
    LeaseTtlTooLarge,
    #[error("required revision has been compacted")]
    Compacted,
    #[error("required revision is a future revision")]
    FutureRevision,
    #[error("database space exceeded")]
    NoSpace,
    #[error("cluster is corrupted")]
    Corrupt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_errors_map_to_distinct_kinds() {
        let err: ApplyError = Version::parse("1.2").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::MalformedVersion);

        let err: ApplyError = Version::parse("1.x.3").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::IntegerParse);

        let err: ApplyError = Version::parse("1.2.3-b@d").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::InvalidSemverIdentifier);
    }

    #[test]
    fn test_messages_carry_classification_fragments() {
        let err = ApplyError::invariant("unmarshal", "unexpected end of file");
        assert!(err.to_string().contains(MSG_DEFENSIVE_INVARIANT));

        let err = ApplyError::InvalidDowngrade {
            server: Version::new(3, 6, 0),
            cluster: Version::new(3, 7, 0),
        };
        assert_eq!(err.to_string(), MSG_INVALID_DOWNGRADE);

        let err: ApplyError = Version::parse("x").unwrap_err().into();
        assert!(err.to_string().contains(MSG_NOT_DOTTED_TRI));

        let err: ApplyError = Version::parse("1.2.z").unwrap_err().into();
        assert!(err.to_string().contains(MSG_PARSE_INT));

        let err: ApplyError = Version::parse("1.2.3+b..d").unwrap_err().into();
        assert!(err.to_string().contains(MSG_INVALID_IDENTIFIER));
    }

    #[test]
    fn test_downgrade_not_allowed_is_not_an_invalid_downgrade() {
        let err = ApplyError::DowngradeNotAllowed {
            server: Version::new(3, 6, 0),
            target: Version::new(3, 4, 0),
        };
        assert_eq!(err.kind(), ErrorKind::DowngradeNotAllowed);
        assert!(!err.to_string().contains(MSG_INVALID_DOWNGRADE));
    }
}
