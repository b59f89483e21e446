//! Semantic versions as the cluster stores them.
//!
//! Parsing follows the dotted-triple rules clients already send: optional
//! `+metadata` is split off first, then an optional `-prerelease`, and what is
//! left must be exactly `major.minor.patch`.

use std::cmp::Ordering;
use std::fmt;
use std::num::ParseIntError;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ApplyError;
use crate::membership::DowngradeInfo;

/// Version of this server binary.
pub const SERVER_VERSION: Version = Version::new(3, 6, 0);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("{0} is not in dotted-tri format")]
    NotDottedTriple(String),

    #[error("ParseInt: parsing {input:?}: {source}")]
    ParseInt {
        input: String,
        source: ParseIntError,
    },

    #[error("failed to validate {field}: {identifier} is not a valid semver identifier")]
    InvalidIdentifier {
        field: &'static str,
        identifier: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub major: i64,
    pub minor: i64,
    pub patch: i64,
    pub pre_release: String,
    pub metadata: String,
}

impl Version {
    pub const fn new(major: i64, minor: i64, patch: i64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre_release: String::new(),
            metadata: String::new(),
        }
    }

    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let (rest, metadata) = split_off(input, '+');
        let (core, pre_release) = split_off(rest, '-');

        let parts: Vec<&str> = core.splitn(3, '.').collect();
        if parts.len() != 3 {
            return Err(VersionError::NotDottedTriple(core.to_string()));
        }

        validate_identifier("pre-release", pre_release)?;
        validate_identifier("metadata", metadata)?;

        let mut parsed = [0i64; 3];
        for (slot, part) in parsed.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|source| VersionError::ParseInt {
                input: (*part).to_string(),
                source,
            })?;
        }

        Ok(Self {
            major: parsed[0],
            minor: parsed[1],
            patch: parsed[2],
            pre_release: pre_release.to_string(),
            metadata: metadata.to_string(),
        })
    }

    /// Major and minor only; the granularity cluster compatibility is decided at.
    pub fn major_minor(&self) -> Version {
        Version::new(self.major, self.minor, 0)
    }
}

fn split_off(input: &str, delim: char) -> (&str, &str) {
    input.split_once(delim).unwrap_or((input, ""))
}

fn validate_identifier(field: &'static str, id: &str) -> Result<(), VersionError> {
    let valid = id.is_empty()
        || id.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-')
        });
    if valid {
        Ok(())
    } else {
        Err(VersionError::InvalidIdentifier {
            field,
            identifier: id.to_string(),
        })
    }
}

fn compare_pre_release(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        // A release ranks above any of its pre-releases.
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }

    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(nx), Ok(ny)) => nx.cmp(&ny),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| compare_pre_release(&self.pre_release, &other.pre_release))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Build metadata does not take part in precedence.
impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre_release.is_empty() {
            write!(f, "-{}", self.pre_release)?;
        }
        if !self.metadata.is_empty() {
            write!(f, "+{}", self.metadata)?;
        }
        Ok(())
    }
}

/// Fails when this server may not run against the given cluster state.
///
/// With a downgrade in progress only servers at the target major.minor may
/// join. Otherwise the server's major.minor must not be below the cluster
/// version.
pub fn must_detect_downgrade(
    server: &Version,
    cluster: Option<&Version>,
    downgrade: &DowngradeInfo,
) -> Result<(), ApplyError> {
    let server = server.major_minor();

    if downgrade.enabled && !downgrade.target_version.is_empty() {
        let target = Version::parse(&downgrade.target_version)?;
        if server == target.major_minor() {
            if let Some(cluster) = cluster {
                tracing::info!(
                    %cluster,
                    target = %target,
                    "cluster is downgrading to target version"
                );
            }
            return Ok(());
        }
        return Err(ApplyError::DowngradeNotAllowed { server, target });
    }

    if let Some(cluster) = cluster {
        if server < *cluster {
            return Err(ApplyError::InvalidDowngrade {
                server,
                cluster: cluster.clone(),
            });
        }
    }
    Ok(())
}
