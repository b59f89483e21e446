// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RKV - PANIC ORACLE
//
// Decides whether a failure raised by the apply path is already handled
// (suppressed) or a defect (re-raised). Typed ApplyError values are matched
// by ErrorKind; panic payloads, which carry only text, are matched against
// message fragments.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use rkv_server::error::{
    MSG_DEFENSIVE_INVARIANT, MSG_INVALID_DOWNGRADE, MSG_INVALID_IDENTIFIER, MSG_NOT_DOTTED_TRI,
    MSG_PARSE_INT,
};
use rkv_server::{ApplyError, ErrorKind};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Expected failure; the input still counts as executed.
    Suppressed,
    /// Must reach the fuzzing engine.
    Defect,
}

#[derive(Debug, Clone, Copy)]
pub struct PanicOracle {
    pub name: &'static str,
    pub kinds: &'static [ErrorKind],
    pub patterns: &'static [&'static str],
}

/// Entry apply: only decode failures of consensus-accepted payloads.
pub const ENTRY_APPLY_ORACLE: PanicOracle = PanicOracle {
    name: "entry_apply",
    kinds: &[ErrorKind::DefensiveInvariant],
    patterns: &[MSG_DEFENSIVE_INVARIANT],
};

/// Request apply: version strings that do not parse, and version changes
/// that would downgrade the cluster below this server.
pub const REQUEST_APPLY_ORACLE: PanicOracle = PanicOracle {
    name: "request_apply",
    kinds: &[
        ErrorKind::MalformedVersion,
        ErrorKind::IntegerParse,
        ErrorKind::InvalidSemverIdentifier,
        ErrorKind::InvalidDowngrade,
    ],
    patterns: &[
        MSG_NOT_DOTTED_TRI,
        MSG_PARSE_INT,
        MSG_INVALID_IDENTIFIER,
        MSG_INVALID_DOWNGRADE,
    ],
};

impl PanicOracle {
    pub fn classify_error(&self, err: &ApplyError) -> Verdict {
        if self.kinds.contains(&err.kind()) {
            Verdict::Suppressed
        } else {
            Verdict::Defect
        }
    }

    pub fn classify_message(&self, message: &str) -> Verdict {
        if self.patterns.iter().any(|p| message.contains(p)) {
            Verdict::Suppressed
        } else {
            Verdict::Defect
        }
    }

    pub fn classify_panic(&self, payload: &(dyn Any + Send)) -> Verdict {
        match payload.downcast_ref::<ApplyError>() {
            Some(err) => self.classify_error(err),
            None => self.classify_message(&panic_message(payload)),
        }
    }

    /// Run `f`. Suppressed failures are swallowed; a defect panic is resumed
    /// with its original payload and a defect error panics with its message.
    pub fn check<T>(&self, f: impl FnOnce() -> Result<T, ApplyError>) {
        let outer = ACTIVE_ORACLE.with(|active| active.replace(Some(*self)));
        let outcome = panic::catch_unwind(AssertUnwindSafe(f));
        ACTIVE_ORACLE.with(|active| active.set(outer));

        match outcome {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => match self.classify_error(&err) {
                Verdict::Suppressed => {
                    debug!(oracle = self.name, kind = ?err.kind(), error = %err, "suppressed apply error");
                }
                Verdict::Defect => panic!("{err}"),
            },
            Err(payload) => match self.classify_panic(&*payload) {
                Verdict::Suppressed => {
                    debug!(oracle = self.name, message = %panic_message(&*payload), "suppressed panic");
                }
                Verdict::Defect => panic::resume_unwind(payload),
            },
        }
    }
}

thread_local! {
    static ACTIVE_ORACLE: Cell<Option<PanicOracle>> = const { Cell::new(None) };
}

/// Wrap the installed panic hook so panics the running `check` will suppress
/// never reach it. libFuzzer's hook aborts the process, so without this only
/// typed errors could be suppressed under the fuzzing engine.
///
/// Installs once per process; hooks set afterwards replace the filter.
pub fn install_panic_filter() {
    static INSTALLED: Once = Once::new();
    INSTALLED.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let suppressed = ACTIVE_ORACLE
                .with(Cell::get)
                .is_some_and(|oracle| oracle.classify_panic(info.payload()) == Verdict::Suppressed);
            if !suppressed {
                previous(info);
            }
        }));
    });
}

/// Best-effort text of a panic payload; empty for payload types we cannot read.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(err) = payload.downcast_ref::<ApplyError>() {
        err.to_string()
    } else if let Some(err) = payload.downcast_ref::<Box<dyn std::error::Error + Send + Sync>>() {
        err.to_string()
    } else if let Some(err) = payload.downcast_ref::<Box<dyn std::error::Error + Send>>() {
        err.to_string()
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rkv_server::{Version, VersionError};

    fn downgrade_error() -> ApplyError {
        ApplyError::InvalidDowngrade {
            server: Version::new(3, 6, 0),
            cluster: Version::new(3, 7, 0),
        }
    }

    #[test]
    fn test_request_oracle_suppresses_exact_downgrade_message() {
        assert_eq!(
            REQUEST_APPLY_ORACLE.classify_message(
                "invalid downgrade; server version is lower than determined cluster version"
            ),
            Verdict::Suppressed
        );
        assert_eq!(
            REQUEST_APPLY_ORACLE.classify_error(&downgrade_error()),
            Verdict::Suppressed
        );
    }

    #[test]
    fn test_request_oracle_patterns_match_as_substrings() {
        for msg in [
            "3.x is not in dotted-tri format",
            "ParseInt: parsing \"x\": invalid digit found in string",
            "failed to validate pre-release: a!b is not a valid semver identifier",
        ] {
            assert_eq!(REQUEST_APPLY_ORACLE.classify_message(msg), Verdict::Suppressed, "{msg}");
        }
        assert_eq!(
            REQUEST_APPLY_ORACLE.classify_message("index out of bounds"),
            Verdict::Defect
        );
    }

    #[test]
    fn test_oracles_do_not_overlap() {
        let invariant = ApplyError::invariant("unmarshal", "bad tag");
        assert_eq!(ENTRY_APPLY_ORACLE.classify_error(&invariant), Verdict::Suppressed);
        assert_eq!(REQUEST_APPLY_ORACLE.classify_error(&invariant), Verdict::Defect);
        assert_eq!(ENTRY_APPLY_ORACLE.classify_error(&downgrade_error()), Verdict::Defect);
        assert_eq!(
            REQUEST_APPLY_ORACLE.classify_error(&ApplyError::UnknownMember(9)),
            Verdict::Defect
        );
    }

    #[test]
    fn test_panic_message_payload_shapes() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*s), "static");
        let s: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*s), "owned");
        let e: Box<dyn Any + Send> =
            Box::new(ApplyError::from(VersionError::NotDottedTriple("1".into())));
        assert_eq!(panic_message(&*e), "1 is not in dotted-tri format");
        let n: Box<dyn Any + Send> = Box::new(17u32);
        assert_eq!(panic_message(&*n), "");
    }

    #[test]
    fn test_check_swallows_suppressed() {
        REQUEST_APPLY_ORACLE.check(|| Err::<(), _>(downgrade_error()));
        ENTRY_APPLY_ORACLE.check(|| -> Result<(), ApplyError> {
            panic!("unmarshal should never fail: truncated")
        });
    }

    #[test]
    fn test_check_resumes_original_payload() {
        let payload = panic::catch_unwind(|| {
            ENTRY_APPLY_ORACLE.check(|| -> Result<(), ApplyError> {
                panic::panic_any(String::from("real bug"))
            })
        })
        .unwrap_err();
        assert_eq!(payload.downcast_ref::<String>().map(String::as_str), Some("real bug"));
    }

    #[test]
    fn test_check_raises_unlisted_error() {
        let payload = panic::catch_unwind(|| {
            REQUEST_APPLY_ORACLE.check(|| Err::<(), _>(ApplyError::UnknownMember(0x2a)))
        })
        .unwrap_err();
        assert_eq!(panic_message(&*payload), "failed to update; member unknown: 2a");
    }
}
