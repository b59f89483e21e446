//! Gate in front of the request-apply target.
//!
//! Cluster-metadata requests reach the applier only when the input spends one
//! more byte agreeing to it.

use rkv_server::request::Request;

use crate::consumer::ByteConsumer;

/// Variants subject to the extra gate byte.
pub fn is_guarded(request: &Request) -> bool {
    request.is_membership()
}

/// Whether `request` may be applied. Guarded variants consume one bool from
/// `input` and pass only if it is true; a missing byte rejects.
pub fn accept(request: &Request, input: &mut ByteConsumer<'_>) -> bool {
    if !is_guarded(request) {
        return true;
    }
    input.bool().unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rkv_server::request::{ClusterVersionSetRequest, CompactionRequest};

    fn version_set() -> Request {
        Request::ClusterVersionSet(ClusterVersionSetRequest { ver: "3.6.0".into() })
    }

    #[test]
    fn test_unguarded_variants_consume_nothing() {
        let mut input = ByteConsumer::new(&[0]);
        assert!(accept(&Request::AuthDisable, &mut input));
        assert!(accept(
            &Request::Compaction(CompactionRequest { revision: 1 }),
            &mut input
        ));
        assert_eq!(input.consumed(), 0);
    }

    #[test]
    fn test_guarded_variant_needs_true_byte() {
        assert!(accept(&version_set(), &mut ByteConsumer::new(&[1])));
        assert!(!accept(&version_set(), &mut ByteConsumer::new(&[0])));
        assert!(!accept(&version_set(), &mut ByteConsumer::new(&[])));
    }
}
