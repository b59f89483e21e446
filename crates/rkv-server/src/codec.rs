//! Binary encoding for log payloads and backend values.

use bincode::Options;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::ApplyError;

/// Upper bound on any single decoded value.
pub const MAX_DECODE_BYTES: u64 = 4 * 1024 * 1024;

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_DECODE_BYTES)
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, bincode::Error> {
    options().serialize(value)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, bincode::Error> {
    options().deserialize(bytes)
}

/// Decode data that consensus has already accepted. A failure here means the
/// log holds something no proposer could have written.
pub(crate) fn must_decode<T: DeserializeOwned>(
    context: &'static str,
    bytes: &[u8],
) -> Result<T, ApplyError> {
    decode(bytes).map_err(|e| ApplyError::invariant(context, e.to_string()))
}
