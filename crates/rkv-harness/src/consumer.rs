// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RKV - STRUCTURED INPUT DECODER
//
// Turns a fuzzer byte buffer into typed values. Decoding is a pure function of
// the buffer: the same bytes always give the same values, and a value that
// needs more bytes than remain fails with ConsumeError::Exhausted instead of
// being padded with zeros.
//
// Wire format (DECODER_FORMAT_VERSION 1):
//   int       1 byte
//   bool      1 byte, low bit
//   u32/u64   big-endian; i64 big-endian two's complement
//   bytes     u32 length, then that many bytes
//   string    bytes, lossy UTF-8
//   tag       1 byte modulo the variant count
//   Option    bool, then the value if set
//   repeated  u32 count modulo MAX_REPEATED, then each element
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use arbitrary::Unstructured;
use thiserror::Error;

use rkv_server::entry::{EntryType, LogEntry};
use rkv_server::membership::Attributes;
use rkv_server::request::{
    AlarmAction, AlarmRequest, AlarmType, ClusterMemberAttrSetRequest, ClusterVersionSetRequest,
    CompactionRequest, DeleteRangeRequest, DowngradeInfoSetRequest, InternalRequest,
    LeaseGrantRequest, LeaseRevokeRequest, PutRequest, Request, RequestHeader,
};

/// Bump whenever the wire format above changes; saved corpora decode
/// differently afterwards.
pub const DECODER_FORMAT_VERSION: u32 = 1;

/// Upper bound (exclusive) on decoded repeated-field lengths.
pub const MAX_REPEATED: u32 = 8;

const ENTRY_TYPE_VARIANTS: u8 = 2;
const REQUEST_VARIANTS: u8 = 11;
const ALARM_ACTION_VARIANTS: u8 = 3;
const ALARM_TYPE_VARIANTS: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConsumeError {
    #[error("input exhausted: needed {needed} bytes, {remaining} remaining")]
    Exhausted { needed: usize, remaining: usize },
}

/// Cursor over the fuzzer input. Only ever moves forward.
pub struct ByteConsumer<'a> {
    input: Unstructured<'a>,
    consumed: usize,
}

impl<'a> ByteConsumer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            input: Unstructured::new(data),
            consumed: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.input.len()
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Take exactly `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], ConsumeError> {
        let remaining = self.input.len();
        if n > remaining {
            return Err(ConsumeError::Exhausted {
                needed: n,
                remaining,
            });
        }
        let bytes = self
            .input
            .bytes(n)
            .map_err(|_| ConsumeError::Exhausted {
                needed: n,
                remaining,
            })?;
        self.consumed += n;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ConsumeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn int(&mut self) -> Result<u8, ConsumeError> {
        Ok(self.take(1)?[0])
    }

    pub fn bool(&mut self) -> Result<bool, ConsumeError> {
        Ok(self.int()? & 1 == 1)
    }

    pub fn u32(&mut self) -> Result<u32, ConsumeError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64, ConsumeError> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    pub fn i64(&mut self) -> Result<i64, ConsumeError> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    pub fn bytes(&mut self) -> Result<Vec<u8>, ConsumeError> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn string(&mut self) -> Result<String, ConsumeError> {
        let len = self.u32()? as usize;
        Ok(String::from_utf8_lossy(self.take(len)?).into_owned())
    }

    /// Variant index in `0..variants`.
    pub fn tag(&mut self, variants: u8) -> Result<u8, ConsumeError> {
        debug_assert!(variants > 0);
        Ok(self.int()? % variants)
    }

    pub fn option<T: Generate>(&mut self) -> Result<Option<T>, ConsumeError> {
        if self.bool()? {
            Ok(Some(T::generate(self)?))
        } else {
            Ok(None)
        }
    }

    pub fn repeated<T: Generate>(&mut self) -> Result<Vec<T>, ConsumeError> {
        let count = self.u32()? % MAX_REPEATED;
        (0..count).map(|_| T::generate(self)).collect()
    }

    pub fn generate<T: Generate>(&mut self) -> Result<T, ConsumeError> {
        T::generate(self)
    }
}

/// A shape the decoder knows how to fill in from input bytes.
pub trait Generate: Sized {
    fn generate(input: &mut ByteConsumer<'_>) -> Result<Self, ConsumeError>;
}

impl Generate for bool {
    fn generate(input: &mut ByteConsumer<'_>) -> Result<Self, ConsumeError> {
        input.bool()
    }
}

impl Generate for u32 {
    fn generate(input: &mut ByteConsumer<'_>) -> Result<Self, ConsumeError> {
        input.u32()
    }
}

impl Generate for u64 {
    fn generate(input: &mut ByteConsumer<'_>) -> Result<Self, ConsumeError> {
        input.u64()
    }
}

impl Generate for i64 {
    fn generate(input: &mut ByteConsumer<'_>) -> Result<Self, ConsumeError> {
        input.i64()
    }
}

impl Generate for String {
    fn generate(input: &mut ByteConsumer<'_>) -> Result<Self, ConsumeError> {
        input.string()
    }
}

impl Generate for LogEntry {
    fn generate(input: &mut ByteConsumer<'_>) -> Result<Self, ConsumeError> {
        let term = input.u64()?;
        let index = input.u64()?;
        let entry_type = match input.tag(ENTRY_TYPE_VARIANTS)? {
            0 => EntryType::Normal,
            _ => EntryType::ConfChange,
        };
        let data = input.bytes()?;
        Ok(LogEntry {
            term,
            index,
            entry_type,
            data,
        })
    }
}

impl Generate for AlarmAction {
    fn generate(input: &mut ByteConsumer<'_>) -> Result<Self, ConsumeError> {
        Ok(match input.tag(ALARM_ACTION_VARIANTS)? {
            0 => AlarmAction::Get,
            1 => AlarmAction::Activate,
            _ => AlarmAction::Deactivate,
        })
    }
}

impl Generate for AlarmType {
    fn generate(input: &mut ByteConsumer<'_>) -> Result<Self, ConsumeError> {
        Ok(match input.tag(ALARM_TYPE_VARIANTS)? {
            0 => AlarmType::None,
            1 => AlarmType::Nospace,
            _ => AlarmType::Corrupt,
        })
    }
}

impl Generate for Attributes {
    fn generate(input: &mut ByteConsumer<'_>) -> Result<Self, ConsumeError> {
        Ok(Attributes {
            name: input.string()?,
            client_urls: input.repeated()?,
        })
    }
}

impl Generate for Request {
    fn generate(input: &mut ByteConsumer<'_>) -> Result<Self, ConsumeError> {
        let request = match input.tag(REQUEST_VARIANTS)? {
            0 => Request::Put(PutRequest {
                key: input.bytes()?,
                value: input.bytes()?,
                lease: input.i64()?,
                prev_kv: input.bool()?,
            }),
            1 => Request::DeleteRange(DeleteRangeRequest {
                key: input.bytes()?,
                range_end: input.bytes()?,
                prev_kv: input.bool()?,
            }),
            2 => Request::Compaction(CompactionRequest {
                revision: input.i64()?,
            }),
            3 => Request::LeaseGrant(LeaseGrantRequest {
                id: input.i64()?,
                ttl: input.i64()?,
            }),
            4 => Request::LeaseRevoke(LeaseRevokeRequest { id: input.i64()? }),
            5 => Request::Alarm(AlarmRequest {
                action: input.generate()?,
                member_id: input.u64()?,
                alarm: input.generate()?,
            }),
            6 => Request::AuthEnable,
            7 => Request::AuthDisable,
            8 => Request::ClusterVersionSet(ClusterVersionSetRequest {
                ver: input.string()?,
            }),
            9 => Request::ClusterMemberAttrSet(ClusterMemberAttrSetRequest {
                member_id: input.u64()?,
                attributes: input.generate()?,
            }),
            _ => Request::DowngradeInfoSet(DowngradeInfoSetRequest {
                enabled: input.bool()?,
                ver: input.string()?,
            }),
        };
        Ok(request)
    }
}

impl Generate for InternalRequest {
    fn generate(input: &mut ByteConsumer<'_>) -> Result<Self, ConsumeError> {
        let header = RequestHeader {
            id: input.u64()?,
            username: input.string()?,
        };
        let request = input.generate()?;
        Ok(InternalRequest { header, request })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_are_big_endian() {
        let mut c = ByteConsumer::new(&[0, 0, 1, 0, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe]);
        assert_eq!(c.u32().unwrap(), 256);
        assert_eq!(c.i64().unwrap(), -2);
        assert_eq!(c.remaining(), 0);
    }

    #[test]
    fn test_exhaustion_does_not_fabricate() {
        let mut c = ByteConsumer::new(&[1, 2, 3]);
        assert_eq!(
            c.u64(),
            Err(ConsumeError::Exhausted {
                needed: 8,
                remaining: 3
            })
        );
        // A failed read leaves the cursor where it was.
        assert_eq!(c.consumed(), 0);
        assert_eq!(c.int().unwrap(), 1);
    }

    #[test]
    fn test_bytes_length_prefix_must_be_satisfied() {
        let mut c = ByteConsumer::new(&[0, 0, 0, 4, b'a', b'b']);
        assert!(c.bytes().is_err());

        let mut c = ByteConsumer::new(&[0, 0, 0, 2, b'a', b'b']);
        assert_eq!(c.bytes().unwrap(), b"ab");
        assert_eq!(c.consumed(), 6);
    }

    #[test]
    fn test_string_is_lossy() {
        let mut c = ByteConsumer::new(&[0, 0, 0, 2, 0xff, b'x']);
        assert_eq!(c.string().unwrap(), "\u{fffd}x");
    }

    #[test]
    fn test_bool_uses_low_bit() {
        let mut c = ByteConsumer::new(&[2, 3]);
        assert!(!c.bool().unwrap());
        assert!(c.bool().unwrap());
    }

    #[test]
    fn test_option_and_repeated() {
        let mut c = ByteConsumer::new(&[0, 1, 0, 0, 0, 7, 0, 0, 0, 9, 0, 0, 0, 1, 0, 0, 0, 5]);
        assert_eq!(c.option::<u32>().unwrap(), None);
        assert_eq!(c.option::<u32>().unwrap(), Some(7));
        // 9 % MAX_REPEATED == 1
        assert_eq!(c.repeated::<u32>().unwrap(), vec![1]);
        assert_eq!(c.u32().unwrap(), 5);
    }

    #[test]
    fn test_log_entry_field_order() {
        let mut data = Vec::new();
        data.extend_from_slice(&3u64.to_be_bytes());
        data.extend_from_slice(&9u64.to_be_bytes());
        data.push(5); // 5 % 2 == 1
        data.extend_from_slice(&1u32.to_be_bytes());
        data.push(0xaa);

        let entry: LogEntry = ByteConsumer::new(&data).generate().unwrap();
        assert_eq!(entry.term, 3);
        assert_eq!(entry.index, 9);
        assert_eq!(entry.entry_type, EntryType::ConfChange);
        assert_eq!(entry.data, vec![0xaa]);
    }

    #[test]
    fn test_internal_request_tag_wraps() {
        let mut data = Vec::new();
        data.extend_from_slice(&77u64.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.push(11 + 6); // wraps to AuthEnable

        let req: InternalRequest = ByteConsumer::new(&data).generate().unwrap();
        assert_eq!(req.header.id, 77);
        assert_eq!(req.request, Request::AuthEnable);
    }

    #[test]
    fn test_decoding_is_deterministic() {
        let data: Vec<u8> = (0..200u8).map(|b| b.wrapping_mul(37)).collect();
        let a = ByteConsumer::new(&data).generate::<InternalRequest>();
        let b = ByteConsumer::new(&data).generate::<InternalRequest>();
        assert_eq!(a, b);
    }
}
