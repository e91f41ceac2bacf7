//! The key formats used internally by different modules.
//!
//! A UserKey is the key supplied by the calling application, without any decoration.
//!
//! An InternalKey is [user_key, tag: u64], where the tag packs the sequence number and
//! the value type as `(seq << 8) | type`, stored big-endian. Internal keys are the key
//! type of tables and of memtable iterators.
//!
//! A MemtableKey is [keylen: varint, user_key, tag: u64, vallen: varint, value]; keylen
//! counts the user key plus the 8 tag bytes. The memtable stores whole entries in the
//! key slot of its skiplist.

use integer_encoding::VarInt;

use crate::coding::{decode_fixed_u64, put_fixed_u64, U64_LEN};
use crate::error::{Result, Status, StatusCode};
use crate::types::{SequenceNumber, ValueType, VALUE_TYPE_FOR_SEEK};

pub type UserKey<'a> = &'a [u8];
pub type InternalKey<'a> = &'a [u8];
pub type MemtableKey<'a> = &'a [u8];

/// Packs a sequence number and value type into an 8-byte tag.
pub fn pack_sequence_and_type(seq: SequenceNumber, t: ValueType) -> u64 {
    debug_assert!(seq <= crate::types::MAX_SEQUENCE_NUMBER);
    (seq << 8) | t as u64
}

/// Splits a tag into (type byte, sequence number).
pub fn parse_tag(tag: u64) -> (u8, SequenceNumber) {
    ((tag & 0xff) as u8, tag >> 8)
}

/// The user-key portion of an internal key: everything but the trailing tag.
pub fn extract_user_key(ikey: InternalKey) -> UserKey {
    assert!(ikey.len() >= U64_LEN);
    &ikey[..ikey.len() - U64_LEN]
}

/// The tag of an internal key.
pub fn extract_tag(ikey: InternalKey) -> u64 {
    assert!(ikey.len() >= U64_LEN);
    decode_fixed_u64(&ikey[ikey.len() - U64_LEN..])
}

/// The decomposed form of an internal key. `encode` and `decode` round-trip.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedInternalKey {
    pub user_key: Vec<u8>,
    pub sequence: SequenceNumber,
    pub value_type: ValueType,
}

impl ParsedInternalKey {
    pub fn new(user_key: &[u8], sequence: SequenceNumber, value_type: ValueType) -> Self {
        ParsedInternalKey {
            user_key: user_key.to_vec(),
            sequence,
            value_type,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut ikey = Vec::with_capacity(self.user_key.len() + U64_LEN);
        ikey.extend_from_slice(&self.user_key);
        put_fixed_u64(
            &mut ikey,
            pack_sequence_and_type(self.sequence, self.value_type),
        );
        ikey
    }

    pub fn decode(ikey: InternalKey) -> Result<Self> {
        if ikey.len() < U64_LEN {
            return Err(Status::new(StatusCode::Corruption, "internal key too short"));
        }
        let (typ, seq) = parse_tag(extract_tag(ikey));
        let value_type = match typ {
            0 => ValueType::TypeDeletion,
            1 => ValueType::TypeValue,
            _ => return Err(Status::new(StatusCode::Corruption, "unknown value type")),
        };
        Ok(ParsedInternalKey {
            user_key: extract_user_key(ikey).to_vec(),
            sequence: seq,
            value_type,
        })
    }
}

/// A LookupKey is the memtable key built for a point read: [keylen: varint, user_key,
/// tag(seq, seek)]. It exposes three overlapping views of one allocation.
pub struct LookupKey {
    key: Vec<u8>,
    key_offset: usize,
}

impl LookupKey {
    pub fn new(user_key: &[u8], seq: SequenceNumber) -> LookupKey {
        let internal_keylen = user_key.len() + U64_LEN;
        let mut key = Vec::with_capacity(internal_keylen.required_space() + internal_keylen);

        key.extend_from_slice(&internal_keylen.encode_var_vec());
        let key_offset = key.len();
        key.extend_from_slice(user_key);
        put_fixed_u64(&mut key, pack_sequence_and_type(seq, VALUE_TYPE_FOR_SEEK));

        LookupKey { key, key_offset }
    }

    /// The whole buffer, suitable for seeking a memtable.
    pub fn memtable_key(&self) -> MemtableKey {
        &self.key
    }

    /// The buffer without the length prefix.
    pub fn internal_key(&self) -> InternalKey {
        &self.key[self.key_offset..]
    }

    /// The internal key minus its tag.
    pub fn user_key(&self) -> UserKey {
        &self.key[self.key_offset..self.key.len() - U64_LEN]
    }
}

/// Builds a full memtable entry. The value is encoded into the key that is inserted into
/// the skiplist; lookups only ever search for the next greater entry.
pub fn build_memtable_key(
    key: &[u8],
    value: &[u8],
    t: ValueType,
    seq: SequenceNumber,
) -> Vec<u8> {
    let keysize = key.len() + U64_LEN;
    let valsize = value.len();

    let mut buf = Vec::with_capacity(
        keysize.required_space() + keysize + valsize.required_space() + valsize,
    );

    buf.extend_from_slice(&keysize.encode_var_vec());
    buf.extend_from_slice(key);
    put_fixed_u64(&mut buf, pack_sequence_and_type(seq, t));
    buf.extend_from_slice(&valsize.encode_var_vec());
    buf.extend_from_slice(value);

    buf
}

/// Parses a memtable entry and returns (user key len, user key offset, tag, value len,
/// value offset). Entries without a value section (lookup keys) yield zero for the value
/// fields.
pub fn parse_memtable_key(mkey: MemtableKey) -> (usize, usize, u64, usize, usize) {
    let (keylen, keyoff): (usize, usize) = usize::decode_var(mkey).unwrap();
    let ukeylen = keylen - U64_LEN;

    let mut i = keyoff + ukeylen;
    let tag = decode_fixed_u64(&mkey[i..]);
    i += U64_LEN;

    if i < mkey.len() {
        let (vallen, j): (usize, usize) = usize::decode_var(&mkey[i..]).unwrap();
        (ukeylen, keyoff, tag, vallen, i + j)
    } else {
        (ukeylen, keyoff, tag, 0, 0)
    }
}
