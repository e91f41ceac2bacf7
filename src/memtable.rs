//! The in-memory write buffer. Entries are encoded as
//! `varint(len(user_key)+8) || user_key || tag || varint(len(value)) || value` and
//! stored whole in the key slot of a skiplist ordered by `MemtableKeyCmp`, so one
//! ordered structure serves point reads, range scans and the eventual flush into a
//! table.

use std::sync::Arc;

use integer_encoding::VarInt;

use crate::cmp::{BoxedCmp, MemtableKeyCmp};
use crate::error::{Result, Status, StatusCode};
use crate::key_types::{build_memtable_key, parse_memtable_key, LookupKey};
use crate::skipmap::{SkipMap, SkipMapIter};
use crate::types::{SequenceNumber, SsIterator, ValueType};

pub struct MemTable {
    map: SkipMap,
    cmp: BoxedCmp,
}

impl MemTable {
    /// Creates a memtable ordered by `cmp` over user keys (newest entry first within a
    /// user key).
    pub fn new(cmp: BoxedCmp) -> MemTable {
        MemTable {
            map: SkipMap::new(Arc::new(Box::new(MemtableKeyCmp(cmp.clone())))),
            cmp,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn approx_mem_usage(&self) -> usize {
        self.map.approx_memory()
    }

    /// Adds an entry. Requires a sequence number never used before; the `&mut`
    /// receiver keeps writers exclusive while readers go through shared references.
    pub fn add(&mut self, seq: SequenceNumber, t: ValueType, key: &[u8], value: &[u8]) {
        self.map.insert(build_memtable_key(key, value, t, seq))
    }

    /// Point lookup. A live entry returns its value; a tombstone at or below the
    /// lookup sequence reports `NotFound` just like a plain miss (callers tell the
    /// two apart by where in the read path the answer came from).
    pub fn get(&self, key: &LookupKey) -> Result<Vec<u8>> {
        let mut iter = self.map.iter();
        iter.seek(key.memtable_key());

        if let Some(entry) = iter.current_key() {
            // The seek landed on the first entry at or after the lookup key; it is
            // only an answer if its user key matches.
            let (ukeylen, keyoff, tag, vallen, valoff) = parse_memtable_key(entry);
            if self.cmp.cmp(&entry[keyoff..keyoff + ukeylen], key.user_key())
                == std::cmp::Ordering::Equal
            {
                if tag & 0xff == ValueType::TypeValue as u64 {
                    return Ok(entry[valoff..valoff + vallen].to_vec());
                }
                return Err(Status::new(StatusCode::NotFound, "deleted"));
            }
        }
        Err(Status::new(StatusCode::NotFound, "not found"))
    }

    pub fn iter(&self) -> MemtableIterator {
        MemtableIterator {
            skipmap_iter: self.map.iter(),
        }
    }
}

/// Iterates over whole memtable entries, exposing the internal key and the value of
/// each. Tombstones appear like any other entry; a flush needs to see them.
pub struct MemtableIterator<'a> {
    skipmap_iter: SkipMapIter<'a>,
}

impl<'a> MemtableIterator<'a> {
    fn current_entry(&self) -> Option<&[u8]> {
        self.skipmap_iter.current_key()
    }
}

impl<'a> SsIterator for MemtableIterator<'a> {
    fn valid(&self) -> bool {
        self.skipmap_iter.valid()
    }

    /// Seeks to the first entry with an internal key at or after `target` (an internal
    /// key). The skiplist stores length-prefixed entries, so the prefix is added
    /// before delegating.
    fn seek(&mut self, target: &[u8]) {
        let mut mkey = target.len().encode_var_vec();
        mkey.extend_from_slice(target);
        self.skipmap_iter.seek(&mkey);
    }

    fn seek_to_first(&mut self) {
        self.skipmap_iter.seek_to_first()
    }

    fn seek_to_last(&mut self) {
        self.skipmap_iter.seek_to_last()
    }

    fn advance(&mut self) -> bool {
        self.skipmap_iter.advance()
    }

    fn prev(&mut self) -> bool {
        self.skipmap_iter.prev()
    }

    fn current_key(&self) -> Option<&[u8]> {
        self.current_entry().map(|entry| {
            let (ukeylen, keyoff, _, _, _) = parse_memtable_key(entry);
            &entry[keyoff..keyoff + ukeylen + 8]
        })
    }

    fn current_value(&self) -> Option<&[u8]> {
        self.current_entry().map(|entry| {
            let (_, _, _, vallen, valoff) = parse_memtable_key(entry);
            &entry[valoff..valoff + vallen]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmp::DefaultCmp;
    use crate::key_types::{extract_tag, extract_user_key, parse_tag};

    fn user_cmp() -> BoxedCmp {
        Arc::new(Box::new(DefaultCmp))
    }

    fn get_memtable() -> MemTable {
        let mut mt = MemTable::new(user_cmp());
        let entries = [
            (120, "abc", "123"),
            (121, "abd", "124"),
            (122, "abe", "125"),
            (123, "abf", "126"),
        ];
        for (seq, k, v) in entries {
            mt.add(seq, ValueType::TypeValue, k.as_bytes(), v.as_bytes());
        }
        mt
    }

    #[test]
    fn test_memtable_add_get() {
        let mt = get_memtable();
        assert_eq!(mt.len(), 4);

        assert_eq!(
            mt.get(&LookupKey::new(b"abc", 120)).unwrap(),
            b"123".to_vec()
        );
        assert_eq!(
            mt.get(&LookupKey::new(b"abe", 122)).unwrap(),
            b"125".to_vec()
        );
        // A later snapshot still sees the entry.
        assert_eq!(
            mt.get(&LookupKey::new(b"abc", 124)).unwrap(),
            b"123".to_vec()
        );
        // An earlier snapshot does not.
        assert!(mt.get(&LookupKey::new(b"abc", 119)).is_err());
        // Unknown key.
        assert!(mt.get(&LookupKey::new(b"xyz", 1000)).is_err());
    }

    #[test]
    fn test_memtable_versions() {
        let mut mt = MemTable::new(user_cmp());
        mt.add(1, ValueType::TypeValue, b"k", b"v1");
        mt.add(5, ValueType::TypeValue, b"k", b"v2");

        assert_eq!(mt.get(&LookupKey::new(b"k", 1)).unwrap(), b"v1".to_vec());
        assert_eq!(mt.get(&LookupKey::new(b"k", 4)).unwrap(), b"v1".to_vec());
        assert_eq!(mt.get(&LookupKey::new(b"k", 5)).unwrap(), b"v2".to_vec());
        assert_eq!(mt.get(&LookupKey::new(b"k", 100)).unwrap(), b"v2".to_vec());
    }

    #[test]
    fn test_memtable_tombstone() {
        let mut mt = MemTable::new(user_cmp());
        mt.add(1, ValueType::TypeValue, b"k", b"v");
        mt.add(2, ValueType::TypeDeletion, b"k", b"");

        // Before the deletion the value is visible, after it the key reads as gone.
        assert_eq!(mt.get(&LookupKey::new(b"k", 1)).unwrap(), b"v".to_vec());
        let err = mt.get(&LookupKey::new(b"k", 2)).unwrap_err();
        assert_eq!(err.code, StatusCode::NotFound);
        let err = mt.get(&LookupKey::new(b"k", 100)).unwrap_err();
        assert_eq!(err.code, StatusCode::NotFound);
    }

    #[test]
    fn test_memtable_iterator() {
        let mt = get_memtable();
        let mut iter = mt.iter();

        assert!(!iter.valid());
        iter.seek_to_first();
        assert!(iter.valid());
        assert_eq!(extract_user_key(iter.current_key().unwrap()), b"abc");
        assert_eq!(iter.current_value(), Some(&b"123"[..]));
        assert_eq!(
            parse_tag(extract_tag(iter.current_key().unwrap())),
            (ValueType::TypeValue as u8, 120)
        );

        assert!(iter.advance());
        assert_eq!(extract_user_key(iter.current_key().unwrap()), b"abd");

        iter.seek_to_last();
        assert_eq!(extract_user_key(iter.current_key().unwrap()), b"abf");
        assert!(iter.prev());
        assert_eq!(extract_user_key(iter.current_key().unwrap()), b"abe");
    }

    #[test]
    fn test_memtable_iterator_seek() {
        let mt = get_memtable();
        let mut iter = mt.iter();

        // Seek with an internal key: user key plus a seek tag.
        let target = LookupKey::new(b"abd", 121);
        iter.seek(target.internal_key());
        assert!(iter.valid());
        assert_eq!(extract_user_key(iter.current_key().unwrap()), b"abd");
        assert_eq!(iter.current_value(), Some(&b"124"[..]));

        // Between keys: lands on the next greater user key.
        let target = LookupKey::new(b"abcz", 200);
        iter.seek(target.internal_key());
        assert_eq!(extract_user_key(iter.current_key().unwrap()), b"abd");

        let target = LookupKey::new(b"zzz", 200);
        iter.seek(target.internal_key());
        assert!(!iter.valid());
    }

    #[test]
    fn test_memtable_iterator_sees_tombstones() {
        let mut mt = MemTable::new(user_cmp());
        mt.add(1, ValueType::TypeValue, b"a", b"v");
        mt.add(2, ValueType::TypeDeletion, b"a", b"");

        let mut iter = mt.iter();
        iter.seek_to_first();

        // The deletion (seq 2) sorts before the older value.
        let mut kinds = Vec::new();
        while iter.valid() {
            kinds.push(parse_tag(extract_tag(iter.current_key().unwrap())).0);
            iter.advance();
        }
        assert_eq!(
            kinds,
            vec![
                ValueType::TypeDeletion as u8,
                ValueType::TypeValue as u8
            ]
        );
    }

    #[test]
    fn test_memtable_mem_usage_grows() {
        let mut mt = MemTable::new(user_cmp());
        let before = mt.approx_mem_usage();
        mt.add(1, ValueType::TypeValue, b"somekey", b"somevalue");
        assert!(mt.approx_mem_usage() > before);
    }
}
