use std::cmp::Ordering;
use std::sync::Arc;

use crate::coding::put_fixed_u64;
use crate::key_types::{self, extract_tag, extract_user_key};
use crate::types::{MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK};

/// Comparator trait, supporting types that can be nested (i.e., add additional
/// functionality on top of an inner comparator).
pub trait Cmp {
    /// Compare two byte strings.
    fn cmp(&self, a: &[u8], b: &[u8]) -> Ordering;
    /// Return the shortest byte string S with `a <= S < b`, or `a` itself when no such
    /// shortening exists (for example when `a` is a prefix of `b`).
    fn find_shortest_sep(&self, a: &[u8], b: &[u8]) -> Vec<u8>;
    /// Return the shortest byte string that compares greater than or equal to `a`.
    fn find_short_succ(&self, a: &[u8]) -> Vec<u8>;
    /// A unique identifier for a comparator. A comparator wrapper (like InternalKeyCmp)
    /// may return the id of its inner comparator.
    fn id(&self) -> &'static str;
}

/// Comparators are stateless or share immutable state, so they can cross threads.
pub type BoxedCmp = Arc<Box<dyn Cmp + Send + Sync>>;

/// Lexicographic byte-order comparator.
#[derive(Clone)]
pub struct DefaultCmp;

impl Cmp for DefaultCmp {
    fn cmp(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn id(&self) -> &'static str {
        "stonetable.BytewiseComparator"
    }

    fn find_shortest_sep(&self, a: &[u8], b: &[u8]) -> Vec<u8> {
        let min = a.len().min(b.len());
        let mut diff_at = 0;

        while diff_at < min && a[diff_at] == b[diff_at] {
            diff_at += 1;
        }

        if diff_at >= min {
            // One string is a prefix of the other; do not shorten.
            return a.to_vec();
        }

        let diff_byte = a[diff_at];
        if diff_byte < 0xff && diff_byte + 1 < b[diff_at] {
            let mut sep = a[..diff_at + 1].to_vec();
            sep[diff_at] += 1;
            assert_eq!(self.cmp(&sep, b), Ordering::Less);
            return sep;
        }

        a.to_vec()
    }

    fn find_short_succ(&self, a: &[u8]) -> Vec<u8> {
        for i in 0..a.len() {
            if a[i] < 0xff {
                let mut succ = a[..i + 1].to_vec();
                succ[i] += 1;
                return succ;
            }
        }
        // All 0xff: no shorter successor exists.
        a.to_vec()
    }
}

/// Orders internal keys by (user key ascending, tag descending); a larger tag means a
/// newer entry, which sorts first so seeks find the newest visible version.
#[derive(Clone)]
pub struct InternalKeyCmp(pub BoxedCmp);

impl InternalKeyCmp {
    /// cmp_inner compares a and b using the wrapped comparator (the "user comparator").
    fn cmp_inner(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.0.cmp(a, b)
    }

    fn max_seek_tag() -> u64 {
        key_types::pack_sequence_and_type(MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK)
    }
}

impl Cmp for InternalKeyCmp {
    fn cmp(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self.cmp_inner(extract_user_key(a), extract_user_key(b)) {
            Ordering::Less => Ordering::Less,
            Ordering::Greater => Ordering::Greater,
            // reverse comparison!
            Ordering::Equal => extract_tag(b).cmp(&extract_tag(a)),
        }
    }

    fn id(&self) -> &'static str {
        self.0.id()
    }

    fn find_shortest_sep(&self, a: &[u8], b: &[u8]) -> Vec<u8> {
        let user_a = extract_user_key(a);
        let user_b = extract_user_key(b);

        let sep = self.0.find_shortest_sep(user_a, user_b);
        if sep.len() < user_a.len() && self.cmp_inner(user_a, &sep) == Ordering::Less {
            // The user key was shortened strictly upward: tack on the highest possible
            // tag and verify the result still falls strictly between a and b.
            let mut result = sep;
            put_fixed_u64(&mut result, Self::max_seek_tag());
            if self.cmp(a, &result) == Ordering::Less && self.cmp(&result, b) == Ordering::Less {
                return result;
            }
        }
        a.to_vec()
    }

    fn find_short_succ(&self, a: &[u8]) -> Vec<u8> {
        let user_a = extract_user_key(a);

        let succ = self.0.find_short_succ(user_a);
        if succ.len() < user_a.len() && self.cmp_inner(user_a, &succ) == Ordering::Less {
            let mut result = succ;
            put_fixed_u64(&mut result, Self::max_seek_tag());
            if self.cmp(a, &result) == Ordering::Less {
                return result;
            }
        }
        a.to_vec()
    }
}

/// Orders memtable entries: the length-prefixed internal key at the front of each entry
/// is compared with internal-key ordering. This is the comparator a memtable's skiplist
/// runs on.
#[derive(Clone)]
pub struct MemtableKeyCmp(pub BoxedCmp);

impl MemtableKeyCmp {
    fn internal_key(mkey: &[u8]) -> &[u8] {
        let (ukeylen, keyoff, _, _, _) = key_types::parse_memtable_key(mkey);
        &mkey[keyoff..keyoff + ukeylen + 8]
    }
}

impl Cmp for MemtableKeyCmp {
    fn cmp(&self, a: &[u8], b: &[u8]) -> Ordering {
        let ika = Self::internal_key(a);
        let ikb = Self::internal_key(b);

        match self.0.cmp(extract_user_key(ika), extract_user_key(ikb)) {
            Ordering::Less => Ordering::Less,
            Ordering::Greater => Ordering::Greater,
            // reverse!
            Ordering::Equal => extract_tag(ikb).cmp(&extract_tag(ika)),
        }
    }

    fn id(&self) -> &'static str {
        self.0.id()
    }

    // Separators are meaningless on memtable keys; nothing ever writes them to a table.
    fn find_shortest_sep(&self, _: &[u8], _: &[u8]) -> Vec<u8> {
        panic!("find_shortest_sep is invalid on MemtableKeyCmp");
    }

    fn find_short_succ(&self, _: &[u8]) -> Vec<u8> {
        panic!("find_short_succ is invalid on MemtableKeyCmp");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_types::{build_memtable_key, LookupKey, ParsedInternalKey};
    use crate::types::ValueType;

    fn ikey(ukey: &[u8], seq: u64, t: ValueType) -> Vec<u8> {
        ParsedInternalKey::new(ukey, seq, t).encode()
    }

    #[test]
    fn test_default_cmp_shortest_sep() {
        assert_eq!(
            DefaultCmp.find_shortest_sep(b"abcd", b"abcf"),
            b"abce".to_vec()
        );
        assert_eq!(DefaultCmp.find_shortest_sep(b"foo", b"hello"), b"g".to_vec());
        // Adjacent differing bytes: no room for a strictly smaller separator.
        assert_eq!(DefaultCmp.find_shortest_sep(b"abc", b"acd"), b"abc".to_vec());
        // Prefix relationships leave the start unchanged.
        assert_eq!(DefaultCmp.find_shortest_sep(b"ab", b"abcd"), b"ab".to_vec());
        assert_eq!(DefaultCmp.find_shortest_sep(b"abcd", b"ab"), b"abcd".to_vec());
        assert_eq!(DefaultCmp.find_shortest_sep(b"", b""), b"".to_vec());
        // A shared 0xff prefix does not prevent incrementing a later byte.
        assert_eq!(
            DefaultCmp.find_shortest_sep(&[0xff, 0x01], &[0xff, 0xff, 0x02]),
            vec![0xff, 0x02]
        );
    }

    #[test]
    fn test_default_cmp_short_succ() {
        assert_eq!(DefaultCmp.find_short_succ(b"abcd"), b"b".to_vec());
        assert_eq!(DefaultCmp.find_short_succ(&[0xff, 0x00]), vec![0xff, 0x01]);
        assert_eq!(
            DefaultCmp.find_short_succ(&[0xff, 0xff, 0xff]),
            vec![0xff, 0xff, 0xff]
        );
        assert_eq!(DefaultCmp.find_short_succ(b""), b"".to_vec());
    }

    #[test]
    fn test_internal_key_cmp_ordering() {
        let cmp = InternalKeyCmp(Arc::new(Box::new(DefaultCmp)));

        // Same user key: higher sequence sorts first.
        let newer = ikey(b"abc", 2, ValueType::TypeValue);
        let older = ikey(b"abc", 1, ValueType::TypeValue);
        assert_eq!(cmp.cmp(&newer, &older), Ordering::Less);
        assert_eq!(cmp.cmp(&older, &newer), Ordering::Greater);
        assert_eq!(cmp.cmp(&newer, &newer), Ordering::Equal);

        // Same user key and sequence: Value sorts before Deletion.
        let val = ikey(b"abc", 5, ValueType::TypeValue);
        let del = ikey(b"abc", 5, ValueType::TypeDeletion);
        assert_eq!(cmp.cmp(&val, &del), Ordering::Less);

        // Different user keys dominate.
        let a = ikey(b"abc", 1, ValueType::TypeValue);
        let b = ikey(b"abd", 9, ValueType::TypeValue);
        assert_eq!(cmp.cmp(&a, &b), Ordering::Less);
    }

    #[test]
    fn test_internal_key_cmp_tag_monotone() {
        // Fixing the user key, a larger sequence gives a smaller internal key.
        let cmp = InternalKeyCmp(Arc::new(Box::new(DefaultCmp)));
        let mut prev = ikey(b"k", 1 << 40, ValueType::TypeValue);
        for seq in [(1u64 << 33), 1 << 20, 300, 2, 1, 0] {
            let cur = ikey(b"k", seq, ValueType::TypeValue);
            assert_eq!(cmp.cmp(&prev, &cur), Ordering::Less);
            prev = cur;
        }
    }

    #[test]
    fn test_internal_key_cmp_shortest_sep() {
        let cmp = InternalKeyCmp(Arc::new(Box::new(DefaultCmp)));

        let sep = cmp.find_shortest_sep(
            &ikey(b"foo", 100, ValueType::TypeValue),
            &ikey(b"hello", 200, ValueType::TypeValue),
        );
        assert_eq!(
            sep,
            ikey(b"g", MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK)
        );

        // Same user key: no separator exists, start is unchanged.
        let start = ikey(b"foo", 100, ValueType::TypeValue);
        let sep = cmp.find_shortest_sep(&start, &ikey(b"foo", 99, ValueType::TypeValue));
        assert_eq!(sep, start);

        let start = ikey(b"abc", 1, ValueType::TypeValue);
        let sep = cmp.find_shortest_sep(&start, &ikey(b"zzz", 2, ValueType::TypeValue));
        assert_eq!(sep, ikey(b"b", MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK));
    }

    #[test]
    fn test_internal_key_cmp_short_succ() {
        let cmp = InternalKeyCmp(Arc::new(Box::new(DefaultCmp)));
        let succ = cmp.find_short_succ(&ikey(b"foo", 100, ValueType::TypeValue));
        assert_eq!(succ, ikey(b"g", MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK));

        let all_ff = ikey(&[0xff, 0xff], 3, ValueType::TypeValue);
        assert_eq!(cmp.find_short_succ(&all_ff), all_ff);
    }

    #[test]
    fn test_memtable_key_cmp() {
        let cmp = MemtableKeyCmp(Arc::new(Box::new(DefaultCmp)));

        let a = build_memtable_key(b"abc", b"v1", ValueType::TypeValue, 2);
        let b = build_memtable_key(b"abc", b"v0", ValueType::TypeValue, 1);
        let c = build_memtable_key(b"abd", b"v2", ValueType::TypeValue, 3);

        assert_eq!(cmp.cmp(&a, &b), Ordering::Less);
        assert_eq!(cmp.cmp(&b, &c), Ordering::Less);
        assert_eq!(cmp.cmp(&a, &a), Ordering::Equal);

        // A lookup key (no value section) compares against full entries: seeking at
        // sequence 5 must land at-or-before the entry with sequence 4.
        let lk = LookupKey::new(b"abc", 5);
        let entry = build_memtable_key(b"abc", b"v", ValueType::TypeValue, 4);
        assert_eq!(cmp.cmp(lk.memtable_key(), &entry), Ordering::Less);
        let lk = LookupKey::new(b"abc", 4);
        assert_eq!(cmp.cmp(lk.memtable_key(), &entry), Ordering::Equal);
        let lk = LookupKey::new(b"abc", 3);
        assert_eq!(cmp.cmp(lk.memtable_key(), &entry), Ordering::Greater);
    }

    #[test]
    #[should_panic]
    fn test_memtable_key_cmp_sep_panics() {
        let cmp = MemtableKeyCmp(Arc::new(Box::new(DefaultCmp)));
        cmp.find_shortest_sep(&[1, 2, 3], &[4, 5, 6]);
    }
}
