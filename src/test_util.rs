//! A vector-backed `SsIterator` used to pin down the trait contract that the real
//! iterators (block, skiplist, memtable, table) follow.

use std::cmp::Ordering;

use crate::cmp::{Cmp, DefaultCmp};
use crate::types::SsIterator;

pub struct TestSsIter<'a> {
    v: Vec<(&'a [u8], &'a [u8])>,
    ix: usize,
    init: bool,
}

impl<'a> TestSsIter<'a> {
    pub fn new(v: Vec<(&'a [u8], &'a [u8])>) -> TestSsIter<'a> {
        TestSsIter {
            v,
            ix: 0,
            init: false,
        }
    }
}

impl<'a> SsIterator for TestSsIter<'a> {
    fn valid(&self) -> bool {
        self.init && self.ix < self.v.len()
    }

    fn seek(&mut self, key: &[u8]) {
        self.ix = 0;
        self.init = true;
        while self.ix < self.v.len() && DefaultCmp.cmp(self.v[self.ix].0, key) == Ordering::Less {
            self.ix += 1;
        }
    }

    fn seek_to_first(&mut self) {
        self.ix = 0;
        self.init = true;
    }

    fn seek_to_last(&mut self) {
        self.ix = if self.v.is_empty() { 0 } else { self.v.len() - 1 };
        self.init = !self.v.is_empty();
    }

    fn advance(&mut self) -> bool {
        if !self.valid() {
            return false;
        }
        self.ix += 1;
        self.valid()
    }

    fn prev(&mut self) -> bool {
        if !self.valid() || self.ix == 0 {
            self.init = false;
            return false;
        }
        self.ix -= 1;
        true
    }

    fn current_key(&self) -> Option<&[u8]> {
        if self.valid() {
            Some(self.v[self.ix].0)
        } else {
            None
        }
    }

    fn current_value(&self) -> Option<&[u8]> {
        if self.valid() {
            Some(self.v[self.ix].1)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_iter<'a>() -> TestSsIter<'a> {
        TestSsIter::new(vec![
            (b"ka", b"va"),
            (b"kb", b"vb"),
            (b"kc", b"vc"),
        ])
    }

    #[test]
    fn test_iter_contract() {
        let mut it = make_iter();

        // Unpositioned iterators are invalid and yield nothing.
        assert!(!it.valid());
        assert!(it.current_key().is_none());
        assert!(it.current_kv().is_none());

        it.seek_to_first();
        assert!(it.valid());
        assert_eq!(it.current_kv(), Some((b"ka".to_vec(), b"va".to_vec())));

        assert!(it.advance());
        assert_eq!(it.current_key(), Some(&b"kb"[..]));
        assert!(it.prev());
        assert_eq!(it.current_key(), Some(&b"ka"[..]));
        assert!(!it.prev());
        assert!(!it.valid());

        it.seek_to_last();
        assert_eq!(it.current_key(), Some(&b"kc"[..]));
        assert!(!it.advance());
        assert!(!it.valid());

        it.seek(b"kb");
        assert_eq!(it.current_key(), Some(&b"kb"[..]));
        it.seek(b"kba");
        assert_eq!(it.current_key(), Some(&b"kc"[..]));
        it.seek(b"kd");
        assert!(!it.valid());
    }
}
