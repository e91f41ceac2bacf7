//! A block is a list of prefix-compressed entries followed by a restart array and a
//! trailing restart count; see `block_builder` for the exact layout. `Block` owns the
//! raw contents of one such block and hands out bidirectional iterators over it.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::cmp::BoxedCmp;
use crate::coding::{decode_fixed_u64, decode_varint_u64, U64_LEN};
use crate::error::{Result, Status, StatusCode};
use crate::options::Options;
use crate::types::SsIterator;

pub type BlockContents = Vec<u8>;

pub struct Block {
    data: Arc<BlockContents>,
    // 0 when the contents are too small or inconsistent; iterators over such a block
    // are never valid.
    size: usize,
    restart_offset: usize,
    cmp: BoxedCmp,
}

impl Block {
    pub fn new(opt: Options, contents: BlockContents) -> Block {
        let mut size = contents.len();
        let mut restart_offset = 0;

        if size < U64_LEN {
            size = 0;
        } else {
            let max_restarts_allowed = (size - U64_LEN) / U64_LEN;
            let num_restarts = decode_fixed_u64(&contents[size - U64_LEN..]) as usize;
            if num_restarts > max_restarts_allowed {
                size = 0;
            } else {
                restart_offset = size - (1 + num_restarts) * U64_LEN;
            }
        }

        Block {
            data: Arc::new(contents),
            size,
            restart_offset,
            cmp: opt.cmp,
        }
    }

    pub fn num_restarts(&self) -> usize {
        if self.size < U64_LEN {
            return 0;
        }
        decode_fixed_u64(&self.data[self.size - U64_LEN..]) as usize
    }

    pub fn iter(&self) -> BlockIter {
        let num_restarts = self.num_restarts();
        if self.size < U64_LEN || num_restarts == 0 {
            // A permanently invalid iterator.
            return BlockIter::new(self.data.clone(), self.cmp.clone(), 0, 0);
        }
        BlockIter::new(
            self.data.clone(),
            self.cmp.clone(),
            self.restart_offset,
            num_restarts,
        )
    }
}

/// Decodes the entry header at the start of `data` (bounded by the restart array),
/// returning `(shared, non_shared, value_len, header_len)`.
fn decode_entry(data: &[u8]) -> Result<(usize, usize, usize, usize)> {
    let corrupt = || Status::new(StatusCode::Corruption, "bad entry in block");

    if data.len() < 3 {
        return Err(corrupt());
    }

    let (shared, non_shared, value_len, header_len);
    if (data[0] | data[1] | data[2]) < 128 {
        // Fast path: all three lengths are one-byte varints.
        shared = data[0] as usize;
        non_shared = data[1] as usize;
        value_len = data[2] as usize;
        header_len = 3;
    } else {
        let (s, slen) = decode_varint_u64(data);
        if slen == 0 {
            return Err(corrupt());
        }
        let (ns, nslen) = decode_varint_u64(&data[slen..]);
        if nslen == 0 {
            return Err(corrupt());
        }
        let (vl, vllen) = decode_varint_u64(&data[slen + nslen..]);
        if vllen == 0 {
            return Err(corrupt());
        }
        shared = s as usize;
        non_shared = ns as usize;
        value_len = vl as usize;
        header_len = slen + nslen + vllen;
    }

    if data.len() - header_len < non_shared + value_len {
        return Err(corrupt());
    }
    Ok((shared, non_shared, value_len, header_len))
}

/// A bidirectional iterator over one block. Once a corruption is encountered the
/// iterator becomes permanently invalid and remembers the error in `status`.
pub struct BlockIter {
    data: Arc<BlockContents>,
    cmp: BoxedCmp,

    // Offset and length of the restart array.
    restarts: usize,
    num_restarts: usize,

    // Offset of the current entry in data; >= restarts if the iterator is invalid.
    current: usize,
    // Index of the restart region containing current.
    restart_index: usize,
    key: Vec<u8>,
    val_offset: usize,
    val_len: usize,

    status: Option<Status>,
}

impl BlockIter {
    fn new(data: Arc<BlockContents>, cmp: BoxedCmp, restarts: usize, num_restarts: usize) -> Self {
        BlockIter {
            data,
            cmp,
            restarts,
            num_restarts,
            current: restarts,
            restart_index: num_restarts,
            key: Vec::new(),
            val_offset: 0,
            val_len: 0,
            status: None,
        }
    }

    /// The first error this iterator ran into, if any.
    pub fn status(&self) -> Result<()> {
        match &self.status {
            Some(s) => Err(s.clone()),
            None => Ok(()),
        }
    }

    fn next_entry_offset(&self) -> usize {
        self.val_offset + self.val_len
    }

    fn restart_point(&self, index: usize) -> usize {
        assert!(index < self.num_restarts);
        decode_fixed_u64(&self.data[self.restarts + index * U64_LEN..]) as usize
    }

    fn seek_to_restart_point(&mut self, index: usize) {
        self.key.clear();
        self.restart_index = index;
        // current is fixed up by parse_next_entry, which starts reading at the end of
        // the current value.
        self.val_offset = self.restart_point(index);
        self.val_len = 0;
    }

    fn invalidate(&mut self) {
        self.current = self.restarts;
        self.restart_index = self.num_restarts;
    }

    fn corruption(&mut self) -> bool {
        self.invalidate();
        self.key.clear();
        self.val_offset = 0;
        self.val_len = 0;
        self.status = Some(Status::new(StatusCode::Corruption, "corrupted block entry"));
        false
    }

    fn parse_next_entry(&mut self) -> bool {
        self.current = self.next_entry_offset();
        if self.current >= self.restarts {
            // No more entries.
            self.invalidate();
            return false;
        }

        match decode_entry(&self.data[self.current..self.restarts]) {
            Ok((shared, non_shared, value_len, header_len)) => {
                if self.key.len() < shared {
                    return self.corruption();
                }
                let delta_off = self.current + header_len;
                self.key.truncate(shared);
                self.key
                    .extend_from_slice(&self.data[delta_off..delta_off + non_shared]);
                self.val_offset = delta_off + non_shared;
                self.val_len = value_len;

                while self.restart_index + 1 < self.num_restarts
                    && self.restart_point(self.restart_index + 1) < self.current
                {
                    self.restart_index += 1;
                }
                true
            }
            Err(_) => self.corruption(),
        }
    }
}

impl SsIterator for BlockIter {
    fn valid(&self) -> bool {
        self.current < self.restarts
    }

    fn seek_to_first(&mut self) {
        if self.num_restarts == 0 {
            return;
        }
        self.seek_to_restart_point(0);
        self.parse_next_entry();
    }

    fn seek_to_last(&mut self) {
        if self.num_restarts == 0 {
            return;
        }
        self.seek_to_restart_point(self.num_restarts - 1);
        loop {
            if !self.parse_next_entry() {
                return;
            }
            if self.next_entry_offset() >= self.restarts {
                return;
            }
        }
    }

    fn seek(&mut self, target: &[u8]) {
        if self.num_restarts == 0 {
            return;
        }

        // Binary search in the restart array for the last restart point with a key
        // smaller than the target.
        let mut left = 0;
        let mut right = self.num_restarts - 1;

        // If we are already positioned, the current entry narrows the search range; a
        // seek to the very key we stand on is free.
        let mut current_key_cmp = None;
        if self.valid() {
            let ord = self.cmp.cmp(&self.key, target);
            match ord {
                Ordering::Less => left = self.restart_index,
                Ordering::Greater => right = self.restart_index,
                Ordering::Equal => return,
            }
            current_key_cmp = Some(ord);
        }

        while left < right {
            let mid = (left + right + 1) / 2;
            let region_offset = self.restart_point(mid);
            match decode_entry(&self.data[region_offset..self.restarts]) {
                Ok((shared, non_shared, _, header_len)) if shared == 0 => {
                    let key_off = region_offset + header_len;
                    let mid_key = &self.data[key_off..key_off + non_shared];
                    if self.cmp.cmp(mid_key, target) == Ordering::Less {
                        left = mid;
                    } else {
                        right = mid - 1;
                    }
                }
                // A restart entry must store a full key.
                _ => {
                    self.corruption();
                    return;
                }
            }
        }

        // When the current key already lies inside the winning restart region, the
        // linear scan can continue from it instead of rewinding.
        let skip_seek = left == self.restart_index && current_key_cmp == Some(Ordering::Less);
        if !skip_seek {
            self.seek_to_restart_point(left);
        }

        // Linear search for the first key >= target.
        loop {
            if !self.parse_next_entry() {
                return;
            }
            if self.cmp.cmp(&self.key, target) != Ordering::Less {
                return;
            }
        }
    }

    fn advance(&mut self) -> bool {
        if !self.valid() {
            return false;
        }
        self.parse_next_entry()
    }

    fn prev(&mut self) -> bool {
        if !self.valid() {
            return false;
        }

        // Scan backwards to a restart point before the current entry.
        let original = self.current;
        while self.restart_point(self.restart_index) >= original {
            if self.restart_index == 0 {
                // No entries before the first one.
                self.invalidate();
                return false;
            }
            self.restart_index -= 1;
        }

        self.seek_to_restart_point(self.restart_index);
        loop {
            if !self.parse_next_entry() {
                return false;
            }
            if self.next_entry_offset() >= original {
                return true;
            }
        }
    }

    fn current_key(&self) -> Option<&[u8]> {
        if self.valid() {
            Some(&self.key)
        } else {
            None
        }
    }

    fn current_value(&self) -> Option<&[u8]> {
        if self.valid() {
            Some(&self.data[self.val_offset..self.val_offset + self.val_len])
        } else {
            None
        }
    }
}
