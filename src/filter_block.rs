//! The filter block of a table: one filter per aligned `2^base_lg`-byte window of the
//! file, so a reader can ask "may this key be in the block at offset X?" without
//! touching the data block itself.
//!
//! Layout: `filters || offsets: u64[num] || array_start: u64 || base_lg: u8`, all
//! fixed integers big-endian.

use crate::coding::{decode_fixed_u64, put_fixed_u64, U64_LEN};
use crate::error::{Result, Status, StatusCode};
use crate::filter::BoxedFilterPolicy;

pub const FILTER_BASE_LG: u8 = 11;

// Offset-array start plus the base_lg byte.
const TRAILER_LEN: usize = U64_LEN + 1;

/// Builds the filter block for one table. The caller must follow the protocol
/// `(start_block add_key*)* finish`, with strictly increasing block offsets.
pub struct FilterBlockBuilder {
    policy: BoxedFilterPolicy,
    // Keys buffered for the filter currently being accumulated.
    keys: Vec<Vec<u8>>,
    // Filter data computed so far.
    result: Vec<u8>,
    filter_offsets: Vec<u64>,
}

impl FilterBlockBuilder {
    pub fn new(policy: BoxedFilterPolicy) -> FilterBlockBuilder {
        FilterBlockBuilder {
            policy,
            keys: Vec::new(),
            result: Vec::new(),
            filter_offsets: Vec::new(),
        }
    }

    pub fn filter_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Announces that a data block begins at `block_offset`, flushing buffered keys
    /// into filters for every window boundary crossed since the last call.
    pub fn start_block(&mut self, block_offset: usize) -> Result<()> {
        let filter_index = block_offset >> FILTER_BASE_LG;
        if filter_index < self.filter_offsets.len() {
            return Err(Status::new(
                StatusCode::Corruption,
                "filter block offsets not increasing",
            ));
        }
        while filter_index > self.filter_offsets.len() {
            self.generate_filter();
        }
        Ok(())
    }

    pub fn add_key(&mut self, key: &[u8]) {
        self.keys.push(key.to_vec());
    }

    pub fn finish(mut self) -> Vec<u8> {
        if !self.keys.is_empty() {
            self.generate_filter();
        }

        let array_offset = self.result.len();
        for &offset in self.filter_offsets.iter() {
            put_fixed_u64(&mut self.result, offset);
        }
        put_fixed_u64(&mut self.result, array_offset as u64);
        self.result.push(FILTER_BASE_LG);
        self.result
    }

    fn generate_filter(&mut self) {
        self.filter_offsets.push(self.result.len() as u64);
        if self.keys.is_empty() {
            // An empty window gets an empty filter (start == limit in the offsets).
            return;
        }

        let keys: Vec<&[u8]> = self.keys.iter().map(|k| k.as_slice()).collect();
        self.policy.create_filter(&keys, &mut self.result);
        self.keys.clear();
    }
}

/// Reads a filter block. A malformed block yields a reader that reports every key as a
/// potential match, trading efficiency for correctness.
pub struct FilterBlockReader {
    policy: BoxedFilterPolicy,
    data: Vec<u8>,
    // Offset where the filter data ends and the offset array begins.
    data_len: usize,
    num: usize,
    base_lg: u8,
}

impl FilterBlockReader {
    pub fn new(policy: BoxedFilterPolicy, contents: Vec<u8>) -> FilterBlockReader {
        let n = contents.len();
        let mut reader = FilterBlockReader {
            policy,
            data: contents,
            data_len: 0,
            num: 0,
            base_lg: 0,
        };

        if n < TRAILER_LEN {
            return reader;
        }
        let base_lg = reader.data[n - 1];
        if base_lg as u32 >= usize::BITS {
            return reader;
        }
        let array_start = decode_fixed_u64(&reader.data[n - TRAILER_LEN..]) as usize;
        if array_start > n - TRAILER_LEN {
            return reader;
        }

        reader.base_lg = base_lg;
        reader.data_len = array_start;
        reader.num = (n - TRAILER_LEN - array_start) / U64_LEN;
        reader
    }

    pub fn num(&self) -> usize {
        self.num
    }

    pub fn key_may_match(&self, block_offset: usize, key: &[u8]) -> bool {
        if self.num == 0 {
            return true;
        }

        let index = block_offset >> self.base_lg;
        if index < self.num {
            let start =
                decode_fixed_u64(&self.data[self.data_len + U64_LEN * index..]) as usize;
            // For the last filter this reads the array_start word, which equals the
            // length of the filter data region.
            let limit =
                decode_fixed_u64(&self.data[self.data_len + U64_LEN * (index + 1)..]) as usize;

            if start == limit {
                // Empty filters never match.
                return false;
            }
            if start < limit && limit <= self.data_len {
                return self.policy.key_may_match(key, &self.data[start..limit]);
            }
        }
        // Errors are treated as potential matches.
        true
    }
}
