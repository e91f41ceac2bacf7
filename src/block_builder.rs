//! BlockBuilder generates blocks where keys are prefix-compressed:
//!
//! When a key is stored, the prefix shared with the previous key is dropped, which cuts
//! the space requirement significantly. Once every `block_restart_interval` keys the
//! compression is not applied and the whole key is stored; such an entry is a "restart
//! point". The tail of the block stores the offsets of all restart points, enabling
//! binary search for a particular key.
//!
//! An entry for a key-value pair has the form
//!
//! ```text
//!     shared: varint || non_shared: varint || value_len: varint
//!     || key_delta: [u8; non_shared] || value: [u8; value_len]
//! ```
//!
//! with `shared == 0` at restart points. The block trailer is
//! `restarts: u64[num_restarts] || num_restarts: u64`, big-endian.

use std::cmp::Ordering;
use std::mem;

use crate::block::BlockContents;
use crate::coding::{put_fixed_u64, put_varint_u64, U64_LEN};
use crate::error::{Result, Status, StatusCode};
use crate::options::Options;

pub struct BlockBuilder {
    opt: Options,
    buffer: Vec<u8>,
    restarts: Vec<u32>,
    counter: usize,
    finished: bool,
    last_key: Vec<u8>,
}

impl BlockBuilder {
    pub fn new(opt: Options) -> BlockBuilder {
        assert!(opt.block_restart_interval >= 1);
        BlockBuilder {
            opt,
            buffer: Vec::new(),
            // The first restart point is always at offset 0.
            restarts: vec![0],
            counter: 0,
            finished: false,
            last_key: Vec::new(),
        }
    }

    /// Resets the contents as if the builder was just constructed.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.restarts.clear();
        self.restarts.push(0);
        self.counter = 0;
        self.finished = false;
        self.last_key.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// An estimate of the size of the block being built, were it finished now.
    pub fn current_size_estimate(&self) -> usize {
        self.buffer.len() + (self.restarts.len() + 1) * U64_LEN
    }

    /// Appends an entry. The key must sort strictly after every previously added key,
    /// and `finish` must not have been called since the last `reset`.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.finished {
            return Err(Status::new(StatusCode::Corruption, "add after finish"));
        }
        if self.counter > self.opt.block_restart_interval {
            return Err(Status::new(StatusCode::Corruption, "restart counter overrun"));
        }
        if !self.buffer.is_empty() && self.opt.cmp.cmp(key, &self.last_key) != Ordering::Greater {
            return Err(Status::new(StatusCode::Corruption, "keys added out of order"));
        }

        let mut shared = 0;
        if self.counter < self.opt.block_restart_interval {
            let min_length = self.last_key.len().min(key.len());
            while shared < min_length && self.last_key[shared] == key[shared] {
                shared += 1;
            }
        } else {
            // Restart compression.
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
        }

        let non_shared = key.len() - shared;

        put_varint_u64(&mut self.buffer, shared as u64);
        put_varint_u64(&mut self.buffer, non_shared as u64);
        put_varint_u64(&mut self.buffer, value.len() as u64);
        self.buffer.extend_from_slice(&key[shared..]);
        self.buffer.extend_from_slice(value);

        self.last_key.truncate(shared);
        self.last_key.extend_from_slice(&key[shared..]);
        debug_assert_eq!(self.last_key, key);

        self.counter += 1;
        Ok(())
    }

    /// Appends the restart array and count, marks the builder finished and hands the
    /// block contents to the caller. The builder is reusable after a `reset`.
    pub fn finish(&mut self) -> BlockContents {
        for &restart in self.restarts.iter() {
            put_fixed_u64(&mut self.buffer, restart as u64);
        }
        put_fixed_u64(&mut self.buffer, self.restarts.len() as u64);
        self.finished = true;
        mem::take(&mut self.buffer)
    }
}
