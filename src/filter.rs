//! Filter policies summarize a set of keys into a small byte string that can later
//! prove, with high probability, that a key was not in the set. Tables consult filters
//! to skip reading blocks that cannot contain a key.

use std::sync::Arc;

use crate::coding::hash;
use crate::key_types::extract_user_key;

pub trait FilterPolicy {
    /// The name of this policy. If the filter encoding changes incompatibly, the name
    /// must change too, so old filters are not fed to new readers.
    fn name(&self) -> &'static str;
    /// Appends a filter summarizing `keys` to `dst`. The previous contents of `dst`
    /// must remain untouched.
    fn create_filter(&self, keys: &[&[u8]], dst: &mut Vec<u8>);
    /// Whether `key` may have been in the set `filter` was built from. False negatives
    /// are forbidden; false positives cost an unnecessary block read.
    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool;
}

pub type BoxedFilterPolicy = Arc<Box<dyn FilterPolicy + Send + Sync>>;

const BLOOM_SEED: u32 = 0xbc9f1d34;

fn bloom_hash(key: &[u8]) -> u32 {
    hash(key, BLOOM_SEED)
}

/// A Bloom filter: `bits_per_key` bits per key, probed `k` times via double hashing.
/// The filter's last byte records `k` so the parameters can evolve without breaking
/// existing filters.
pub struct BloomPolicy {
    bits_per_key: usize,
    k: usize,
}

impl BloomPolicy {
    pub fn new(bits_per_key: usize) -> BloomPolicy {
        // Round k to the information-theoretic optimum ln(2) * bits_per_key.
        let k = (bits_per_key as f64 * 0.693147).round() as usize;
        BloomPolicy {
            bits_per_key,
            k: k.clamp(1, 30),
        }
    }

    pub fn new_wrap(bits_per_key: usize) -> BoxedFilterPolicy {
        Arc::new(Box::new(BloomPolicy::new(bits_per_key)))
    }
}

impl FilterPolicy for BloomPolicy {
    fn name(&self) -> &'static str {
        "stonetable.BuiltinBloomFilter"
    }

    fn create_filter(&self, keys: &[&[u8]], dst: &mut Vec<u8>) {
        // Very small sets would have high false positive rates; enforce a floor.
        let mut bits = (keys.len() * self.bits_per_key).max(64);
        let bytes = (bits + 7) / 8;
        bits = bytes * 8;

        let filter_offset = dst.len();
        dst.resize(filter_offset + bytes, 0);
        dst.push(self.k as u8);

        for key in keys {
            // Double hashing: probe positions h, h+delta, h+2*delta, ...
            let mut h = bloom_hash(key);
            let delta = h.rotate_right(17);
            for _ in 0..self.k {
                let bitpos = (h as usize) % bits;
                dst[filter_offset + bitpos / 8] |= 1 << (bitpos % 8);
                h = h.wrapping_add(delta);
            }
        }
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool {
        let n = filter.len();
        if n < 2 {
            return false;
        }

        let bits = (n - 1) * 8;
        let k = filter[n - 1] as usize;
        if k > 30 {
            // Reserved for potential new encodings; treat as a match.
            return true;
        }

        let mut h = bloom_hash(key);
        let delta = h.rotate_right(17);
        for _ in 0..k {
            let bitpos = (h as usize) % bits;
            if filter[bitpos / 8] & (1 << (bitpos % 8)) == 0 {
                return false;
            }
            h = h.wrapping_add(delta);
        }
        true
    }
}

/// Wraps another policy for tables keyed by internal keys: the tag is stripped so the
/// filter is built over, and probed with, user keys.
pub struct InternalFilterPolicy(pub BoxedFilterPolicy);

impl InternalFilterPolicy {
    pub fn new_wrap(inner: BoxedFilterPolicy) -> BoxedFilterPolicy {
        Arc::new(Box::new(InternalFilterPolicy(inner)))
    }
}

impl FilterPolicy for InternalFilterPolicy {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn create_filter(&self, keys: &[&[u8]], dst: &mut Vec<u8>) {
        let user_keys: Vec<&[u8]> = keys.iter().map(|k| extract_user_key(k)).collect();
        self.0.create_filter(&user_keys, dst)
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool {
        self.0.key_may_match(extract_user_key(key), filter)
    }
}
