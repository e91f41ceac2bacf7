use std::sync::Arc;

use crate::cmp::{BoxedCmp, DefaultCmp};
use crate::filter::BoxedFilterPolicy;
use crate::infolog::Logger;
use crate::types::Shared;

/// How a block's contents are stored on disk. The type byte follows every block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionType {
    CompressionNone = 0,
    CompressionSnappy = 1,
    CompressionZstd = 2,
}

pub fn int_to_compression_type(i: u32) -> Option<CompressionType> {
    match i {
        0 => Some(CompressionType::CompressionNone),
        1 => Some(CompressionType::CompressionSnappy),
        2 => Some(CompressionType::CompressionZstd),
        _ => None,
    }
}

/// Options steer the in-memory and on-disk behavior of tables and blocks. They are
/// read-only once a build has started.
#[derive(Clone)]
pub struct Options {
    pub cmp: BoxedCmp,
    pub block_size: usize,
    pub block_restart_interval: usize,
    pub compression_type: CompressionType,
    pub filter_policy: Option<BoxedFilterPolicy>,
    pub log: Option<Shared<Logger>>,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            cmp: Arc::new(Box::new(DefaultCmp)),
            block_size: 4 << 10,
            block_restart_interval: 16,
            compression_type: CompressionType::CompressionNone,
            filter_policy: None,
            log: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_type_roundtrip() {
        for t in [
            CompressionType::CompressionNone,
            CompressionType::CompressionSnappy,
            CompressionType::CompressionZstd,
        ] {
            assert_eq!(int_to_compression_type(t as u32), Some(t));
        }
        assert_eq!(int_to_compression_type(3), None);
    }
}
