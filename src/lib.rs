//! stonetable is the storage core of an ordered key-value engine in the LSM-tree
//! family: an in-memory write buffer (memtable over a concurrent skiplist) and the
//! building blocks of immutable sorted tables (prefix-compressed blocks, Bloom-style
//! filter blocks, the table builder and reader).
//!
//! The higher-level database machinery (compactions, versions, write-ahead log,
//! snapshots) lives above this crate and treats it as a library of parts:
//!
//! - writes go through [`MemTable`], ordered by internal keys;
//! - a full memtable is iterated and fed into a [`TableBuilder`], producing a sorted
//!   table on any [`WritableFile`] sink;
//! - reads consult the memtable first, then [`Table`] readers, which use index and
//!   filter blocks to touch as little of the file as possible.

#[macro_use]
pub mod infolog;

pub mod block;
pub mod block_builder;
pub mod blockhandle;
pub mod cmp;
pub mod coding;
pub mod env;
pub mod error;
pub mod filter;
pub mod filter_block;
pub mod key_types;
pub mod memtable;
pub mod options;
pub mod skipmap;
pub mod table_builder;
pub mod table_reader;
#[cfg(test)]
mod test_util;
pub mod types;

pub use cmp::{Cmp, DefaultCmp, InternalKeyCmp};
pub use env::WritableFile;
pub use error::{Result, Status, StatusCode};
pub use filter::{BloomPolicy, FilterPolicy};
pub use infolog::Logger;
pub use key_types::{LookupKey, ParsedInternalKey};
pub use memtable::MemTable;
pub use options::{CompressionType, Options};
pub use skipmap::SkipMap;
pub use table_builder::TableBuilder;
pub use table_reader::Table;
pub use types::{SequenceNumber, SsIterator, ValueType, MAX_SEQUENCE_NUMBER};
