//! Crate-wide basic types: sequence numbers, value kinds and the iterator trait shared
//! by blocks, the skiplist, the memtable and tables.

use std::cell::RefCell;
use std::rc::Rc;

/// Represents a sequence number of a single entry. Only the low 56 bits are usable.
pub type SequenceNumber = u64;

/// The largest valid sequence number.
pub const MAX_SEQUENCE_NUMBER: SequenceNumber = (1 << 56) - 1;

/// The kind of an entry, encoded in the low byte of its tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueType {
    TypeDeletion = 0,
    TypeValue = 1,
}

/// The value type used when seeking: entries with the same user key and sequence sort
/// with `TypeValue` first, so a seek tag uses it.
pub const VALUE_TYPE_FOR_SEEK: ValueType = ValueType::TypeValue;

/// A shared, mutable cell. Used for loggers and other single-threaded shared state.
pub type Shared<T> = Rc<RefCell<T>>;

pub fn share<T>(t: T) -> Shared<T> {
    Rc::new(RefCell::new(t))
}

/// A stateful iterator over sorted key/value entries.
///
/// Unlike `std::iter::Iterator`, an `SsIterator` is positioned: it stands on an entry
/// (or is invalid) and can move in both directions. `advance`/`prev` return whether the
/// iterator is valid afterwards. A freshly created iterator is invalid until positioned
/// by `seek`, `seek_to_first` or `seek_to_last`; an iterator over an empty source never
/// becomes valid.
pub trait SsIterator {
    fn valid(&self) -> bool;
    /// Positions on the first entry with a key greater than or equal to `key`, or
    /// invalidates the iterator if there is none.
    fn seek(&mut self, key: &[u8]);
    fn seek_to_first(&mut self);
    fn seek_to_last(&mut self);
    fn advance(&mut self) -> bool;
    fn prev(&mut self) -> bool;
    fn current_key(&self) -> Option<&[u8]>;
    fn current_value(&self) -> Option<&[u8]>;

    /// Owned copies of the current entry, for callers that outlive the borrow.
    fn current_kv(&self) -> Option<(Vec<u8>, Vec<u8>)> {
        match (self.current_key(), self.current_value()) {
            (Some(k), Some(v)) => Some((k.to_vec(), v.to_vec())),
            _ => None,
        }
    }
}
