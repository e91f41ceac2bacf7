//! A skiplist backing the memtable: ordered, append-only, with one writer and any
//! number of concurrent readers.
//!
//! Each forward pointer is an atomic slot. The writer initializes a new node's own
//! pointers without barriers, then publishes the node level by level with release
//! stores; readers traverse with acquire loads and never block. A reader may observe a
//! node at level 0 before it appears at higher levels; the search routines tolerate
//! that, because a missing high-level shortcut only costs extra steps, never a wrong
//! result. `max_height` increases monotonically and may be read stale: the head's
//! pointers above the stale height are still nil, which simply ends the descent early.
//!
//! Nodes are owned by an arena and freed together with the list, so readers can hold
//! raw node pointers for as long as they hold the list itself.

use std::cmp::Ordering;
use std::mem::size_of;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering as MemOrder};
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::cmp::BoxedCmp;
use crate::types::SsIterator;

const MAX_HEIGHT: usize = 12;
const BRANCHING_FACTOR: u32 = 4;

struct Node {
    key: Vec<u8>,
    // One slot per level; next[0] links the full ordered chain.
    next: Vec<AtomicPtr<Node>>,
}

impl Node {
    fn new(key: Vec<u8>, height: usize) -> Box<Node> {
        let mut next = Vec::with_capacity(height);
        for _ in 0..height {
            next.push(AtomicPtr::new(ptr::null_mut()));
        }
        Box::new(Node { key, next })
    }

    fn next(&self, level: usize) -> *mut Node {
        self.next[level].load(MemOrder::Acquire)
    }

    fn set_next(&self, level: usize, node: *mut Node) {
        self.next[level].store(node, MemOrder::Release)
    }

    fn no_barrier_next(&self, level: usize) -> *mut Node {
        self.next[level].load(MemOrder::Relaxed)
    }

    fn no_barrier_set_next(&self, level: usize, node: *mut Node) {
        self.next[level].store(node, MemOrder::Relaxed)
    }
}

/// The backing store of a memtable. `insert` requires external synchronization against
/// other inserts (single writer); all read paths can run concurrently with it and with
/// each other.
pub struct SkipMap {
    head: Box<Node>,
    // Owns every inserted node; only the writer pushes.
    arena: Mutex<Vec<Box<Node>>>,
    rand: Mutex<StdRng>,
    cmp: BoxedCmp,
    max_height: AtomicUsize,
    len: AtomicUsize,
    // Approximation of the memory used by the map.
    approx_mem: AtomicUsize,
}

// Raw node pointers are published and consumed through atomics; the arena and RNG are
// behind locks touched only by the single writer.
unsafe impl Send for SkipMap {}
unsafe impl Sync for SkipMap {}

impl SkipMap {
    pub fn new(cmp: BoxedCmp) -> SkipMap {
        SkipMap {
            head: Node::new(Vec::new(), MAX_HEIGHT),
            arena: Mutex::new(Vec::new()),
            rand: Mutex::new(StdRng::from_seed([47u8; 32])),
            cmp,
            max_height: AtomicUsize::new(1),
            len: AtomicUsize::new(0),
            approx_mem: AtomicUsize::new(
                size_of::<Self>() + MAX_HEIGHT * size_of::<AtomicPtr<Node>>(),
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.len.load(MemOrder::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn approx_memory(&self) -> usize {
        self.approx_mem.load(MemOrder::Relaxed)
    }

    fn head_ptr(&self) -> *const Node {
        &*self.head
    }

    fn random_height(&self) -> usize {
        let mut rand = self.rand.lock().unwrap();
        let mut height = 1;
        while height < MAX_HEIGHT && rand.next_u32() % BRANCHING_FACTOR == 0 {
            height += 1;
        }
        height
    }

    fn key_is_after_node(&self, key: &[u8], node: *const Node) -> bool {
        !node.is_null() && self.cmp.cmp(unsafe { &(*node).key }, key) == Ordering::Less
    }

    /// The earliest node at or after `key`, or null. Fills `prev` with the rightmost
    /// node before `key` on every level when requested (the insert path).
    fn find_greater_or_equal(
        &self,
        key: &[u8],
        mut prev: Option<&mut [*const Node; MAX_HEIGHT]>,
    ) -> *const Node {
        let mut node = self.head_ptr();
        let mut level = self.max_height.load(MemOrder::Relaxed) - 1;

        loop {
            let next = unsafe { (*node).next(level) };
            if self.key_is_after_node(key, next) {
                // Keep searching in this level.
                node = next;
            } else {
                if let Some(ref mut prev) = prev {
                    prev[level] = node;
                }
                if level == 0 {
                    return next;
                }
                level -= 1;
            }
        }
    }

    /// The latest node with a key strictly before `key`; head if there is none.
    fn find_less_than(&self, key: &[u8]) -> *const Node {
        let mut node = self.head_ptr();
        let mut level = self.max_height.load(MemOrder::Relaxed) - 1;

        loop {
            let next = unsafe { (*node).next(level) };
            if next.is_null() || self.cmp.cmp(unsafe { &(*next).key }, key) != Ordering::Less {
                if level == 0 {
                    return node;
                }
                level -= 1;
            } else {
                node = next;
            }
        }
    }

    /// The last node of the list; head if the list is empty.
    fn find_last(&self) -> *const Node {
        let mut node = self.head_ptr();
        let mut level = self.max_height.load(MemOrder::Relaxed) - 1;

        loop {
            let next = unsafe { (*node).next(level) };
            if next.is_null() {
                if level == 0 {
                    return node;
                }
                level -= 1;
            } else {
                node = next;
            }
        }
    }

    /// Inserts `key`. REQUIRES: nothing equal to `key` is in the list, and no other
    /// insert runs concurrently. Panics on duplicate insertion.
    pub fn insert(&self, key: Vec<u8>) {
        assert!(!key.is_empty());

        let mut prev = [self.head_ptr(); MAX_HEIGHT];
        let existing = self.find_greater_or_equal(&key, Some(&mut prev));
        if !existing.is_null() {
            assert!(
                self.cmp.cmp(unsafe { &(*existing).key }, &key) != Ordering::Equal,
                "duplicate insertion"
            );
        }

        let height = self.random_height();
        let max_height = self.max_height.load(MemOrder::Relaxed);
        if height > max_height {
            for slot in prev.iter_mut().take(height).skip(max_height) {
                *slot = self.head_ptr();
            }
            // Readers loading the new height concurrently are fine: head's pointers at
            // the new levels are still nil, so their descent starts one level lower at
            // worst.
            self.max_height.store(height, MemOrder::Relaxed);
        }

        let added_mem = size_of::<Node>()
            + size_of::<AtomicPtr<Node>>() * height
            + key.len();

        // Park the node in the arena first; its heap address is stable from here on.
        let node_ptr = {
            let mut arena = self.arena.lock().unwrap();
            arena.push(Node::new(key, height));
            &**arena.last().unwrap() as *const Node as *mut Node
        };

        for (level, prev) in prev.iter().enumerate().take(height) {
            unsafe {
                // The new node is invisible until the release store below, so its own
                // pointer can be set without a barrier.
                (*node_ptr).no_barrier_set_next(level, (**prev).no_barrier_next(level));
                (**prev).set_next(level, node_ptr);
            }
        }

        self.len.fetch_add(1, MemOrder::Relaxed);
        self.approx_mem.fetch_add(added_mem, MemOrder::Relaxed);
    }

    /// Whether an entry comparing equal to `key` is in the list.
    pub fn contains(&self, key: &[u8]) -> bool {
        let node = self.find_greater_or_equal(key, None);
        !node.is_null() && self.cmp.cmp(unsafe { &(*node).key }, key) == Ordering::Equal
    }

    pub fn iter(&self) -> SkipMapIter {
        SkipMapIter {
            map: self,
            current: ptr::null(),
        }
    }
}

/// An iterator positioned on one node of the map. Holds the map borrow, so nodes it
/// points at stay alive.
pub struct SkipMapIter<'a> {
    map: &'a SkipMap,
    current: *const Node,
}

impl<'a> SkipMapIter<'a> {
    fn settle(&mut self, node: *const Node) -> bool {
        // Landing on the head means there is no such entry.
        self.current = if node == self.map.head_ptr() {
            ptr::null()
        } else {
            node
        };
        self.valid()
    }
}

impl<'a> SsIterator for SkipMapIter<'a> {
    fn valid(&self) -> bool {
        !self.current.is_null()
    }

    fn seek(&mut self, key: &[u8]) {
        self.current = self.map.find_greater_or_equal(key, None);
    }

    fn seek_to_first(&mut self) {
        self.current = unsafe { (*self.map.head_ptr()).next(0) };
    }

    fn seek_to_last(&mut self) {
        let last = self.map.find_last();
        self.settle(last);
    }

    fn advance(&mut self) -> bool {
        if !self.valid() {
            return false;
        }
        self.current = unsafe { (*self.current).next(0) };
        self.valid()
    }

    fn prev(&mut self) -> bool {
        if !self.valid() {
            return false;
        }
        let prev = self.map.find_less_than(unsafe { &(*self.current).key });
        self.settle(prev)
    }

    fn current_key(&self) -> Option<&[u8]> {
        if !self.valid() {
            return None;
        }
        unsafe { Some(&(*self.current).key) }
    }

    fn current_value(&self) -> Option<&[u8]> {
        // The map stores keys only; entries encode any payload inside the key bytes.
        if !self.valid() {
            return None;
        }
        Some(&[])
    }
}
