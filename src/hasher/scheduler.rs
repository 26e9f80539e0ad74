//! Dirty-ancestor propagation fused with concurrent combination.
//!
//! The dispatcher (the calling thread) reads dirty leaves in ascending path
//! order. For each leaf it walks up the parent chain, opening a slot for
//! every ancestor not yet seen and marking which side of it is dirty; the
//! walk stops at the first ancestor whose side was already marked. Leaves
//! are then handed to pool workers in chunks.
//!
//! A slot is "sealed" once the dispatcher has read past the last leaf path
//! under that node: from then on its set of dirty sides is final. A slot
//! is combined when it is sealed and every dirty side has delivered its
//! hash. Whoever completes that condition (the dispatcher sealing, or the
//! worker delivering the second child) claims the slot and combines it,
//! then carries the result up to the parent. Clean sides are read from
//! the hash source; sides past the last leaf are [`NULL_HASH`].
//!
//! Only open slots live in memory. With the read-ahead bounded by the
//! in-flight chunk limit, that is the frontier of partially hashed
//! ancestors, not the tree.

use super::combine::{combine_at, NULL_HASH};
use super::listener::HashListener;
use super::source::HashSource;
use crate::model::path::{self, Path, ROOT_PATH};
use crate::model::{Hash, LeafExtent, VirtualLeaf};
use crate::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use rayon::{Scope, ThreadPool};
use serde::Serialize;
use std::any::Any;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// What one hashing pass did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HashingStats {
    pub dirty_leaves: u64,
    /// Internal nodes recomputed, the root included
    pub internal_nodes: u64,
    /// Clean sibling hashes fetched from the source
    pub source_reads: u64,
    /// Most ancestor slots open at the same time
    pub peak_open_nodes: usize,
}

/// Min-heap of `(last leaf under node, node)`, ordered by the first field
type SealQueue = BinaryHeap<Reverse<(Path, Path)>>;

const LEFT: usize = 0;
const RIGHT: usize = 1;

fn side_of(child: Path) -> usize {
    if path::is_left(child) {
        LEFT
    } else {
        RIGHT
    }
}

/// Partial state of a dirty internal node
#[derive(Debug, Default)]
struct Slot {
    dirty: [bool; 2],
    hashes: [Option<Hash>; 2],
    sealed: bool,
    claimed: bool,
}

impl Slot {
    fn ready(&self) -> bool {
        self.sealed && (0..2).all(|side| !self.dirty[side] || self.hashes[side].is_some())
    }

    /// True exactly once: the first time the slot is seen ready
    fn try_claim(&mut self) -> bool {
        if !self.claimed && self.ready() {
            self.claimed = true;
            true
        } else {
            false
        }
    }
}

/// Counting gate on queued leaf chunks
struct InFlight {
    count: Mutex<usize>,
    freed: Condvar,
    limit: usize,
}

impl InFlight {
    fn new(limit: usize) -> Self {
        InFlight {
            count: Mutex::new(0),
            freed: Condvar::new(),
            limit,
        }
    }

    fn acquire(&self, abort: &AtomicBool) {
        let mut count = self.count.lock();
        while *count >= self.limit && !abort.load(Ordering::Acquire) {
            self.freed.wait(&mut count);
        }
        *count += 1;
    }

    fn release(&self) {
        let mut count = self.count.lock();
        *count -= 1;
        self.freed.notify_one();
    }

    fn wake_all(&self) {
        let _count = self.count.lock();
        self.freed.notify_all();
    }
}

/// State of one hashing pass, shared by the dispatcher and the workers
pub(crate) struct Pass<'a, S: HashSource + ?Sized> {
    extent: LeafExtent,
    source: &'a S,
    listener: &'a dyn HashListener,
    chunk_size: usize,
    slots: DashMap<Path, Slot>,
    open: AtomicUsize,
    peak_open: AtomicUsize,
    root: Mutex<Option<Hash>>,
    failure: Mutex<Option<Error>>,
    failed: AtomicBool,
    in_flight: InFlight,
    leaves: AtomicU64,
    internal: AtomicU64,
    reads: AtomicU64,
}

impl<'a, S: HashSource + ?Sized> Pass<'a, S> {
    pub(crate) fn new(
        extent: LeafExtent,
        source: &'a S,
        listener: &'a dyn HashListener,
        chunk_size: usize,
        in_flight_chunks: usize,
    ) -> Self {
        Pass {
            extent,
            source,
            listener,
            chunk_size: chunk_size.max(1),
            slots: DashMap::new(),
            open: AtomicUsize::new(0),
            peak_open: AtomicUsize::new(0),
            root: Mutex::new(None),
            failure: Mutex::new(None),
            failed: AtomicBool::new(false),
            in_flight: InFlight::new(in_flight_chunks.max(1)),
            leaves: AtomicU64::new(0),
            internal: AtomicU64::new(0),
            reads: AtomicU64::new(0),
        }
    }

    /// Hash every leaf in `leaves` and everything above them. Returns once
    /// all spawned work has finished.
    pub(crate) fn run<I, L>(self, pool: &ThreadPool, leaves: I) -> Result<(Hash, HashingStats)>
    where
        I: Iterator<Item = L>,
        L: VirtualLeaf,
    {
        pool.in_place_scope(|scope| {
            if let Err(err) = self.dispatch(scope, leaves) {
                self.fail(err);
            }
        });

        if let Some(err) = self.failure.lock().take() {
            return Err(err);
        }
        let root = self
            .root
            .lock()
            .take()
            .ok_or_else(|| Error::Scheduler("pass finished without hashing the root".into()))?;
        if !self.slots.is_empty() {
            return Err(Error::Scheduler(format!(
                "{} dirty nodes were never combined",
                self.slots.len()
            )));
        }
        Ok((root, self.stats()))
    }

    fn stats(&self) -> HashingStats {
        HashingStats {
            dirty_leaves: self.leaves.load(Ordering::Relaxed),
            internal_nodes: self.internal.load(Ordering::Relaxed),
            source_reads: self.reads.load(Ordering::Relaxed),
            peak_open_nodes: self.peak_open.load(Ordering::Relaxed),
        }
    }

    fn dispatch<'s, I, L>(&'s self, scope: &Scope<'s>, leaves: I) -> Result<()>
    where
        I: Iterator<Item = L>,
        L: VirtualLeaf + 's,
    {
        let mut sealing = SealQueue::new();
        let mut chunk: Vec<L> = Vec::with_capacity(self.chunk_size);
        let mut previous: Option<Path> = None;

        for leaf in leaves {
            if self.failed.load(Ordering::Acquire) {
                return Ok(());
            }
            let leaf_path = leaf.path();
            if let Some(prev) = previous {
                if leaf_path <= prev {
                    return Err(Error::InvalidArgument(format!(
                        "dirty leaves must be strictly increasing, got {leaf_path} after {prev}"
                    )));
                }
            }
            if !self.extent.contains(leaf_path) {
                return Err(Error::InvalidArgument(format!(
                    "dirty leaf {leaf_path} lies outside the leaf extent {}",
                    self.extent
                )));
            }
            previous = Some(leaf_path);

            self.seal_before(scope, &mut sealing, Some(leaf_path))?;
            self.register(leaf_path, &mut sealing)?;

            chunk.push(leaf);
            if chunk.len() >= self.chunk_size {
                let full = std::mem::replace(&mut chunk, Vec::with_capacity(self.chunk_size));
                self.spawn_chunk(scope, full);
            }
        }

        if !chunk.is_empty() {
            self.spawn_chunk(scope, chunk);
        }
        // End of stream: every open slot is final
        self.seal_before(scope, &mut sealing, None)
    }

    /// Open slots for the ancestors of `leaf` that no earlier leaf opened
    fn register(&self, leaf: Path, sealing: &mut SealQueue) -> Result<()> {
        let mut child = leaf;
        while child != ROOT_PATH {
            let parent = path::parent(child);
            let side = side_of(child);
            let already_dirty = match self.slots.entry(parent) {
                Entry::Occupied(mut entry) => {
                    let slot = entry.get_mut();
                    let was = slot.dirty[side];
                    slot.dirty[side] = true;
                    was
                }
                Entry::Vacant(entry) => {
                    let mut slot = Slot::default();
                    slot.dirty[side] = true;
                    entry.insert(slot);

                    let last_leaf = self.extent.last_leaf_under(parent).ok_or_else(|| {
                        Error::Scheduler(format!("node {parent} has no leaves under it"))
                    })?;
                    sealing.push(Reverse((last_leaf, parent)));
                    let open = self.open.fetch_add(1, Ordering::Relaxed) + 1;
                    self.peak_open.fetch_max(open, Ordering::Relaxed);
                    false
                }
            };
            if already_dirty {
                break;
            }
            child = parent;
        }
        Ok(())
    }

    /// Seal every open slot whose subtree ends before `next_leaf`, or all of
    /// them when the stream is exhausted.
    fn seal_before<'s>(
        &'s self,
        scope: &Scope<'s>,
        sealing: &mut SealQueue,
        next_leaf: Option<Path>,
    ) -> Result<()> {
        while let Some(&Reverse((last_leaf, node))) = sealing.peek() {
            if next_leaf.is_some_and(|next| last_leaf >= next) {
                break;
            }
            sealing.pop();

            let claimed = {
                let mut slot = self.slots.get_mut(&node).ok_or_else(|| {
                    Error::Scheduler(format!("sealing node {node} with no open slot"))
                })?;
                slot.sealed = true;
                slot.try_claim()
            };
            if claimed {
                scope.spawn(move |_| self.guarded(|| self.combine_from(node)));
            }
        }
        Ok(())
    }

    fn spawn_chunk<'s, L>(&'s self, scope: &Scope<'s>, chunk: Vec<L>)
    where
        L: VirtualLeaf + 's,
    {
        self.in_flight.acquire(&self.failed);
        scope.spawn(move |_| {
            self.guarded(|| self.hash_leaves(chunk));
            self.in_flight.release();
        });
    }

    fn hash_leaves<L: VirtualLeaf>(&self, chunk: Vec<L>) -> Result<()> {
        for leaf in chunk {
            if self.failed.load(Ordering::Acquire) {
                return Ok(());
            }
            let leaf_path = leaf.path();
            let hash = leaf.leaf_hash();
            self.leaves.fetch_add(1, Ordering::Relaxed);
            self.listener.on_leaf_hashed(leaf_path, hash);
            if let Some(parent) = self.deliver(leaf_path, hash)? {
                self.combine_from(parent)?;
            }
        }
        Ok(())
    }

    /// Hand `child`'s hash to its parent slot. Returns the parent if this
    /// delivery made it ready and the caller now owns combining it.
    fn deliver(&self, child: Path, hash: Hash) -> Result<Option<Path>> {
        let parent = path::parent(child);
        let mut slot = self.slots.get_mut(&parent).ok_or_else(|| {
            Error::Scheduler(format!("no open slot for {parent}, parent of {child}"))
        })?;
        let side = side_of(child);
        if !slot.dirty[side] || slot.hashes[side].is_some() {
            return Err(Error::Scheduler(format!(
                "unexpected hash delivered for {child}"
            )));
        }
        slot.hashes[side] = Some(hash);
        Ok(slot.try_claim().then_some(parent))
    }

    /// Combine `node`, then keep climbing while each delivery completes
    /// the next parent.
    fn combine_from(&self, mut node: Path) -> Result<()> {
        loop {
            let (_, slot) = self.slots.remove(&node).ok_or_else(|| {
                Error::Scheduler(format!("combining node {node} with no open slot"))
            })?;
            self.open.fetch_sub(1, Ordering::Relaxed);

            let left = self.child_hash(path::left_child(node), slot.hashes[LEFT])?;
            let right = self.child_hash(path::right_child(node), slot.hashes[RIGHT])?;
            let hash = combine_at(node, &left, &right);
            self.internal.fetch_add(1, Ordering::Relaxed);
            self.listener.on_node_hashed(node, hash);

            if node == ROOT_PATH {
                *self.root.lock() = Some(hash);
                return Ok(());
            }
            match self.deliver(node, hash)? {
                Some(parent) => node = parent,
                None => return Ok(()),
            }
        }
    }

    fn child_hash(&self, child: Path, computed: Option<Hash>) -> Result<Hash> {
        if let Some(hash) = computed {
            return Ok(hash);
        }
        if self.extent.is_absent(child) {
            return Ok(NULL_HASH);
        }
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.source
            .read_hash(child)?
            .ok_or(Error::MissingHash { path: child })
    }

    /// Run a task, turning its error or panic into the pass failure
    fn guarded(&self, task: impl FnOnce() -> Result<()>) {
        if self.failed.load(Ordering::Acquire) {
            return;
        }
        match catch_unwind(AssertUnwindSafe(task)) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self.fail(err),
            Err(panic) => self.fail(Error::Worker(panic_message(panic.as_ref()))),
        }
    }

    /// Record the first failure and stop handing out work
    fn fail(&self, err: Error) {
        {
            let mut failure = self.failure.lock();
            if failure.is_none() {
                *failure = Some(err);
            }
        }
        self.failed.store(true, Ordering::Release);
        self.in_flight.wake_all();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "hashing task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_claims_once() {
        let mut slot = Slot::default();
        slot.dirty[LEFT] = true;
        assert!(!slot.try_claim());
        slot.hashes[LEFT] = Some(Hash::digest(b"l"));
        assert!(!slot.try_claim(), "unsealed slot must wait");
        slot.sealed = true;
        assert!(slot.try_claim());
        assert!(!slot.try_claim());
    }

    #[test]
    fn test_slot_waits_for_both_dirty_sides() {
        let mut slot = Slot {
            dirty: [true, true],
            sealed: true,
            ..Default::default()
        };
        slot.hashes[RIGHT] = Some(Hash::digest(b"r"));
        assert!(!slot.ready());
        slot.hashes[LEFT] = Some(Hash::digest(b"l"));
        assert!(slot.ready());
    }

    #[test]
    fn test_side_of() {
        assert_eq!(side_of(1), LEFT);
        assert_eq!(side_of(2), RIGHT);
        assert_eq!(side_of(103), LEFT);
        assert_eq!(side_of(104), RIGHT);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "hashing task panicked");
    }
}
