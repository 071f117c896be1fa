//! # Concurrent Stack Aggregation
//!
//! Counts identical stacks per reporting window while capture threads keep
//! pushing samples, and hands the whole window over to the reporter in one
//! atomic swap.
//!
//! ## Layout
//!
//! ```text
//! live: RwLock<Window>
//!         │
//!         └── shards: [Mutex<Shard>; N]     shard = hash(pid, addresses) % N
//!                      │
//!                      └── HashMap<Pid, HashMap<Box<[u64]>, u64>>
//! ```
//!
//! ## Locking Discipline
//!
//! - `record()` holds the read lock plus one shard lock for the duration of
//!   a single increment. Producers on different shards never contend.
//! - `drain_top()` allocates the replacement window first, then holds the
//!   write lock only for `mem::replace`. Taking the write lock waits out
//!   every in-flight increment, so each sample lands entirely before or
//!   entirely after the boundary.
//! - Selection, sorting and everything downstream work on the detached
//!   window with no lock held.
//!
//! ## Performance
//!
//! - `record()` on a known stack: one hash, two map lookups, no allocation
//!   (the inner map is queried with the borrowed `&[u64]`)
//! - `record()` on a new stack: one boxed copy of the addresses
//! - `drain_top(k)`: O(n log k) over n distinct stacks

use std::collections::{BinaryHeap, HashMap};
use std::cmp::Reverse;
use std::hash::{BuildHasher, BuildHasherDefault, DefaultHasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use log::debug;

use super::stack_key::{AggregatedStack, StackKey};
use crate::domain::Pid;

/// Default shard count; enough to keep a handful of capture threads apart
const DEFAULT_SHARDS: usize = 16;

/// Anything that accepts stack samples
///
/// The trace session only knows this trait, so tests can drive the
/// aggregator (or a fake) without a kernel.
pub trait StackSink: Send + Sync {
    /// Count one observation of `addresses` (innermost frame first) in `pid`
    fn record(&self, pid: Pid, addresses: &[u64]);
}

#[derive(Default)]
struct Shard {
    stacks: HashMap<Pid, HashMap<Box<[u64]>, u64>>,
}

impl Shard {
    fn increment(&mut self, pid: Pid, addresses: &[u64]) {
        let per_pid = self.stacks.entry(pid).or_default();
        if let Some(count) = per_pid.get_mut(addresses) {
            *count += 1;
        } else {
            per_pid.insert(addresses.into(), 1);
        }
    }
}

/// One aggregation window: the set of counts between two drains
struct Window {
    shards: Box<[Mutex<Shard>]>,
    samples: AtomicU64,
}

impl Window {
    fn new(shard_count: usize) -> Self {
        Self {
            shards: (0..shard_count).map(|_| Mutex::new(Shard::default())).collect(),
            samples: AtomicU64::new(0),
        }
    }

    /// Consume the window into owned stacks
    fn into_stacks(self) -> impl Iterator<Item = AggregatedStack> {
        self.shards.into_vec().into_iter().flat_map(|shard| {
            let shard = shard.into_inner().unwrap_or_else(PoisonError::into_inner);
            shard.stacks.into_iter().flat_map(|(pid, stacks)| {
                stacks.into_iter().map(move |(addresses, count)| AggregatedStack {
                    key: StackKey { pid, addresses },
                    count,
                })
            })
        })
    }
}

/// The concurrent counting table
///
/// Exclusively owns every live count. Callers only ever receive copies
/// from a drain.
pub struct StackAggregator {
    live: RwLock<Window>,
    hasher: BuildHasherDefault<DefaultHasher>,
    shard_count: usize,
}

impl StackAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Create an aggregator with `shard_count` independently locked shards
    ///
    /// A count of zero is treated as one.
    #[must_use]
    pub fn with_shards(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            live: RwLock::new(Window::new(shard_count)),
            hasher: BuildHasherDefault::default(),
            shard_count,
        }
    }

    /// Count one sample in the live window
    ///
    /// Safe to call from any number of threads. Blocks only while a drain is
    /// swapping windows.
    pub fn record(&self, pid: Pid, addresses: &[u64]) {
        #[allow(clippy::cast_possible_truncation)]
        let shard_idx = (self.hasher.hash_one((pid, addresses)) as usize) % self.shard_count;

        let window = self.live.read().unwrap_or_else(PoisonError::into_inner);
        window.shards[shard_idx]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .increment(pid, addresses);
        window.samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Samples recorded into the live window so far
    ///
    /// Approximate while producers are running; meant for diagnostics.
    #[must_use]
    pub fn live_samples(&self) -> u64 {
        self.live.read().unwrap_or_else(PoisonError::into_inner).samples.load(Ordering::Relaxed)
    }

    /// Close the live window and return its `k` hottest stacks
    ///
    /// Results are sorted by descending count; equal counts are ordered by
    /// ascending pid, then ascending address sequence. The drained window is
    /// discarded even when `k` is zero.
    #[must_use]
    pub fn drain_top(&self, k: usize) -> Vec<AggregatedStack> {
        let window = self.swap_window();
        let total = window.samples.load(Ordering::Relaxed);

        let mut distinct = 0usize;
        let mut heap: BinaryHeap<Reverse<AggregatedStack>> = BinaryHeap::new();
        for stack in window.into_stacks() {
            distinct += 1;
            if k == 0 {
                continue;
            }
            if heap.len() < k {
                heap.push(Reverse(stack));
            } else if heap.peek().is_some_and(|Reverse(weakest)| stack > *weakest) {
                heap.pop();
                heap.push(Reverse(stack));
            }
        }

        debug!("Drained window: {total} samples, {distinct} distinct stacks, keeping {}", heap.len());

        // Ascending order of Reverse<_> is descending rank
        heap.into_sorted_vec().into_iter().map(|Reverse(stack)| stack).collect()
    }

    /// Close the live window and return every stack in report order
    #[must_use]
    pub fn drain_all(&self) -> Vec<AggregatedStack> {
        self.drain_top(usize::MAX)
    }

    fn swap_window(&self) -> Window {
        let fresh = Window::new(self.shard_count);
        let mut live = self.live.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *live, fresh)
    }
}

impl Default for StackAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl StackSink for StackAggregator {
    fn record(&self, pid: Pid, addresses: &[u64]) {
        StackAggregator::record(self, pid, addresses);
    }
}
