/// Bounded priority queue for thumbnail/preview generation
///
/// Binary min-heap ordered by `(priority, added_at)`: more urgent priorities
/// first, then first-come first-served. An id → heap index map gives O(1)
/// `has`/`get_priority` and lets `update_priority`/`remove` re-heapify from
/// the right slot. At most one entry exists per asset.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use crate::state::data::AssetId;

/// Default bound on pending entries
pub const DEFAULT_QUEUE_CAPACITY: usize = 200;

/// Generation urgency; lower sorts first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// On screen now
    Visible = 0,
    /// Just outside the viewport
    NearVisible = 1,
    /// Everything else in the library
    Background = 2,
    /// Speculative warm-up; only runs once background work is done
    Preload = 3,
}

/// Deferred access to an asset's encoded source bytes
pub type ByteSource = Arc<dyn Fn() -> io::Result<Vec<u8>> + Send + Sync>;

pub struct QueueItem {
    pub asset_id: AssetId,
    pub priority: Priority,
    pub source: ByteSource,
    /// Insertion sequence number; earlier entries win ties
    pub added_at: u64,
}

impl QueueItem {
    #[inline]
    fn key(&self) -> (Priority, u64) {
        (self.priority, self.added_at)
    }
}

impl fmt::Debug for QueueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueItem")
            .field("asset_id", &self.asset_id)
            .field("priority", &self.priority)
            .field("added_at", &self.added_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct PriorityQueue {
    heap: Vec<QueueItem>,
    index: HashMap<AssetId, usize>,
    capacity: usize,
    next_seq: u64,
}

impl Default for PriorityQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl PriorityQueue {
    /// Queue holding at most `capacity` entries (at least one)
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: Vec::new(),
            index: HashMap::new(),
            capacity: capacity.max(1),
            next_seq: 0,
        }
    }

    /// Add or re-prioritise `asset_id`.
    ///
    /// An existing entry keeps its place in line (`added_at`), takes the new
    /// priority and the new byte source. A new entry arriving at capacity
    /// first evicts the worst queued entry, which is returned.
    pub fn enqueue(
        &mut self,
        asset_id: AssetId,
        priority: Priority,
        source: ByteSource,
    ) -> Option<QueueItem> {
        if let Some(&i) = self.index.get(&asset_id) {
            self.heap[i].source = source;
            self.set_priority_at(i, priority);
            return None;
        }

        let evicted = if self.heap.len() >= self.capacity {
            self.worst_index().and_then(|i| self.remove_at(i))
        } else {
            None
        };

        let added_at = self.next_seq;
        self.next_seq += 1;
        let i = self.heap.len();
        self.index.insert(asset_id.clone(), i);
        self.heap.push(QueueItem {
            asset_id,
            priority,
            source,
            added_at,
        });
        self.sift_up(i);
        evicted
    }

    /// Remove and return the most urgent entry
    pub fn dequeue(&mut self) -> Option<QueueItem> {
        if self.heap.is_empty() {
            return None;
        }
        self.remove_at(0)
    }

    pub fn peek(&self) -> Option<&QueueItem> {
        self.heap.first()
    }

    pub fn has(&self, asset_id: &AssetId) -> bool {
        self.index.contains_key(asset_id)
    }

    pub fn get_priority(&self, asset_id: &AssetId) -> Option<Priority> {
        self.index.get(asset_id).map(|&i| self.heap[i].priority)
    }

    /// Change the priority of a queued asset; false when absent
    pub fn update_priority(&mut self, asset_id: &AssetId, priority: Priority) -> bool {
        match self.index.get(asset_id) {
            Some(&i) => {
                self.set_priority_at(i, priority);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, asset_id: &AssetId) -> Option<QueueItem> {
        let i = *self.index.get(asset_id)?;
        self.remove_at(i)
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.index.clear();
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn set_priority_at(&mut self, i: usize, priority: Priority) {
        let old = self.heap[i].priority;
        self.heap[i].priority = priority;
        if priority < old {
            self.sift_up(i);
        } else if priority > old {
            self.sift_down(i);
        }
    }

    /// The worst entry is always a leaf, so only the back half is scanned.
    ///
    /// This makes an enqueue into a full queue O(n) rather than O(log n).
    /// `n` is bounded by `capacity` and eviction only happens on that path,
    /// so a second, max-ordered index is not kept in sync on every
    /// operation.
    fn worst_index(&self) -> Option<usize> {
        let n = self.heap.len();
        (n / 2..n).max_by_key(|&i| self.heap[i].key())
    }

    fn remove_at(&mut self, i: usize) -> Option<QueueItem> {
        let last = self.heap.len().checked_sub(1)?;
        if i != last {
            self.swap(i, last);
        }
        let item = self.heap.pop()?;
        self.index.remove(&item.asset_id);
        if i < self.heap.len() {
            // The moved entry may belong above or below its new slot
            self.sift_up(i);
            self.sift_down(i);
        }
        Some(item)
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.index.insert(self.heap[a].asset_id.clone(), a);
        self.index.insert(self.heap[b].asset_id.clone(), b);
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.heap[i].key() >= self.heap[parent].key() {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let n = self.heap.len();
        loop {
            let left = 2 * i + 1;
            let right = left + 1;
            let mut smallest = i;
            if left < n && self.heap[left].key() < self.heap[smallest].key() {
                smallest = left;
            }
            if right < n && self.heap[right].key() < self.heap[smallest].key() {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.swap(i, smallest);
            i = smallest;
        }
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        assert_eq!(self.heap.len(), self.index.len());
        for (i, item) in self.heap.iter().enumerate() {
            assert_eq!(self.index.get(&item.asset_id), Some(&i));
            if i > 0 {
                assert!(self.heap[(i - 1) / 2].key() <= item.key());
            }
        }
    }
}
