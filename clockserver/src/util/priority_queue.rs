//! Associative priority queue.

/// An associative container optimized for extraction of the value with the
/// lowest key.
///
/// This is a conventional array-based binary min-heap with one extra
/// guarantee: same-key elements are pulled in FIFO order. Each element is
/// tagged at insertion with a monotonically increasing epoch, and the heap is
/// ordered by the (key, epoch) pair, so two elements inserted with equal keys
/// are extracted in insertion order.
///
/// Values are stored inline in the heap items. Since the queue is only ever
/// pulled from the top and reinserted, no support for arbitrary deletion is
/// provided.
pub(crate) struct PriorityQueue<K, V>
where
    K: Copy + Ord,
{
    heap: Vec<Item<K, V>>,
    next_epoch: u64,
}

impl<K: Copy + Ord, V> PriorityQueue<K, V> {
    /// Creates an empty `PriorityQueue`.
    pub(crate) fn new() -> Self {
        Self {
            heap: Vec::new(),
            next_epoch: 0,
        }
    }

    /// Creates an empty `PriorityQueue` with at least the specified capacity.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: Vec::with_capacity(capacity),
            next_epoch: 0,
        }
    }

    /// Returns the number of key-value pairs in the priority queue.
    #[allow(unused)]
    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    /// Inserts a new key-value pair.
    ///
    /// This operation has *O*(log(*N*)) amortized worse-case theoretical
    /// complexity.
    pub(crate) fn insert(&mut self, key: K, value: V) {
        let epoch = self.next_epoch;
        assert_ne!(epoch, u64::MAX);
        self.next_epoch += 1;

        self.heap.push(Item {
            key: UniqueKey { key, epoch },
            value,
        });
        self.sift_up(self.heap.len() - 1);
    }

    /// Pulls the value with the lowest key.
    ///
    /// If there are several equal lowest keys, the value which was inserted
    /// first is returned.
    ///
    /// This operation has *O*(log(N)) non-amortized theoretical complexity.
    pub(crate) fn pull(&mut self) -> Option<(K, V)> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.heap.swap(0, last);
        let item = self.heap.pop().unwrap();
        if !self.heap.is_empty() {
            self.sift_down(0);
        }

        Some((item.key.key, item.value))
    }

    /// Peeks a reference to the lowest key, leaving it in the queue.
    ///
    /// This operation has *O*(1) non-amortized theoretical complexity.
    pub(crate) fn peek_key(&self) -> Option<&K> {
        self.heap.first().map(|item| &item.key.key)
    }

    /// Moves the item at `idx` up the heap while a parent has a larger key.
    fn sift_up(&mut self, mut idx: usize) {
        while idx != 0 {
            let parent_idx = (idx - 1) / 2;

            // Stop when the key is larger or equal to the parent's.
            if self.heap[idx].key >= self.heap[parent_idx].key {
                break;
            }
            self.heap.swap(idx, parent_idx);
            idx = parent_idx;
        }
    }

    /// Moves the item at `idx` down the heap while a child has a smaller key.
    fn sift_down(&mut self, mut idx: usize) {
        loop {
            let mut child_idx = 2 * idx + 1;
            if child_idx >= self.heap.len() {
                break;
            }

            // If the sibling exists and has a smaller key, make it the
            // candidate for swapping.
            if let Some(other_child) = self.heap.get(child_idx + 1) {
                child_idx += (self.heap[child_idx].key > other_child.key) as usize;
            }

            // Stop when the key is smaller or equal to the child with the
            // smallest key.
            if self.heap[idx].key <= self.heap[child_idx].key {
                break;
            }
            self.heap.swap(idx, child_idx);
            idx = child_idx;
        }
    }
}

/// A single key-value pair stored in the heap.
struct Item<K: Copy, V> {
    key: UniqueKey<K>,
    value: V,
}

/// A unique key made of the user-provided key complemented by a unique epoch.
///
/// Implementation note: `UniqueKey` automatically derives `PartialOrd`, which
/// implies that lexicographic order between `key` and `epoch` must be
/// preserved to make sure that `key` has a higher sorting priority than
/// `epoch`.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct UniqueKey<K: Copy> {
    /// The user-provided key.
    key: K,
    /// A unique epoch that indicates the insertion date.
    epoch: u64,
}
