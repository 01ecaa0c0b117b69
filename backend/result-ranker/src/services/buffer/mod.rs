// ============================================
// Indexed Buffer (索引緩衝區)
// ============================================
//
// Fixed-capacity label → slot map with least-recently-used eviction.
//
// Slots are the address space of the model's output layer, so a label keeps
// its slot for as long as it stays in the buffer and an evicted label's slot
// is handed to the label that displaced it.
//
// Layout: `nodes[slot]` holds the label living in that slot plus the links of
// an intrusive doubly linked recency list (lru ↔ ... ↔ mru). Insert, touch
// and evict are O(1).

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("Snapshot holds {labels} labels but capacity is {capacity}")]
    Overflow { labels: usize, capacity: usize },

    #[error("Snapshot holds duplicate label at slot {0}")]
    DuplicateLabel(usize),
}

#[derive(Debug, Clone)]
struct Node<T> {
    label: T,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct IndexedBuffer<T> {
    capacity: usize,
    nodes: Vec<Node<T>>,
    slots: HashMap<T, usize>,
    /// Least recently used slot, next to be evicted
    lru: Option<usize>,
    /// Most recently used slot
    mru: Option<usize>,
}

impl<T> IndexedBuffer<T>
where
    T: Eq + Hash + Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            nodes: Vec::with_capacity(capacity.min(1024)),
            slots: HashMap::new(),
            lru: None,
            mru: None,
        }
    }

    /// Rebuild a buffer from its persisted form.
    ///
    /// `labels[i]` lands in slot `i`. `eviction_order` (least recent first) is
    /// replayed as touches so future evictions match the buffer that produced
    /// the snapshot; entries that are not labels are ignored.
    pub fn from_snapshot<Q>(
        capacity: usize,
        labels: Vec<T>,
        eviction_order: &[Q],
    ) -> Result<Self, BufferError>
    where
        T: Borrow<Q>,
        Q: Eq + Hash,
    {
        if labels.len() > capacity {
            return Err(BufferError::Overflow {
                labels: labels.len(),
                capacity,
            });
        }

        let mut buffer = Self::new(capacity);
        for (slot, label) in labels.into_iter().enumerate() {
            if buffer.slots.contains_key::<T>(&label) {
                return Err(BufferError::DuplicateLabel(slot));
            }
            buffer.push_new(label);
        }

        for label in eviction_order {
            buffer.touch(label);
        }

        Ok(buffer)
    }

    /// Add a label unless already present.
    ///
    /// Returns the slot that was evicted to make room, if any. A label that
    /// is already present keeps its recency untouched.
    pub fn insert(&mut self, label: T) -> Option<usize> {
        if self.capacity == 0 || self.slots.contains_key(&label) {
            return None;
        }

        if self.nodes.len() < self.capacity {
            self.push_new(label);
            return None;
        }

        let slot = self.lru?;
        self.unlink(slot);
        let evicted = std::mem::replace(&mut self.nodes[slot].label, label.clone());
        self.slots.remove(&evicted);
        self.slots.insert(label, slot);
        self.link_mru(slot);

        Some(slot)
    }

    /// Insert every label in order, collecting the evicted slots
    pub fn extend<I>(&mut self, labels: I) -> Vec<usize>
    where
        I: IntoIterator<Item = T>,
    {
        labels
            .into_iter()
            .filter_map(|label| self.insert(label))
            .collect()
    }

    /// Mark a label as most recently used. Unknown labels are ignored.
    pub fn touch<Q>(&mut self, label: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        match self.slots.get(label) {
            Some(&slot) => {
                if self.mru != Some(slot) {
                    self.unlink(slot);
                    self.link_mru(slot);
                }
                true
            }
            None => false,
        }
    }

    pub fn contains<Q>(&self, label: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.slots.contains_key(label)
    }

    pub fn slot_of<Q>(&self, label: &Q) -> Option<usize>
    where
        T: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.slots.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Labels indexed by slot
    pub fn labels_in_slot_order(&self) -> Vec<T> {
        self.nodes.iter().map(|node| node.label.clone()).collect()
    }

    /// Labels from least to most recently used
    pub fn eviction_order(&self) -> Vec<T> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut cursor = self.lru;
        while let Some(slot) = cursor {
            let node = &self.nodes[slot];
            order.push(node.label.clone());
            cursor = node.next;
        }
        order
    }

    fn push_new(&mut self, label: T) {
        let slot = self.nodes.len();
        self.nodes.push(Node {
            label: label.clone(),
            prev: None,
            next: None,
        });
        self.slots.insert(label, slot);
        self.link_mru(slot);
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = {
            let node = &self.nodes[slot];
            (node.prev, node.next)
        };

        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.lru = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.mru = prev,
        }

        let node = &mut self.nodes[slot];
        node.prev = None;
        node.next = None;
    }

    fn link_mru(&mut self, slot: usize) {
        self.nodes[slot].prev = self.mru;
        self.nodes[slot].next = None;

        match self.mru {
            Some(tail) => self.nodes[tail].next = Some(slot),
            None => self.lru = Some(slot),
        }
        self.mru = Some(slot);
    }
}
