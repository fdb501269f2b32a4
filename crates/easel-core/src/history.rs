//! Bounded linear undo/redo history.
//!
//! [`HistoryStack`] is a fixed-capacity ring buffer with a cursor. Pushing
//! while the cursor is behind the newest entry discards the redo branch;
//! pushing into a full stack evicts the oldest entry. Undo and redo are O(1).
//! Push drops the redo branch slot by slot, so a single push costs the length
//! of that branch; since every entry is dropped at most once, push is
//! amortized O(1). Entries are never mutated once stored.

use std::num::NonZeroUsize;

/// Memory retained by a history entry.
pub trait MemorySize {
    fn memory_size(&self) -> usize;
}

/// Cursor-addressed ring buffer of snapshots.
#[derive(Debug, Clone)]
pub struct HistoryStack<T> {
    slots: Vec<Option<T>>,
    /// Physical index of the oldest entry.
    head: usize,
    len: usize,
    /// Logical index of the current entry; only meaningful when `len > 0`.
    cursor: usize,
}

impl<T> HistoryStack<T> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        let mut slots = Vec::with_capacity(capacity.get());
        slots.resize_with(capacity.get(), || None);
        Self {
            slots,
            head: 0,
            len: 0,
            cursor: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Logical index of the current entry, oldest first.
    pub fn cursor(&self) -> Option<usize> {
        (self.len > 0).then_some(self.cursor)
    }

    #[inline]
    fn physical(&self, logical: usize) -> usize {
        (self.head + logical) % self.slots.len()
    }

    /// Entry at logical position `index`, oldest first.
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        self.slots[self.physical(index)].as_ref()
    }

    pub fn current(&self) -> Option<&T> {
        self.cursor().and_then(|c| self.get(c))
    }

    /// Append `entry` after the cursor and make it current.
    ///
    /// Entries after the cursor are dropped first. If the stack is full the
    /// oldest entry is evicted and returned.
    pub fn push(&mut self, entry: T) -> Option<T> {
        if self.len > 0 {
            for logical in self.cursor + 1..self.len {
                let idx = self.physical(logical);
                self.slots[idx] = None;
            }
            self.len = self.cursor + 1;
        }

        let evicted = if self.len == self.capacity() {
            let oldest = self.slots[self.head].take();
            self.head = (self.head + 1) % self.capacity();
            self.len -= 1;
            oldest
        } else {
            None
        };

        let idx = self.physical(self.len);
        self.slots[idx] = Some(entry);
        self.len += 1;
        self.cursor = self.len - 1;
        evicted
    }

    pub fn can_undo(&self) -> bool {
        self.len > 0 && self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.len > 0 && self.cursor + 1 < self.len
    }

    /// Step back one entry. Returns the new current entry, or `None` when
    /// already at the oldest one.
    pub fn undo(&mut self) -> Option<&T> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.current()
    }

    /// Step forward one entry. Returns the new current entry, or `None` when
    /// already at the newest one.
    pub fn redo(&mut self) -> Option<&T> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.current()
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
        self.cursor = 0;
    }

    /// Drop everything and start over from `seed`.
    pub fn reset(&mut self, seed: T) {
        self.clear();
        self.push(seed);
    }

    /// Entries oldest first, including any redo branch.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |i| self.get(i))
    }
}

impl<T: MemorySize> HistoryStack<T> {
    /// Total memory retained by all entries.
    pub fn memory_size(&self) -> usize {
        self.iter().map(MemorySize::memory_size).sum()
    }
}
