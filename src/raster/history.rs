//! Bounded undo/redo over full-frame snapshots.
//!
//! A fixed-capacity ring of immutable pixmap snapshots plus a cursor.
//! `commit` truncates any redo branch beyond the cursor, pushes the new
//! snapshot, and evicts the oldest entry once capacity is exceeded,
//! so with capacity C, undo reaches back exactly C-1 steps from the
//! latest state and never further. `undo`/`redo` only move the cursor;
//! they never allocate new entries.

use std::collections::VecDeque;

use tiny_skia::Pixmap;

/// Snapshot history with a hard capacity. Always holds at least one
/// snapshot: the current state.
pub struct SnapshotHistory {
    slots: VecDeque<Pixmap>,
    cursor: usize,
    capacity: usize,
}

impl SnapshotHistory {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize, initial: Pixmap) -> Self {
        let mut slots = VecDeque::with_capacity(capacity.max(1));
        slots.push_back(initial);
        Self {
            slots,
            cursor: 0,
            capacity: capacity.max(1),
        }
    }

    /// Drop everything and start over from a fresh initial snapshot.
    /// Used when a new image is loaded into the session.
    pub fn reset(&mut self, initial: Pixmap) {
        self.slots.clear();
        self.slots.push_back(initial);
        self.cursor = 0;
    }

    /// Record a new state. Any redo branch beyond the cursor is
    /// discarded; the oldest entry is evicted once the ring is full.
    pub fn commit(&mut self, snapshot: Pixmap) {
        self.slots.truncate(self.cursor + 1);
        self.slots.push_back(snapshot);
        if self.slots.len() > self.capacity {
            self.slots.pop_front();
        }
        self.cursor = self.slots.len() - 1;
    }

    /// Step the cursor back and return the snapshot to restore.
    pub fn undo(&mut self) -> Option<&Pixmap> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(&self.slots[self.cursor])
    }

    /// Step the cursor forward and return the snapshot to restore.
    pub fn redo(&mut self) -> Option<&Pixmap> {
        if self.cursor + 1 >= self.slots.len() {
            return None;
        }
        self.cursor += 1;
        Some(&self.slots[self.cursor])
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.slots.len()
    }

    /// The snapshot at the cursor.
    pub fn current(&self) -> &Pixmap {
        &self.slots[self.cursor]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A 1x1 pixmap whose single pixel encodes `tag`, so snapshots are
    /// distinguishable.
    fn frame(tag: u8) -> Pixmap {
        let mut pixmap = Pixmap::new(1, 1).unwrap();
        pixmap.fill(tiny_skia::Color::from_rgba8(tag, tag, tag, 255));
        pixmap
    }

    fn tag_of(pixmap: &Pixmap) -> u8 {
        pixmap.data()[0]
    }

    #[test]
    fn undo_then_redo_round_trips() {
        let mut history = SnapshotHistory::new(8, frame(0));
        history.commit(frame(1));
        history.commit(frame(2));

        assert_eq!(tag_of(history.undo().unwrap()), 1);
        assert_eq!(tag_of(history.undo().unwrap()), 0);
        assert!(history.undo().is_none());
        assert_eq!(tag_of(history.redo().unwrap()), 1);
        assert_eq!(tag_of(history.redo().unwrap()), 2);
        assert!(history.redo().is_none());
    }

    #[test]
    fn commit_truncates_the_redo_branch() {
        let mut history = SnapshotHistory::new(8, frame(0));
        history.commit(frame(1));
        history.commit(frame(2));
        history.undo();
        history.undo();
        assert!(history.can_redo());

        history.commit(frame(9));
        assert!(!history.can_redo(), "redo branch must be discarded");
        assert_eq!(tag_of(history.current()), 9);
        assert_eq!(tag_of(history.undo().unwrap()), 0);
    }

    #[test]
    fn capacity_bounds_how_far_undo_reaches() {
        // Capacity 15, 20 commits on top of the initial frame: only the
        // last 15 states are retained, so undo stops 14 steps back.
        let capacity = 15;
        let mut history = SnapshotHistory::new(capacity, frame(0));
        for i in 1..=20u8 {
            history.commit(frame(i));
        }
        assert_eq!(history.len(), capacity);

        let mut undos = 0;
        while history.can_undo() {
            history.undo();
            undos += 1;
        }
        assert_eq!(undos, capacity - 1);
        assert_eq!(
            tag_of(history.current()),
            6,
            "the original blank frame is long evicted"
        );
        // Further undos are refused, 16 attempts or a hundred.
        assert!(history.undo().is_none());
    }

    #[test]
    fn cursor_stays_valid_across_eviction() {
        let mut history = SnapshotHistory::new(3, frame(0));
        for i in 1..=10u8 {
            history.commit(frame(i));
            assert_eq!(tag_of(history.current()), i);
            assert!(history.len() <= 3);
        }
    }

    #[test]
    fn reset_clears_everything() {
        let mut history = SnapshotHistory::new(4, frame(0));
        history.commit(frame(1));
        history.commit(frame(2));
        history.reset(frame(7));
        assert_eq!(history.len(), 1);
        assert!(!history.can_undo());
        assert!(!history.can_redo());
        assert_eq!(tag_of(history.current()), 7);
    }
}
