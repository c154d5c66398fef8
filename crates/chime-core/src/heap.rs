//! Fire-time heap.
//!
//! A min-heap of `(next fire time, task handle)` entries. `BinaryHeap` is a
//! max-heap, so `Ord` is reversed to pop the earliest time first. Entries
//! hold `Arc<Task>` handles; a task removed from the scheduler is
//! tombstoned (enabled flag cleared) and its entry dropped on the next pop.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::Task;

pub(crate) struct FireEntry {
    pub(crate) next: DateTime<Utc>,
    pub(crate) task: Arc<Task>,
}

impl PartialEq for FireEntry {
    fn eq(&self, other: &Self) -> bool {
        self.next == other.next
    }
}

impl Eq for FireEntry {}

impl PartialOrd for FireEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FireEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering: earlier times have higher priority.
        other.next.cmp(&self.next)
    }
}

pub(crate) type TaskHeap = BinaryHeap<FireEntry>;
