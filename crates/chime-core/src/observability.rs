use serde::{Deserialize, Serialize};

/// Per-state totals over the enabled tasks of a scheduler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}
