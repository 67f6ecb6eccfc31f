use std::collections::VecDeque;

use super::{Job, Priority};

/// Pending work for a single context: three FIFO lanes drained in strict
/// lane order, plus the flag that keeps the context to one task at a time.
#[derive(Default)]
pub(super) struct ContextQueue {
    /// Indexed by [`Priority::lane`]: urgent, high, normal.
    lanes: [VecDeque<Job>; 3],
    pub(super) running: bool,
}

impl ContextQueue {
    pub(super) fn push(&mut self, job: Job) {
        self.lanes[job.priority.lane()].push_back(job);
    }

    /// Removes the oldest job of the highest non-empty lane.
    pub(super) fn pop(&mut self) -> Option<Job> {
        self.lanes.iter_mut().find_map(VecDeque::pop_front)
    }

    pub(super) fn len(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum()
    }

    pub(super) fn is_empty(&self) -> bool {
        self.lanes.iter().all(VecDeque::is_empty)
    }

    /// Nothing queued and nothing running: the entry can be dropped.
    pub(super) fn is_idle(&self) -> bool {
        !self.running && self.is_empty()
    }

    pub(super) fn queued_at(&self, priority: Priority) -> usize {
        self.lanes[priority.lane()].len()
    }
}
