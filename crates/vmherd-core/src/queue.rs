//! Time-ordered queue of pending jobs

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use vmherd_util::{MachineName, MonotonicInstant};

use crate::job::RotationJob;

struct Entry {
    seq: u64,
    job: RotationJob,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed: the heap pops the earliest fire time, then the oldest insert
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .job
            .fire_at
            .cmp(&self.job.fire_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Pending jobs, popped in fire-time order; ties fire in insertion order
#[derive(Default)]
pub struct JobQueue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: RotationJob) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry { seq, job });
    }

    /// Remove and return every job due at `now`, earliest first
    pub fn pop_due(&mut self, now: MonotonicInstant) -> Vec<RotationJob> {
        let mut due = Vec::new();
        while self.heap.peek().is_some_and(|e| e.job.is_due(now)) {
            if let Some(entry) = self.heap.pop() {
                due.push(entry.job);
            }
        }
        due
    }

    /// Fire time of the earliest pending job
    pub fn next_fire(&self) -> Option<MonotonicInstant> {
        self.heap.peek().map(|e| e.job.fire_at)
    }

    /// Drop every job targeting `name`; returns how many were removed
    pub fn cancel_target(&mut self, name: &MachineName) -> usize {
        let before = self.heap.len();
        self.heap.retain(|e| e.job.action.target() != Some(name));
        before - self.heap.len()
    }

    pub fn has_pending(&self, predicate: impl Fn(&RotationJob) -> bool) -> bool {
        self.heap.iter().any(|e| predicate(&e.job))
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Pending jobs in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &RotationJob> {
        self.heap.iter().map(|e| &e.job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobAction;
    use std::time::Duration;

    fn job(action: JobAction, at: MonotonicInstant) -> RotationJob {
        RotationJob::new(action, at, vmherd_util::now())
    }

    #[test]
    fn pops_in_fire_order() {
        let now = MonotonicInstant::now();
        let mut queue = JobQueue::new();
        queue.push(job(JobAction::Start("b".into()), now + Duration::from_secs(30)));
        queue.push(job(JobAction::Start("a".into()), now));
        queue.push(job(JobAction::Rescan, now + Duration::from_secs(60)));

        assert_eq!(queue.next_fire(), Some(now));

        let due = queue.pop_due(now + Duration::from_secs(30));
        let actions: Vec<_> = due.iter().map(|j| j.action.to_string()).collect();
        assert_eq!(actions, vec!["start a", "start b"]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_fire(), Some(now + Duration::from_secs(60)));
    }

    #[test]
    fn equal_fire_times_keep_insertion_order() {
        let now = MonotonicInstant::now();
        let mut queue = JobQueue::new();
        for name in ["a", "b", "c", "d"] {
            queue.push(job(JobAction::Start(name.into()), now));
        }

        let order: Vec<_> = queue
            .pop_due(now)
            .into_iter()
            .map(|j| j.action.to_string())
            .collect();
        assert_eq!(order, vec!["start a", "start b", "start c", "start d"]);
    }

    #[test]
    fn nothing_due_before_fire_time() {
        let now = MonotonicInstant::now();
        let mut queue = JobQueue::new();
        queue.push(job(JobAction::Rescan, now + Duration::from_secs(5)));

        assert!(queue.pop_due(now).is_empty());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn cancel_removes_only_target_jobs() {
        let now = MonotonicInstant::now();
        let mut queue = JobQueue::new();
        queue.push(job(JobAction::Start("a".into()), now));
        queue.push(job(JobAction::Stop("a".into()), now + Duration::from_secs(120)));
        queue.push(job(JobAction::Start("b".into()), now));
        queue.push(job(JobAction::Rescan, now));

        assert_eq!(queue.cancel_target(&"a".into()), 2);
        assert_eq!(queue.len(), 2);
        assert!(!queue.has_pending(|j| j.action.target() == Some(&"a".into())));
        assert_eq!(queue.cancel_target(&"zzz".into()), 0);
    }
}
