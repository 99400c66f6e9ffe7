//! Deterministic timer min-heap: firing order is total on
//! `(deadlineMs, TimerID)`, implemented as an explicit `BinaryHeap` so that
//! order is directly observable rather than left to a library timer
//! wheel's internal tie-breaking.

use crate::task::TaskId;
use crate::waker::WakerKey;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

crate::id_type!(TimerId);

#[derive(Debug, Clone)]
pub struct Timer {
    pub id: TimerId,
    pub deadline_ms: u64,
    pub key: WakerKey,
    pub task: Option<TaskId>,
    pub cancelled: bool,
}

/// `(deadlineMs, TimerID)` ascending order so a max-heap of `Reverse` keys
/// pops the earliest-and-lowest-id timer first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct HeapKey(u64, u64);

#[derive(Default)]
pub struct TimerHeap {
    heap: BinaryHeap<Reverse<HeapKey>>,
    timers: std::collections::HashMap<u64, Timer>,
    next_id: u64,
}

impl TimerHeap {
    pub fn new() -> Self {
        TimerHeap { heap: BinaryHeap::new(), timers: std::collections::HashMap::new(), next_id: 0 }
    }

    /// Saturating deadline arithmetic: `deadline = nowMs + delay`, capped
    /// at `u64::MAX`.
    pub fn schedule(&mut self, now_ms: u64, delay_ms: u64, key: WakerKey, task: Option<TaskId>) -> TimerId {
        let id = TimerId::new(self.next_id);
        self.next_id += 1;
        let deadline_ms = now_ms.saturating_add(delay_ms);
        self.heap.push(Reverse(HeapKey(deadline_ms, id.inner())));
        self.timers.insert(id.inner(), Timer { id, deadline_ms, key, task, cancelled: false });
        id
    }

    pub fn cancel(&mut self, id: TimerId) {
        if let Some(t) = self.timers.get_mut(&id.inner()) {
            t.cancelled = true;
        }
    }

    pub fn peek_deadline(&self) -> Option<u64> {
        loop {
            let Reverse(HeapKey(deadline, id)) = self.heap.peek()?;
            match self.timers.get(id) {
                Some(t) if t.cancelled => {
                    let (deadline, id) = (*deadline, *id);
                    self.heap.pop();
                    self.timers.remove(&id);
                    let _ = deadline;
                }
                Some(_) => return Some(*deadline),
                None => {
                    self.heap.pop();
                }
            }
        }
    }

    /// Pops and returns every non-cancelled timer whose deadline is `<=
    /// now_ms`, in firing order. Lazily drops cancelled entries encountered
    /// along the way.
    pub fn pop_due(&mut self, now_ms: u64) -> Vec<Timer> {
        let mut fired = Vec::new();
        while let Some(Reverse(HeapKey(deadline, id))) = self.heap.peek().copied() {
            if deadline > now_ms {
                break;
            }
            self.heap.pop();
            if let Some(t) = self.timers.remove(&id) {
                if !t.cancelled {
                    fired.push(t);
                }
            }
        }
        fired
    }

    pub fn is_empty(&self) -> bool {
        self.timers.values().all(|t| t.cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waker::WakerKeyKind;

    fn key(a: u64) -> WakerKey {
        WakerKey { kind: WakerKeyKind::Join, a, b: 0 }
    }

    #[test]
    fn fires_in_deadline_then_id_order() {
        let mut heap = TimerHeap::new();
        let t1 = heap.schedule(0, 100, key(1), None);
        let t2 = heap.schedule(0, 50, key(2), None);
        let t3 = heap.schedule(0, 50, key(3), None);
        let fired = heap.pop_due(1000);
        let ids: Vec<TimerId> = fired.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![t2, t3, t1]);
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let mut heap = TimerHeap::new();
        let t1 = heap.schedule(0, 10, key(1), None);
        heap.cancel(t1);
        let fired = heap.pop_due(1000);
        assert!(fired.is_empty());
    }

    #[test]
    fn deadline_saturates_at_u64_max() {
        let mut heap = TimerHeap::new();
        let id = heap.schedule(u64::MAX - 5, 100, key(1), None);
        let t = heap.pop_due(u64::MAX);
        assert_eq!(t[0].id, id);
        assert_eq!(t[0].deadline_ms, u64::MAX);
    }

    #[test]
    fn peek_deadline_skips_cancelled() {
        let mut heap = TimerHeap::new();
        let t1 = heap.schedule(0, 10, key(1), None);
        heap.schedule(0, 20, key(2), None);
        heap.cancel(t1);
        assert_eq!(heap.peek_deadline(), Some(20));
    }
}
