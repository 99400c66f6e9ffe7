//! `WakerKey` / `Waiter` wait-queue bucket machinery: a fan-out table from
//! an event key (a join, a channel send slot, a channel recv slot) to the
//! tasks parked waiting on it.

use crate::select::SelectId;
use crate::task::TaskId;
use fxhash::FxHashMap;
use smallvec::SmallVec;

/// Most wait-queue buckets hold one or two parked tasks; inlining that
/// common case avoids a heap allocation per registration.
type WaiterQueue = SmallVec<[Waiter; 2]>;

/// `Invalid` is a sentinel no task is ever legitimately waiting at --
/// `register`/`wake_key` silently no-op on it rather than erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WakerKeyKind {
    Invalid,
    Join,
    ChannelSend,
    ChannelRecv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WakerKey {
    pub kind: WakerKeyKind,
    pub a: u64,
    pub b: u64,
}

impl WakerKey {
    pub const INVALID: WakerKey = WakerKey { kind: WakerKeyKind::Invalid, a: 0, b: 0 };

    pub fn join(task: TaskId) -> Self {
        WakerKey { kind: WakerKeyKind::Join, a: task.inner(), b: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waiter {
    pub task: TaskId,
    pub select: Option<SelectId>,
}

#[derive(Debug, Default)]
pub struct WakerTable {
    queues: FxHashMap<WakerKey, WaiterQueue>,
}

impl WakerTable {
    pub fn new() -> Self {
        WakerTable::default()
    }

    pub fn register(&mut self, key: WakerKey, waiter: Waiter) {
        if key.kind == WakerKeyKind::Invalid {
            return;
        }
        self.queues.entry(key).or_default().push(waiter);
    }

    /// Moves every task registered at `key` out of the wait-queue, removing
    /// the bucket entirely.
    pub fn wake_key_all(&mut self, key: WakerKey) -> WaiterQueue {
        self.queues.remove(&key).unwrap_or_default()
    }

    /// Removes every waiter belonging to `select` from every bucket it
    /// appears in.
    pub fn remove_select(&mut self, select: SelectId) {
        self.queues.retain(|_, waiters| {
            waiters.retain(|w| w.select != Some(select));
            !waiters.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_key_never_queues() {
        let mut t = WakerTable::new();
        t.register(WakerKey::INVALID, Waiter { task: TaskId::new(1), select: None });
        assert!(t.wake_key_all(WakerKey::INVALID).is_empty());
    }

    #[test]
    fn wake_key_all_drains_and_removes_bucket() {
        let mut t = WakerTable::new();
        let key = WakerKey::join(TaskId::new(9));
        t.register(key, Waiter { task: TaskId::new(1), select: None });
        t.register(key, Waiter { task: TaskId::new(2), select: None });
        let woken = t.wake_key_all(key).into_vec();
        assert_eq!(woken.len(), 2);
        assert!(t.wake_key_all(key).is_empty());
    }

    #[test]
    fn remove_select_scrubs_across_buckets() {
        let mut t = WakerTable::new();
        let k1 = WakerKey::join(TaskId::new(1));
        let k2 = WakerKey::join(TaskId::new(2));
        let sel = SelectId::new(5);
        t.register(k1, Waiter { task: TaskId::new(10), select: Some(sel) });
        t.register(k2, Waiter { task: TaskId::new(11), select: Some(sel) });
        t.register(k2, Waiter { task: TaskId::new(12), select: None });
        t.remove_select(sel);
        assert!(t.wake_key_all(k1).is_empty());
        let remaining = t.wake_key_all(k2).into_vec();
        assert_eq!(remaining, vec![Waiter { task: TaskId::new(12), select: None }]);
    }
}
