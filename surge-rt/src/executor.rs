//! The deterministic scheduling loop: glues Task/Scope/Timer/Channel/Select
//! together and drives the ready-queue.
//!
//! Poll dispatch is plain synchronous Rust, not futures: compiled IR calls
//! back into the executor one poll at a time through a jump table. This
//! crate does not execute LLVM IR itself, so the caller supplies a
//! [`PollHandler`] standing in for that jump table.

use crate::channel::{Channel, ChannelId, RecvOutcome};
use crate::clock::{Clock, ClockKind, RealClock, VirtualClock};
use crate::scope::{Scope, ScopeId};
use crate::select::{SelectId, SelectSub};
use crate::task::{ResultKind, Task, TaskId, TaskKind, TaskStatus};
use crate::timer::{Timer, TimerHeap, TimerId};
use crate::waker::{WakerKey, WakerTable, Waiter};
use fxhash::FxHashMap;
use std::collections::VecDeque;

/// Constructor knobs for an [`Executor`]: which clock realization to use
/// and a sizing hint for the ready queue.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    pub clock: ClockKind,
    pub ready_queue_capacity_hint: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig { clock: ClockKind::Virtual, ready_queue_capacity_hint: 16 }
    }
}

#[derive(Debug)]
enum ClockImpl {
    Virtual(VirtualClock),
    Real(RealClock),
}

impl Clock for ClockImpl {
    fn now_ms(&self) -> u64 {
        match self {
            ClockImpl::Virtual(c) => c.now_ms(),
            ClockImpl::Real(c) => c.now_ms(),
        }
    }

    fn sleep_until_ms(&mut self, target_ms: u64) {
        match self {
            ClockImpl::Virtual(c) => c.sleep_until_ms(target_ms),
            ClockImpl::Real(c) => c.sleep_until_ms(target_ms),
        }
    }
}

/// What a simulated poll invocation reported back: yielding, returning a
/// value, or returning cancelled. Falling off the end without an explicit
/// terminator is treated identically to `Yield`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Yield,
    Return(i64),
    ReturnCancelled,
}

/// Stands in for the compiled module's poll dispatch table: given a task
/// about to be polled, run its poll body one tick and report how it
/// finished. A real embedder backs this with a call into compiled/JIT'd
/// IR; tests back it with a plain state machine.
pub trait PollHandler {
    fn poll(&mut self, task: TaskId) -> PollOutcome;
}

#[derive(Debug)]
pub struct Executor {
    clock: ClockImpl,
    tasks: FxHashMap<u64, Task>,
    scopes: FxHashMap<u64, Scope>,
    channels: FxHashMap<u64, Channel>,
    selects: FxHashMap<u64, SelectSub>,
    ready: VecDeque<TaskId>,
    timers: TimerHeap,
    wakers: WakerTable,
    next_task: u64,
    next_scope: u64,
    next_channel: u64,
    next_select: u64,
}

impl Executor {
    pub fn new(config: ExecutorConfig) -> Self {
        let clock = match config.clock {
            ClockKind::Virtual => ClockImpl::Virtual(VirtualClock::new()),
            ClockKind::Real => ClockImpl::Real(RealClock::new()),
        };
        Executor {
            clock,
            tasks: FxHashMap::default(),
            scopes: FxHashMap::default(),
            channels: FxHashMap::default(),
            selects: FxHashMap::default(),
            ready: VecDeque::with_capacity(config.ready_queue_capacity_hint),
            timers: TimerHeap::new(),
            wakers: WakerTable::new(),
            next_task: 0,
            next_scope: 0,
            next_channel: 0,
            next_select: 0,
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id.inner())
    }

    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(&id.inner())
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(&id.inner())
    }

    // ---- tasks -------------------------------------------------------

    /// Creates a task and enqueues it: by the time a spawn's result is
    /// observable to its caller, the task is already runnable.
    pub fn spawn_task(&mut self, kind: TaskKind, parent_scope: Option<ScopeId>, poll_fn_id: i64) -> TaskId {
        let id = TaskId::new(self.next_task);
        self.next_task += 1;
        self.tasks.insert(id.inner(), Task::new(id, kind, parent_scope, poll_fn_id));
        self.ready.push_back(id);
        id
    }

    /// Cooperative cancellation: the task observes this on its next poll.
    pub fn cancel(&mut self, id: TaskId) {
        if let Some(t) = self.tasks.get_mut(&id.inner()) {
            t.cancel_requested = true;
        }
    }

    fn wake_task_direct(&mut self, id: TaskId) {
        if let Some(t) = self.tasks.get_mut(&id.inner()) {
            if !t.is_done() {
                t.status = TaskStatus::Runnable;
                if !self.ready.contains(&id) {
                    self.ready.push_back(id);
                }
            }
        }
    }

    fn park(&mut self, id: TaskId) {
        if let Some(t) = self.tasks.get_mut(&id.inner()) {
            t.status = TaskStatus::Parked;
        }
    }

    fn complete_task(&mut self, id: TaskId, kind: ResultKind, bits: i64) {
        if let Some(t) = self.tasks.get_mut(&id.inner()) {
            t.status = match kind {
                ResultKind::Cancelled => TaskStatus::Cancelled,
                ResultKind::Success | ResultKind::Pending => TaskStatus::Done,
            };
            t.result_kind = kind;
            t.result_bits = bits;
        }
        self.wake_key(WakerKey::join(id));
    }

    fn wake_key(&mut self, key: WakerKey) {
        let waiters = self.wakers.wake_key_all(key);
        for w in waiters {
            self.wake_task_direct(w.task);
        }
    }

    // ---- scopes --------------------------------------------------------

    pub fn enter_scope(&mut self, owner: TaskId, failfast: bool) -> ScopeId {
        let id = ScopeId::new(self.next_scope);
        self.next_scope += 1;
        self.scopes.insert(id.inner(), Scope::new(id, owner, failfast));
        if let Some(t) = self.tasks.get_mut(&owner.inner()) {
            t.scope = Some(id);
        }
        id
    }

    pub fn register_child(&mut self, scope: ScopeId, child: TaskId) {
        if let Some(s) = self.scopes.get_mut(&scope.inner()) {
            s.register_child(child);
        }
        if let Some(t) = self.tasks.get_mut(&child.inner()) {
            t.parent_scope = Some(scope);
        }
    }

    /// Cancels every child in spawn order: their relative order in
    /// `Scope::children` is untouched, only their cancellation flags
    /// change.
    pub fn cancel_all_children(&mut self, scope: ScopeId) {
        let children = match self.scopes.get(&scope.inner()) {
            Some(s) => s.children.clone(),
            None => return,
        };
        for child in children {
            self.cancel(child);
        }
    }

    /// Advances in spawn order and reports the first not-yet-`Done` child
    /// as the pending waitee, alongside the scope's latched failfast bit.
    pub fn join_all_children_blocking(&mut self, scope: ScopeId) -> (bool, Option<TaskId>, bool) {
        let Some(s) = self.scopes.get(&scope.inner()) else {
            return (true, None, false);
        };
        let failfast = s.failfast_triggered;
        for &child in &s.children {
            let done = self.tasks.get(&child.inner()).map(|t| t.is_done()).unwrap_or(true);
            if !done {
                return (false, Some(child), failfast);
            }
        }
        (true, None, failfast)
    }

    /// Marks the scope's failfast latch. Once set it remains set for the
    /// scope's lifetime.
    pub fn trigger_failfast(&mut self, scope: ScopeId) {
        if let Some(s) = self.scopes.get_mut(&scope.inner()) {
            s.failfast_triggered = true;
        }
    }

    /// Panics with the exact formatted message if any child is not
    /// `Done`.
    pub fn exit_scope(&mut self, scope: ScopeId) {
        let Some(s) = self.scopes.get(&scope.inner()) else { return };
        let live: Vec<TaskId> = s
            .children
            .iter()
            .copied()
            .filter(|c| !self.tasks.get(&c.inner()).map(|t| t.is_done()).unwrap_or(true))
            .collect();
        if !live.is_empty() {
            let msg = Scope::live_children_message(scope, &live);
            log::warn!("{msg}");
            panic!("{msg}");
        }
        self.scopes.remove(&scope.inner());
    }

    // ---- timers --------------------------------------------------------

    pub fn schedule_timer(&mut self, delay_ms: u64, key: WakerKey, task: Option<TaskId>) -> TimerId {
        let now = self.clock.now_ms();
        self.timers.schedule(now, delay_ms, key, task)
    }

    pub fn cancel_timer(&mut self, id: TimerId) {
        self.timers.cancel(id);
    }

    fn fire_timer(&mut self, timer: Timer) {
        if let Some(task) = timer.task {
            self.wake_task_direct(task);
        }
        self.wake_key(timer.key);
    }

    // ---- channels --------------------------------------------------------

    pub fn new_channel(&mut self, capacity: usize) -> ChannelId {
        let id = ChannelId::new(self.next_channel);
        self.next_channel += 1;
        self.channels.insert(id.inner(), Channel::new(id, capacity));
        id
    }

    pub fn try_send(&mut self, ch: ChannelId, value: i64) -> bool {
        let sent = self.channels.get_mut(&ch.inner()).map(|c| c.try_send(value)).unwrap_or(false);
        if sent {
            self.wake_one_recv_waiter(ch);
        }
        sent
    }

    pub fn try_recv(&mut self, ch: ChannelId) -> RecvOutcome {
        let outcome =
            self.channels.get_mut(&ch.inner()).map(|c| c.try_recv()).unwrap_or(RecvOutcome::Closed);
        if matches!(outcome, RecvOutcome::Value(_)) {
            self.wake_one_send_waiter(ch);
        }
        outcome
    }

    /// Suspending send: parks `task` on the channel's send wait-queue when
    /// the buffer is full.
    pub fn send_blocking(&mut self, ch: ChannelId, value: i64, task: TaskId) -> bool {
        if self.try_send(ch, value) {
            return true;
        }
        if let Some(c) = self.channels.get_mut(&ch.inner()) {
            c.send_waiters.push_back(Waiter { task, select: None });
        }
        self.park(task);
        false
    }

    pub fn recv_blocking(&mut self, ch: ChannelId, task: TaskId) -> RecvOutcome {
        let outcome = self.try_recv(ch);
        if matches!(outcome, RecvOutcome::WouldBlock) {
            if let Some(c) = self.channels.get_mut(&ch.inner()) {
                c.recv_waiters.push_back(Waiter { task, select: None });
            }
            self.park(task);
        }
        outcome
    }

    /// Close wakes all senders and receivers.
    pub fn close_channel(&mut self, ch: ChannelId) {
        let Some(c) = self.channels.get_mut(&ch.inner()) else { return };
        let (recv_waiters, send_waiters) = c.close();
        for w in recv_waiters {
            self.wake_task_direct(w.task);
        }
        for w in send_waiters {
            self.wake_task_direct(w.task);
        }
    }

    fn wake_one_recv_waiter(&mut self, ch: ChannelId) {
        let waiter = self.channels.get_mut(&ch.inner()).and_then(|c| c.recv_waiters.pop_front());
        if let Some(w) = waiter {
            self.wake_task_direct(w.task);
        }
    }

    fn wake_one_send_waiter(&mut self, ch: ChannelId) {
        let waiter = self.channels.get_mut(&ch.inner()).and_then(|c| c.send_waiters.pop_front());
        if let Some(w) = waiter {
            self.wake_task_direct(w.task);
        }
    }

    // ---- select --------------------------------------------------------

    pub fn select_new(&mut self, owner: TaskId) -> SelectId {
        let id = SelectId::new(self.next_select);
        self.next_select += 1;
        self.selects.insert(id.inner(), SelectSub::new(id, owner));
        id
    }

    pub fn select_register_key(&mut self, select: SelectId, key: WakerKey) {
        let owner = match self.selects.get_mut(&select.inner()) {
            Some(sub) => {
                sub.keys.push(key);
                sub.owner
            }
            None => return,
        };
        self.wakers.register(key, Waiter { task: owner, select: Some(select) });
    }

    pub fn select_register_recv(&mut self, select: SelectId, ch: ChannelId) {
        let owner = match self.selects.get_mut(&select.inner()) {
            Some(sub) => {
                sub.recv_channels.push(ch);
                sub.owner
            }
            None => return,
        };
        if let Some(c) = self.channels.get_mut(&ch.inner()) {
            c.recv_waiters.push_back(Waiter { task: owner, select: Some(select) });
        }
    }

    pub fn select_register_send(&mut self, select: SelectId, ch: ChannelId) {
        let owner = match self.selects.get_mut(&select.inner()) {
            Some(sub) => {
                sub.send_channels.push(ch);
                sub.owner
            }
            None => return,
        };
        if let Some(c) = self.channels.get_mut(&ch.inner()) {
            c.send_waiters.push_back(Waiter { task: owner, select: Some(select) });
        }
    }

    /// Arms a per-arm timeout timer, bound directly to the select's owner
    /// task rather than a waker key, so firing it wakes the owner without
    /// any other registration.
    pub fn select_arm_timer(&mut self, select: SelectId, arm: usize, delay_ms: u64) -> Option<TimerId> {
        let owner = self.selects.get(&select.inner())?.owner;
        let timer_id = self.schedule_timer(delay_ms, WakerKey::INVALID, Some(owner));
        if let Some(sub) = self.selects.get_mut(&select.inner()) {
            sub.arm_timers.insert(arm, timer_id);
        }
        Some(timer_id)
    }

    /// Removes all waiter entries and cancels all timers registered on
    /// this select's arms.
    pub fn select_clear(&mut self, select: SelectId) {
        self.wakers.remove_select(select);
        if let Some(sub) = self.selects.remove(&select.inner()) {
            for ch in &sub.recv_channels {
                if let Some(c) = self.channels.get_mut(&ch.inner()) {
                    c.recv_waiters.retain(|w| w.select != Some(select));
                }
            }
            for ch in &sub.send_channels {
                if let Some(c) = self.channels.get_mut(&ch.inner()) {
                    c.send_waiters.retain(|w| w.select != Some(select));
                }
            }
            for timer in sub.arm_timers.values() {
                self.timers.cancel(*timer);
            }
        }
    }

    /// Removes waiters but leaves timers armed, and keeps the registration
    /// alive so it can be partially rearmed under the same select id.
    pub fn select_clear_waiters(&mut self, select: SelectId) {
        self.wakers.remove_select(select);
        let Some(sub) = self.selects.get_mut(&select.inner()) else { return };
        let recv_channels = std::mem::take(&mut sub.recv_channels);
        let send_channels = std::mem::take(&mut sub.send_channels);
        sub.keys.clear();
        for ch in &recv_channels {
            if let Some(c) = self.channels.get_mut(&ch.inner()) {
                c.recv_waiters.retain(|w| w.select != Some(select));
            }
        }
        for ch in &send_channels {
            if let Some(c) = self.channels.get_mut(&ch.inner()) {
                c.send_waiters.retain(|w| w.select != Some(select));
            }
        }
    }

    // ---- scheduling loop -------------------------------------------------

    /// Drives the scheduling loop to completion: dispatches every runnable
    /// task, then fires due timers (advancing the clock to the next
    /// deadline when otherwise idle), until both the ready queue and the
    /// timer heap are empty.
    pub fn run_until_idle(&mut self, handler: &mut dyn PollHandler) {
        loop {
            while let Some(task_id) = self.ready.pop_front() {
                log::debug!("dispatch task {task_id}");
                self.dispatch(handler, task_id);
            }
            let now = self.clock.now_ms();
            let mut due = self.timers.pop_due(now);
            if due.is_empty() {
                match self.timers.peek_deadline() {
                    Some(deadline) => {
                        log::debug!("advancing clock to next timer deadline {deadline}");
                        self.clock.sleep_until_ms(deadline);
                        due = self.timers.pop_due(self.clock.now_ms());
                    }
                    None => {
                        log::debug!("ready queue and timer heap both empty, halting");
                        break;
                    }
                }
            }
            for timer in due {
                log::debug!("firing timer {}", timer.id);
                self.fire_timer(timer);
            }
        }
    }

    fn dispatch(&mut self, handler: &mut dyn PollHandler, id: TaskId) {
        let outcome = handler.poll(id);
        match outcome {
            PollOutcome::Yield => {
                let requeue = self
                    .tasks
                    .get(&id.inner())
                    .map(|t| t.status == TaskStatus::Runnable && !t.cancel_requested)
                    .unwrap_or(false);
                if requeue {
                    self.ready.push_back(id);
                }
            }
            PollOutcome::Return(bits) => self.complete_task(id, ResultKind::Success, bits),
            PollOutcome::ReturnCancelled => self.complete_task(id, ResultKind::Cancelled, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedHandler {
        ticks: FxHashMap<u64, Vec<PollOutcome>>,
    }

    impl ScriptedHandler {
        fn new() -> Self {
            ScriptedHandler { ticks: FxHashMap::default() }
        }

        fn script(&mut self, task: TaskId, outcomes: Vec<PollOutcome>) {
            self.ticks.insert(task.inner(), outcomes);
        }
    }

    impl PollHandler for ScriptedHandler {
        fn poll(&mut self, task: TaskId) -> PollOutcome {
            let script = self.ticks.get_mut(&task.inner()).expect("scripted task");
            if script.is_empty() {
                PollOutcome::Yield
            } else {
                script.remove(0)
            }
        }
    }

    /// Exiting a scope with a live child panics with the exact formatted
    /// message.
    #[test]
    #[should_panic(expected = "scope 0 exited with live children: [1]")]
    fn scope_exit_with_live_children_panics() {
        let mut ex = Executor::new(ExecutorConfig::default());
        let t1 = ex.spawn_task(TaskKind::User, None, 0);
        let scope = ex.enter_scope(t1, false);
        let t2 = ex.spawn_task(TaskKind::User, Some(scope), 0);
        ex.register_child(scope, t2);
        ex.exit_scope(scope);
    }

    /// A scope whose only child already completed exits cleanly.
    #[test]
    fn exit_scope_with_done_children_succeeds() {
        let mut ex = Executor::new(ExecutorConfig::default());
        let owner = ex.spawn_task(TaskKind::User, None, 0);
        let scope = ex.enter_scope(owner, false);
        let child = ex.spawn_task(TaskKind::User, Some(scope), 0);
        ex.register_child(scope, child);
        let mut handler = ScriptedHandler::new();
        handler.script(owner, vec![PollOutcome::Return(0)]);
        handler.script(child, vec![PollOutcome::Return(0)]);
        ex.run_until_idle(&mut handler);
        ex.exit_scope(scope);
        assert!(ex.scope(scope).is_none());
    }

    /// Failfast reporting through `join_all_children_blocking`.
    #[test]
    fn failfast_is_reported_through_join_all_children() {
        let mut ex = Executor::new(ExecutorConfig::default());
        let owner = ex.spawn_task(TaskKind::User, None, 0);
        let scope = ex.enter_scope(owner, true);
        let c1 = ex.spawn_task(TaskKind::User, Some(scope), 0);
        let c2 = ex.spawn_task(TaskKind::User, Some(scope), 0);
        ex.register_child(scope, c1);
        ex.register_child(scope, c2);

        let (done, pending, failfast) = ex.join_all_children_blocking(scope);
        assert!(!done);
        assert_eq!(pending, Some(c1));
        assert!(!failfast);

        ex.trigger_failfast(scope);
        let (done, pending, failfast) = ex.join_all_children_blocking(scope);
        assert!(!done);
        assert_eq!(pending, Some(c1));
        assert!(failfast);

        let mut handler = ScriptedHandler::new();
        handler.script(owner, vec![PollOutcome::Return(0)]);
        handler.script(c1, vec![PollOutcome::ReturnCancelled]);
        handler.script(c2, vec![PollOutcome::Return(0)]);
        ex.run_until_idle(&mut handler);

        let (done, pending, failfast) = ex.join_all_children_blocking(scope);
        assert!(done);
        assert_eq!(pending, None);
        assert!(failfast);
    }

    /// Cancellation flags are set in spawn order and spawn order itself is
    /// untouched.
    #[test]
    fn cancel_all_children_preserves_spawn_order() {
        let mut ex = Executor::new(ExecutorConfig::default());
        let owner = ex.spawn_task(TaskKind::User, None, 0);
        let scope = ex.enter_scope(owner, false);
        let c1 = ex.spawn_task(TaskKind::User, Some(scope), 0);
        let c2 = ex.spawn_task(TaskKind::User, Some(scope), 0);
        let c3 = ex.spawn_task(TaskKind::User, Some(scope), 0);
        ex.register_child(scope, c1);
        ex.register_child(scope, c2);
        ex.register_child(scope, c3);

        ex.cancel_all_children(scope);

        assert_eq!(ex.scope(scope).unwrap().children.as_slice(), &[c1, c2, c3][..]);
        assert!(ex.task(c1).unwrap().cancel_requested);
        assert!(ex.task(c2).unwrap().cancel_requested);
        assert!(ex.task(c3).unwrap().cancel_requested);
    }

    /// Yielding re-enqueues a still-runnable, non-cancelled task until it
    /// eventually returns.
    #[test]
    fn yielding_task_is_rescheduled_until_it_returns() {
        let mut ex = Executor::new(ExecutorConfig::default());
        let t = ex.spawn_task(TaskKind::User, None, 0);
        let mut handler = ScriptedHandler::new();
        handler.script(t, vec![PollOutcome::Yield, PollOutcome::Yield, PollOutcome::Return(42)]);
        ex.run_until_idle(&mut handler);
        let task = ex.task(t).unwrap();
        assert_eq!(task.status, TaskStatus::Done);
        assert_eq!(task.result_kind, ResultKind::Success);
        assert_eq!(task.result_bits, 42);
    }

    /// A cancelled task that yields is dropped rather than rescheduled.
    #[test]
    fn cancelled_yielding_task_is_dropped() {
        let mut ex = Executor::new(ExecutorConfig::default());
        let t = ex.spawn_task(TaskKind::User, None, 0);
        ex.cancel(t);
        let mut handler = ScriptedHandler::new();
        handler.script(t, vec![PollOutcome::Yield, PollOutcome::Return(1)]);
        ex.run_until_idle(&mut handler);
        // Dropped after the first yield: the scripted second outcome is
        // never consumed, and the task never reaches Done.
        assert_eq!(ex.task(t).unwrap().status, TaskStatus::Runnable);
    }

    /// Timers fire in `(deadlineMs, TimerID)` order, and the virtual clock
    /// advances to the next deadline when idle.
    #[test]
    fn timers_fire_in_order_and_advance_virtual_clock() {
        let mut ex = Executor::new(ExecutorConfig::default());
        let t1 = ex.spawn_task(TaskKind::Sleep, None, 0);
        let t2 = ex.spawn_task(TaskKind::Sleep, None, 0);
        // Both tasks immediately park themselves awaiting their timers;
        // model this directly rather than through a handler tick.
        ex.park(t1);
        ex.park(t2);
        ex.ready.clear();
        ex.schedule_timer(100, WakerKey::INVALID, Some(t1));
        ex.schedule_timer(50, WakerKey::INVALID, Some(t2));

        let mut handler = ScriptedHandler::new();
        handler.script(t1, vec![PollOutcome::Return(0)]);
        handler.script(t2, vec![PollOutcome::Return(0)]);
        ex.run_until_idle(&mut handler);

        assert_eq!(ex.task(t1).unwrap().status, TaskStatus::Done);
        assert_eq!(ex.task(t2).unwrap().status, TaskStatus::Done);
        assert!(ex.now_ms() >= 100);
    }

    /// A full channel parks the sender, and a subsequent receive wakes it.
    #[test]
    fn blocking_send_parks_and_is_woken_by_recv() {
        let mut ex = Executor::new(ExecutorConfig::default());
        let sender = ex.spawn_task(TaskKind::User, None, 0);
        ex.ready.clear();
        let ch = ex.new_channel(1);
        assert!(ex.try_send(ch, 7));
        assert!(!ex.send_blocking(ch, 8, sender));
        assert_eq!(ex.task(sender).unwrap().status, TaskStatus::Parked);

        assert_eq!(ex.try_recv(ch), RecvOutcome::Value(7));
        assert_eq!(ex.task(sender).unwrap().status, TaskStatus::Runnable);
    }

    /// `select_clear` cancels arm timers, while `select_clear_waiters`
    /// leaves them armed.
    #[test]
    fn select_clear_cancels_timers_but_clear_waiters_does_not() {
        let mut ex = Executor::new(ExecutorConfig::default());
        let owner = ex.spawn_task(TaskKind::User, None, 0);
        ex.ready.clear();
        let sel = ex.select_new(owner);
        let timer = ex.select_arm_timer(sel, 0, 10).unwrap();
        ex.select_clear_waiters(sel);
        assert_eq!(ex.timers.peek_deadline(), Some(10));
        let _ = timer;

        let sel2 = ex.select_new(owner);
        ex.select_arm_timer(sel2, 0, 20);
        ex.select_clear(sel2);
        // Only the first select's timer (deadline 10) remains live.
        assert_eq!(ex.timers.peek_deadline(), Some(10));
    }
}
