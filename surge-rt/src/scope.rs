//! `Scope`: structured-concurrency bookkeeping for a task's children,
//! tracking owner, spawn order, and a fail-fast latch.

use crate::task::TaskId;
use smallvec::SmallVec;

crate::id_type!(ScopeId);

/// Most scopes spawn a handful of children; inlining avoids a heap
/// allocation for the common case.
pub type ScopeChildren = SmallVec<[TaskId; 4]>;

#[derive(Debug, Clone)]
pub struct Scope {
    pub id: ScopeId,
    pub owner: TaskId,
    /// Spawn order preserved: registration always appends.
    pub children: ScopeChildren,
    pub failfast: bool,
    pub failfast_triggered: bool,
}

impl Scope {
    pub fn new(id: ScopeId, owner: TaskId, failfast: bool) -> Self {
        Scope { id, owner, children: ScopeChildren::new(), failfast, failfast_triggered: false }
    }

    pub fn register_child(&mut self, child: TaskId) {
        self.children.push(child);
    }

    /// The exact panic message used when a scope is exited with live
    /// children.
    pub fn live_children_message(id: ScopeId, live: &[TaskId]) -> String {
        let ids: Vec<String> = live.iter().map(|t| t.inner().to_string()).collect();
        format!("scope {} exited with live children: [{}]", id.inner(), ids.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_child_preserves_spawn_order() {
        let mut s = Scope::new(ScopeId::new(0), TaskId::new(0), false);
        s.register_child(TaskId::new(3));
        s.register_child(TaskId::new(1));
        s.register_child(TaskId::new(2));
        assert_eq!(s.children.into_vec(), vec![TaskId::new(3), TaskId::new(1), TaskId::new(2)]);
    }

    #[test]
    fn live_children_message_matches_exact_format() {
        let msg = Scope::live_children_message(ScopeId::new(4), &[TaskId::new(1), TaskId::new(2)]);
        assert_eq!(msg, "scope 4 exited with live children: [1, 2]");
    }
}
