//! Deterministic, single-threaded cooperative async runtime model for
//! programs compiled by `surge-emitter`.
//!
//! The executor owns every task, scope, channel, and timer in plain Rust
//! collections and drives them through a synchronous scheduling loop: the
//! compiled module calls back into it through the `rt_*` ABI one poll at a
//! time, rather than through Tokio futures. Only wall-clock sleeping goes
//! through Tokio; everything else (readiness, cancellation, structured
//! concurrency, rendezvous) is modeled directly.

pub mod channel;
pub mod clock;
pub mod executor;
pub mod scope;
pub mod select;
pub mod task;
pub mod timer;
pub mod waker;

pub use channel::{Channel, ChannelId, RecvOutcome};
pub use clock::{Clock, ClockKind, RealClock, VirtualClock};
pub use executor::{Executor, ExecutorConfig, PollHandler, PollOutcome};
pub use scope::{Scope, ScopeId};
pub use select::{SelectId, SelectSub};
pub use task::{ResultKind, Task, TaskId, TaskKind, TaskStatus};
pub use timer::{Timer, TimerId};
pub use waker::{WakerKey, WakerKeyKind, Waiter};

/// Generates a `Copy` newtype ID with the `Display`/accessor shape used
/// throughout this crate.
macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u64);

        impl $name {
            pub fn new(v: u64) -> Self {
                $name(v)
            }

            pub fn inner(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

pub(crate) use id_type;
