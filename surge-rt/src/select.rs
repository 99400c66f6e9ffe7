//! `Select` registration: a single wait that can watch several wake keys
//! and channel arms at once, plus the per-arm timers some arms carry.

use crate::channel::ChannelId;
use crate::task::TaskId;
use crate::timer::TimerId;
use crate::waker::WakerKey;
use fxhash::FxHashMap;

crate::id_type!(SelectId);

#[derive(Debug, Clone)]
pub struct SelectSub {
    pub id: SelectId,
    pub owner: TaskId,
    pub keys: Vec<WakerKey>,
    pub recv_channels: Vec<ChannelId>,
    pub send_channels: Vec<ChannelId>,
    /// Arm index -> its armed timer. A plain map, not a fixed-size array:
    /// correctness should not degrade above any soft arm-count bound.
    pub arm_timers: FxHashMap<usize, TimerId>,
}

impl SelectSub {
    pub fn new(id: SelectId, owner: TaskId) -> Self {
        SelectSub {
            id,
            owner,
            keys: Vec::new(),
            recv_channels: Vec::new(),
            send_channels: Vec::new(),
            arm_timers: FxHashMap::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_select_has_no_registrations() {
        let sub = SelectSub::new(SelectId::new(0), TaskId::new(1));
        assert!(sub.keys.is_empty());
        assert!(sub.arm_timers.is_empty());
    }
}
