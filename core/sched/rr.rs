//! Round-Robin (RR) guest selection
//!
//! Gives each waiting guest the CPU in turn, in ascending vmid order.

use crate::core::vmm::{GuestState, Vmid};

/// Guest selection policy
///
/// Implementations are pure: the same `current` and `states` always yield
/// the same answer, and no state is touched.
pub trait SchedPolicy {
    /// Pick the guest that should run next
    ///
    /// `states` is indexed by vmid. A `Locked` guest must never be picked.
    fn determ_next(&self, current: Option<Vmid>, states: &[GuestState]) -> Option<Vmid>;
}

/// Round-robin over waiting guests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundRobin;

impl SchedPolicy for RoundRobin {
    fn determ_next(&self, current: Option<Vmid>, states: &[GuestState]) -> Option<Vmid> {
        let n = states.len();
        let start = current.map_or(0, |vmid| vmid + 1);

        (0..n)
            .map(|i| (start + i) % n)
            .find(|&vmid| states[vmid] == GuestState::Waiting)
    }
}
