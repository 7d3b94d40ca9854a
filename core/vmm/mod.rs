//! Virtual Machine Manager (VMM)
//!
//! Guest identity and lifecycle, and the per-guest CPU contexts that are
//! swapped on the physical core.

pub mod context;

pub use context::{ContextManager, GuestContext};

/// Guest identifier, dense in `[0, num_guests)`
pub type Vmid = usize;

/// Guest lifecycle states
///
/// `Uninitialized -> Waiting -> Running <-> Waiting`, with `Locked` as a
/// non-preemptible flavour of `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuestState {
    /// Context allocated, guest not ready to run yet
    #[default]
    Uninitialized,
    /// Ready to run, waiting for the scheduler
    Waiting,
    /// Loaded on the physical CPU
    Running,
    /// Loaded on the physical CPU and not preemptible
    Locked,
}

impl GuestState {
    /// Whether the guest is the one loaded on the CPU
    pub fn is_on_cpu(self) -> bool {
        matches!(self, Self::Running | Self::Locked)
    }
}

/// Result of a successful switch request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// `from` was saved and `to` loaded
    Switched { from: Vmid, to: Vmid },
    /// Nothing was loaded before; `to` is now the first guest on the CPU
    Launched(Vmid),
    /// The target already was the current guest
    Stayed(Vmid),
}

impl SwitchOutcome {
    /// Guest on the CPU after the request
    pub fn current(self) -> Vmid {
        match self {
            Self::Switched { to, .. } | Self::Launched(to) | Self::Stayed(to) => to,
        }
    }
}
