//! Synchronization primitives
//!
//! Primitives suitable for the hypervisor's trap path.

pub mod spinlock;

// Re-export SpinLock for convenience
pub use spinlock::{SpinLock, SpinLockGuard};
