//! Guest scheduler
//!
//! Decides, on every scheduling tick, which guest owns the physical CPU
//! for the next quantum and drives the context switch.

pub mod rr;

pub use rr::{RoundRobin, SchedPolicy};

use crate::arch::arm32::{ArchRegs, CpuMode};
use crate::arch::CpuOps;
use crate::core::vmm::{ContextManager, GuestState, Vmid};
use crate::core::Result;

/// Scheduler statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedStats {
    /// Scheduler runs
    pub decisions: u64,
    /// Context switches performed
    pub switches: u64,
}

/// Result of one scheduling decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// The CPU moved to `to`; `from` is `None` on the first launch
    Switched { from: Option<Vmid>, to: Vmid },
    /// The current guest keeps the CPU
    Stayed(Vmid),
    /// The current guest is locked and was not preempted
    Held(Vmid),
    /// No guest runs and none is waiting
    Idle,
}

/// Quantum-based guest scheduler
pub struct Scheduler<P: SchedPolicy = RoundRobin> {
    policy: P,
    quantum: u64,
    slice_start: u64,
    stats: SchedStats,
}

impl Scheduler<RoundRobin> {
    /// Round-robin scheduler with a quantum of `quantum` ticks
    pub fn round_robin(quantum: u64) -> Self {
        Self::new(RoundRobin, quantum)
    }
}

impl<P: SchedPolicy> Scheduler<P> {
    pub fn new(policy: P, quantum: u64) -> Self {
        Self {
            policy,
            quantum,
            slice_start: 0,
            stats: SchedStats::default(),
        }
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Quantum in timer ticks
    pub fn quantum(&self) -> u64 {
        self.quantum
    }

    /// Start a new slice at `now` without a decision, e.g. at first launch
    pub fn start_slice(&mut self, now: u64) {
        self.slice_start = now;
    }

    /// Ask the policy for the next guest given the manager's state
    pub fn policy_determ_next<C: CpuOps>(&self, ctx: &ContextManager<C>) -> Option<Vmid> {
        let states = ctx.states();
        self.policy.determ_next(ctx.current_vmid(), &states)
    }

    /// Make a scheduling decision at tick `now` and switch if needed
    ///
    /// Every successful decision restarts the slice, so
    /// [`Scheduler::next_event`] is always one quantum after the last one.
    /// A tick taken while the CPU was in hyp mode never switches: `frame`
    /// then holds hypervisor state, not the current guest's.
    pub fn schedule<C: CpuOps>(
        &mut self,
        ctx: &mut ContextManager<C>,
        frame: &mut ArchRegs,
        now: u64,
    ) -> Result<ScheduleOutcome> {
        let outcome = self.decide(ctx, frame)?;

        self.stats.decisions += 1;
        self.slice_start = now;

        log::debug!("sched: {:?} at {}", outcome, now);
        Ok(outcome)
    }

    fn decide<C: CpuOps>(
        &mut self,
        ctx: &mut ContextManager<C>,
        frame: &mut ArchRegs,
    ) -> Result<ScheduleOutcome> {
        let current = ctx.current_vmid();
        if let Some(vmid) = current {
            if ctx.state(vmid)? == GuestState::Locked {
                log::trace!("sched: guest {} locked, not preempted", vmid);
                return Ok(ScheduleOutcome::Held(vmid));
            }
            if frame.mode() == Some(CpuMode::Hyp) {
                log::trace!("sched: tick from hyp mode, guest {} kept", vmid);
                return Ok(ScheduleOutcome::Stayed(vmid));
            }
        }

        let outcome = match (self.policy_determ_next(ctx), current) {
            (Some(next), Some(cur)) if next == cur => ScheduleOutcome::Stayed(cur),
            (Some(next), from) => {
                ctx.switchto(next, frame)?;
                self.stats.switches += 1;
                ScheduleOutcome::Switched { from, to: next }
            }
            (None, Some(cur)) => ScheduleOutcome::Stayed(cur),
            (None, None) => ScheduleOutcome::Idle,
        };

        Ok(outcome)
    }

    /// Tick at which the next scheduling decision is due
    pub fn next_event(&self) -> u64 {
        self.slice_start.saturating_add(self.quantum)
    }

    pub fn stats(&self) -> SchedStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::sim::SimCpu;
    use crate::config::HypervisorConfig;
    use crate::core::Error;

    fn guests(num_guests: usize, waiting: &[Vmid]) -> ContextManager<SimCpu> {
        let config = HypervisorConfig::with_guests(num_guests);
        let mut ctx = ContextManager::new(SimCpu::new(), &config);
        ctx.init_guests();
        for &vmid in waiting {
            ctx.mark_waiting(vmid).unwrap();
        }
        ctx
    }

    #[test]
    fn test_first_decision_launches() {
        let mut ctx = guests(2, &[0, 1]);
        let mut sched = Scheduler::round_robin(100);
        let mut frame = ArchRegs::default();

        let outcome = sched.schedule(&mut ctx, &mut frame, 0).unwrap();
        assert_eq!(outcome, ScheduleOutcome::Switched { from: None, to: 0 });
        assert_eq!(ctx.current_vmid(), Some(0));
    }

    #[test]
    fn test_idle_without_guests() {
        let mut ctx = guests(2, &[]);
        let mut sched = Scheduler::round_robin(100);
        let mut frame = ArchRegs::default();

        assert_eq!(sched.schedule(&mut ctx, &mut frame, 5), Ok(ScheduleOutcome::Idle));
        assert_eq!(sched.stats(), SchedStats { decisions: 1, switches: 0 });
    }

    #[test]
    fn test_single_guest_stays() {
        let mut ctx = guests(1, &[0]);
        let mut sched = Scheduler::round_robin(100);
        let mut frame = ArchRegs::default();

        sched.schedule(&mut ctx, &mut frame, 0).unwrap();
        assert_eq!(sched.schedule(&mut ctx, &mut frame, 100), Ok(ScheduleOutcome::Stayed(0)));
        assert_eq!(sched.stats().switches, 1);
    }

    #[test]
    fn test_locked_guest_is_held() {
        let mut ctx = guests(3, &[0, 1, 2]);
        let mut sched = Scheduler::round_robin(100);
        let mut frame = ArchRegs::default();
        ctx.switch_to_initial_guest(&mut frame).unwrap();
        ctx.switchto_lock(0, true, &mut frame).unwrap();

        assert_eq!(sched.policy_determ_next(&ctx), Some(1));
        assert_eq!(sched.schedule(&mut ctx, &mut frame, 100), Ok(ScheduleOutcome::Held(0)));
        assert_eq!(ctx.current_vmid(), Some(0));
        assert_eq!(ctx.switchto(1, &mut frame), Err(Error::GuestLocked));
    }

    #[test]
    fn test_next_event_follows_decisions() {
        let mut ctx = guests(2, &[0, 1]);
        let mut sched = Scheduler::round_robin(1_000);
        let mut frame = ArchRegs::default();

        sched.start_slice(40);
        assert_eq!(sched.next_event(), 1_040);
        // Pure: asking twice changes nothing.
        assert_eq!(sched.next_event(), 1_040);

        sched.schedule(&mut ctx, &mut frame, 1_050).unwrap();
        assert_eq!(sched.next_event(), 2_050);
    }

    #[test]
    fn test_hyp_mode_tick_never_switches() {
        let mut ctx = guests(2, &[0, 1]);
        let mut sched = Scheduler::round_robin(100);
        let mut frame = ArchRegs::default();
        ctx.switch_to_initial_guest(&mut frame).unwrap();
        let guest0 = *ctx.atvmid(0).unwrap().regs();

        frame.cpsr = 0x1da;
        frame.pc = 0xf000_1234;
        assert_eq!(sched.schedule(&mut ctx, &mut frame, 100), Ok(ScheduleOutcome::Stayed(0)));
        assert_eq!(ctx.current_vmid(), Some(0));
        assert_eq!(*ctx.atvmid(0).unwrap().regs(), guest0);
        assert_eq!(ctx.cpu().saves(), 0);
        assert_eq!(sched.stats(), SchedStats { decisions: 1, switches: 0 });
    }

    /// Picks a guest that does not exist
    struct Broken;

    impl SchedPolicy for Broken {
        fn determ_next(&self, _current: Option<Vmid>, _states: &[GuestState]) -> Option<Vmid> {
            Some(7)
        }
    }

    #[test]
    fn test_failed_decision_leaves_state() {
        let mut ctx = guests(2, &[0, 1]);
        let mut sched = Scheduler::new(Broken, 100);
        let mut frame = ArchRegs::default();
        sched.start_slice(40);

        assert_eq!(sched.schedule(&mut ctx, &mut frame, 90), Err(Error::InvalidVmid));
        assert_eq!(sched.stats(), SchedStats::default());
        assert_eq!(sched.next_event(), 140);
        assert_eq!(ctx.current_vmid(), None);
    }

    #[test]
    fn test_next_event_saturates() {
        let mut sched = Scheduler::round_robin(10);
        sched.start_slice(u64::MAX - 3);
        assert_eq!(sched.next_event(), u64::MAX);
    }
}
