//! Hypervisor instance
//!
//! Ties the per-core state together: guest contexts, the scheduler, the
//! slot tables and the interrupt routes. Platform code owns one
//! [`Hypervisor`] per physical core and calls into it from the trap
//! vectors.

use crate::arch::arm32::ArchRegs;
use crate::arch::CpuOps;
use crate::config::HypervisorConfig;
use crate::core::irq::{
    HostIrqHandler, IrqRoute, IrqRouter, Pirq, Slot, SlotRouter, Virq, VirqMapEntry,
};
use crate::core::sched::{RoundRobin, SchedPolicy, ScheduleOutcome, Scheduler};
use crate::core::vmm::{ContextManager, SwitchOutcome, Vmid};
use crate::core::Result;

/// What the trap path did with a physical interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqOutcome {
    /// Scheduling tick; the timer must be re-armed at `rearm_at`
    Scheduled {
        outcome: ScheduleOutcome,
        rearm_at: u64,
    },
    /// Queued as `virq` in `slot` of guest `vmid`; `current` tells whether
    /// that guest is the one on the CPU
    Injected {
        vmid: Vmid,
        virq: Virq,
        slot: Slot,
        current: bool,
    },
    /// Handled by a hypervisor handler
    Host(Pirq),
    /// No route and no handler
    Unhandled(Pirq),
}

/// Per-core hypervisor state
pub struct Hypervisor<C: CpuOps, P: SchedPolicy = RoundRobin> {
    config: HypervisorConfig,
    contexts: ContextManager<C>,
    scheduler: Scheduler<P>,
    slots: SlotRouter,
    irqs: IrqRouter,
}

impl<C: CpuOps> Hypervisor<C> {
    /// Create a round-robin hypervisor on `cpu`
    pub fn new(cpu: C, config: HypervisorConfig) -> crate::Result<Self> {
        Self::with_policy(cpu, config, RoundRobin)
    }
}

impl<C: CpuOps, P: SchedPolicy> Hypervisor<C, P> {
    /// Create a hypervisor on `cpu` scheduling with `policy`
    pub fn with_policy(cpu: C, config: HypervisorConfig, policy: P) -> crate::Result<Self> {
        config.validate()?;

        log::info!(
            "khyp: {} guests, quantum {} ticks, timer irq {}",
            config.num_guests,
            config.sched_interval,
            config.timer_irq
        );

        Ok(Self {
            contexts: ContextManager::new(cpu, &config),
            scheduler: Scheduler::new(policy, config.sched_interval),
            slots: SlotRouter::new(config.num_guests),
            irqs: IrqRouter::new(config.num_guests, config.timer_irq),
            config,
        })
    }

    pub fn config(&self) -> &HypervisorConfig {
        &self.config
    }

    pub fn contexts(&self) -> &ContextManager<C> {
        &self.contexts
    }

    pub fn contexts_mut(&mut self) -> &mut ContextManager<C> {
        &mut self.contexts
    }

    pub fn scheduler(&self) -> &Scheduler<P> {
        &self.scheduler
    }

    /// Slot tables; also the entry point of the guest-facing emulation path
    pub fn slots(&self) -> &SlotRouter {
        &self.slots
    }

    pub fn irqs(&self) -> &IrqRouter {
        &self.irqs
    }

    /// Bring every configured guest to its boot state with empty slots
    ///
    /// Boot-time only.
    pub fn init_guests(&mut self) {
        self.contexts.init_guests();
        self.slots.init();
    }

    /// Signal that the image of `vmid` is loaded and it may be scheduled
    pub fn mark_waiting(&mut self, vmid: Vmid) -> Result<()> {
        self.contexts.mark_waiting(vmid)
    }

    /// Route physical `pirq` to `virq` of guest `vmid`
    pub fn map_irq(&mut self, pirq: Pirq, vmid: Vmid, virq: Virq) -> Result<()> {
        self.irqs.map_irq(pirq, vmid, virq)
    }

    /// Handle physical `irq` in the hypervisor
    pub fn request_irq(&mut self, irq: Pirq, handler: HostIrqHandler) -> Result<()> {
        self.irqs.request_irq(irq, handler)
    }

    /// Load the first guest into `frame` and start its slice at `now`
    pub fn switch_to_initial_guest(
        &mut self,
        frame: &mut ArchRegs,
        now: u64,
    ) -> Result<SwitchOutcome> {
        let outcome = self.contexts.switch_to_initial_guest(frame)?;
        self.scheduler.start_slice(now);
        Ok(outcome)
    }

    /// Launch the first guest; only returns control through traps
    pub fn start_guest_os(&mut self, now: u64) -> ! {
        let mut frame = ArchRegs::default();
        match self.switch_to_initial_guest(&mut frame, now) {
            Ok(_) => self.contexts.launch(&frame),
            Err(err) => {
                log::error!("start_guest_os: {}", err);
                crate::arch::halt()
            }
        }
    }

    /// Switch to `vmid` and lock or unlock it on the CPU
    pub fn switchto_lock(
        &mut self,
        vmid: Vmid,
        locked: bool,
        frame: &mut ArchRegs,
    ) -> Result<SwitchOutcome> {
        self.contexts.switchto_lock(vmid, locked, frame)
    }

    /// Run a scheduling decision outside the timer path
    pub fn schedule(&mut self, frame: &mut ArchRegs, now: u64) -> Result<ScheduleOutcome> {
        self.scheduler.schedule(&mut self.contexts, frame, now)
    }

    /// Tick at which the scheduling timer must fire next
    pub fn next_event(&self) -> u64 {
        self.scheduler.next_event()
    }

    /// Interrupt service routine
    ///
    /// `frame` is the trap frame of the interrupted guest and is updated in
    /// place when the tick switches guests. `now` is the current counter
    /// value.
    pub fn handle_irq(&mut self, irq: Pirq, frame: &mut ArchRegs, now: u64) -> Result<IrqOutcome> {
        let outcome = match self.irqs.route(irq)? {
            IrqRoute::Tick => {
                let outcome = self.scheduler.schedule(&mut self.contexts, frame, now)?;
                IrqOutcome::Scheduled {
                    outcome,
                    rearm_at: self.scheduler.next_event(),
                }
            }
            IrqRoute::Guest(VirqMapEntry { vmid, virq }) => {
                let slot = self.slots.inject(vmid, irq, virq)?;
                let current = self.contexts.state(vmid)?.is_on_cpu();
                IrqOutcome::Injected {
                    vmid,
                    virq,
                    slot,
                    current,
                }
            }
            IrqRoute::Host(handler) => {
                handler(irq);
                IrqOutcome::Host(irq)
            }
            IrqRoute::Unrouted => {
                log::warn!("irq {} not routed, ignored", irq);
                IrqOutcome::Unhandled(irq)
            }
        };

        log::trace!("irq {}: {:?}", irq, outcome);
        Ok(outcome)
    }

    /// Guest end of interrupt for `virq`
    ///
    /// Frees the slot and returns the physical interrupt to deactivate.
    pub fn complete_virq(&mut self, vmid: Vmid, virq: Virq) -> Result<Option<Pirq>> {
        self.slots.complete(vmid, virq)
    }
}
