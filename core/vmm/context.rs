//! Guest context management
//!
//! Holds the authoritative saved CPU state of every guest and performs the
//! state swap when the running guest changes.
//!
//! Saving and restoring are only reachable through [`ContextManager::switchto`]
//! (and its locking and bootstrap variants), so a guest is always restored
//! from the state saved when it last left the CPU.

use heapless::Vec;

use crate::arch::arm32::{ArchRegs, BankedRegs, CopRegs, Cpsr, CpuMode};
use crate::arch::CpuOps;
use crate::config::{HypervisorConfig, MAX_GUESTS};
use crate::core::vmm::{GuestState, SwitchOutcome, Vmid};
use crate::core::{Error, Result};

/// Saved CPU state of one guest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuestContext {
    vmid: Vmid,
    regs: ArchRegs,
    banked: BankedRegs,
    cop: CopRegs,
    state: GuestState,
}

impl GuestContext {
    pub fn vmid(&self) -> Vmid {
        self.vmid
    }

    /// Trap frame registers as last saved
    pub fn regs(&self) -> &ArchRegs {
        &self.regs
    }

    /// Banked registers as last saved
    pub fn banked(&self) -> &BankedRegs {
        &self.banked
    }

    /// CP15 state as last saved
    pub fn cop(&self) -> &CopRegs {
        &self.cop
    }

    pub fn state(&self) -> GuestState {
        self.state
    }
}

/// Owner of every guest context and of the current-vmid state of one core
pub struct ContextManager<C: CpuOps> {
    cpu: C,
    contexts: [GuestContext; MAX_GUESTS],
    num_guests: usize,
    current: Option<Vmid>,
    guest_entry: u32,
    guest_cpsr: Cpsr,
}

impl<C: CpuOps> ContextManager<C> {
    /// Create a manager for `config.num_guests` guests on `cpu`
    ///
    /// The configuration must already be validated.
    pub(crate) fn new(cpu: C, config: &HypervisorConfig) -> Self {
        Self {
            cpu,
            contexts: [GuestContext::default(); MAX_GUESTS],
            num_guests: config.num_guests.min(MAX_GUESTS),
            current: None,
            guest_entry: config.guest_entry,
            guest_cpsr: config.guest_cpsr,
        }
    }

    /// Zero every configured context and apply the boot register state
    ///
    /// Boot-time only; the caller guards against a second call.
    pub fn init_guests(&mut self) {
        log::info!("init_guests: {} guests", self.num_guests);

        for vmid in 0..self.num_guests {
            self.contexts[vmid] = GuestContext {
                vmid,
                regs: ArchRegs::boot(self.guest_entry, self.guest_cpsr),
                ..GuestContext::default()
            };
        }
        self.current = None;
    }

    /// Number of configured guests
    pub fn num_guests(&self) -> usize {
        self.num_guests
    }

    pub fn first_vmid(&self) -> Vmid {
        0
    }

    pub fn last_vmid(&self) -> Vmid {
        self.num_guests.saturating_sub(1)
    }

    /// The vmid after `of` in allocation order, `None` past the last one
    pub fn next_vmid(&self, of: Vmid) -> Option<Vmid> {
        let next = of.checked_add(1)?;
        (next < self.num_guests).then_some(next)
    }

    /// Every configured vmid in ascending order
    pub fn vmids(&self) -> impl Iterator<Item = Vmid> {
        self.first_vmid()..self.num_guests
    }

    /// Guest loaded on the CPU, `None` before the first launch
    pub fn current_vmid(&self) -> Option<Vmid> {
        self.current
    }

    /// Resolve a vmid to its context
    pub fn atvmid(&self, vmid: Vmid) -> Result<&GuestContext> {
        if vmid < self.num_guests {
            Ok(&self.contexts[vmid])
        } else {
            Err(Error::InvalidVmid)
        }
    }

    /// Lifecycle state of `vmid`
    pub fn state(&self, vmid: Vmid) -> Result<GuestState> {
        self.atvmid(vmid).map(GuestContext::state)
    }

    /// Lifecycle states of all configured guests, indexed by vmid
    pub fn states(&self) -> Vec<GuestState, MAX_GUESTS> {
        self.contexts[..self.num_guests]
            .iter()
            .map(GuestContext::state)
            .collect()
    }

    /// Lowest vmid waiting to be scheduled
    pub fn waiting_vmid(&self) -> Option<Vmid> {
        self.vmids()
            .find(|&vmid| self.contexts[vmid].state == GuestState::Waiting)
    }

    /// Make a guest schedulable once its image is in place
    ///
    /// Guests already past `Uninitialized` are left alone.
    pub fn mark_waiting(&mut self, vmid: Vmid) -> Result<()> {
        self.atvmid(vmid)?;
        let ctx = &mut self.contexts[vmid];
        if ctx.state == GuestState::Uninitialized {
            ctx.state = GuestState::Waiting;
            log::debug!("guest {} waiting", vmid);
        }
        Ok(())
    }

    /// Switch the physical CPU to `vmid`
    ///
    /// `frame` is the trap frame of the current guest; on return it holds
    /// the frame of `vmid`, ready for the exception return.
    pub fn switchto(&mut self, vmid: Vmid, frame: &mut ArchRegs) -> Result<SwitchOutcome> {
        let target = self.atvmid(vmid)?.state;

        if let Some(current) = self.current {
            if self.contexts[current].state == GuestState::Locked {
                log::debug!("switch to {} refused: guest {} locked", vmid, current);
                return Err(Error::GuestLocked);
            }
            if current == vmid {
                return Ok(SwitchOutcome::Stayed(vmid));
            }
        }

        if target == GuestState::Uninitialized {
            return Err(Error::GuestNotReady);
        }

        let flags = self.cpu.irq_disable();
        let outcome = self.perform_switch(vmid, frame);
        self.cpu.irq_restore(flags);

        Ok(outcome)
    }

    /// Switch to `vmid` and lock it on the CPU, or release the lock
    ///
    /// `switchto_lock(current, false)` from the lock holder only releases
    /// the lock. Locking while a guest is already locked fails.
    pub fn switchto_lock(
        &mut self,
        vmid: Vmid,
        locked: bool,
        frame: &mut ArchRegs,
    ) -> Result<SwitchOutcome> {
        self.atvmid(vmid)?;

        if let Some(current) = self.current {
            if self.contexts[current].state == GuestState::Locked {
                if !locked && current == vmid {
                    self.contexts[current].state = GuestState::Running;
                    log::debug!("guest {} unlocked", vmid);
                    return Ok(SwitchOutcome::Stayed(vmid));
                }
                return Err(Error::GuestLocked);
            }
        }

        let outcome = self.switchto(vmid, frame)?;
        self.contexts[vmid].state = if locked {
            GuestState::Locked
        } else {
            GuestState::Running
        };
        if locked {
            log::debug!("guest {} locked", vmid);
        }

        Ok(outcome)
    }

    /// Load the first guest onto an empty CPU
    pub fn switch_to_initial_guest(&mut self, frame: &mut ArchRegs) -> Result<SwitchOutcome> {
        let first = self.first_vmid();
        log::info!(
            "switch_to_initial_guest: vmid {} {}",
            first,
            self.atvmid(first)?.regs
        );
        self.switchto(first, frame)
    }

    /// Hand the CPU over to the guest described by `frame`
    pub fn launch(&mut self, frame: &ArchRegs) -> ! {
        self.cpu.enter_guest(frame)
    }

    /// The CPU backend
    pub fn cpu(&self) -> &C {
        &self.cpu
    }

    /// Mutable CPU backend access for platform code
    pub fn cpu_mut(&mut self) -> &mut C {
        &mut self.cpu
    }

    fn perform_switch(&mut self, next: Vmid, frame: &mut ArchRegs) -> SwitchOutcome {
        let prev = self.current;
        if let Some(prev) = prev {
            self.save(prev, frame);
        }
        self.restore(next, frame);
        self.current = Some(next);

        match prev {
            Some(from) => SwitchOutcome::Switched { from, to: next },
            None => SwitchOutcome::Launched(next),
        }
    }

    fn save(&mut self, vmid: Vmid, frame: &ArchRegs) {
        let ctx = &mut self.contexts[vmid];
        ctx.regs = *frame;
        self.cpu.save_cop(&mut ctx.cop);
        self.cpu.save_banked(&mut ctx.banked);
        ctx.state = GuestState::Waiting;

        log::trace!(
            "context: saving vmid[{}] mode {} pc {:#x}",
            vmid,
            mode_name(frame),
            frame.pc
        );
    }

    fn restore(&mut self, vmid: Vmid, frame: &mut ArchRegs) {
        let ctx = &mut self.contexts[vmid];
        *frame = ctx.regs;
        self.cpu.restore_cop(&ctx.cop);
        self.cpu.restore_banked(&ctx.banked);
        ctx.state = GuestState::Running;

        log::trace!(
            "context: restoring vmid[{}] mode {} pc {:#x}",
            vmid,
            mode_name(frame),
            frame.pc
        );
    }
}

fn mode_name(regs: &ArchRegs) -> &'static str {
    regs.mode().map_or("Unknown", CpuMode::name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::sim::SimCpu;
    use crate::config::DEFAULT_GUEST_ENTRY;
    use test_case::test_case;

    fn manager(num_guests: usize) -> ContextManager<SimCpu> {
        let config = HypervisorConfig::with_guests(num_guests);
        let mut ctx = ContextManager::new(SimCpu::new(), &config);
        ctx.init_guests();
        for vmid in 0..num_guests {
            ctx.mark_waiting(vmid).unwrap();
        }
        ctx
    }

    fn launched(num_guests: usize) -> (ContextManager<SimCpu>, ArchRegs) {
        let mut ctx = manager(num_guests);
        let mut frame = ArchRegs::default();
        ctx.switch_to_initial_guest(&mut frame).unwrap();
        (ctx, frame)
    }

    #[test]
    fn test_init_guests_boot_state() {
        let config = HypervisorConfig::with_guests(3);
        let mut ctx = ContextManager::new(SimCpu::new(), &config);
        ctx.init_guests();

        for vmid in ctx.vmids() {
            let guest = ctx.atvmid(vmid).unwrap();
            assert_eq!(guest.vmid(), vmid);
            assert_eq!(guest.state(), GuestState::Uninitialized);
            assert_eq!(guest.regs().pc, DEFAULT_GUEST_ENTRY);
            assert_eq!(guest.regs().cpsr, 0x1d3);
            assert_eq!(*guest.banked(), BankedRegs::default());
            assert_eq!(*guest.cop(), CopRegs::default());
        }
        assert_eq!(ctx.current_vmid(), None);
        assert_eq!(ctx.waiting_vmid(), None);
    }

    #[test]
    fn test_vmid_traversal() {
        let ctx = manager(3);
        let mut seen = Vec::<Vmid, MAX_GUESTS>::new();
        let mut next = Some(ctx.first_vmid());
        while let Some(vmid) = next {
            seen.push(vmid).unwrap();
            next = ctx.next_vmid(vmid);
        }

        assert_eq!(seen.as_slice(), &[0, 1, 2]);
        assert_eq!(ctx.last_vmid(), 2);
        assert_eq!(ctx.next_vmid(ctx.last_vmid()), None);
        assert!(ctx.vmids().eq(seen.iter().copied()));
    }

    #[test]
    fn test_traversal_without_guests() {
        let config = HypervisorConfig::with_guests(0);
        let ctx = ContextManager::new(SimCpu::new(), &config);

        assert_eq!(ctx.vmids().count(), 0);
        assert_eq!(ctx.next_vmid(ctx.first_vmid()), None);
        assert_eq!(ctx.next_vmid(usize::MAX), None);
        assert_eq!(ctx.waiting_vmid(), None);
        assert!(ctx.states().is_empty());
    }

    #[test_case(0)]
    #[test_case(1)]
    #[test_case(2)]
    fn test_switchto_sets_current(vmid: Vmid) {
        let (mut ctx, mut frame) = launched(3);
        ctx.atvmid(vmid).unwrap();
        ctx.switchto(vmid, &mut frame).unwrap();
        assert_eq!(ctx.current_vmid(), Some(vmid));
        assert_eq!(ctx.state(vmid), Ok(GuestState::Running));
    }

    #[test]
    fn test_atvmid_out_of_range() {
        let ctx = manager(2);
        assert_eq!(ctx.atvmid(2).err(), Some(Error::InvalidVmid));
        assert_eq!(ctx.atvmid(MAX_GUESTS).err(), Some(Error::InvalidVmid));
    }

    #[test]
    fn test_switchto_invalid_vmid() {
        let (mut ctx, mut frame) = launched(2);
        assert_eq!(ctx.switchto(5, &mut frame), Err(Error::InvalidVmid));
        assert_eq!(ctx.current_vmid(), Some(0));
    }

    #[test]
    fn test_switchto_uninitialized_guest() {
        let config = HypervisorConfig::with_guests(2);
        let mut ctx = ContextManager::new(SimCpu::new(), &config);
        ctx.init_guests();
        ctx.mark_waiting(0).unwrap();
        let mut frame = ArchRegs::default();
        ctx.switch_to_initial_guest(&mut frame).unwrap();

        assert_eq!(ctx.switchto(1, &mut frame), Err(Error::GuestNotReady));
        assert_eq!(ctx.current_vmid(), Some(0));
    }

    #[test]
    fn test_initial_guest_launch() {
        let mut ctx = manager(2);
        let mut frame = ArchRegs::default();

        let outcome = ctx.switch_to_initial_guest(&mut frame).unwrap();
        assert_eq!(outcome, SwitchOutcome::Launched(0));
        assert_eq!(frame.pc, DEFAULT_GUEST_ENTRY);
        assert_eq!(frame.mode(), Some(CpuMode::Svc));
        // Nothing was on the CPU, so nothing was saved.
        assert_eq!(ctx.cpu().saves(), 0);
        assert_eq!(ctx.cpu().restores(), 1);
        assert_eq!(ctx.waiting_vmid(), Some(1));
    }

    #[test]
    fn test_context_round_trip() {
        let (mut ctx, mut frame) = launched(3);

        // Guest 0 runs and changes its state.
        frame.gpr = [0x11; 13];
        frame.gpr[4] = 0xdead_beef;
        frame.pc = 0x8000_1234;
        frame.lr = 0x8000_0100;
        frame.cpsr = 0x6000_0013;
        ctx.cpu_mut().banked.sp_svc = 0x8100_0000;
        ctx.cpu_mut().banked.r12_fiq = 0xf1f1_f1f1;
        ctx.cpu_mut().cop.ttbr0 = 0x8040_4000;
        ctx.cpu_mut().cop.sctlr = 0x00c5_187d;
        let saved_frame = frame;
        let saved_banked = ctx.cpu().banked;
        let saved_cop = ctx.cpu().cop;

        ctx.switchto(1, &mut frame).unwrap();
        assert_eq!(frame.pc, DEFAULT_GUEST_ENTRY);
        assert_eq!(ctx.cpu().banked, BankedRegs::default());

        // Guest 1 scribbles over everything, then guest 2 runs.
        frame.gpr = [0x22; 13];
        ctx.cpu_mut().banked.sp_svc = 0x9100_0000;
        ctx.cpu_mut().cop.ttbr0 = 0x9040_4000;
        ctx.switchto(2, &mut frame).unwrap();
        frame.pc = 0x9999_0000;

        ctx.switchto(0, &mut frame).unwrap();
        assert_eq!(frame, saved_frame);
        assert_eq!(ctx.cpu().banked, saved_banked);
        assert_eq!(ctx.cpu().cop, saved_cop);

        // Guest 1 kept its own state as well.
        let guest1 = ctx.atvmid(1).unwrap();
        assert_eq!(guest1.regs().gpr, [0x22; 13]);
        assert_eq!(guest1.banked().sp_svc, 0x9100_0000);
        assert_eq!(guest1.cop().ttbr0, 0x9040_4000);
    }

    #[test]
    fn test_switch_runs_with_irqs_masked() {
        let (mut ctx, mut frame) = launched(3);
        ctx.switchto(1, &mut frame).unwrap();
        ctx.switchto(2, &mut frame).unwrap();
        ctx.switchto(0, &mut frame).unwrap();

        assert_eq!(ctx.cpu().unmasked_accesses(), 0);
        assert!(!ctx.cpu().irqs_masked());
        assert_eq!(ctx.cpu().saves(), 3);
        assert_eq!(ctx.cpu().restores(), 4);
    }

    #[test]
    fn test_switch_states() {
        let (mut ctx, mut frame) = launched(2);
        let outcome = ctx.switchto(1, &mut frame).unwrap();

        assert_eq!(outcome, SwitchOutcome::Switched { from: 0, to: 1 });
        assert_eq!(ctx.state(0), Ok(GuestState::Waiting));
        assert_eq!(ctx.state(1), Ok(GuestState::Running));
        assert_eq!(ctx.waiting_vmid(), Some(0));
    }

    #[test]
    fn test_switchto_current_is_noop() {
        let (mut ctx, mut frame) = launched(2);
        frame.gpr[0] = 42;

        assert_eq!(ctx.switchto(0, &mut frame), Ok(SwitchOutcome::Stayed(0)));
        assert_eq!(frame.gpr[0], 42);
        assert_eq!(ctx.cpu().saves(), 0);
    }

    #[test]
    fn test_locked_guest_blocks_switch() {
        let (mut ctx, mut frame) = launched(3);
        ctx.switchto_lock(1, true, &mut frame).unwrap();
        assert_eq!(ctx.state(1), Ok(GuestState::Locked));

        assert_eq!(ctx.switchto(2, &mut frame), Err(Error::GuestLocked));
        assert_eq!(ctx.switchto(1, &mut frame), Err(Error::GuestLocked));
        assert_eq!(ctx.switchto_lock(1, true, &mut frame), Err(Error::GuestLocked));
        assert_eq!(ctx.switchto_lock(2, false, &mut frame), Err(Error::GuestLocked));
        assert_eq!(ctx.current_vmid(), Some(1));
    }

    #[test]
    fn test_unlock_then_switch() {
        let (mut ctx, mut frame) = launched(2);
        ctx.switchto_lock(0, true, &mut frame).unwrap();

        assert_eq!(ctx.switchto_lock(0, false, &mut frame), Ok(SwitchOutcome::Stayed(0)));
        assert_eq!(ctx.state(0), Ok(GuestState::Running));
        assert_eq!(
            ctx.switchto(1, &mut frame),
            Ok(SwitchOutcome::Switched { from: 0, to: 1 })
        );
    }

    #[test]
    fn test_mark_waiting_keeps_running_guest() {
        let (mut ctx, _frame) = launched(2);
        ctx.mark_waiting(0).unwrap();
        assert_eq!(ctx.state(0), Ok(GuestState::Running));
        assert_eq!(ctx.mark_waiting(9), Err(Error::InvalidVmid));
    }
}
