//! khyp main entry point
//!
//! On bare-metal ARMv7 the boot assembly enters `hyp_main` in hyp mode
//! and the hyp IRQ vector calls `hyp_irq_entry` with the trap frame.
//! On a hosted target the binary drives the same trap path against the
//! simulated CPU and prints what happens.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(all(target_os = "none", target_arch = "arm"))]
mod bare {
    use core::fmt::{self, Write};
    use core::ptr;

    use khyp::arch::arm32::cpu::{read_cntpct, write_cnthp_cval};
    use khyp::arch::arm32::ArchRegs;
    use khyp::arch::{halt, CpuOps, Platform};
    use khyp::core::sync::SpinLock;
    use khyp::{Hypervisor, HypervisorConfig, IrqOutcome, Pirq};

    /// PL011 UART0 on the Versatile Express motherboard
    const UART0_BASE: usize = 0x1c09_0000;
    const UART_FR: usize = 0x18;
    const UART_FR_TXFF: u32 = 1 << 5;

    struct Pl011 {
        base: usize,
    }

    impl Pl011 {
        fn putc(&mut self, byte: u8) {
            // SAFETY: UART0 is identity mapped and owned by the hypervisor.
            unsafe {
                while ptr::read_volatile((self.base + UART_FR) as *const u32) & UART_FR_TXFF != 0 {
                    core::hint::spin_loop();
                }
                ptr::write_volatile(self.base as *mut u32, byte as u32);
            }
        }
    }

    impl Write for Pl011 {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            for byte in s.bytes() {
                if byte == b'\n' {
                    self.putc(b'\r');
                }
                self.putc(byte);
            }
            Ok(())
        }
    }

    static mut CONSOLE: Pl011 = Pl011 { base: UART0_BASE };

    static HYPERVISOR: SpinLock<Option<Hypervisor<Platform>>> = SpinLock::new(None);

    /// Boot entry, called once in hyp mode with the MMU configured
    #[no_mangle]
    pub extern "C" fn hyp_main() -> ! {
        // SAFETY: single core, runs once before anything else logs.
        khyp::utils::log::init(unsafe { &mut *ptr::addr_of_mut!(CONSOLE) });
        log::info!("khyp {}", khyp::VERSION);

        match boot() {
            Ok(frame) => Platform::default().enter_guest(&frame),
            Err(err) => {
                log::error!("boot failed: {}", err);
                halt()
            }
        }
    }

    fn boot() -> khyp::Result<ArchRegs> {
        let mut hyp = Hypervisor::new(Platform::default(), HypervisorConfig::default())?;
        hyp.init_guests();

        // Guest images are loaded by the boot loader.
        for vmid in 0..hyp.config().num_guests {
            hyp.mark_waiting(vmid)?;
        }

        let mut frame = ArchRegs::default();
        hyp.switch_to_initial_guest(&mut frame, read_cntpct())?;
        write_cnthp_cval(hyp.next_event());

        *HYPERVISOR.lock() = Some(hyp);
        Ok(frame)
    }

    /// Hyp IRQ vector body; `frame` is the trap frame the vector pushed
    #[no_mangle]
    pub extern "C" fn hyp_irq_entry(irq: Pirq, frame: *mut ArchRegs) {
        // SAFETY: the vector passes its own stack frame, valid for this call.
        let Some(frame) = (unsafe { frame.as_mut() }) else {
            return;
        };

        let mut guard = HYPERVISOR.lock();
        let Some(hyp) = guard.as_mut() else {
            log::warn!("irq {} before boot", irq);
            return;
        };

        match hyp.handle_irq(irq, frame, read_cntpct()) {
            Ok(IrqOutcome::Scheduled { rearm_at, .. }) => write_cnthp_cval(rearm_at),
            Ok(_) => {}
            Err(err) => log::error!("irq {}: {}", irq, err),
        }
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    host::run();
}

#[cfg(not(target_os = "none"))]
mod host {
    use std::fmt;

    use khyp::arch::arm32::ArchRegs;
    use khyp::arch::Platform;
    use khyp::{Hypervisor, HypervisorConfig, IrqOutcome, Pirq};

    const GUESTS: usize = 3;
    const UART_PIRQ: Pirq = 37;
    const UART_VIRQ: u32 = 33;

    struct Stdout;

    impl fmt::Write for Stdout {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            print!("{}", s);
            Ok(())
        }
    }

    pub fn run() {
        khyp::utils::log::init(Box::leak(Box::new(Stdout)));

        if let Err(err) = simulate() {
            log::error!("simulation failed: {}", err);
            std::process::exit(1);
        }
    }

    fn simulate() -> khyp::Result<()> {
        let config = HypervisorConfig::with_guests(GUESTS);
        let mut hyp = Hypervisor::new(Platform::default(), config)?;
        hyp.init_guests();
        hyp.map_irq(UART_PIRQ, 1, UART_VIRQ)?;
        for vmid in 0..GUESTS {
            hyp.mark_waiting(vmid)?;
        }

        let mut frame = ArchRegs::default();
        hyp.switch_to_initial_guest(&mut frame, 0)?;

        for round in 0..2 * GUESTS {
            frame.gpr[0] = round as u32;
            let now = hyp.next_event();

            if round == 1 {
                let outcome = hyp.handle_irq(UART_PIRQ, &mut frame, now)?;
                log::info!("uart: {:?}", outcome);
            }

            if let IrqOutcome::Scheduled { outcome, rearm_at } =
                hyp.handle_irq(config.timer_irq, &mut frame, now)?
            {
                log::info!("tick {}: {:?}, next at {}", now, outcome, rearm_at);
            }
        }

        if let Some(pirq) = hyp.complete_virq(1, UART_VIRQ)? {
            log::info!("uart: eoi, deactivate pirq {}", pirq);
        }

        let stats = hyp.scheduler().stats();
        log::info!(
            "{} decisions, {} switches, {:?}",
            stats.decisions,
            stats.switches,
            hyp.contexts().states()
        );
        Ok(())
    }
}
