//! Per-core scheduler loop.
//!
//! There is no global scheduler thread; every core runs this loop whenever
//! it has nothing to execute. Each decision consults the advisory channel
//! first and re-validates the hint against live process state: the world
//! can change between injection and consultation, so a hint is never
//! cached. An unusable hint costs at most one missed optimization and falls
//! back to a round-robin scan over the core's own history.

use crate::proc::NPROC;
use crate::Kernel;

/// Hardware seam between the scheduling core and the machine.
///
/// The instruction-level context switch and the idle halt live outside this
/// crate; the kernel binary implements this trait over its arch layer, and
/// the test suite implements it over a simulated machine.
pub trait CoreDriver {
    /// Switch into the process occupying `slot`. Called with no locks held;
    /// returns when that process yields the core back.
    fn dispatch(&mut self, slot: usize);

    /// Process side of the same switch: hand the core to the scheduler
    /// loop. Returns once this process has been dispatched again.
    fn yield_now(&mut self);

    /// Nothing is runnable: enable interrupts and halt until the next
    /// timer or device interrupt. Never called with a lock held.
    fn idle(&mut self);
}

/// Per-core scheduling state. Each core owns exactly one of these.
pub struct Core {
    pub id: usize,
    /// Slot of the last process this core ran; the round-robin scan starts
    /// just after it. Fairness is per-core history, not global.
    pub last_slot: usize,
    /// Slot currently dispatched on this core, if any.
    pub current: Option<usize>,
}

impl Core {
    pub fn new(id: usize) -> Self {
        Core {
            id,
            last_slot: NPROC - 1,
            current: None,
        }
    }
}

/// One scheduling decision: pick a runnable process and claim it.
///
/// The advisory hint is tried first. `consult` only says whether a fresh
/// hint exists; whether it is usable is decided here, under the candidate's
/// slot lock. A hint that names a missing, sleeping, already-running or
/// zombie process is a routine condition and falls through silently to the
/// round-robin scan.
pub fn pick_next(kernel: &Kernel, core: &mut Core) -> Option<usize> {
    if let Some(pid) = kernel.advice.consult(kernel.clock.now()) {
        if let Some(slot) = kernel.table.claim_by_pid(pid) {
            core.last_slot = slot;
            core.current = Some(slot);
            return Some(slot);
        }
        log::trace!("core {}: advised pid {} not runnable, using round-robin", core.id, pid);
    }

    for step in 1..=NPROC {
        let slot = (core.last_slot + step) % NPROC;
        if kernel.table.claim_slot(slot) {
            core.last_slot = slot;
            core.current = Some(slot);
            return Some(slot);
        }
    }
    None
}

/// One iteration of the loop: dispatch if anything is runnable.
/// Returns false when the core should idle instead.
pub fn schedule_one(kernel: &Kernel, core: &mut Core, driver: &mut dyn CoreDriver) -> bool {
    match pick_next(kernel, core) {
        Some(slot) => {
            driver.dispatch(slot);
            core.current = None;
            true
        }
        None => false,
    }
}

/// The scheduler loop proper. Entered by a core with nothing to run; never
/// returns. Idling happens in the driver with interrupts enabled: the
/// loop never spins while holding a lock.
pub fn run(kernel: &Kernel, core: &mut Core, driver: &mut dyn CoreDriver) -> ! {
    log::info!("core {}: entering scheduler loop", core.id);
    loop {
        if !schedule_one(kernel, core, driver) {
            driver.idle();
        }
    }
}

/// Voluntary yield, also the timer-preemption entry point: put the running
/// process back in the runnable pool and give the core away.
pub fn yield_now(kernel: &Kernel, slot: usize, driver: &mut dyn CoreDriver) {
    kernel.table.yield_slot(slot);
    driver.yield_now();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::ProcState;

    struct NoMachine;

    impl CoreDriver for NoMachine {
        fn dispatch(&mut self, _slot: usize) {}
        fn yield_now(&mut self) {}
        fn idle(&mut self) {}
    }

    fn boot_with_children(n: usize) -> (Kernel, usize) {
        let kernel = Kernel::new();
        let init_pid = kernel.bootstrap("init").unwrap();
        let init_slot = kernel.table.slot_of(init_pid).unwrap();
        // Park init as if another core were running it.
        assert!(kernel.table.claim_slot(init_slot));
        for _ in 0..n {
            kernel.table.spawn(init_slot).unwrap();
        }
        (kernel, init_slot)
    }

    #[test]
    fn nothing_runnable_means_idle() {
        let kernel = Kernel::new();
        let mut core = Core::new(0);
        assert_eq!(pick_next(&kernel, &mut core), None);
        assert!(!schedule_one(&kernel, &mut core, &mut NoMachine));
    }

    #[test]
    fn round_robin_scan_claims_in_table_order() {
        let (kernel, _) = boot_with_children(3);
        let mut core = Core::new(0);

        let first = pick_next(&kernel, &mut core).unwrap();
        let second = pick_next(&kernel, &mut core).unwrap();
        let third = pick_next(&kernel, &mut core).unwrap();
        assert!(first < second && second < third);
        assert_eq!(kernel.table.state_of(first), ProcState::Running);
        // Everything runnable has been claimed.
        assert_eq!(pick_next(&kernel, &mut core), None);
    }

    #[test]
    fn fresh_advice_wins_over_round_robin() {
        let (kernel, _) = boot_with_children(3);
        let mut core = Core::new(0);
        let pids: alloc::vec::Vec<_> = kernel
            .table
            .snapshot()
            .iter()
            .map(|p| p.pid)
            .collect();
        let target = pids[3]; // last child, not the round-robin choice

        kernel.advice.inject(target as i64, kernel.clock.now()).unwrap();
        let slot = pick_next(&kernel, &mut core).unwrap();
        assert_eq!(kernel.table.pid_of(slot), target);
    }

    #[test]
    fn advice_for_missing_pid_falls_back_silently() {
        let (kernel, _) = boot_with_children(2);
        let mut core = Core::new(0);
        kernel.advice.inject(4242, kernel.clock.now()).unwrap();
        // Falls back to the first runnable child; no panic, no error.
        let slot = pick_next(&kernel, &mut core).unwrap();
        assert_ne!(kernel.table.pid_of(slot), 4242);
    }

    #[test]
    fn advice_for_running_pid_falls_back() {
        let (kernel, init_slot) = boot_with_children(1);
        let mut core = Core::new(0);
        // init is Running on "another core"; advising it must not dispatch it.
        let init_pid = kernel.table.pid_of(init_slot);
        kernel.advice.inject(init_pid as i64, kernel.clock.now()).unwrap();
        let slot = pick_next(&kernel, &mut core).unwrap();
        assert_ne!(slot, init_slot);
        assert_eq!(kernel.table.state_of(init_slot), ProcState::Running);
    }
}
