//! HintOS scheduling core.
//!
//! A preemptive multi-core process scheduler for a small Unix-like teaching
//! kernel, extended with an external advisory channel: a trusted user-space
//! agent may suggest which pid should run next, and every core treats that
//! suggestion as a hint to be re-validated, never as ground truth. The
//! machine stays correct (no crash, no starvation, no stuck zombie)
//! whether the hint is absent, stale, malicious, or pointing at a process
//! that cannot run.
//!
//! The crate is freestanding (`no_std` + `alloc`); the arch layer that
//! links it provides traps, context switching and a logger. Under
//! `cfg(test)` it builds against `std` so the whole core runs on a host.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod advice;
pub mod clock;
pub mod error;
pub mod proc;
pub mod sched;
pub mod syscalls;

pub use error::{KernelError, KernelResult};

use advice::AdviceChannel;
use clock::TickClock;
use proc::{Pid, ProcTable};

/// The kernel core's shared state, threaded explicitly through every entry
/// point rather than living in ambient statics. One instance exists per
/// machine; each subsystem carries its own lock.
pub struct Kernel {
    pub clock: TickClock,
    pub advice: AdviceChannel,
    pub table: ProcTable,
}

impl Kernel {
    pub fn new() -> Self {
        Kernel {
            clock: TickClock::new(),
            advice: AdviceChannel::new(),
            table: ProcTable::new(),
        }
    }

    /// Bring the core up: create the init process, the ancestor every
    /// orphan re-parents to. Call once at boot, before any core enters its
    /// scheduler loop.
    pub fn bootstrap(&self, init_name: &str) -> KernelResult<Pid> {
        let pid = self.table.spawn_init(init_name)?;
        log::info!("kernel core up, advisory window {} ticks", advice::STALENESS_WINDOW);
        Ok(pid)
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proc::ProcState;

    #[test]
    fn bootstrap_creates_init_as_pid_one() {
        let kernel = Kernel::new();
        let pid = kernel.bootstrap("init").unwrap();
        assert_eq!(pid, 1);
        let slot = kernel.table.slot_of(pid).unwrap();
        assert_eq!(kernel.table.state_of(slot), ProcState::Runnable);
    }
}
