//! Syscall surface of the scheduling core.
//!
//! The register-decoding layer above this module turns a trap into
//! `dispatch(number, arg0, arg1)`; results travel back as `u64` with
//! `u64::MAX` standing in for -1. Pointer arguments (wait's status
//! pointer) are marshaled by that layer too: here everything is already
//! typed.

use crate::proc::{Channel, Pid};
use crate::sched::{self, Core, CoreDriver};
use crate::Kernel;

/// Syscall numbers (passed in the first register from userland).
pub const SYS_EXIT: u64 = 0;
pub const SYS_FORK: u64 = 1;
pub const SYS_WAIT: u64 = 2;
pub const SYS_KILL: u64 = 3;
pub const SYS_GETPID: u64 = 4;
pub const SYS_SBRK: u64 = 5;
pub const SYS_PAUSE: u64 = 6;
pub const SYS_UPTIME: u64 = 7;
pub const SYS_YIELD: u64 = 8;
pub const SYS_SET_LLM_ADVICE: u64 = 9;

/// sbrk modes: eager maps pages immediately, lazy leaves them to the page
/// fault path. Both are identical at this layer: only the size accounting
/// lives here.
pub const SBRK_EAGER: u64 = 0;
pub const SBRK_LAZY: u64 = 1;

pub use crate::proc::MAX_PROC_SIZE;

/// Central syscall dispatcher.
pub fn dispatch(
    kernel: &Kernel,
    core: &mut Core,
    driver: &mut dyn CoreDriver,
    number: u64,
    arg0: u64,
    arg1: u64,
) -> u64 {
    match number {
        SYS_EXIT => sys_exit(kernel, core, driver, arg0 as i32),
        SYS_FORK => sys_fork(kernel, core),
        SYS_WAIT => sys_wait(kernel, core, driver),
        SYS_KILL => sys_kill(kernel, arg0),
        SYS_GETPID => sys_getpid(kernel, core),
        SYS_SBRK => sys_sbrk(kernel, core, arg0 as i64, arg1),
        SYS_PAUSE => sys_pause(kernel, core, driver, arg0),
        SYS_UPTIME => sys_uptime(kernel),
        SYS_YIELD => {
            sys_yield(kernel, core, driver);
            0
        }
        SYS_SET_LLM_ADVICE => sys_set_llm_advice(kernel, arg0 as i64),
        _ => {
            log::warn!("syscall: unknown number {}", number);
            u64::MAX
        }
    }
}

/// sys_exit: terminate the current process. Never returns: the core goes
/// back to its scheduler loop and a zombie is never re-dispatched.
pub fn sys_exit(kernel: &Kernel, core: &mut Core, driver: &mut dyn CoreDriver, code: i32) -> ! {
    let slot = core
        .current
        .take()
        .expect("sys_exit called without an active process");
    kernel.table.terminate(slot, code);
    driver.yield_now();
    unreachable!("sys_exit should never return");
}

/// sys_fork: duplicate the current process. Returns the child pid to the
/// parent; the context layer arranges for the child to see 0.
pub fn sys_fork(kernel: &Kernel, core: &Core) -> u64 {
    let Some(slot) = core.current else {
        return u64::MAX;
    };
    match kernel.table.spawn(slot) {
        Ok(pid) => pid as u64,
        Err(e) => {
            log::warn!("fork failed: {}", e);
            u64::MAX
        }
    }
}

/// sys_wait: block until a child exits, then reap it and return its pid.
/// Waiting is an I/O-style event for classification purposes.
pub fn sys_wait(kernel: &Kernel, core: &Core, driver: &mut dyn CoreDriver) -> u64 {
    let Some(slot) = core.current else {
        return u64::MAX;
    };
    kernel.table.bump_io_count(slot);
    match kernel.table.reap(slot, driver) {
        // The exit code travels to userland through the status pointer,
        // written by the marshaling layer.
        Ok((pid, _exit_code)) => pid as u64,
        Err(_) => u64::MAX,
    }
}

/// sys_kill: set the cooperative kill flag on a process.
pub fn sys_kill(kernel: &Kernel, pid: u64) -> u64 {
    if pid == 0 || pid > u32::MAX as u64 {
        return u64::MAX;
    }
    match kernel.table.signal(pid as Pid) {
        Ok(()) => 0,
        Err(_) => u64::MAX,
    }
}

/// sys_getpid: pid of the current process.
pub fn sys_getpid(kernel: &Kernel, core: &Core) -> u64 {
    core.current
        .map_or(0, |slot| kernel.table.pid_of(slot) as u64)
}

/// sys_sbrk: grow or shrink the process image, returning the old size.
pub fn sys_sbrk(kernel: &Kernel, core: &Core, delta: i64, mode: u64) -> u64 {
    let Some(slot) = core.current else {
        return u64::MAX;
    };
    if mode != SBRK_EAGER && mode != SBRK_LAZY {
        return u64::MAX;
    }
    match kernel.table.grow(slot, delta) {
        Ok(old) => old as u64,
        Err(_) => u64::MAX,
    }
}

/// sys_pause: sleep until `n` ticks have elapsed. Counts as an I/O-style
/// event. The kill flag is re-checked on every wake, so a paused process
/// returns -1 promptly instead of blocking on after a kill.
pub fn sys_pause(kernel: &Kernel, core: &Core, driver: &mut dyn CoreDriver, n: u64) -> u64 {
    let Some(slot) = core.current else {
        return u64::MAX;
    };
    kernel.table.bump_io_count(slot);

    let mut ticks = kernel.clock.ticks.lock();
    // `n` comes straight from a register; a saturated deadline just means
    // the pause lasts until a kill cuts it short.
    let deadline = ticks.saturating_add(n);
    while *ticks < deadline {
        if kernel.table.killed(slot) {
            return u64::MAX;
        }
        ticks = kernel
            .table
            .sleep(slot, Channel::Ticks, &kernel.clock.ticks, ticks, driver);
    }
    0
}

/// sys_uptime: clock ticks since boot.
pub fn sys_uptime(kernel: &Kernel) -> u64 {
    kernel.clock.now()
}

/// sys_yield: cooperatively give up the CPU.
pub fn sys_yield(kernel: &Kernel, core: &Core, driver: &mut dyn CoreDriver) {
    if let Some(slot) = core.current {
        sched::yield_now(kernel, slot, driver);
    }
}

/// sys_set_llm_advice: inject external scheduling advice. Returns -1 iff
/// the pid fails the boundary check; the scheduler does the final
/// validation at dispatch time.
pub fn sys_set_llm_advice(kernel: &Kernel, pid: i64) -> u64 {
    match kernel.advice.inject(pid, kernel.clock.now()) {
        Ok(()) => 0,
        Err(_) => u64::MAX,
    }
}
