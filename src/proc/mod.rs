//! Process table and lifecycle management.
//!
//! The table owns every PCB. Each slot has its own lock so cores can make
//! progress on unrelated processes concurrently; `wait_lock` additionally
//! serializes everything that walks or mutates the parent/child tree (fork
//! linking, exit re-parenting, wait scanning), which is what makes the
//! exit/wait wakeup handshake lose-proof.
//!
//! Lock order: `wait_lock` before any slot lock; at most one slot lock held
//! at a time; the tick lock may be held while taking a slot lock (the sleep
//! commit) but never the other way around.

pub mod pcb;

use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};
use spin::{Mutex, MutexGuard, Once};

use crate::error::{KernelError, KernelResult};
use crate::sched::CoreDriver;

pub use pcb::{Channel, Context, Pcb, Pid, ProcState};

/// Fixed capacity of the process table.
pub const NPROC: usize = 64;

/// Upper bound on a process's recorded memory size. The VM layer enforces
/// the real mapping limit; this just keeps sbrk accounting sane.
pub const MAX_PROC_SIZE: usize = 128 * 1024 * 1024;

/// One row of a process-table snapshot (ps-style introspection; `io_count`
/// is the CPU-bound vs I/O-bound classification signal).
#[derive(Debug, Clone)]
pub struct ProcInfo {
    pub pid: Pid,
    pub name: String,
    pub state: ProcState,
    pub io_count: u64,
}

/// Fixed-size registry of Process Control Blocks.
pub struct ProcTable {
    slots: [Mutex<Pcb>; NPROC],
    /// Serializes parent/child link mutation and wait scanning.
    wait_lock: Mutex<()>,
    next_pid: AtomicU32,
    /// Slot of the init process, the ancestor orphans re-parent to.
    init_slot: Once<usize>,
}

impl ProcTable {
    pub fn new() -> Self {
        ProcTable {
            slots: core::array::from_fn(|_| Mutex::new(Pcb::new())),
            wait_lock: Mutex::new(()),
            next_pid: AtomicU32::new(1),
            init_slot: Once::new(),
        }
    }

    /// Find a free slot, mark it Allocating and assign a fresh pid.
    fn alloc_slot(&self) -> KernelResult<usize> {
        for (i, slot) in self.slots.iter().enumerate() {
            let mut p = slot.lock();
            if p.state == ProcState::Unused {
                p.transition(ProcState::Allocating);
                p.pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
                return Ok(i);
            }
        }
        Err(KernelError::ResourceExhausted)
    }

    /// Create the first process. It never exits and is the re-parenting
    /// target for every orphan. Must be called exactly once, at boot.
    pub fn spawn_init(&self, name: &str) -> KernelResult<Pid> {
        let slot = self.alloc_slot()?;
        let pid = {
            let mut p = self.slots[slot].lock();
            p.name = String::from(name);
            p.transition(ProcState::Runnable);
            p.pid
        };
        self.init_slot.call_once(|| slot);
        log::info!("init process '{}' is pid {}", name, pid);
        Ok(pid)
    }

    /// Fork: duplicate the parent's image into a fresh Runnable PCB.
    ///
    /// The address-space copy itself belongs to the VM layer; here the
    /// child inherits the parent's size, opaque context and name, and is
    /// linked to its parent under `wait_lock`.
    pub fn spawn(&self, parent_slot: usize) -> KernelResult<Pid> {
        let (memory_size, context, name) = {
            let parent = self.slots[parent_slot].lock();
            (parent.memory_size, parent.context, parent.name.clone())
        };

        let slot = self.alloc_slot()?;
        let pid = {
            let _wl = self.wait_lock.lock();
            let mut child = self.slots[slot].lock();
            child.memory_size = memory_size;
            child.context = context;
            child.name = name;
            child.parent = Some(parent_slot);
            child.transition(ProcState::Runnable);
            child.pid
        };
        Ok(pid)
    }

    /// Atomically commit `Running -> Sleeping` on `chan` and release the
    /// condition guard, then give the core back through the driver seam.
    ///
    /// The slot lock is taken *before* the condition guard is dropped, so a
    /// waker serialized by the condition lock either runs before the commit
    /// (and the caller re-checks its condition before sleeping again) or
    /// blocks on the slot lock until Sleeping is visible. Returns with the
    /// condition lock re-acquired, once this process has been dispatched
    /// again.
    pub fn sleep<'a, T>(
        &self,
        slot: usize,
        chan: Channel,
        cond: &'a Mutex<T>,
        guard: MutexGuard<'a, T>,
        driver: &mut dyn CoreDriver,
    ) -> MutexGuard<'a, T> {
        {
            let mut p = self.slots[slot].lock();
            drop(guard);
            p.chan = Some(chan);
            p.transition(ProcState::Sleeping);
        }
        // No lock is held across the yield.
        driver.yield_now();
        cond.lock()
    }

    /// Wake every process sleeping on `chan`. Safe no-op when none match.
    pub fn wake(&self, chan: Channel) {
        for slot in self.slots.iter() {
            let mut p = slot.lock();
            if p.state == ProcState::Sleeping && p.chan == Some(chan) {
                p.chan = None;
                p.transition(ProcState::Runnable);
            }
        }
    }

    /// Terminate the running process in `slot`: hand its children to init,
    /// wake its parent, and turn the slot into a Zombie holding `exit_code`.
    pub fn terminate(&self, slot: usize, exit_code: i32) {
        let init = *self
            .init_slot
            .get()
            .expect("terminate before init process exists");
        assert!(slot != init, "init exiting");

        let wl = self.wait_lock.lock();

        // Re-parent children; remember whether init inherits a zombie it
        // must be told about.
        let mut orphaned_zombie = false;
        for i in 0..NPROC {
            if i == slot {
                continue;
            }
            let mut p = self.slots[i].lock();
            if p.parent == Some(slot) {
                p.parent = Some(init);
                if p.state == ProcState::Zombie {
                    orphaned_zombie = true;
                }
            }
        }
        if orphaned_zombie {
            let init_pid = self.slots[init].lock().pid;
            self.wake(Channel::ChildExit(init_pid));
        }

        // Wake the parent first, then become a zombie. The parent cannot
        // re-scan until wait_lock is released below, so the wakeup cannot
        // be lost even though the zombie state is not visible yet.
        let parent = self.slots[slot].lock().parent;
        if let Some(parent_slot) = parent {
            let parent_pid = self.slots[parent_slot].lock().pid;
            self.wake(Channel::ChildExit(parent_pid));
        }

        let pid = {
            let mut me = self.slots[slot].lock();
            me.exit_code = exit_code;
            me.chan = None;
            me.transition(ProcState::Zombie);
            me.pid
        };
        drop(wl);
        log::trace!("pid {} exited with code {}", pid, exit_code);
    }

    /// Wait for a child of `parent_slot` to exit and reap it.
    ///
    /// Returns the child's pid and exit code, freeing its slot. Fails
    /// immediately with `NoChildren` if the caller has none at all, and
    /// with `Killed` instead of blocking forever once the caller's kill
    /// flag is observed.
    pub fn reap(
        &self,
        parent_slot: usize,
        driver: &mut dyn CoreDriver,
    ) -> KernelResult<(Pid, i32)> {
        let mut wl = self.wait_lock.lock();
        loop {
            let mut have_children = false;
            for i in 0..NPROC {
                if i == parent_slot {
                    continue;
                }
                let mut p = self.slots[i].lock();
                if p.parent != Some(parent_slot) {
                    continue;
                }
                have_children = true;
                if p.state == ProcState::Zombie {
                    let pid = p.pid;
                    let exit_code = p.exit_code;
                    p.free();
                    return Ok((pid, exit_code));
                }
            }

            if !have_children {
                return Err(KernelError::NoChildren);
            }
            if self.killed(parent_slot) {
                return Err(KernelError::Killed);
            }

            let pid = self.slots[parent_slot].lock().pid;
            wl = self.sleep(parent_slot, Channel::ChildExit(pid), &self.wait_lock, wl, driver);
        }
    }

    /// Set the kill flag on the process named by `pid`, waking it if it is
    /// sleeping so the flag is observed promptly. The flag is cooperative:
    /// nothing is preempted here.
    pub fn signal(&self, pid: Pid) -> KernelResult<()> {
        for slot in self.slots.iter() {
            let mut p = slot.lock();
            if p.pid == pid && p.state != ProcState::Unused {
                p.killed = true;
                if p.state == ProcState::Sleeping {
                    p.chan = None;
                    p.transition(ProcState::Runnable);
                }
                return Ok(());
            }
        }
        Err(KernelError::NotFound)
    }

    /// Claim the process in `slot` for dispatch: `Runnable -> Running`.
    /// Returns false if the slot is not currently runnable.
    pub fn claim_slot(&self, slot: usize) -> bool {
        let mut p = self.slots[slot].lock();
        if p.state == ProcState::Runnable {
            p.transition(ProcState::Running);
            true
        } else {
            false
        }
    }

    /// Claim the runnable process named by `pid`, if any. Used to validate
    /// an advisory hint at the moment of dispatch.
    pub fn claim_by_pid(&self, pid: Pid) -> Option<usize> {
        for (i, slot) in self.slots.iter().enumerate() {
            let mut p = slot.lock();
            if p.pid == pid && p.state == ProcState::Runnable {
                p.transition(ProcState::Running);
                return Some(i);
            }
        }
        None
    }

    /// Voluntary yield or timer preemption: `Running -> Runnable`.
    pub fn yield_slot(&self, slot: usize) {
        let mut p = self.slots[slot].lock();
        p.transition(ProcState::Runnable);
    }

    /// Grow (or shrink) the recorded memory size of a process by `delta`
    /// bytes, returning the old size. Page mapping is the VM layer's job.
    pub fn grow(&self, slot: usize, delta: i64) -> KernelResult<usize> {
        let mut p = self.slots[slot].lock();
        let old = p.memory_size;
        // Deltas come straight from a syscall register; an overflowing sum
        // is out of range, not a crash.
        let new = match (old as i64).checked_add(delta) {
            Some(n) if (0..=MAX_PROC_SIZE as i64).contains(&n) => n,
            _ => return Err(KernelError::InvalidArgument),
        };
        p.memory_size = new as usize;
        Ok(old)
    }

    /// Count one blocking-style event against `slot`.
    pub fn bump_io_count(&self, slot: usize) {
        self.slots[slot].lock().io_count += 1;
    }

    pub fn killed(&self, slot: usize) -> bool {
        self.slots[slot].lock().killed
    }

    pub fn pid_of(&self, slot: usize) -> Pid {
        self.slots[slot].lock().pid
    }

    pub fn state_of(&self, slot: usize) -> ProcState {
        self.slots[slot].lock().state
    }

    /// Slot currently holding the live process named by `pid`.
    pub fn slot_of(&self, pid: Pid) -> Option<usize> {
        for (i, slot) in self.slots.iter().enumerate() {
            let p = slot.lock();
            if p.pid == pid && p.state != ProcState::Unused {
                return Some(i);
            }
        }
        None
    }

    /// Snapshot of all live processes, for ps-style display and for the
    /// external classification consumer.
    pub fn snapshot(&self) -> Vec<ProcInfo> {
        let mut out = Vec::new();
        for slot in self.slots.iter() {
            let p = slot.lock();
            if p.state != ProcState::Unused {
                out.push(ProcInfo {
                    pid: p.pid,
                    name: p.name.clone(),
                    state: p.state,
                    io_count: p.io_count,
                });
            }
        }
        out
    }
}

impl Default for ProcTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Driver for paths that must never actually yield.
    struct NoYield;

    impl CoreDriver for NoYield {
        fn dispatch(&mut self, _slot: usize) {
            unreachable!("dispatch in no-yield test");
        }
        fn yield_now(&mut self) {
            unreachable!("yield in no-yield test");
        }
        fn idle(&mut self) {}
    }

    fn boot() -> (ProcTable, usize) {
        let table = ProcTable::new();
        let init_pid = table.spawn_init("init").unwrap();
        let init_slot = table.slot_of(init_pid).unwrap();
        (table, init_slot)
    }

    #[test]
    fn pids_are_unique_and_positive() {
        let (table, init_slot) = boot();
        let a = table.spawn(init_slot).unwrap();
        let b = table.spawn(init_slot).unwrap();
        assert!(a > 0 && b > 0);
        assert_ne!(a, b);
    }

    #[test]
    fn spawn_fails_when_table_is_full() {
        let (table, init_slot) = boot();
        for _ in 0..NPROC - 1 {
            table.spawn(init_slot).unwrap();
        }
        assert_eq!(table.spawn(init_slot), Err(KernelError::ResourceExhausted));
    }

    #[test]
    fn lifecycle_closure_spawn_terminate_reap() {
        let (table, init_slot) = boot();
        let child_pid = table.spawn(init_slot).unwrap();
        let child_slot = table.slot_of(child_pid).unwrap();

        assert!(table.claim_slot(child_slot));
        table.terminate(child_slot, 42);
        assert_eq!(table.state_of(child_slot), ProcState::Zombie);

        let (pid, code) = table.reap(init_slot, &mut NoYield).unwrap();
        assert_eq!((pid, code), (child_pid, 42));
        assert_eq!(table.state_of(child_slot), ProcState::Unused);
        // The slot is reusable, under a fresh pid.
        let next = table.spawn(init_slot).unwrap();
        assert_ne!(next, child_pid);
        assert_eq!(table.slot_of(next), Some(child_slot));
    }

    #[test]
    fn reap_without_children_fails_immediately() {
        let (table, init_slot) = boot();
        assert_eq!(
            table.reap(init_slot, &mut NoYield),
            Err(KernelError::NoChildren)
        );
    }

    #[test]
    fn orphans_reparent_to_init() {
        let (table, init_slot) = boot();
        let a_pid = table.spawn(init_slot).unwrap();
        let a_slot = table.slot_of(a_pid).unwrap();
        let b_pid = table.spawn(a_slot).unwrap();
        let b_slot = table.slot_of(b_pid).unwrap();

        assert!(table.claim_slot(a_slot));
        table.terminate(a_slot, 0);

        // B now belongs to init; init reaps A first, then B once it exits.
        let (pid, _) = table.reap(init_slot, &mut NoYield).unwrap();
        assert_eq!(pid, a_pid);
        assert!(table.claim_slot(b_slot));
        table.terminate(b_slot, 7);
        let (pid, code) = table.reap(init_slot, &mut NoYield).unwrap();
        assert_eq!((pid, code), (b_pid, 7));
    }

    #[test]
    fn signal_unknown_pid_is_not_found() {
        let (table, _) = boot();
        assert_eq!(table.signal(9999), Err(KernelError::NotFound));
    }

    #[test]
    fn signal_wakes_a_sleeper_with_killed_set() {
        let (table, init_slot) = boot();
        let pid = table.spawn(init_slot).unwrap();
        let slot = table.slot_of(pid).unwrap();
        assert!(table.claim_slot(slot));

        struct KillMidSleep<'a> {
            table: &'a ProcTable,
            pid: Pid,
            slot: usize,
        }
        impl CoreDriver for KillMidSleep<'_> {
            fn dispatch(&mut self, _slot: usize) {}
            fn yield_now(&mut self) {
                assert_eq!(self.table.state_of(self.slot), ProcState::Sleeping);
                self.table.signal(self.pid).unwrap();
                assert_eq!(self.table.state_of(self.slot), ProcState::Runnable);
                assert!(self.table.claim_slot(self.slot));
            }
            fn idle(&mut self) {}
        }

        let cond = Mutex::new(());
        let guard = cond.lock();
        let mut driver = KillMidSleep {
            table: &table,
            pid,
            slot,
        };
        let _guard = table.sleep(slot, Channel::Ticks, &cond, guard, &mut driver);
        assert!(table.killed(slot));
    }

    #[test]
    fn wake_with_no_sleepers_is_a_noop() {
        let (table, _) = boot();
        table.wake(Channel::ChildExit(12345));
    }

    #[test]
    fn snapshot_reports_live_processes() {
        let (table, init_slot) = boot();
        table.spawn(init_slot).unwrap();
        table.bump_io_count(init_slot);
        let snap = table.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].name, "init");
        assert_eq!(snap[0].io_count, 1);
    }
}
