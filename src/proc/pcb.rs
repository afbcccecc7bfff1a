use alloc::string::String;

/// Unique process identifier. Assigned from a monotonic counter; 0 is never
/// a valid pid.
pub type Pid = u32;

/// Process lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Unused,
    Allocating,
    Runnable,
    Running,
    Sleeping,
    Zombie,
}

impl ProcState {
    /// Check whether a transition to `new` is legal.
    pub fn can_transition_to(self, new: ProcState) -> bool {
        matches!(
            (self, new),
            // Slot allocation, and rollback of a failed setup.
            (ProcState::Unused, ProcState::Allocating)
                | (ProcState::Allocating, ProcState::Runnable)
                | (ProcState::Allocating, ProcState::Unused)
                // Scheduling.
                | (ProcState::Runnable, ProcState::Running)
                | (ProcState::Running, ProcState::Runnable)
                // Blocking and waking.
                | (ProcState::Running, ProcState::Sleeping)
                | (ProcState::Sleeping, ProcState::Runnable)
                // Exit and reap.
                | (ProcState::Running, ProcState::Zombie)
                | (ProcState::Zombie, ProcState::Unused)
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ProcState::Unused => "Unused",
            ProcState::Allocating => "Allocating",
            ProcState::Runnable => "Runnable",
            ProcState::Running => "Running",
            ProcState::Sleeping => "Sleeping",
            ProcState::Zombie => "Zombie",
        }
    }
}

/// What a sleeping process is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// The tick clock advanced (pause-style sleeps).
    Ticks,
    /// A child of the process with this pid exited.
    ChildExit(Pid),
}

/// Saved execution context. The scheduler only moves it around; the
/// context-switch layer owns the register layout.
#[derive(Debug, Clone, Copy)]
pub struct Context {
    regs: [u64; 16],
}

impl Context {
    pub const fn new() -> Self {
        Context { regs: [0; 16] }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Process Control Block: one process's identity, state, and resources.
pub struct Pcb {
    pub pid: Pid,
    pub state: ProcState,
    /// Slot index of the parent; re-pointed to init when the parent exits
    /// first. A lookup reference only: the table owns every slot.
    pub parent: Option<usize>,
    /// Set once, at the transition into Zombie; read by wait.
    pub exit_code: i32,
    /// Cooperative kill flag, checked at blocking-wait resumption points.
    pub killed: bool,
    /// Count of blocking-style events (pause, wait); exported as a
    /// CPU-bound vs I/O-bound classification signal.
    pub io_count: u64,
    /// Wait condition token, set while Sleeping, cleared on wake.
    pub chan: Option<Channel>,
    pub memory_size: usize,
    pub context: Context,
    pub name: String,
}

impl Pcb {
    pub const fn new() -> Self {
        Pcb {
            pid: 0,
            state: ProcState::Unused,
            parent: None,
            exit_code: 0,
            killed: false,
            io_count: 0,
            chan: None,
            memory_size: 0,
            context: Context::new(),
            name: String::new(),
        }
    }

    /// Advance the lifecycle state machine. An illegal transition means a
    /// table invariant has been broken and is fatal to the detecting core.
    pub fn transition(&mut self, new: ProcState) {
        assert!(
            self.state.can_transition_to(new),
            "illegal process transition {} -> {} (pid {})",
            self.state.name(),
            new.name(),
            self.pid
        );
        self.state = new;
    }

    /// Reset the slot to Unused after a reap (or a failed setup).
    pub fn free(&mut self) {
        self.transition(ProcState::Unused);
        self.pid = 0;
        self.parent = None;
        self.exit_code = 0;
        self.killed = false;
        self.io_count = 0;
        self.chan = None;
        self.memory_size = 0;
        self.context = Context::new();
        self.name.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_lifecycle_path() {
        let mut pcb = Pcb::new();
        pcb.transition(ProcState::Allocating);
        pcb.transition(ProcState::Runnable);
        pcb.transition(ProcState::Running);
        pcb.transition(ProcState::Sleeping);
        pcb.transition(ProcState::Runnable);
        pcb.transition(ProcState::Running);
        pcb.transition(ProcState::Zombie);
        pcb.free();
        assert_eq!(pcb.state, ProcState::Unused);
    }

    #[test]
    #[should_panic(expected = "illegal process transition")]
    fn runnable_cannot_become_zombie() {
        let mut pcb = Pcb::new();
        pcb.transition(ProcState::Allocating);
        pcb.transition(ProcState::Runnable);
        pcb.transition(ProcState::Zombie);
    }

    #[test]
    #[should_panic(expected = "illegal process transition")]
    fn sleeping_cannot_run_directly() {
        let mut pcb = Pcb::new();
        pcb.transition(ProcState::Allocating);
        pcb.transition(ProcState::Runnable);
        pcb.transition(ProcState::Running);
        pcb.transition(ProcState::Sleeping);
        pcb.transition(ProcState::Running);
    }
}
