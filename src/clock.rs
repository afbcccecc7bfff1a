use spin::Mutex;

use crate::proc::{Channel, ProcTable};

/// Monotonic tick count since boot.
pub type Tick = u64;

/// The boot-time tick counter, advanced once per timer interrupt.
///
/// The counter has its own lock so sleep/wake and the advisory staleness
/// check can read it without touching any process-slot lock. `pause` sleeps
/// holding the `ticks` guard as its condition lock, which is why the field
/// is public rather than hidden behind accessors.
pub struct TickClock {
    pub ticks: Mutex<Tick>,
}

impl TickClock {
    pub const fn new() -> Self {
        TickClock {
            ticks: Mutex::new(0),
        }
    }

    /// Current tick count.
    pub fn now(&self) -> Tick {
        *self.ticks.lock()
    }

    /// Advance the clock by one tick and wake every process sleeping on it.
    /// Called from the (out-of-scope) timer interrupt handler.
    pub fn tick(&self, table: &ProcTable) {
        {
            let mut ticks = self.ticks.lock();
            *ticks += 1;
        }
        table.wake(Channel::Ticks);
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new()
    }
}
