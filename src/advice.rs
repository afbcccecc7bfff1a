//! External advisory channel.
//!
//! A trusted user-space agent (an LLM bridge or any heuristic) may suggest
//! which pid should run next. The suggestion is a hint, not ground truth:
//! `inject` is the single write path, every core's scheduler loop polls
//! through `consult`, and a hint only survives for `STALENESS_WINDOW` ticks.
//! Whether the recommended process actually exists and is runnable is
//! checked later, at claim time, by the scheduler.

use spin::Mutex;

use crate::clock::Tick;
use crate::error::{KernelError, KernelResult};
use crate::proc::Pid;

/// Maximum age, in ticks, at which an advisory entry is still usable.
///
/// The agent re-asserts its advice periodically, so entries expire rather
/// than being consumed on use; a fresh entry may satisfy several scheduling
/// decisions across cores before it ages out.
pub const STALENESS_WINDOW: Tick = 10;

#[derive(Debug, Clone, Copy)]
struct AdviceRecord {
    recommended_pid: Pid,
    valid: bool,
    timestamp: Tick,
}

/// Shared advisory state: one record, one lock, overwritten wholesale.
///
/// The lock is the innermost in the kernel: it is never held across a
/// process-slot or tick-lock acquisition, so readers always see a consistent
/// `{pid, valid, timestamp}` snapshot without any ordering hazards.
pub struct AdviceChannel {
    record: Mutex<AdviceRecord>,
}

impl AdviceChannel {
    pub const fn new() -> Self {
        AdviceChannel {
            record: Mutex::new(AdviceRecord {
                recommended_pid: 0,
                valid: false,
                timestamp: 0,
            }),
        }
    }

    /// Record a new recommendation, timestamped with the current tick.
    ///
    /// Rejects `pid <= 0` at the boundary with no state change. There is no
    /// reader notification; cores pick the value up on their next decision.
    pub fn inject(&self, pid: i64, now: Tick) -> KernelResult<()> {
        if pid <= 0 || pid > u32::MAX as i64 {
            return Err(KernelError::InvalidAdvice);
        }
        let mut record = self.record.lock();
        *record = AdviceRecord {
            recommended_pid: pid as Pid,
            valid: true,
            timestamp: now,
        };
        Ok(())
    }

    /// Return the recommended pid if the record is valid and fresh.
    ///
    /// Performs no validation of process existence or runnability: that is
    /// the scheduler's job once it holds the candidate's slot lock.
    pub fn consult(&self, now: Tick) -> Option<Pid> {
        let record = *self.record.lock();
        if record.valid && now.saturating_sub(record.timestamp) <= STALENESS_WINDOW {
            Some(record.recommended_pid)
        } else {
            None
        }
    }
}

impl Default for AdviceChannel {
    fn default() -> Self {
        Self::new()
    }
}
