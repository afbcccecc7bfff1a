use core::fmt;

/// Kernel error types surfaced to the syscall boundary.
///
/// Routine scheduling conditions (a stale or non-runnable advisory hint, a
/// sleep that timed out) are handled where they occur and never appear here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Advisory pid was zero or negative; the record was left untouched.
    InvalidAdvice,
    /// No free process slot for a spawn.
    ResourceExhausted,
    /// Target pid names no live process.
    NotFound,
    /// Wait was called by a process with no children at all.
    NoChildren,
    /// A blocking operation was cut short because the caller was killed.
    Killed,
    /// A syscall argument was out of range.
    InvalidArgument,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KernelError::InvalidAdvice => write!(f, "Invalid advisory pid"),
            KernelError::ResourceExhausted => write!(f, "No free process slot"),
            KernelError::NotFound => write!(f, "No such process"),
            KernelError::NoChildren => write!(f, "No child processes"),
            KernelError::Killed => write!(f, "Killed"),
            KernelError::InvalidArgument => write!(f, "Invalid argument"),
        }
    }
}

pub type KernelResult<T> = Result<T, KernelError>;
