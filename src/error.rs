//! # Kernel Errors
//!
//! Resource exhaustion at startup is the only error class that is fatal.
//! Everything else (full channels, busy drivers, unready devices) is
//! handled locally inside the task that hit it.

use core::fmt;

/// Fatal bootstrap errors. The system either starts fully provisioned or
/// does not start at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KernelError {
    /// The task table already holds `MAX_TASKS` tasks.
    TaskTableFull,
    /// The requested stack budget is below `MIN_STACK_SIZE`.
    StackTooSmall { task: &'static str, requested: usize },
    /// Reserving the stack budget would overrun `STACK_POOL_BYTES`.
    StackPoolExhausted {
        task: &'static str,
        requested: usize,
        available: usize,
    },
    /// The sensor channel set was already created.
    ChannelUnavailable,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::TaskTableFull => write!(f, "task table full"),
            KernelError::StackTooSmall { task, requested } => {
                write!(f, "stack budget of {} bytes too small for {}", requested, task)
            }
            KernelError::StackPoolExhausted {
                task,
                requested,
                available,
            } => write!(
                f,
                "out of stack memory for {}: requested {}, available {}",
                task, requested, available
            ),
            KernelError::ChannelUnavailable => write!(f, "sensor channels unavailable"),
        }
    }
}
