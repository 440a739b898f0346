//! # Synchronization Primitives
//!
//! Interrupt-safe critical sections for state shared between tasks and
//! interrupt handlers (channel storage, completion sinks, the tick
//! counter). Backed by the `critical-section` crate: on Cortex-M the
//! single-core implementation masks interrupts, on the host the `std`
//! implementation takes a global lock.

pub use critical_section::{CriticalSection, Mutex};

/// Execute a closure within a critical section.
///
/// Keep the enclosed work short: every interrupt, including SysTick, is
/// held off until it returns.
///
/// ```ignore
/// sync::critical_section(|cs| {
///     let queue = QUEUE.borrow_ref_mut(cs);
/// });
/// ```
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}
