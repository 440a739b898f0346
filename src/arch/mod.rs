//! # Architecture Abstraction Layer
//!
//! The kernel only needs two things from the hardware: a monotonic tick
//! count and a way to sleep until the next interesting tick. Each port
//! implements [`Port`]; the Cortex-M4 port drives it from SysTick, the
//! virtual port from a software clock.

use crate::task::Tick;

#[cfg(target_arch = "arm")]
pub mod cortex_m4;
pub mod virt;

/// Tick source and idle hook used by the dispatcher.
pub trait Port {
    /// Ticks elapsed since the port was started.
    fn now(&self) -> Tick;

    /// Nothing is runnable. Sleep until `next_wake`, or until any
    /// interrupt when no task is waiting for time.
    fn idle(&self, next_wake: Option<Tick>);

    /// Called after every activation.
    fn dispatched(&self) {}
}

impl<P: Port + ?Sized> Port for &P {
    fn now(&self) -> Tick {
        (**self).now()
    }

    fn idle(&self, next_wake: Option<Tick>) {
        (**self).idle(next_wake)
    }

    fn dispatched(&self) {
        (**self).dispatched()
    }
}
