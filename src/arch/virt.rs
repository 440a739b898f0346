//! Virtual port: a software clock for running the kernel off-target.
//!
//! Idling jumps the clock straight to the next wake-up, so a simulation of
//! thousands of ticks finishes in microseconds. Each activation can be
//! charged a fixed cost to model execution time, which is what lets a
//! task that never sleeps still move time forward.

use core::cell::Cell;

use super::Port;
use crate::task::Tick;

#[derive(Debug, Default)]
pub struct VirtualPort {
    now: Cell<Tick>,
    dispatch_cost: Cell<Tick>,
    idle_calls: Cell<u64>,
}

impl VirtualPort {
    pub const fn new() -> Self {
        Self {
            now: Cell::new(0),
            dispatch_cost: Cell::new(0),
            idle_calls: Cell::new(0),
        }
    }

    /// Charge `ticks` of virtual time for every activation.
    pub fn with_dispatch_cost(self, ticks: Tick) -> Self {
        self.dispatch_cost.set(ticks);
        self
    }

    pub fn advance(&self, ticks: Tick) {
        self.now.set(self.now.get() + ticks);
    }

    pub fn idle_calls(&self) -> u64 {
        self.idle_calls.get()
    }
}

impl Port for VirtualPort {
    fn now(&self) -> Tick {
        self.now.get()
    }

    fn idle(&self, next_wake: Option<Tick>) {
        self.idle_calls.set(self.idle_calls.get() + 1);
        match next_wake {
            Some(at) if at > self.now.get() => self.now.set(at),
            _ => self.advance(1),
        }
    }

    fn dispatched(&self) {
        self.advance(self.dispatch_cost.get());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_jumps_to_next_wake() {
        let port = VirtualPort::new();
        port.idle(Some(250));
        assert_eq!(port.now(), 250);
        port.idle(None);
        assert_eq!(port.now(), 251);
        assert_eq!(port.idle_calls(), 2);
    }

    #[test]
    fn test_dispatch_cost() {
        let port = VirtualPort::new().with_dispatch_cost(3);
        port.dispatched();
        port.dispatched();
        assert_eq!(port.now(), 6);
    }
}
