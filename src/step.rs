//! Subsystem step functions.
//!
//! Every subsystem (device configuration, DMA, timers, the link stack,
//! the indicator pattern engine, ...) exposes an "advance one iteration"
//! entry point. It must return promptly: it runs inside an activation and
//! holds the CPU until it returns. A step that can fail handles the
//! failure itself; nothing above it will restart the task.

pub trait Step {
    fn step(&mut self);
}

impl<F: FnMut()> Step for F {
    fn step(&mut self) {
        self()
    }
}

/// Runs several steps in order as one. The system-maintenance task uses
/// this to drain the device-configuration and DMA state machines in the
/// same period.
pub struct Chain<A, B>(pub A, pub B);

impl<A: Step, B: Step> Step for Chain<A, B> {
    fn step(&mut self) {
        self.0.step();
        self.1.step();
    }
}
