//! # Periodic Task
//!
//! Wraps a [`Step`] in the canonical polling loop:
//!
//! ```text
//! Created ──► Sleep ──► Invoke ──► Sleep ──► Invoke ──► …  (never exits)
//! ```
//!
//! Release instants are absolute (`release += interval`), so the time a
//! step takes does not accumulate as drift. If a step overruns a whole
//! period the missed releases are dropped and the task re-aligns to
//! `now + interval`. With [`Phase::InvokeFirst`] the task skips the
//! initial sleep and invokes its step on the first activation.
//!
//! `Every(0)` never sleeps: each invocation is followed by a yield to the
//! rest of the tier, and overruns are not counted.
//!
//! A [`Period::TightLoop`] task never sleeps. With `yield_every: None` it
//! also never yields, so every other task in its tier starves while it is
//! runnable; only higher tiers get the CPU (at the next activation
//! boundary). Prefer a finite `yield_every`.

use core::num::NonZeroU32;

use log::{trace, warn};

use crate::step::Step;
use crate::task::{Context, Suspend, Task, Tick};

/// Activation pattern of a periodic task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Period {
    /// Sleep this many ticks between invocations.
    Every(u32),
    /// Invoke back to back, yielding to same-tier peers every
    /// `yield_every` invocations (never, if `None`).
    TightLoop { yield_every: Option<NonZeroU32> },
}

/// Whether an `Every` task sleeps before its first invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    SleepFirst,
    InvokeFirst,
}

pub struct PeriodicTask<S> {
    step: S,
    period: Period,
    phase: Phase,
    release: Option<Tick>,
    iterations: u64,
    overruns: u32,
}

impl<S: Step> PeriodicTask<S> {
    /// A task that sleeps one period before its first invocation.
    pub const fn new(step: S, period: Period) -> Self {
        Self {
            step,
            period,
            phase: Phase::SleepFirst,
            release: None,
            iterations: 0,
            overruns: 0,
        }
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    pub const fn period(&self) -> Period {
        self.period
    }

    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of times the step has been invoked.
    pub const fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Number of times a step overran its period and releases were skipped.
    pub const fn overruns(&self) -> u32 {
        self.overruns
    }

    pub fn step_mut(&mut self) -> &mut S {
        &mut self.step
    }

    fn invoke(&mut self) {
        self.step.step();
        self.iterations += 1;
    }
}

impl<'a, S: Step> Task<'a> for PeriodicTask<S> {
    fn run(&mut self, cx: &Context) -> Suspend<'a> {
        match self.period {
            Period::Every(0) => {
                self.invoke();
                Suspend::Yield
            }
            Period::Every(interval) => {
                let interval = Tick::from(interval);
                let (release, late) = match (self.release, self.phase) {
                    // Woken a whole period late: the previous step overran.
                    (Some(release), _) => (release, cx.now() >= release + interval),
                    (None, Phase::InvokeFirst) => (cx.now(), false),
                    (None, Phase::SleepFirst) => {
                        let first = cx.now() + interval;
                        self.release = Some(first);
                        return Suspend::DelayUntil(first);
                    }
                };
                self.invoke();

                let next = if late {
                    self.overruns = self.overruns.saturating_add(1);
                    trace!("{} overran its period at {}", cx.name(), cx.now());
                    cx.now() + interval
                } else {
                    release + interval
                };
                self.release = Some(next);
                Suspend::DelayUntil(next)
            }
            Period::TightLoop { yield_every } => {
                if self.iterations == 0 && yield_every.is_none() {
                    warn!("{} runs a tight loop without yielding", cx.name());
                }
                self.invoke();
                match yield_every {
                    Some(n) if self.iterations % u64::from(n.get()) == 0 => Suspend::Yield,
                    _ => Suspend::Continue,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
