//! Standard firmware task layout.
//!
//! | Task               | Tier        | Period     | First invocation |
//! |--------------------|-------------|------------|------------------|
//! | system-maintenance | System      | 100 ticks  | at start         |
//! | timer-service      | System      | 1000 ticks | at start         |
//! | wireless-link      | Application | tight loop | at start         |
//! | indicator          | Application | 100 ticks  | after one period |
//! | motion-sampler     | Application | 50 ticks   | after one period |
//! | shell              | Application | 1000 ticks | at start         |

use crate::config::{
    INDICATOR_PERIOD_TICKS, LINK_STACK_SIZE, LINK_YIELD_EVERY, MINIMAL_STACK_SIZE,
    MOTION_PERIOD_TICKS, SHELL_PERIOD_TICKS, SYSTEM_PERIOD_TICKS, TIMER_PERIOD_TICKS,
};
use crate::periodic::{Period, PeriodicTask, Phase};
use crate::step::Step;
use crate::task::{TaskDescriptor, Tier};

/// Device configuration, DMA and timer-driver maintenance.
pub const SYSTEM_MAINTENANCE: TaskDescriptor =
    TaskDescriptor::new("system-maintenance", Tier::System, MINIMAL_STACK_SIZE);

pub const TIMER_SERVICE: TaskDescriptor =
    TaskDescriptor::new("timer-service", Tier::System, MINIMAL_STACK_SIZE);

pub const WIRELESS_LINK: TaskDescriptor =
    TaskDescriptor::new("wireless-link", Tier::Application, LINK_STACK_SIZE);

pub const INDICATOR: TaskDescriptor =
    TaskDescriptor::new("indicator", Tier::Application, MINIMAL_STACK_SIZE);

pub const MOTION_SAMPLER: TaskDescriptor =
    TaskDescriptor::new("motion-sampler", Tier::Application, MINIMAL_STACK_SIZE);

/// Serial command shell. Opens its USART on the first invocation.
pub const SHELL: TaskDescriptor = TaskDescriptor::new("shell", Tier::Application, MINIMAL_STACK_SIZE);

/// One entry of the task layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskLayout {
    pub descriptor: TaskDescriptor,
    pub period: Period,
    pub phase: Phase,
}

impl TaskLayout {
    const fn new(descriptor: TaskDescriptor, period: Period, phase: Phase) -> Self {
        Self {
            descriptor,
            period,
            phase,
        }
    }

    /// Wrap `step` in a periodic task with this entry's timing.
    pub fn periodic<S: Step>(&self, step: S) -> PeriodicTask<S> {
        PeriodicTask::new(step, self.period).with_phase(self.phase)
    }
}

/// Every standard task, in creation order.
pub const STANDARD_TASKS: [TaskLayout; 6] = [
    TaskLayout::new(
        SYSTEM_MAINTENANCE,
        Period::Every(SYSTEM_PERIOD_TICKS),
        Phase::InvokeFirst,
    ),
    TaskLayout::new(TIMER_SERVICE, Period::Every(TIMER_PERIOD_TICKS), Phase::InvokeFirst),
    TaskLayout::new(
        WIRELESS_LINK,
        Period::TightLoop {
            yield_every: LINK_YIELD_EVERY,
        },
        Phase::InvokeFirst,
    ),
    TaskLayout::new(INDICATOR, Period::Every(INDICATOR_PERIOD_TICKS), Phase::SleepFirst),
    TaskLayout::new(MOTION_SAMPLER, Period::Every(MOTION_PERIOD_TICKS), Phase::SleepFirst),
    TaskLayout::new(SHELL, Period::Every(SHELL_PERIOD_TICKS), Phase::InvokeFirst),
];
