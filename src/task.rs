//! # Task Model
//!
//! Descriptors, priority tiers and the Task Control Block. A task is a
//! body that the dispatcher activates; each activation runs to completion
//! and ends by telling the kernel how the task suspends (sleep, wait on a
//! channel, yield, or keep the CPU).
//!
//! ```text
//!   ┌──────────┐     schedule()      ┌─────────┐
//!   │  Ready   │ ──────────────────► │ Running │
//!   └──────────┘                     └─────────┘
//!     ▲  ▲  ▲     Yield / Continue        │
//!     │  │  └─────────────────────────────┤
//!     │  │        DelayUntil              ▼
//!     │  │  tick()              ┌──────────────┐
//!     │  └───────────────────── │   Delayed    │
//!     │                         └──────────────┘
//!     │   event / timeout       ┌──────────────┐
//!     └──────────────────────── │   Blocked    │ ◄── Wait
//!                               └──────────────┘
//! ```

use crate::config::MINIMAL_STACK_SIZE;

/// Kernel time in ticks since start.
pub type Tick = u64;

/// Index of a task in the scheduler's task table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    pub const fn index(self) -> usize {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Priority tiers
// ---------------------------------------------------------------------------

/// Priority used by the idle loop. No task may be created below it.
pub const IDLE_PRIORITY: u8 = 0;

/// Logical priority class. A ready `System` task always runs before any
/// `Application` task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Tier {
    /// System-service and timer maintenance.
    System,
    /// Wireless, indicator, sensor and shell work.
    Application,
}

impl Tier {
    /// Numeric priority of the tier (higher = preferred).
    pub const fn priority(self) -> u8 {
        match self {
            Tier::System => 2,
            Tier::Application => 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Task descriptor (immutable after creation)
// ---------------------------------------------------------------------------

/// Static description of a task, fixed at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskDescriptor {
    /// Name used in logs and diagnostics.
    pub name: &'static str,
    /// Base priority (higher = more important).
    pub priority: u8,
    /// Stack budget in bytes, reserved from `STACK_POOL_BYTES` at
    /// creation. Admission control only: activations run to completion on
    /// the dispatcher's stack and no per-task stack is allocated.
    pub stack_size: usize,
}

impl TaskDescriptor {
    pub const fn new(name: &'static str, tier: Tier, stack_size: usize) -> Self {
        Self {
            name,
            priority: tier.priority(),
            stack_size,
        }
    }

    /// Descriptor with an explicit numeric priority and the minimal stack.
    pub const fn with_priority(name: &'static str, priority: u8) -> Self {
        Self {
            name,
            priority,
            stack_size: MINIMAL_STACK_SIZE,
        }
    }
}

// ---------------------------------------------------------------------------
// Activation protocol
// ---------------------------------------------------------------------------

/// Why a task is being activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeReason {
    /// First activation after creation.
    Start,
    /// A `DelayUntil` instant was reached.
    Timer,
    /// The condition the task waited on became true.
    Event,
    /// The wait deadline passed before the condition became true.
    Timeout,
    /// The task yielded and was picked again.
    Yield,
    /// The task kept the CPU from its previous activation.
    Continue,
}

/// What a blocked task is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Interest {
    Readable,
    Writable,
}

/// Something a task can block on. Evaluated by the kernel at every
/// scheduling point, so it must be cheap and must not block.
pub trait Waitable {
    fn is_ready(&self, interest: Interest) -> bool;
}

/// How a task suspends at the end of an activation.
pub enum Suspend<'a> {
    /// Keep the CPU. Only a higher-priority task can take over; peers in
    /// the same tier starve until the task yields.
    Continue,
    /// Go to the back of the tier.
    Yield,
    /// Sleep until the given absolute tick.
    DelayUntil(Tick),
    /// Block until `on` is ready for `interest`, or until `deadline`.
    Wait {
        on: &'a dyn Waitable,
        interest: Interest,
        deadline: Option<Tick>,
    },
}

/// Information handed to a task for one activation.
#[derive(Debug, Clone, Copy)]
pub struct Context {
    now: Tick,
    task: TaskId,
    name: &'static str,
    wake: WakeReason,
}

impl Context {
    pub(crate) const fn new(now: Tick, task: TaskId, name: &'static str, wake: WakeReason) -> Self {
        Self {
            now,
            task,
            name,
            wake,
        }
    }

    pub const fn now(&self) -> Tick {
        self.now
    }

    pub const fn task(&self) -> TaskId {
        self.task
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn wake(&self) -> WakeReason {
        self.wake
    }

    /// True when this activation is the expiry of the wait the task
    /// returned last time. Covers the whole activation: a task that waits
    /// on several conditions should track each deadline itself (see
    /// `channel::ReadWait`).
    pub fn timed_out(&self) -> bool {
        self.wake == WakeReason::Timeout
    }
}

/// A schedulable body. `run` is one activation; it must return promptly.
pub trait Task<'a> {
    fn run(&mut self, cx: &Context) -> Suspend<'a>;
}

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskState {
    /// Runnable, waiting for the dispatcher.
    Ready,
    /// Currently activated.
    Running,
    /// Sleeping until a tick.
    Delayed,
    /// Waiting on a channel condition.
    Blocked,
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Per-task runtime record, owned by the scheduler's task table.
pub struct TaskControlBlock<'a> {
    pub id: TaskId,
    pub descriptor: TaskDescriptor,
    pub state: TaskState,

    /// Completed activations.
    pub activations: u64,

    /// Dispatch sequence number of the last activation. Used for
    /// round-robin within a priority level.
    pub last_dispatch: u64,

    /// Set when the last activation returned `Continue`.
    pub holds_cpu: bool,

    body: &'a mut dyn Task<'a>,
    wake: WakeReason,
    wake_at: Option<Tick>,
    wait: Option<(&'a dyn Waitable, Interest)>,
}

impl<'a> TaskControlBlock<'a> {
    pub fn new(id: TaskId, descriptor: TaskDescriptor, body: &'a mut dyn Task<'a>) -> Self {
        Self {
            id,
            descriptor,
            state: TaskState::Ready,
            activations: 0,
            last_dispatch: 0,
            holds_cpu: false,
            body,
            wake: WakeReason::Start,
            wake_at: None,
            wait: None,
        }
    }

    #[inline]
    pub fn priority(&self) -> u8 {
        self.descriptor.priority
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    #[inline]
    pub fn is_runnable(&self) -> bool {
        matches!(self.state, TaskState::Ready | TaskState::Running)
    }

    /// Absolute tick at which this task needs the kernel's attention.
    pub fn wake_at(&self) -> Option<Tick> {
        match self.state {
            TaskState::Delayed | TaskState::Blocked => self.wake_at,
            _ => None,
        }
    }

    /// Move a sleeping or blocked task to Ready if it is due.
    /// Returns true when the task was released.
    pub fn release(&mut self, now: Tick) -> bool {
        match self.state {
            TaskState::Delayed => {
                if self.wake_at.is_some_and(|at| now >= at) {
                    self.make_ready(WakeReason::Timer);
                    return true;
                }
            }
            TaskState::Blocked => {
                if let Some((on, interest)) = self.wait {
                    if on.is_ready(interest) {
                        self.make_ready(WakeReason::Event);
                        return true;
                    }
                }
                if self.wake_at.is_some_and(|at| now >= at) {
                    self.make_ready(WakeReason::Timeout);
                    return true;
                }
            }
            TaskState::Ready | TaskState::Running => {}
        }
        false
    }

    /// Run one activation and apply the returned suspension.
    pub fn activate(&mut self, now: Tick, sequence: u64) {
        self.state = TaskState::Running;
        let cx = Context::new(now, self.id, self.descriptor.name, self.wake);
        let suspend = self.body.run(&cx);
        self.activations += 1;
        self.last_dispatch = sequence;
        self.suspend(suspend, now);
    }

    fn suspend(&mut self, suspend: Suspend<'a>, now: Tick) {
        self.holds_cpu = false;
        match suspend {
            Suspend::Continue => {
                self.holds_cpu = true;
                self.make_ready(WakeReason::Continue);
            }
            Suspend::Yield => self.make_ready(WakeReason::Yield),
            Suspend::DelayUntil(at) if at <= now => self.make_ready(WakeReason::Timer),
            Suspend::DelayUntil(at) => {
                self.state = TaskState::Delayed;
                self.wake_at = Some(at);
            }
            Suspend::Wait {
                on,
                interest,
                deadline,
            } => {
                if on.is_ready(interest) {
                    self.make_ready(WakeReason::Event);
                } else {
                    self.state = TaskState::Blocked;
                    self.wait = Some((on, interest));
                    self.wake_at = deadline;
                }
            }
        }
    }

    fn make_ready(&mut self, wake: WakeReason) {
        self.state = TaskState::Ready;
        self.wake = wake;
        self.wake_at = None;
        self.wait = None;
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
