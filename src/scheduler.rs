//! # Scheduler
//!
//! Priority-based task selection for PollOS. The scheduler owns the task
//! table and decides, at every scheduling point, which task is activated
//! next.
//!
//! ## Scheduling Algorithm
//!
//! At each scheduling point:
//! 1. **Release**: sleeping tasks whose instant has passed and blocked
//!    tasks whose condition holds (or whose deadline expired) become Ready
//! 2. **Select**: the runnable task with the highest priority wins
//! 3. **Within a priority level**: a task that kept the CPU (`Continue`)
//!    stays on it; otherwise the least recently dispatched task runs
//!    (round-robin)
//!
//! A higher-priority task that becomes ready always takes the CPU at the
//! next scheduling point, even from a task that never yields. Activations
//! are short and run to completion, so every activation boundary is a
//! preemption point.

use heapless::Vec;
use log::{debug, trace};

use crate::config::{MAX_TASKS, MIN_STACK_SIZE, STACK_POOL_BYTES};
use crate::error::KernelError;
use crate::task::{Task, TaskControlBlock, TaskDescriptor, TaskId, TaskState, Tick};

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// The central scheduler state: task table, stack reservations and the
/// dispatch sequence used for round-robin.
pub struct Scheduler<'a> {
    tasks: Vec<TaskControlBlock<'a>, MAX_TASKS>,

    /// Task activated by the last dispatch.
    current: Option<TaskId>,

    /// Bytes of `STACK_POOL_BYTES` already reserved.
    stack_reserved: usize,

    /// Monotonic dispatch counter.
    sequence: u64,
}

impl<'a> Default for Scheduler<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Scheduler<'a> {
    pub const fn new() -> Self {
        Self {
            tasks: Vec::new(),
            current: None,
            stack_reserved: 0,
            sequence: 0,
        }
    }

    /// Register a new task.
    ///
    /// Fails when the table is full or the stack budget cannot be
    /// reserved. Nothing is registered on failure.
    pub fn create_task(
        &mut self,
        descriptor: TaskDescriptor,
        body: &'a mut dyn Task<'a>,
    ) -> Result<TaskId, KernelError> {
        if self.tasks.is_full() {
            return Err(KernelError::TaskTableFull);
        }
        if descriptor.stack_size < MIN_STACK_SIZE {
            return Err(KernelError::StackTooSmall {
                task: descriptor.name,
                requested: descriptor.stack_size,
            });
        }
        let available = self.stack_available();
        if descriptor.stack_size > available {
            return Err(KernelError::StackPoolExhausted {
                task: descriptor.name,
                requested: descriptor.stack_size,
                available,
            });
        }

        let id = TaskId(self.tasks.len());
        self.tasks
            .push(TaskControlBlock::new(id, descriptor, body))
            .map_err(|_| KernelError::TaskTableFull)?;
        self.stack_reserved += descriptor.stack_size;

        debug!(
            "created task {} (priority {}, stack {})",
            descriptor.name, descriptor.priority, descriptor.stack_size
        );
        Ok(id)
    }

    /// Release every task that is due at `now`.
    ///
    /// Returns the number of tasks made ready.
    pub fn tick(&mut self, now: Tick) -> usize {
        let running = self.current_priority();
        let mut released = 0;

        for tcb in self.tasks.iter_mut() {
            if tcb.release(now) {
                released += 1;
                if running.is_some_and(|p| tcb.priority() > p) {
                    trace!("{} preempts at tick {}", tcb.name(), now);
                }
            }
        }
        released
    }

    /// Select the next task to activate.
    ///
    /// Returns `None` when nothing is runnable (idle).
    pub fn schedule(&mut self) -> Option<TaskId> {
        let mut best: Option<&TaskControlBlock<'a>> = None;

        for tcb in self.tasks.iter().filter(|t| t.is_runnable()) {
            best = match best {
                None => Some(tcb),
                Some(b) if outranks(tcb, b) => Some(tcb),
                keep => keep,
            };
        }

        let next = best.map(|t| t.id);
        self.current = next;
        next
    }

    /// Activate `id` once at tick `now`.
    pub fn dispatch(&mut self, id: TaskId, now: Tick) {
        self.sequence += 1;
        let sequence = self.sequence;
        if let Some(tcb) = self.tasks.get_mut(id.0) {
            tcb.activate(now, sequence);
        }
    }

    /// Earliest tick at which a sleeping or blocked task needs attention.
    pub fn next_wake(&self) -> Option<Tick> {
        self.tasks.iter().filter_map(|t| t.wake_at()).min()
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskControlBlock<'a>> {
        self.tasks.get(id.0)
    }

    pub fn find(&self, name: &str) -> Option<&TaskControlBlock<'a>> {
        self.tasks.iter().find(|t| t.name() == name)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskControlBlock<'a>> {
        self.tasks.iter()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    pub fn dispatches(&self) -> u64 {
        self.sequence
    }

    pub fn stack_available(&self) -> usize {
        STACK_POOL_BYTES - self.stack_reserved
    }

    fn current_priority(&self) -> Option<u8> {
        self.current
            .and_then(|id| self.tasks.get(id.0))
            .filter(|t| t.state == TaskState::Running || t.holds_cpu)
            .map(|t| t.priority())
    }
}

/// True if `a` should run instead of `b`.
fn outranks(a: &TaskControlBlock<'_>, b: &TaskControlBlock<'_>) -> bool {
    if a.priority() != b.priority() {
        return a.priority() > b.priority();
    }
    if a.holds_cpu != b.holds_cpu {
        return a.holds_cpu;
    }
    a.last_dispatch < b.last_dispatch
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Context, Suspend};

    struct Sleeper(Tick);

    impl<'a> Task<'a> for Sleeper {
        fn run(&mut self, cx: &Context) -> Suspend<'a> {
            Suspend::DelayUntil(cx.now() + self.0)
        }
    }

    struct Spinner;

    impl<'a> Task<'a> for Spinner {
        fn run(&mut self, _cx: &Context) -> Suspend<'a> {
            Suspend::Continue
        }
    }

    struct Yielder;

    impl<'a> Task<'a> for Yielder {
        fn run(&mut self, _cx: &Context) -> Suspend<'a> {
            Suspend::Yield
        }
    }

    #[test]
    fn test_create_task_rejects_small_stack() {
        let mut body = Yielder;
        let mut sched = Scheduler::new();
        let desc = TaskDescriptor {
            name: "tiny",
            priority: 1,
            stack_size: MIN_STACK_SIZE - 1,
        };
        assert!(matches!(
            sched.create_task(desc, &mut body),
            Err(KernelError::StackTooSmall { task: "tiny", .. })
        ));
        assert_eq!(sched.task_count(), 0);
    }

    #[test]
    fn test_create_task_exhausts_stack_pool() {
        let mut a = Yielder;
        let mut b = Yielder;
        let mut sched = Scheduler::new();
        let big = TaskDescriptor {
            name: "big",
            priority: 1,
            stack_size: STACK_POOL_BYTES - 100,
        };
        let more = TaskDescriptor {
            name: "more",
            priority: 1,
            stack_size: MIN_STACK_SIZE,
        };
        assert!(sched.create_task(big, &mut a).is_ok());
        assert_eq!(
            sched.create_task(more, &mut b),
            Err(KernelError::StackPoolExhausted {
                task: "more",
                requested: MIN_STACK_SIZE,
                available: 100,
            })
        );
        assert_eq!(sched.task_count(), 1);
    }

    #[test]
    fn test_create_task_table_full() {
        let mut bodies: [Yielder; MAX_TASKS + 1] = core::array::from_fn(|_| Yielder);
        let mut sched = Scheduler::new();
        let mut results = bodies
            .iter_mut()
            .map(|b| sched.create_task(TaskDescriptor::with_priority("t", 1), b))
            .collect::<std::vec::Vec<_>>();
        assert_eq!(results.pop(), Some(Err(KernelError::TaskTableFull)));
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn test_highest_priority_wins() {
        let mut low = Yielder;
        let mut high = Yielder;
        let mut sched = Scheduler::new();
        sched.create_task(TaskDescriptor::with_priority("low", 1), &mut low).unwrap();
        let high_id = sched
            .create_task(TaskDescriptor::with_priority("high", 2), &mut high)
            .unwrap();

        for now in 0..5 {
            assert_eq!(sched.schedule(), Some(high_id));
            sched.dispatch(high_id, now);
        }
    }

    #[test]
    fn test_round_robin_within_priority() {
        let mut a = Yielder;
        let mut b = Yielder;
        let mut c = Yielder;
        let mut sched = Scheduler::new();
        let ids = [
            sched.create_task(TaskDescriptor::with_priority("a", 1), &mut a).unwrap(),
            sched.create_task(TaskDescriptor::with_priority("b", 1), &mut b).unwrap(),
            sched.create_task(TaskDescriptor::with_priority("c", 1), &mut c).unwrap(),
        ];

        let mut order = std::vec::Vec::new();
        for now in 0..6 {
            let id = sched.schedule().unwrap();
            order.push(id);
            sched.dispatch(id, now);
        }
        assert_eq!(order, [ids[0], ids[1], ids[2], ids[0], ids[1], ids[2]]);
    }

    #[test]
    fn test_continue_keeps_cpu_until_higher_priority_is_due() {
        let mut spin = Spinner;
        let mut peer = Yielder;
        let mut sys = Sleeper(10);
        let mut sched = Scheduler::new();
        let spin_id = sched.create_task(TaskDescriptor::with_priority("spin", 1), &mut spin).unwrap();
        sched.create_task(TaskDescriptor::with_priority("peer", 1), &mut peer).unwrap();
        let sys_id = sched.create_task(TaskDescriptor::with_priority("sys", 2), &mut sys).unwrap();

        // sys runs first, then sleeps until tick 10
        sched.tick(0);
        assert_eq!(sched.schedule(), Some(sys_id));
        sched.dispatch(sys_id, 0);

        sched.tick(0);
        assert_eq!(sched.schedule(), Some(spin_id));
        sched.dispatch(spin_id, 0);

        // spinner never yields: the peer starves until sys preempts
        for now in 1..10 {
            sched.tick(now);
            assert_eq!(sched.schedule(), Some(spin_id));
            sched.dispatch(spin_id, now);
        }
        assert_eq!(sched.tick(10), 1);
        assert_eq!(sched.schedule(), Some(sys_id));
        sched.dispatch(sys_id, 10);

        // after the preemption the spinner resumes
        sched.tick(10);
        assert_eq!(sched.schedule(), Some(spin_id));
    }

    #[test]
    fn test_next_wake_is_earliest_sleeper() {
        let mut a = Sleeper(30);
        let mut b = Sleeper(20);
        let mut sched = Scheduler::new();
        let a_id = sched.create_task(TaskDescriptor::with_priority("a", 1), &mut a).unwrap();
        let b_id = sched.create_task(TaskDescriptor::with_priority("b", 1), &mut b).unwrap();
        sched.dispatch(a_id, 0);
        sched.dispatch(b_id, 0);

        assert_eq!(sched.schedule(), None);
        assert_eq!(sched.next_wake(), Some(20));
    }
}
