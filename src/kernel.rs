//! # Kernel
//!
//! Top-level kernel object and public API for PollOS.
//!
//! The kernel couples the scheduler with a [`Port`] (tick source + idle).
//! Nothing is global: the firmware constructs one kernel, hands it every
//! task body by reference and then gives up control for good.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► Kernel::new(port)       ← Tick source configured
//!         ├─► Kernel::create_task()   ← Register tasks (×N)
//!         └─► Kernel::start()         ← Dispatch forever (no return)
//!               loop:
//!                 ├─► Scheduler::tick()     release due tasks
//!                 ├─► Scheduler::schedule() pick highest priority
//!                 └─► dispatch, or Port::idle() when nothing is ready
//! ```

use log::{info, trace};

use crate::arch::Port;
use crate::error::KernelError;
use crate::scheduler::Scheduler;
use crate::task::{Task, TaskDescriptor, TaskId, Tick};

pub struct Kernel<'a, P: Port> {
    scheduler: Scheduler<'a>,
    port: P,
}

impl<'a, P: Port> Kernel<'a, P> {
    pub fn new(port: P) -> Self {
        Self {
            scheduler: Scheduler::new(),
            port,
        }
    }

    /// Create a new task and register it with the scheduler.
    ///
    /// # Returns
    /// - `Ok(task_id)`: the task's index in the task table.
    /// - `Err(KernelError)`: the table is full or the stack budget cannot
    ///   be reserved. Startup must not continue.
    ///
    /// # Example
    /// ```ignore
    /// let id = kernel.create_task(
    ///     TaskDescriptor::new("indicator", Tier::Application, MINIMAL_STACK_SIZE),
    ///     &mut indicator,
    /// )?;
    /// ```
    pub fn create_task(
        &mut self,
        descriptor: TaskDescriptor,
        body: &'a mut dyn Task<'a>,
    ) -> Result<TaskId, KernelError> {
        self.scheduler.create_task(descriptor, body)
    }

    /// Make one scheduling decision: release due tasks, then either
    /// activate the best runnable task or idle until the next wake-up.
    ///
    /// Returns the task that was activated, if any.
    pub fn run_once(&mut self) -> Option<TaskId> {
        let now = self.port.now();
        self.scheduler.tick(now);

        match self.scheduler.schedule() {
            Some(id) => {
                trace!("dispatch {} at {}", id.index(), now);
                self.scheduler.dispatch(id, now);
                self.port.dispatched();
                Some(id)
            }
            None => {
                self.port.idle(self.scheduler.next_wake());
                None
            }
        }
    }

    /// Dispatch until the port clock reaches `deadline`.
    pub fn run_until(&mut self, deadline: Tick) {
        while self.port.now() < deadline {
            self.run_once();
        }
    }

    /// Start the dispatcher. **Does not return.**
    pub fn start(mut self) -> ! {
        info!(
            "starting dispatcher with {} tasks, {} stack bytes free",
            self.scheduler.task_count(),
            self.scheduler.stack_available()
        );
        loop {
            self.run_once();
        }
    }

    /// Park the CPU forever without dispatching anything.
    pub fn halt(self) -> ! {
        loop {
            self.port.idle(None);
        }
    }

    pub fn scheduler(&self) -> &Scheduler<'a> {
        &self.scheduler
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn now(&self) -> Tick {
        self.port.now()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
