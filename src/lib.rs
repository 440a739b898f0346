//! # PollOS
//!
//! A small priority task-dispatch core for firmware built out of polled
//! subsystem state machines (device configuration, DMA, timers, a wireless
//! link stack, an indicator light, a motion sensor and a serial shell).
//!
//! ## Overview
//!
//! Every subsystem exposes a non-blocking "advance one iteration" step.
//! PollOS wraps each step in a task with a fixed priority tier and an
//! activation pattern, and dispatches the tasks:
//!
//! - **Priority first**: a ready `System` task always runs before any
//!   `Application` task
//! - **Round-robin within a tier**: equal-priority tasks take turns at
//!   their suspension points
//! - **Preemption at step boundaries**: a higher-priority task that becomes
//!   ready takes the CPU as soon as the running activation returns
//!
//! Tasks exchange sensor data through bounded channels and talk to the
//! serial port through a non-blocking, completion-driven session.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │  Subsystem steps (step.rs)  ·  Standard layout          │
//! │  MotionSampler · SerialSession · FnMut() closures       │
//! ├────────────────────────────────────────────────────────┤
//! │  PeriodicTask (periodic.rs)   Bootstrap (bootstrap.rs)  │
//! │  ─ Every(ticks)               ─ bootstrap() · launch()  │
//! │  ─ TightLoop { yield_every }  ─ create_channels()       │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Kernel      │  Channels          │  Serial session   │
//! │  kernel.rs   │  channel.rs        │  session.rs       │
//! │  ─ run_once()│  ─ try_write()     │  ─ poll()         │
//! │  ─ start()   │  ─ blocking_read() │  ─ SessionEvents  │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │  Scheduler (scheduler.rs) · Task model (task.rs)        │
//! │  TCB · Suspend · Waitable · stack budgets               │
//! ├────────────────────────────────────────────────────────┤
//! │  Port (arch/)                                           │
//! │  SysTickPort (Cortex-M4)  ·  VirtualPort (host)         │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: all state is statically allocated
//! - **Fixed-size task table**: `heapless::Vec<TaskControlBlock, MAX_TASKS>`
//! - **Stack budgets**: reserved per task from `STACK_POOL_BYTES`
//! - **Critical sections**: `critical-section` guards every shared cell

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod bootstrap;
pub mod channel;
pub mod config;
pub mod diag;
pub mod error;
pub mod kernel;
pub mod layout;
pub mod motion;
pub mod periodic;
pub mod scheduler;
pub mod session;
pub mod step;
pub mod sync;
pub mod task;
