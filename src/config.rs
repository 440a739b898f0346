//! # PollOS Configuration
//!
//! Compile-time constants governing the kernel, the stack budget pool and
//! the standard firmware task layout. All limits are fixed at compile
//! time; nothing is allocated dynamically.

use core::num::NonZeroU32;

/// Maximum number of tasks the task table can hold.
pub const MAX_TASKS: usize = 8;

/// SysTick frequency in Hz. One tick is one millisecond, so task periods
/// below are expressed in both ticks and milliseconds.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (PIC32/STM32 class part at 80 MHz).
pub const SYSTEM_CLOCK_HZ: u32 = 80_000_000;

/// Smallest stack budget, in bytes, the kernel accepts for a task.
pub const MIN_STACK_SIZE: usize = 256;

/// Default stack budget for tasks that only drive a polled state machine.
pub const MINIMAL_STACK_SIZE: usize = 512;

/// Stack budget for the wireless link task (protocol stack is deep).
pub const LINK_STACK_SIZE: usize = 1024;

/// Total bytes available for task stack reservations. Task creation fails
/// once the sum of budgets would exceed this pool.
pub const STACK_POOL_BYTES: usize = 4096;

// ---------------------------------------------------------------------------
// Standard task layout
// ---------------------------------------------------------------------------

/// Device configuration / DMA maintenance period in ticks.
pub const SYSTEM_PERIOD_TICKS: u32 = 100;

/// Shared timer service period in ticks.
pub const TIMER_PERIOD_TICKS: u32 = 1000;

/// Indicator pattern period in ticks.
pub const INDICATOR_PERIOD_TICKS: u32 = 100;

/// Motion sampler period in ticks.
pub const MOTION_PERIOD_TICKS: u32 = 50;

/// Serial shell period in ticks. Bounds the echo throughput to one byte
/// per period.
pub const SHELL_PERIOD_TICKS: u32 = 1000;

/// The wireless link runs as a tight loop. `None` never yields to its
/// application-tier peers, which starves them while the link is busy.
/// `Some(n)` yields after every `n` iterations.
pub const LINK_YIELD_EVERY: Option<NonZeroU32> = NonZeroU32::new(16);

/// USART instance used by the command shell.
pub const SHELL_USART_INDEX: usize = 1;
