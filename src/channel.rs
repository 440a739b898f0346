//! # Bounded Data Channel
//!
//! Fixed-capacity queue for handing samples from one producer task to its
//! consumers. Storage is a `heapless::Deque` behind a critical section, so
//! a channel can live in a `static` and be shared by reference.
//!
//! The non-blocking calls (`try_write`, `try_read`) never suspend. The
//! blocking variants express the wait as a [`Suspend::Wait`] that the
//! calling task returns to the kernel; the kernel re-activates it once the
//! channel becomes ready (or the read deadline passes) and the task calls
//! again.
//!
//! A blocking read keeps its deadline in a caller-owned [`ReadWait`]. The
//! deadline is fixed when the wait starts, so a reader that keeps losing
//! the race for new values to other consumers still times out on time.

use core::cell::RefCell;
use core::fmt;

use heapless::Deque;

use crate::sync::{self, Mutex};
use crate::task::{Context, Interest, Suspend, Tick, Waitable};

/// What a write does when the channel is saturated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OverflowPolicy {
    /// Refuse the write; the caller keeps the value.
    Reject,
    /// Drop the oldest unread value to make room.
    Overwrite,
}

/// A non-blocking write found the channel full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryWriteError<T> {
    Full(T),
}

/// A non-blocking read found nothing unread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TryReadError {
    Empty,
}

impl<T> fmt::Display for TryWriteError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryWriteError::Full(_) => write!(f, "channel full"),
        }
    }
}

impl fmt::Display for TryReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryReadError::Empty => write!(f, "channel empty"),
        }
    }
}

/// Result of a blocking read.
pub enum Blocking<'a, T> {
    /// A value was read.
    Ready(T),
    /// Nothing yet: return this suspension from the task and call again
    /// on the next activation.
    Pending(Suspend<'a>),
    /// The deadline passed with the channel still empty.
    TimedOut,
}

/// A blocking write could not complete yet. Return `suspend` from the
/// task and retry with `value` on the next activation.
pub struct PendingWrite<'a, T> {
    pub value: T,
    pub suspend: Suspend<'a>,
}

/// Deadline state of one blocking read, owned by the reading task.
///
/// Armed on the first empty read and cleared when the read completes or
/// times out. Use one per channel a task reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReadWait {
    timeout: u32,
    deadline: Option<Tick>,
}

impl ReadWait {
    /// Wait at most `timeout` ticks for a value.
    pub const fn new(timeout: u32) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    pub const fn timeout(&self) -> u32 {
        self.timeout
    }

    /// Absolute deadline of the wait in progress, if any.
    pub const fn deadline(&self) -> Option<Tick> {
        self.deadline
    }
}

struct Inner<T, const N: usize> {
    queue: Deque<T, N>,
    overwritten: u32,
}

/// Bounded channel of capacity `N`.
pub struct SampleChannel<T, const N: usize> {
    name: &'static str,
    policy: OverflowPolicy,
    inner: Mutex<RefCell<Inner<T, N>>>,
}

impl<T, const N: usize> SampleChannel<T, N> {
    pub const fn new(name: &'static str, policy: OverflowPolicy) -> Self {
        Self {
            name,
            policy,
            inner: Mutex::new(RefCell::new(Inner {
                queue: Deque::new(),
                overwritten: 0,
            })),
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        sync::critical_section(|cs| self.inner.borrow_ref(cs).queue.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= N
    }

    /// Unread values dropped by `Overwrite` writes since creation.
    pub fn overwritten(&self) -> u32 {
        sync::critical_section(|cs| self.inner.borrow_ref(cs).overwritten)
    }

    /// Write without blocking.
    ///
    /// A `Reject` channel returns `Full(value)` when saturated; an
    /// `Overwrite` channel always succeeds.
    pub fn try_write(&self, value: T) -> Result<(), TryWriteError<T>> {
        sync::critical_section(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            if inner.queue.is_full() {
                match self.policy {
                    OverflowPolicy::Reject => return Err(TryWriteError::Full(value)),
                    OverflowPolicy::Overwrite => {
                        inner.queue.pop_front();
                        inner.overwritten = inner.overwritten.wrapping_add(1);
                    }
                }
            }
            inner
                .queue
                .push_back(value)
                .map_err(TryWriteError::Full)
        })
    }

    /// Read the oldest unread value without blocking.
    pub fn try_read(&self) -> Result<T, TryReadError> {
        sync::critical_section(|cs| {
            self.inner
                .borrow_ref_mut(cs)
                .queue
                .pop_front()
                .ok_or(TryReadError::Empty)
        })
    }

    /// Write, suspending the caller while the channel is full.
    pub fn blocking_write<'a>(&'a self, value: T) -> Result<(), PendingWrite<'a, T>> {
        self.try_write(value).map_err(|TryWriteError::Full(value)| PendingWrite {
            value,
            suspend: Suspend::Wait {
                on: self,
                interest: Interest::Writable,
                deadline: None,
            },
        })
    }

    /// Read, suspending the caller for at most `wait.timeout()` ticks
    /// counted from the first call of this wait.
    ///
    /// Call on every activation until it returns `Ready` or `TimedOut`.
    pub fn blocking_read<'a>(&'a self, cx: &Context, wait: &mut ReadWait) -> Blocking<'a, T> {
        match self.try_read() {
            Ok(value) => {
                wait.deadline = None;
                Blocking::Ready(value)
            }
            Err(TryReadError::Empty) => {
                let deadline = *wait
                    .deadline
                    .get_or_insert(cx.now() + u64::from(wait.timeout));
                if cx.now() >= deadline {
                    wait.deadline = None;
                    Blocking::TimedOut
                } else {
                    Blocking::Pending(Suspend::Wait {
                        on: self,
                        interest: Interest::Readable,
                        deadline: Some(deadline),
                    })
                }
            }
        }
    }
}

impl<T, const N: usize> Waitable for SampleChannel<T, N> {
    fn is_ready(&self, interest: Interest) -> bool {
        match interest {
            Interest::Readable => !self.is_empty(),
            Interest::Writable => !self.is_full(),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
