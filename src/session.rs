//! # Event-Driven Serial Session
//!
//! Drives one serial client for the command shell. The driver is non-
//! blocking: reads and writes are submitted as requests, and completions
//! arrive later through a [`CompletionHandler`], usually from the USART
//! interrupt. The session never waits on the driver; it only looks at
//! what has completed since the previous period.
//!
//! ## Per-period cycle
//!
//! 1. If no read is in flight, submit a one-byte read
//! 2. Collect a completed read, if any
//! 3. If it produced a non-zero byte, submit a one-byte write echoing it
//!
//! At most one byte is echoed per period. A submission the driver refuses
//! as busy (`nb::Error::WouldBlock`) is retried on the next period; a
//! pending echo byte is kept until its write is accepted, and no new read
//! is submitted while it waits.
//!
//! A client that fails to open, or opens but is not ready, is reported once
//! and the session degrades to a no-op.

use core::cell::Cell;
use core::fmt;

use log::{debug, info, trace};

use crate::diag::{Diagnostic, DiagnosticSink};
use crate::step::Step;
use crate::sync::{self, Mutex};

// ---------------------------------------------------------------------------
// Driver interface
// ---------------------------------------------------------------------------

/// Opaque client handle issued by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClientHandle(pub u32);

/// Identifies one submitted buffer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RequestToken(pub u32);

/// Access requested when opening a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IoIntent {
    pub read: bool,
    pub write: bool,
    pub blocking: bool,
}

impl IoIntent {
    pub const READ_WRITE_NONBLOCKING: IoIntent = IoIntent {
        read: true,
        write: true,
        blocking: false,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClientStatus {
    Ready,
    NotReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpenError {
    /// The driver handed back an invalid handle.
    InvalidHandle,
    /// The driver instance is not initialized.
    Unavailable,
}

/// Hard submission failure. Busy is reported as `nb::Error::WouldBlock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SubmitError {
    InvalidHandle,
    InvalidBuffer,
}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenError::InvalidHandle => write!(f, "invalid handle"),
            OpenError::Unavailable => write!(f, "driver unavailable"),
        }
    }
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::InvalidHandle => write!(f, "invalid handle"),
            SubmitError::InvalidBuffer => write!(f, "invalid buffer"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventKind {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventOutcome {
    Complete,
    Error,
    Aborted,
}

/// Completion notice for one buffer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BufferEvent {
    pub token: RequestToken,
    pub kind: EventKind,
    pub outcome: EventOutcome,
    /// First received byte, for completed reads.
    pub data: Option<u8>,
}

/// Notification sink the driver calls when a request completes.
pub trait CompletionHandler {
    fn on_event(&self, event: &BufferEvent);
}

/// Non-blocking serial driver, as exposed by the vendor USART layer.
pub trait SerialDriver<'a> {
    fn open(&mut self, index: usize, intent: IoIntent) -> Result<ClientHandle, OpenError>;

    fn client_status(&self, handle: ClientHandle) -> ClientStatus;

    fn set_completion_handler(&mut self, handle: ClientHandle, handler: &'a dyn CompletionHandler);

    fn submit_read(&mut self, handle: ClientHandle, len: usize) -> nb::Result<RequestToken, SubmitError>;

    fn submit_write(&mut self, handle: ClientHandle, data: &[u8]) -> nb::Result<RequestToken, SubmitError>;
}

// ---------------------------------------------------------------------------
// Completion sink
// ---------------------------------------------------------------------------

/// A read request that has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReadCompletion {
    pub token: RequestToken,
    /// `None` if the request failed or was aborted.
    pub byte: Option<u8>,
}

#[derive(Debug, Clone, Copy, Default)]
struct EventLog {
    read: Option<ReadCompletion>,
    write: Option<RequestToken>,
    completed: u32,
    failed: u32,
}

/// Completion handler registered by a [`SerialSession`].
///
/// Lives outside the session so the driver can hold a shared reference to
/// it while the session itself is owned by its task. Every event is also
/// passed to the optional follow-up hook.
pub struct SessionEvents {
    log: Mutex<Cell<EventLog>>,
    follow_up: Option<fn(&BufferEvent)>,
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionEvents {
    pub const fn new() -> Self {
        Self {
            log: Mutex::new(Cell::new(EventLog {
                read: None,
                write: None,
                completed: 0,
                failed: 0,
            })),
            follow_up: None,
        }
    }

    pub const fn with_follow_up(hook: fn(&BufferEvent)) -> Self {
        let mut events = Self::new();
        events.follow_up = Some(hook);
        events
    }

    /// Take the most recent read completion.
    pub fn take_read(&self) -> Option<ReadCompletion> {
        self.update(|log| log.read.take())
    }

    /// Take the most recent completed write.
    pub fn take_write(&self) -> Option<RequestToken> {
        self.update(|log| log.write.take())
    }

    /// Requests that completed successfully.
    pub fn completed(&self) -> u32 {
        sync::critical_section(|cs| self.log.borrow(cs).get().completed)
    }

    /// Requests that ended in error or were aborted.
    pub fn failed(&self) -> u32 {
        sync::critical_section(|cs| self.log.borrow(cs).get().failed)
    }

    fn update<R>(&self, f: impl FnOnce(&mut EventLog) -> R) -> R {
        sync::critical_section(|cs| {
            let cell = self.log.borrow(cs);
            let mut log = cell.get();
            let result = f(&mut log);
            cell.set(log);
            result
        })
    }
}

impl CompletionHandler for SessionEvents {
    fn on_event(&self, event: &BufferEvent) {
        self.update(|log| {
            match event.outcome {
                EventOutcome::Complete => log.completed = log.completed.wrapping_add(1),
                EventOutcome::Error | EventOutcome::Aborted => log.failed = log.failed.wrapping_add(1),
            }
            match event.kind {
                EventKind::Read => {
                    let byte = match event.outcome {
                        EventOutcome::Complete => event.data,
                        EventOutcome::Error | EventOutcome::Aborted => None,
                    };
                    log.read = Some(ReadCompletion {
                        token: event.token,
                        byte,
                    });
                }
                EventKind::Write => log.write = Some(event.token),
            }
        });
        if let Some(hook) = self.follow_up {
            hook(event);
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    /// Not opened yet; the first poll opens the client.
    Closed,
    Open(ClientHandle),
    /// Open failed; every poll is a no-op.
    Degraded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SessionStats {
    pub reads_submitted: u32,
    pub writes_submitted: u32,
    /// Submissions the driver refused as busy.
    pub busy: u32,
    /// Submissions the driver rejected outright.
    pub rejected: u32,
}

pub struct SerialSession<'a, D> {
    driver: D,
    index: usize,
    state: SessionState,
    events: &'a SessionEvents,
    diagnostics: &'a dyn DiagnosticSink,
    pending_read: Option<RequestToken>,
    pending_write: Option<RequestToken>,
    echo: Option<u8>,
    stats: SessionStats,
}

impl<'a, D: SerialDriver<'a>> SerialSession<'a, D> {
    pub fn new(
        driver: D,
        index: usize,
        events: &'a SessionEvents,
        diagnostics: &'a dyn DiagnosticSink,
    ) -> Self {
        Self {
            driver,
            index,
            state: SessionState::Closed,
            events,
            diagnostics,
            pending_read: None,
            pending_write: None,
            echo: None,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn pending_read(&self) -> Option<RequestToken> {
        self.pending_read
    }

    pub fn pending_write(&self) -> Option<RequestToken> {
        self.pending_write
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Open the client and register the completion sink.
    fn open(&mut self) {
        self.state = match self.driver.open(self.index, IoIntent::READ_WRITE_NONBLOCKING) {
            Ok(handle) => match self.driver.client_status(handle) {
                ClientStatus::Ready => {
                    self.driver.set_completion_handler(handle, self.events);
                    info!("USART {} client open", self.index);
                    SessionState::Open(handle)
                }
                ClientStatus::NotReady => {
                    self.diagnostics
                        .report(Diagnostic::SerialNotReady { index: self.index });
                    SessionState::Degraded
                }
            },
            Err(err) => {
                debug!("USART {} open: {}", self.index, err);
                self.diagnostics
                    .report(Diagnostic::SerialOpenFailed { index: self.index });
                SessionState::Degraded
            }
        };
    }

    /// One period of the echo protocol.
    pub fn poll(&mut self) {
        if self.state == SessionState::Closed {
            self.open();
        }
        let SessionState::Open(handle) = self.state else {
            return;
        };

        // A refused echo is retried before anything new is read.
        if self.pending_read.is_none() && self.echo.is_none() {
            match self.driver.submit_read(handle, 1) {
                Ok(token) => {
                    self.pending_read = Some(token);
                    self.stats.reads_submitted += 1;
                }
                Err(err) => self.note_refusal(err),
            }
        }

        if let Some(done) = self.events.take_read() {
            if self.pending_read == Some(done.token) {
                self.pending_read = None;
            }
            match done.byte {
                Some(0) | None => {}
                Some(byte) => self.echo = Some(byte),
            }
        }

        if let Some(token) = self.events.take_write() {
            if self.pending_write == Some(token) {
                self.pending_write = None;
            }
        }

        if let Some(byte) = self.echo {
            match self.driver.submit_write(handle, &[byte]) {
                Ok(token) => {
                    trace!("echo {:#04x}", byte);
                    self.echo = None;
                    self.pending_write = Some(token);
                    self.stats.writes_submitted += 1;
                }
                Err(nb::Error::WouldBlock) => self.stats.busy += 1,
                Err(nb::Error::Other(err)) => {
                    debug!("USART {} write: {}", self.index, err);
                    self.echo = None;
                    self.stats.rejected += 1;
                }
            }
        }
    }

    fn note_refusal(&mut self, err: nb::Error<SubmitError>) {
        match err {
            nb::Error::WouldBlock => self.stats.busy += 1,
            nb::Error::Other(err) => {
                debug!("USART {} read: {}", self.index, err);
                self.stats.rejected += 1;
            }
        }
    }
}

impl<'a, D: SerialDriver<'a>> Step for SerialSession<'a, D> {
    fn step(&mut self) {
        self.poll();
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::vec::Vec;

    use crate::diag::tests::Recorder;

    /// Driver double. Reads complete as soon as a byte is available;
    /// writes complete immediately.
    pub(crate) struct MockDriver<'a> {
        pub open_result: Result<ClientHandle, OpenError>,
        pub status: ClientStatus,
        pub rx: VecDeque<u8>,
        pub busy_reads: u32,
        pub busy_writes: u32,
        pub reads: u32,
        pub written: Vec<u8>,
        handler: Option<&'a dyn CompletionHandler>,
        outstanding_read: Option<RequestToken>,
        next_token: u32,
    }

    impl<'a> MockDriver<'a> {
        pub fn ready() -> Self {
            Self {
                open_result: Ok(ClientHandle(1)),
                status: ClientStatus::Ready,
                rx: VecDeque::new(),
                busy_reads: 0,
                busy_writes: 0,
                reads: 0,
                written: Vec::new(),
                handler: None,
                outstanding_read: None,
                next_token: 0,
            }
        }

        /// A byte arrives on the wire.
        pub fn receive(&mut self, byte: u8) {
            self.rx.push_back(byte);
            self.complete_read();
        }

        /// The outstanding read ends without data.
        pub fn fail_read(&mut self, outcome: EventOutcome) {
            if let (Some(token), Some(handler)) = (self.outstanding_read.take(), self.handler) {
                handler.on_event(&BufferEvent {
                    token,
                    kind: EventKind::Read,
                    outcome,
                    data: None,
                });
            }
        }

        fn token(&mut self) -> RequestToken {
            self.next_token += 1;
            RequestToken(self.next_token)
        }

        fn complete_read(&mut self) {
            let (Some(token), Some(handler)) = (self.outstanding_read, self.handler) else {
                return;
            };
            if let Some(byte) = self.rx.pop_front() {
                self.outstanding_read = None;
                handler.on_event(&BufferEvent {
                    token,
                    kind: EventKind::Read,
                    outcome: EventOutcome::Complete,
                    data: Some(byte),
                });
            }
        }
    }

    impl<'a> SerialDriver<'a> for MockDriver<'a> {
        fn open(&mut self, _index: usize, intent: IoIntent) -> Result<ClientHandle, OpenError> {
            assert!(!intent.blocking);
            self.open_result
        }

        fn client_status(&self, _handle: ClientHandle) -> ClientStatus {
            self.status
        }

        fn set_completion_handler(&mut self, _handle: ClientHandle, handler: &'a dyn CompletionHandler) {
            self.handler = Some(handler);
        }

        fn submit_read(&mut self, _handle: ClientHandle, len: usize) -> nb::Result<RequestToken, SubmitError> {
            assert_eq!(len, 1);
            if self.busy_reads > 0 {
                self.busy_reads -= 1;
                return Err(nb::Error::WouldBlock);
            }
            self.reads += 1;
            let token = self.token();
            self.outstanding_read = Some(token);
            self.complete_read();
            Ok(token)
        }

        fn submit_write(&mut self, _handle: ClientHandle, data: &[u8]) -> nb::Result<RequestToken, SubmitError> {
            if self.busy_writes > 0 {
                self.busy_writes -= 1;
                return Err(nb::Error::WouldBlock);
            }
            self.written.extend_from_slice(data);
            let token = self.token();
            if let Some(handler) = self.handler {
                handler.on_event(&BufferEvent {
                    token,
                    kind: EventKind::Write,
                    outcome: EventOutcome::Complete,
                    data: None,
                });
            }
            Ok(token)
        }
    }

    #[test]
    fn test_echoes_nonzero_byte() {
        let events = SessionEvents::new();
        let diag = Recorder::default();
        let mut driver = MockDriver::ready();
        driver.rx.push_back(b'k');
        let mut session = SerialSession::new(driver, 1, &events, &diag);

        session.poll();

        assert!(matches!(session.state(), SessionState::Open(_)));
        assert_eq!(session.driver().written, b"k");
        assert_eq!(session.stats().reads_submitted, 1);
        assert_eq!(session.stats().writes_submitted, 1);
        assert!(diag.0.borrow().is_empty());
    }

    #[test]
    fn test_zero_byte_is_not_echoed() {
        let events = SessionEvents::new();
        let diag = Recorder::default();
        let mut driver = MockDriver::ready();
        driver.rx.push_back(0);
        let mut session = SerialSession::new(driver, 1, &events, &diag);

        session.poll();

        assert_eq!(session.stats().reads_submitted, 1);
        assert_eq!(session.stats().writes_submitted, 0);
        assert!(session.driver().written.is_empty());
    }

    #[test]
    fn test_one_read_in_flight() {
        let events = SessionEvents::new();
        let diag = Recorder::default();
        let mut session = SerialSession::new(MockDriver::ready(), 1, &events, &diag);

        session.poll();
        session.poll();
        session.poll();
        assert_eq!(session.driver().reads, 1);
        assert!(session.pending_read().is_some());

        // byte arrives between periods, echoed on the next one
        session.driver_mut().receive(b'x');
        assert!(session.driver().written.is_empty());
        session.poll();
        assert_eq!(session.driver().written, b"x");
        assert_eq!(session.driver().reads, 1);

        // the next read goes out on the following period
        session.poll();
        assert_eq!(session.driver().reads, 2);
    }

    #[test]
    fn test_at_most_one_byte_per_period() {
        let events = SessionEvents::new();
        let diag = Recorder::default();
        let mut driver = MockDriver::ready();
        driver.rx.extend(b"abc");
        let mut session = SerialSession::new(driver, 1, &events, &diag);

        session.poll();
        assert_eq!(session.driver().written, b"a");
        session.poll();
        assert_eq!(session.driver().written, b"ab");
        session.poll();
        assert_eq!(session.driver().written, b"abc");
    }

    #[test]
    fn test_busy_write_keeps_byte_for_next_period() {
        let events = SessionEvents::new();
        let diag = Recorder::default();
        let mut driver = MockDriver::ready();
        driver.rx.push_back(b'z');
        driver.busy_writes = 1;
        let mut session = SerialSession::new(driver, 1, &events, &diag);

        session.poll();
        assert!(session.driver().written.is_empty());
        assert_eq!(session.stats().busy, 1);

        session.poll();
        assert_eq!(session.driver().written, b"z");
    }

    #[test]
    fn test_busy_write_does_not_lose_later_bytes() {
        let events = SessionEvents::new();
        let diag = Recorder::default();
        let mut driver = MockDriver::ready();
        driver.rx.extend(b"ab");
        driver.busy_writes = 1;
        let mut session = SerialSession::new(driver, 1, &events, &diag);

        for _ in 0..4 {
            session.poll();
        }

        assert_eq!(session.driver().written, b"ab");
        assert_eq!(session.stats().busy, 1);
        assert_eq!(session.stats().writes_submitted, 2);
    }

    #[test]
    fn test_failed_read_is_counted_and_not_echoed() {
        let events = SessionEvents::new();
        let diag = Recorder::default();
        let mut session = SerialSession::new(MockDriver::ready(), 1, &events, &diag);

        session.poll();
        session.driver_mut().fail_read(EventOutcome::Error);
        session.poll();
        assert_eq!(events.failed(), 1);
        assert!(session.pending_read().is_none());
        assert!(session.driver().written.is_empty());

        // the next period reads again
        session.poll();
        assert_eq!(session.driver().reads, 2);
        session.driver_mut().fail_read(EventOutcome::Aborted);
        assert_eq!(events.failed(), 2);
        assert_eq!(events.completed(), 0);
    }

    #[test]
    fn test_events_drop_data_of_failed_reads() {
        let events = SessionEvents::new();
        events.on_event(&BufferEvent {
            token: RequestToken(9),
            kind: EventKind::Read,
            outcome: EventOutcome::Aborted,
            data: Some(b'x'),
        });

        assert_eq!(
            events.take_read(),
            Some(ReadCompletion {
                token: RequestToken(9),
                byte: None
            })
        );
        assert_eq!(events.take_read(), None);
        assert_eq!(events.failed(), 1);
    }

    #[test]
    fn test_busy_read_retried_next_period() {
        let events = SessionEvents::new();
        let diag = Recorder::default();
        let mut driver = MockDriver::ready();
        driver.busy_reads = 2;
        let mut session = SerialSession::new(driver, 1, &events, &diag);

        session.poll();
        session.poll();
        assert_eq!(session.driver().reads, 0);
        session.poll();
        assert_eq!(session.driver().reads, 1);
        assert_eq!(session.stats().busy, 2);
    }

    #[test]
    fn test_open_failure_degrades_with_one_report() {
        let events = SessionEvents::new();
        let diag = Recorder::default();
        let mut driver = MockDriver::ready();
        driver.open_result = Err(OpenError::InvalidHandle);
        driver.rx.push_back(b'q');
        let mut session = SerialSession::new(driver, 1, &events, &diag);

        for _ in 0..5 {
            session.poll();
        }

        assert_eq!(session.state(), SessionState::Degraded);
        assert_eq!(session.driver().reads, 0);
        assert!(session.driver().written.is_empty());
        assert_eq!(session.stats(), SessionStats::default());
        assert_eq!(*diag.0.borrow(), [Diagnostic::SerialOpenFailed { index: 1 }]);
    }

    #[test]
    fn test_not_ready_degrades() {
        let events = SessionEvents::new();
        let diag = Recorder::default();
        let mut driver = MockDriver::ready();
        driver.status = ClientStatus::NotReady;
        let mut session = SerialSession::new(driver, 1, &events, &diag);

        session.poll();
        session.poll();

        assert_eq!(session.state(), SessionState::Degraded);
        assert_eq!(session.driver().reads, 0);
        assert_eq!(*diag.0.borrow(), [Diagnostic::SerialNotReady { index: 1 }]);
    }

    #[test]
    fn test_follow_up_hook_sees_every_event() {
        use std::sync::atomic::{AtomicU32, Ordering};
        static SEEN: AtomicU32 = AtomicU32::new(0);
        fn hook(_event: &BufferEvent) {
            SEEN.fetch_add(1, Ordering::Relaxed);
        }

        let events = SessionEvents::with_follow_up(hook);
        let diag = Recorder::default();
        let mut driver = MockDriver::ready();
        driver.rx.push_back(b'!');
        let mut session = SerialSession::new(driver, 1, &events, &diag);

        session.poll();

        // read completion + write completion
        assert_eq!(SEEN.load(Ordering::Relaxed), 2);
        assert_eq!(events.completed(), 2);
        assert_eq!(events.failed(), 0);
    }
}
