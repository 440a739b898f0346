//! Diagnostic reporting.
//!
//! The device has no interactive user, so only two things are ever
//! surfaced: a bootstrap that could not provision every task, and a serial
//! client that could not be opened. Both go through a [`DiagnosticSink`]
//! handed to whoever can produce them.
//!
//! [`LogSink`] writes to the `log` facade and, with the `defmt` feature,
//! to `defmt` as well. The firmware image enables `defmt` and links
//! `defmt-rtt`, so diagnostics reach an attached debugger over RTT.

use core::fmt;

use log::{error, warn};

use crate::error::KernelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Diagnostic {
    /// Startup aborted; the dispatcher was never started.
    BootFailed(KernelError),
    /// The serial driver returned an invalid handle.
    SerialOpenFailed { index: usize },
    /// The serial client opened but never became ready.
    SerialNotReady { index: usize },
}

impl Diagnostic {
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Diagnostic::BootFailed(_))
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::BootFailed(err) => write!(f, "boot failed: {}", err),
            Diagnostic::SerialOpenFailed { index } => write!(f, "USART {} open failed", index),
            Diagnostic::SerialNotReady { index } => write!(f, "USART {} driver not ready", index),
        }
    }
}

pub trait DiagnosticSink {
    fn report(&self, diagnostic: Diagnostic);
}

/// Writes diagnostics to the `log` facade, and to `defmt` when enabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&self, diagnostic: Diagnostic) {
        if diagnostic.is_fatal() {
            error!("{}", diagnostic);
            #[cfg(feature = "defmt")]
            defmt::error!("{}", diagnostic);
        } else {
            warn!("{}", diagnostic);
            #[cfg(feature = "defmt")]
            defmt::warn!("{}", diagnostic);
        }
    }
}
