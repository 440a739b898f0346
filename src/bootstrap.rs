//! # Bootstrap
//!
//! Provisions every task and the sensor channels, then hands the CPU to
//! the dispatcher for good. Startup is all-or-nothing: if any task cannot
//! be created the dispatcher is never started, a fatal diagnostic is
//! reported and the CPU parks in idle.

use log::{info, warn};
use static_cell::StaticCell;

use crate::arch::Port;
use crate::diag::{Diagnostic, DiagnosticSink};
use crate::error::KernelError;
use crate::kernel::Kernel;
use crate::motion::SensorChannels;
use crate::task::{Task, TaskDescriptor};

/// A task to create at startup: its descriptor and its body.
pub struct TaskSpec<'a> {
    pub descriptor: TaskDescriptor,
    pub body: &'a mut dyn Task<'a>,
}

impl<'a> TaskSpec<'a> {
    pub fn new(descriptor: TaskDescriptor, body: &'a mut dyn Task<'a>) -> Self {
        Self { descriptor, body }
    }
}

/// Create every task in `specs`, in order.
///
/// Stops at the first failure. The caller must not start the kernel after
/// an error.
pub fn bootstrap<'a, P: Port>(
    kernel: &mut Kernel<'a, P>,
    specs: impl IntoIterator<Item = TaskSpec<'a>>,
) -> Result<(), KernelError> {
    for spec in specs {
        kernel.create_task(spec.descriptor, spec.body)?;
    }
    info!("bootstrap complete: {} tasks", kernel.scheduler().task_count());
    Ok(())
}

/// Bootstrap, then start the dispatcher. **Does not return.**
///
/// On failure the error is reported through `diagnostics` and the CPU
/// idles forever without dispatching any task.
pub fn launch<'a, P: Port>(
    mut kernel: Kernel<'a, P>,
    specs: impl IntoIterator<Item = TaskSpec<'a>>,
    diagnostics: &dyn DiagnosticSink,
) -> ! {
    match bootstrap(&mut kernel, specs) {
        Ok(()) => kernel.start(),
        Err(err) => {
            diagnostics.report(Diagnostic::BootFailed(err));
            kernel.halt()
        }
    }
}

/// Create the sensor channel set in `cell`, before any task exists.
///
/// Construction is static and cannot fail; the cell only guards against a
/// second channel set being handed out. Calling this twice is fatal.
pub fn create_channels(
    cell: &'static StaticCell<SensorChannels>,
) -> Result<&'static SensorChannels, KernelError> {
    match cell.try_init(SensorChannels::new()) {
        Some(channels) => Ok(channels),
        None => {
            warn!("sensor channels already created");
            Err(KernelError::ChannelUnavailable)
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
