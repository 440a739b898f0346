//! # PollOS Firmware
//!
//! Boots the standard task layout on a Cortex-M4 part:
//!
//! | Task | Tier | Period | Step |
//! |------|------|--------|------|
//! | `system-maintenance` | System | 100 ms | device configuration, DMA, timer driver |
//! | `timer-service` | System | 1 s | shared timer service |
//! | `wireless-link` | Application | tight loop | link protocol stack |
//! | `indicator` | Application | 100 ms | LED pattern from the latest sample |
//! | `motion-sampler` | Application | 50 ms | accelerometer, publishes samples |
//! | `shell` | Application | 1 s | USART echo session |
//!
//! The system, timer, link and shell tasks invoke their step as soon as
//! they are first dispatched; the indicator and sampler sleep one period
//! first.
//!
//! The vendor subsystem stacks are linked in through the `board` module
//! below. Until a board is wired up the steps are inert, the accelerometer
//! never completes a conversion and the USART refuses to open, so the shell
//! reports one diagnostic and idles.

#![no_std]
#![no_main]

use cortex_m_rt::{entry, exception};
use defmt_rtt as _;
use panic_halt as _;
use static_cell::StaticCell;

use pollos::arch::cortex_m4::{self, SysTickPort};
use pollos::bootstrap::{self, TaskSpec};
use pollos::config::SHELL_USART_INDEX;
use pollos::diag::{Diagnostic, DiagnosticSink, LogSink};
use pollos::kernel::Kernel;
use pollos::layout::STANDARD_TASKS;
use pollos::motion::{MotionSampler, SensorChannels};
use pollos::session::{SerialSession, SessionEvents};
use pollos::step::Chain;

static CHANNELS: StaticCell<SensorChannels> = StaticCell::new();
static SHELL_EVENTS: SessionEvents = SessionEvents::new();

// ---------------------------------------------------------------------------
// Board hooks
// ---------------------------------------------------------------------------

mod board {
    use pollos::motion::{FilteredSample, MotionSample, SampleSource};
    use pollos::session::{
        ClientHandle, ClientStatus, CompletionHandler, IoIntent, OpenError, RequestToken,
        SerialDriver, SubmitError,
    };

    pub fn device_config_tasks() {}

    pub fn dma_tasks() {}

    pub fn timer_driver_tasks() {}

    pub fn timer_tasks() {}

    pub fn link_tasks() {}

    pub fn indicator_tasks(_latest: Option<FilteredSample>) {}

    pub struct Accelerometer;

    impl SampleSource for Accelerometer {
        fn advance(&mut self) -> Option<MotionSample> {
            None
        }
    }

    pub struct Usart;

    impl SerialDriver<'static> for Usart {
        fn open(&mut self, _index: usize, _intent: IoIntent) -> Result<ClientHandle, OpenError> {
            Err(OpenError::Unavailable)
        }

        fn client_status(&self, _handle: ClientHandle) -> ClientStatus {
            ClientStatus::NotReady
        }

        fn set_completion_handler(
            &mut self,
            _handle: ClientHandle,
            _handler: &'static dyn CompletionHandler,
        ) {
        }

        fn submit_read(
            &mut self,
            _handle: ClientHandle,
            _len: usize,
        ) -> nb::Result<RequestToken, SubmitError> {
            Err(nb::Error::Other(SubmitError::InvalidHandle))
        }

        fn submit_write(
            &mut self,
            _handle: ClientHandle,
            _data: &[u8],
        ) -> nb::Result<RequestToken, SubmitError> {
            Err(nb::Error::Other(SubmitError::InvalidHandle))
        }
    }
}

// ---------------------------------------------------------------------------
// Exceptions
// ---------------------------------------------------------------------------

#[exception]
fn SysTick() {
    cortex_m4::on_systick();
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Firmware entry point. Provisions the channels and tasks, then hands the
/// CPU to the dispatcher. Does not return.
#[entry]
fn main() -> ! {
    let Some(mut cp) = cortex_m::Peripherals::take() else {
        panic!("core peripherals already taken");
    };
    let kernel = Kernel::new(SysTickPort::new(cp.SYST, &mut cp.SCB));

    let channels = match bootstrap::create_channels(&CHANNELS) {
        Ok(channels) => channels,
        Err(err) => {
            LogSink.report(Diagnostic::BootFailed(err));
            kernel.halt()
        }
    };

    let [system, timer, link, indicator, motion, shell] = STANDARD_TASKS;

    let mut system_task = system.periodic(Chain(
        Chain(board::device_config_tasks, board::dma_tasks),
        board::timer_driver_tasks,
    ));
    let mut timer_task = timer.periodic(board::timer_tasks);
    let mut link_task = link.periodic(board::link_tasks);
    let mut indicator_task =
        indicator.periodic(|| board::indicator_tasks(channels.filtered().try_read().ok()));
    let mut motion_task = motion.periodic(MotionSampler::new(board::Accelerometer, channels));
    let mut shell_task = shell.periodic(SerialSession::new(
        board::Usart,
        SHELL_USART_INDEX,
        &SHELL_EVENTS,
        &LogSink,
    ));

    bootstrap::launch(
        kernel,
        [
            TaskSpec::new(system.descriptor, &mut system_task),
            TaskSpec::new(timer.descriptor, &mut timer_task),
            TaskSpec::new(link.descriptor, &mut link_task),
            TaskSpec::new(indicator.descriptor, &mut indicator_task),
            TaskSpec::new(motion.descriptor, &mut motion_task),
            TaskSpec::new(shell.descriptor, &mut shell_task),
        ],
        &LogSink,
    )
}
