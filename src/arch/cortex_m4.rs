//! # Cortex-M4 Port Layer
//!
//! SysTick drives the kernel tick. The exception handler (installed by the
//! firmware binary) calls [`on_systick`], which advances a 64-bit tick
//! counter held under a critical section. When nothing is runnable the
//! core sleeps in WFI; the next SysTick or peripheral interrupt wakes it
//! and the dispatcher re-evaluates.
//!
//! SysTick is set to the lowest exception priority so that it never
//! delays a peripheral ISR that is completing an I/O request.

use core::cell::Cell;

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};

use super::Port;
use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::sync::{self, Mutex};
use crate::task::Tick;

static TICKS: Mutex<Cell<Tick>> = Mutex::new(Cell::new(0));

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure SysTick to fire at `TICK_HZ` from the core clock.
pub fn configure_systick(syst: &mut SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Put SysTick at the lowest exception priority (0xFF).
pub fn set_interrupt_priorities(scb: &mut SCB) {
    unsafe {
        scb.set_priority(SystemHandler::SysTick, 0xFF);
    }
}

/// SysTick exception body. Call from the `SysTick` handler.
#[inline]
pub fn on_systick() {
    sync::critical_section(|cs| {
        let ticks = TICKS.borrow(cs);
        ticks.set(ticks.get().wrapping_add(1));
    });
}

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// Port backed by SysTick. Owning it proves SysTick has been configured.
pub struct SysTickPort {
    _syst: SYST,
}

impl SysTickPort {
    pub fn new(mut syst: SYST, scb: &mut SCB) -> Self {
        set_interrupt_priorities(scb);
        configure_systick(&mut syst);
        Self { _syst: syst }
    }
}

impl Port for SysTickPort {
    fn now(&self) -> Tick {
        sync::critical_section(|cs| TICKS.borrow(cs).get())
    }

    fn idle(&self, _next_wake: Option<Tick>) {
        // SysTick keeps running, so the core wakes at least once per tick.
        cortex_m::asm::wfi();
    }
}
