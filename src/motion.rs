//! Motion samples and the sensor channel set.
//!
//! The motion sampler is the only producer of sensor data. It publishes
//! each completed sample to two capacity-1 channels, one filtered and one
//! raw, which the indicator and link tasks read. Both channels overwrite:
//! consumers always see the latest sample and the sampler never waits on
//! a slow reader.

use log::trace;

use crate::channel::{OverflowPolicy, SampleChannel};
use crate::step::Step;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawSample {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

/// Acceleration in g after filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FilteredSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotionSample {
    pub raw: RawSample,
    pub filtered: FilteredSample,
}

/// Motion sensor driver state machine.
pub trait SampleSource {
    /// Advance one iteration. Returns a sample when a conversion completes.
    fn advance(&mut self) -> Option<MotionSample>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelId {
    Filtered,
    Raw,
}

impl ChannelId {
    pub const fn name(self) -> &'static str {
        match self {
            ChannelId::Filtered => "filtered-sample",
            ChannelId::Raw => "raw-sample",
        }
    }
}

/// A channel of either sample type, as returned by [`SensorChannels::get`].
pub enum SensorChannel<'a> {
    Filtered(&'a SampleChannel<FilteredSample, 1>),
    Raw(&'a SampleChannel<RawSample, 1>),
}

impl SensorChannel<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            SensorChannel::Filtered(ch) => ch.name(),
            SensorChannel::Raw(ch) => ch.name(),
        }
    }
}

pub struct SensorChannels {
    filtered: SampleChannel<FilteredSample, 1>,
    raw: SampleChannel<RawSample, 1>,
}

impl Default for SensorChannels {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorChannels {
    pub const fn new() -> Self {
        Self {
            filtered: SampleChannel::new(ChannelId::Filtered.name(), OverflowPolicy::Overwrite),
            raw: SampleChannel::new(ChannelId::Raw.name(), OverflowPolicy::Overwrite),
        }
    }

    pub fn filtered(&self) -> &SampleChannel<FilteredSample, 1> {
        &self.filtered
    }

    pub fn raw(&self) -> &SampleChannel<RawSample, 1> {
        &self.raw
    }

    pub fn get(&self, id: ChannelId) -> SensorChannel<'_> {
        match id {
            ChannelId::Filtered => SensorChannel::Filtered(&self.filtered),
            ChannelId::Raw => SensorChannel::Raw(&self.raw),
        }
    }
}

/// Step of the motion-sampler task: advance the sensor driver and publish
/// whatever it completes.
pub struct MotionSampler<'a, S> {
    source: S,
    channels: &'a SensorChannels,
    published: u32,
    dropped: u32,
}

impl<'a, S: SampleSource> MotionSampler<'a, S> {
    pub const fn new(source: S, channels: &'a SensorChannels) -> Self {
        Self {
            source,
            channels,
            published: 0,
            dropped: 0,
        }
    }

    /// Samples published so far.
    pub const fn published(&self) -> u32 {
        self.published
    }

    /// Channel writes refused as full.
    pub const fn dropped(&self) -> u32 {
        self.dropped
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    fn publish(&mut self, sample: MotionSample) {
        let filtered = self.channels.filtered.try_write(sample.filtered).is_ok();
        let raw = self.channels.raw.try_write(sample.raw).is_ok();
        if !(filtered && raw) {
            self.dropped = self.dropped.wrapping_add(1);
        }
        self.published = self.published.wrapping_add(1);
        trace!("motion sample {:?}", sample.raw);
    }
}

impl<S: SampleSource> Step for MotionSampler<'_, S> {
    fn step(&mut self) {
        if let Some(sample) = self.source.advance() {
            self.publish(sample);
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::{Cell, RefCell};
    use std::vec::Vec;

    use crate::arch::virt::VirtualPort;
    use crate::channel::{Blocking, ReadWait};
    use crate::config::{INDICATOR_PERIOD_TICKS, MOTION_PERIOD_TICKS};
    use crate::kernel::Kernel;
    use crate::config::MINIMAL_STACK_SIZE;
    use crate::periodic::{Period, PeriodicTask};
    use crate::task::{Context, Suspend, Task, TaskDescriptor, Tier};

    /// Completes a conversion on every other call.
    struct Ramp {
        calls: i16,
    }

    impl SampleSource for Ramp {
        fn advance(&mut self) -> Option<MotionSample> {
            self.calls += 1;
            if self.calls % 2 != 0 {
                return None;
            }
            let n = self.calls / 2;
            Some(MotionSample {
                raw: RawSample { x: n, y: -n, z: 1000 },
                filtered: FilteredSample {
                    x: f32::from(n),
                    y: -f32::from(n),
                    z: 1.0,
                },
            })
        }
    }

    #[test]
    fn test_channels_are_named_and_discoverable() {
        let channels = SensorChannels::new();
        assert_eq!(channels.get(ChannelId::Filtered).name(), "filtered-sample");
        assert_eq!(channels.get(ChannelId::Raw).name(), "raw-sample");
        assert_eq!(channels.filtered().capacity(), 1);
        assert_eq!(channels.raw().policy(), OverflowPolicy::Overwrite);
    }

    #[test]
    fn test_sampler_publishes_latest_without_blocking() {
        let channels = SensorChannels::new();
        let mut sampler = MotionSampler::new(Ramp { calls: 0 }, &channels);

        for _ in 0..6 {
            sampler.step();
        }

        // nobody read: three samples published, only the newest retained
        assert_eq!(sampler.published(), 3);
        assert_eq!(sampler.dropped(), 0);
        assert_eq!(channels.raw().len(), 1);
        assert_eq!(channels.raw().overwritten(), 2);
        assert_eq!(channels.raw().try_read().unwrap().x, 3);
    }

    /// Indicator stand-in: waits on the filtered channel with a timeout.
    struct Indicator<'a> {
        channels: &'a SensorChannels,
        wait: ReadWait,
        seen: &'a RefCell<Vec<f32>>,
        timeouts: &'a Cell<u32>,
    }

    impl<'a> Task<'a> for Indicator<'a> {
        fn run(&mut self, cx: &Context) -> Suspend<'a> {
            match self.channels.filtered().blocking_read(cx, &mut self.wait) {
                Blocking::Ready(sample) => {
                    self.seen.borrow_mut().push(sample.x);
                    Suspend::DelayUntil(cx.now() + u64::from(INDICATOR_PERIOD_TICKS))
                }
                Blocking::Pending(wait) => wait,
                Blocking::TimedOut => {
                    self.timeouts.set(self.timeouts.get() + 1);
                    Suspend::Yield
                }
            }
        }
    }

    #[test]
    fn test_sampler_and_slow_consumer_never_deadlock() {
        let port = VirtualPort::new().with_dispatch_cost(1);
        let channels = SensorChannels::new();
        let seen = RefCell::new(Vec::new());
        let timeouts = Cell::new(0);

        let mut sampler = PeriodicTask::new(
            MotionSampler::new(Ramp { calls: 0 }, &channels),
            Period::Every(MOTION_PERIOD_TICKS),
        );
        let mut indicator = Indicator {
            channels: &channels,
            wait: ReadWait::new(2 * INDICATOR_PERIOD_TICKS),
            seen: &seen,
            timeouts: &timeouts,
        };

        let mut kernel = Kernel::new(&port);
        kernel
            .create_task(
                TaskDescriptor::new("motion-sampler", Tier::Application, MINIMAL_STACK_SIZE),
                &mut sampler,
            )
            .unwrap();
        kernel
            .create_task(
                TaskDescriptor::new("indicator", Tier::Application, MINIMAL_STACK_SIZE),
                &mut indicator,
            )
            .unwrap();
        kernel.run_until(2_000);
        drop(kernel);

        // sampler kept its period: released at 50, 100, ... 1950
        assert_eq!(sampler.iterations(), 39);
        assert_eq!(sampler.step_mut().published(), 19);

        // consumer made progress and samples arrived in order
        let seen = seen.borrow();
        assert!(seen.len() >= 9);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(timeouts.get(), 0);
    }
}
