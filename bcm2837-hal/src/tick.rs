//! # Kernel tick driver
//!
//! Generates the periodic kernel tick with the compare value of a [HardwareClock]. The compare
//! value is armed once with [TickTimer::setup] and moved forward by exactly one period on every
//! tick with [TickTimer::acknowledge]. Advancing the previous compare value instead of the
//! current counter value keeps the tick free of drift, even if the interrupt is serviced late.
//!
//! The timer interrupt reaches the core through the local interrupt controller, so
//! [TickTimer::setup] also enables the configured [TimerSource] for the designated core.
use crate::{
    fatal_assert, fatal_unwrap,
    generic_timer::{HardwareClock, TimerControl},
    intc::{CoreId, LocalInterruptController, TimerSource},
    time::Hertz,
};

/// Generic timer frequency of the Raspberry Pi 2B v1.2 and 3.
pub const DEFAULT_REFERENCE_CLOCK: Hertz = Hertz::from_raw(19_200_000);
pub const DEFAULT_TICK_RATE: Hertz = Hertz::from_raw(1000);

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TickError {
    #[error("tick timer is not armed")]
    NotArmed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TickConfig {
    /// Frequency of the generic timer counter.
    pub reference_clock: Hertz,
    pub tick_rate: Hertz,
    /// Local timer interrupt source which is enabled by [TickTimer::setup].
    pub timer_source: TimerSource,
    /// Core which services the tick interrupt.
    pub core: CoreId,
    /// Treat a mismatch between the reference clock and the frequency reported by the clock as
    /// a fatal error instead of logging a warning.
    pub strict_frequency_check: bool,
}

impl TickConfig {
    pub const fn new() -> Self {
        Self {
            reference_clock: DEFAULT_REFERENCE_CLOCK,
            tick_rate: DEFAULT_TICK_RATE,
            timer_source: TimerSource::PhysicalSecure,
            core: CoreId::CORE_0,
            strict_frequency_check: false,
        }
    }

    pub const fn with_reference_clock(mut self, reference_clock: Hertz) -> Self {
        self.reference_clock = reference_clock;
        self
    }

    pub const fn with_tick_rate(mut self, tick_rate: Hertz) -> Self {
        self.tick_rate = tick_rate;
        self
    }

    pub const fn with_timer_source(mut self, timer_source: TimerSource) -> Self {
        self.timer_source = timer_source;
        self
    }

    pub const fn with_core(mut self, core: CoreId) -> Self {
        self.core = core;
        self
    }

    pub const fn with_strict_frequency_check(mut self, strict: bool) -> Self {
        self.strict_frequency_check = strict;
        self
    }
}

impl Default for TickConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter ticks per kernel tick.
///
/// A zero tick rate and a tick rate above the reference clock are fatal errors.
pub fn period(reference_clock: Hertz, tick_rate: Hertz) -> u32 {
    fatal_assert!(tick_rate.raw() != 0);
    fatal_assert!(tick_rate.raw() <= reference_clock.raw());
    reference_clock.raw() / tick_rate.raw()
}

/// Add one period to a compare value. The period is added to the lower half and the carry is
/// propagated into the upper half, the result wraps at 2^64.
#[inline]
pub const fn advance_compare(compare: u64, period: u32) -> u64 {
    let (lower, carry) = (compare as u32).overflowing_add(period);
    let upper = ((compare >> 32) as u32).wrapping_add(carry as u32);
    ((upper as u64) << 32) | lower as u64
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum TickState {
    Uninitialized,
    Armed { period: u32 },
}

/// Periodic tick driver.
pub struct TickTimer<C: HardwareClock> {
    clock: C,
    config: TickConfig,
    state: TickState,
}

impl<C: HardwareClock> TickTimer<C> {
    pub const fn new(clock: C, config: TickConfig) -> Self {
        Self {
            clock,
            config,
            state: TickState::Uninitialized,
        }
    }

    /// Arm the first tick one period after the current counter value, enable and unmask the
    /// timer and enable its interrupt source for the configured core.
    ///
    /// Has to be called exactly once with interrupts masked. Calling it on an armed timer is
    /// a fatal error.
    pub fn setup(&mut self, local: &mut LocalInterruptController) {
        fatal_assert!(self.state == TickState::Uninitialized);
        let period = period(self.config.reference_clock, self.config.tick_rate);
        self.check_frequency();

        let compare = advance_compare(self.clock.read_counter(), period);
        self.clock.write_compare(compare);
        self.clock.write_control(TimerControl::ENABLED);
        local.enable_timer_interrupt(self.config.core, self.config.timer_source);
        self.state = TickState::Armed { period };
        ::log::info!(
            "tick timer armed: {} Hz tick, period {} counter ticks, core {}",
            self.config.tick_rate.raw(),
            period,
            self.config.core.index()
        );
    }

    /// Move the compare value forward by one period. Called once per tick from the interrupt
    /// handler, which also clears the timer condition.
    ///
    /// Calling it before [Self::setup] is a fatal error.
    #[inline]
    pub fn acknowledge(&mut self) {
        let period = fatal_unwrap!(self.period().ok_or(TickError::NotArmed));
        let compare = self.clock.read_compare();
        self.clock.write_compare(advance_compare(compare, period));
    }

    /// Counter ticks per kernel tick. [None] before [Self::setup] was called.
    #[inline]
    pub fn period(&self) -> Option<u32> {
        match self.state {
            TickState::Uninitialized => None,
            TickState::Armed { period } => Some(period),
        }
    }

    #[inline]
    pub fn is_armed(&self) -> bool {
        self.period().is_some()
    }

    #[inline]
    pub fn config(&self) -> &TickConfig {
        &self.config
    }

    #[inline]
    pub fn clock(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn release(self) -> C {
        self.clock
    }

    fn check_frequency(&mut self) {
        let Some(frequency) = self.clock.frequency() else {
            return;
        };
        if frequency != self.config.reference_clock {
            ::log::warn!(
                "counter frequency {} Hz does not match the reference clock {} Hz",
                frequency.raw(),
                self.config.reference_clock.raw()
            );
            fatal_assert!(!self.config.strict_frequency_check);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bcm2837::local_intc::LocalIntc;

    #[derive(Default)]
    struct FakeClock {
        counter: u64,
        compare: u64,
        control: Option<TimerControl>,
        frequency: Option<Hertz>,
        compare_writes: usize,
    }

    impl HardwareClock for FakeClock {
        fn read_counter(&mut self) -> u64 {
            self.counter
        }

        fn read_compare(&mut self) -> u64 {
            self.compare
        }

        fn write_compare(&mut self, value: u64) {
            self.compare_writes += 1;
            self.compare = value;
        }

        fn write_control(&mut self, control: TimerControl) {
            self.control = Some(control);
        }

        fn frequency(&mut self) -> Option<Hertz> {
            self.frequency
        }
    }

    fn clock_at(counter: u64) -> FakeClock {
        FakeClock {
            counter,
            ..Default::default()
        }
    }

    #[test]
    fn period_for_reference_platform() {
        assert_eq!(period(DEFAULT_REFERENCE_CLOCK, DEFAULT_TICK_RATE), 19_200);
        assert_eq!(
            period(Hertz::from_raw(19_200_000), Hertz::from_raw(7)),
            2_742_857
        );
        assert_eq!(
            period(Hertz::from_raw(19_200_000), Hertz::from_raw(19_200_000)),
            1
        );
    }

    #[test]
    #[should_panic(expected = "fatal assertion failed")]
    fn zero_tick_rate() {
        period(DEFAULT_REFERENCE_CLOCK, Hertz::from_raw(0));
    }

    #[test]
    #[should_panic(expected = "fatal assertion failed")]
    fn tick_rate_above_reference() {
        period(Hertz::from_raw(1000), Hertz::from_raw(1001));
    }

    #[test]
    fn compare_carry_into_upper_half() {
        assert_eq!(advance_compare(0x0000_0000_FFFF_FFFF, 1), 0x0000_0001_0000_0000);
        assert_eq!(advance_compare(0x0000_0001_FFFF_FF00, 19_200), 0x0000_0002_0000_4A00);
        assert_eq!(advance_compare(0x1234, 19_200), 0x1234 + 19_200);
        assert_eq!(advance_compare(u64::MAX, 1), 0);
    }

    #[test]
    fn setup_arms_first_tick() {
        let mut storage = LocalIntc::new_zeroed();
        let mut local =
            LocalInterruptController::new(unsafe { LocalIntc::new_mmio(&raw mut storage) });
        let mut tick = TickTimer::new(clock_at(1_000), TickConfig::new());
        assert!(!tick.is_armed());
        tick.setup(&mut local);

        assert_eq!(tick.period(), Some(19_200));
        assert_eq!(tick.clock().compare, 20_200);
        let control = tick.clock().control.unwrap();
        assert!(control.enable());
        assert!(!control.imask());
        assert_eq!(local.timer_interrupt_control(CoreId::CORE_0).raw_value(), 1);
        assert_eq!(local.timer_interrupt_control(CoreId::CORE_1).raw_value(), 0);
    }

    #[test]
    fn setup_preserves_other_timer_sources() {
        let mut storage = LocalIntc::new_zeroed();
        let mut local =
            LocalInterruptController::new(unsafe { LocalIntc::new_mmio(&raw mut storage) });
        local.enable_timer_interrupt(CoreId::CORE_1, TimerSource::Virtual);
        let config = TickConfig::new()
            .with_core(CoreId::CORE_1)
            .with_timer_source(TimerSource::PhysicalNonSecure);
        let mut tick = TickTimer::new(clock_at(0), config);
        tick.setup(&mut local);
        assert_eq!(
            local.timer_interrupt_control(CoreId::CORE_1).raw_value(),
            (1 << 3) | (1 << 1)
        );
    }

    #[test]
    fn acknowledge_advances_by_one_period() {
        let mut storage = LocalIntc::new_zeroed();
        let mut local =
            LocalInterruptController::new(unsafe { LocalIntc::new_mmio(&raw mut storage) });
        let start = 0xFFFF_0000;
        let mut tick = TickTimer::new(clock_at(start), TickConfig::new());
        tick.setup(&mut local);

        let ticks = 10_000u64;
        for _ in 0..ticks {
            tick.acknowledge();
        }
        let clock = tick.release();
        assert_eq!(clock.compare, start + (ticks + 1) * 19_200);
        assert_eq!(clock.compare_writes as u64, ticks + 1);
    }

    #[test]
    fn acknowledge_uses_compare_not_counter() {
        let mut storage = LocalIntc::new_zeroed();
        let mut local =
            LocalInterruptController::new(unsafe { LocalIntc::new_mmio(&raw mut storage) });
        let mut tick = TickTimer::new(clock_at(0), TickConfig::new());
        tick.setup(&mut local);
        // Late interrupt, the counter is already two periods further.
        tick.clock().counter = 3 * 19_200 + 500;
        tick.acknowledge();
        assert_eq!(tick.clock().compare, 2 * 19_200);
    }

    #[test]
    fn acknowledge_wraps_at_end_of_counter() {
        let mut storage = LocalIntc::new_zeroed();
        let mut local =
            LocalInterruptController::new(unsafe { LocalIntc::new_mmio(&raw mut storage) });
        let mut tick = TickTimer::new(clock_at(u64::MAX - 19_200), TickConfig::new());
        tick.setup(&mut local);
        assert_eq!(tick.clock().compare, u64::MAX);
        tick.acknowledge();
        assert_eq!(tick.clock().compare, 19_199);
    }

    #[test]
    #[should_panic(expected = "fatal assertion failed")]
    fn acknowledge_before_setup() {
        let mut tick = TickTimer::new(clock_at(0), TickConfig::new());
        tick.acknowledge();
    }

    #[test]
    #[should_panic(expected = "fatal assertion failed")]
    fn setup_twice() {
        let mut storage = LocalIntc::new_zeroed();
        let mut local =
            LocalInterruptController::new(unsafe { LocalIntc::new_mmio(&raw mut storage) });
        let mut tick = TickTimer::new(clock_at(0), TickConfig::new());
        tick.setup(&mut local);
        tick.setup(&mut local);
    }

    #[test]
    fn frequency_mismatch_is_a_warning_by_default() {
        let mut storage = LocalIntc::new_zeroed();
        let mut local =
            LocalInterruptController::new(unsafe { LocalIntc::new_mmio(&raw mut storage) });
        let clock = FakeClock {
            frequency: Some(Hertz::from_raw(54_000_000)),
            ..Default::default()
        };
        let mut tick = TickTimer::new(clock, TickConfig::new());
        tick.setup(&mut local);
        assert!(tick.is_armed());
    }

    #[test]
    fn matching_frequency_with_strict_check() {
        let mut storage = LocalIntc::new_zeroed();
        let mut local =
            LocalInterruptController::new(unsafe { LocalIntc::new_mmio(&raw mut storage) });
        let clock = FakeClock {
            frequency: Some(DEFAULT_REFERENCE_CLOCK),
            ..Default::default()
        };
        let mut tick = TickTimer::new(clock, TickConfig::new().with_strict_frequency_check(true));
        tick.setup(&mut local);
        assert!(tick.is_armed());
    }

    #[test]
    #[should_panic(expected = "fatal assertion failed")]
    fn frequency_mismatch_with_strict_check() {
        let mut storage = LocalIntc::new_zeroed();
        let mut local =
            LocalInterruptController::new(unsafe { LocalIntc::new_mmio(&raw mut storage) });
        let clock = FakeClock {
            frequency: Some(Hertz::from_raw(54_000_000)),
            ..Default::default()
        };
        let mut tick = TickTimer::new(clock, TickConfig::new().with_strict_frequency_check(true));
        tick.setup(&mut local);
    }
}
