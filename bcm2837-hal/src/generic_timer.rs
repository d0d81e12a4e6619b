//! # ARM generic timer
//!
//! The tick driver only needs four accesses to the generic timer of the core: the 64-bit
//! counter, the 64-bit compare value and the control register, plus the optional counter
//! frequency. These are abstracted by the [HardwareClock] trait, which is implemented for the
//! physical timer of the executing core by [PhysicalTimer] on ARM targets.
//!
//! [Delay] provides blocking delays on top of any [HardwareClock].
use crate::time::Hertz;

/// Physical timer control register (CNTP_CTL).
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct TimerControl {
    /// Read-only. The timer condition is met.
    #[bit(2, r)]
    istatus: bool,
    /// Mask the timer interrupt.
    #[bit(1, rw)]
    imask: bool,
    #[bit(0, rw)]
    enable: bool,
}

impl TimerControl {
    /// Timer enabled, interrupt unmasked.
    pub const ENABLED: Self = Self::DEFAULT.with_enable(true).with_imask(false);
}

/// Access to a generic timer of the executing core.
pub trait HardwareClock {
    /// Current value of the 64-bit counter.
    fn read_counter(&mut self) -> u64;

    /// Current 64-bit compare value.
    fn read_compare(&mut self) -> u64;

    /// Set the 64-bit compare value. The timer condition is met as soon as the counter is equal
    /// to or larger than the compare value.
    fn write_compare(&mut self, value: u64);

    fn write_control(&mut self, control: TimerControl);

    /// Counter frequency as programmed by the boot firmware, if it can be read.
    fn frequency(&mut self) -> Option<Hertz> {
        None
    }
}

impl<C: HardwareClock + ?Sized> HardwareClock for &mut C {
    #[inline]
    fn read_counter(&mut self) -> u64 {
        (**self).read_counter()
    }

    #[inline]
    fn read_compare(&mut self) -> u64 {
        (**self).read_compare()
    }

    #[inline]
    fn write_compare(&mut self, value: u64) {
        (**self).write_compare(value)
    }

    #[inline]
    fn write_control(&mut self, control: TimerControl) {
        (**self).write_control(control)
    }

    #[inline]
    fn frequency(&mut self) -> Option<Hertz> {
        (**self).frequency()
    }
}

/// Physical timer (CNTPCT, CNTP_CVAL, CNTP_CTL) of the executing core.
#[cfg(target_arch = "arm")]
#[derive(Debug)]
pub struct PhysicalTimer(());

#[cfg(target_arch = "arm")]
impl PhysicalTimer {
    /// Create the timer handle.
    ///
    /// # Safety
    ///
    /// The physical timer is a per-core resource. Only one handle should exist per core.
    #[inline]
    pub const unsafe fn steal() -> Self {
        Self(())
    }
}

#[cfg(target_arch = "arm")]
impl HardwareClock for PhysicalTimer {
    #[inline]
    fn read_counter(&mut self) -> u64 {
        let lower: u32;
        let upper: u32;
        // Safety: Read of the physical count register, no side effects.
        unsafe {
            core::arch::asm!(
                "isb",
                "mrrc p15, 0, {lower}, {upper}, c14",
                lower = out(reg) lower,
                upper = out(reg) upper,
                options(nomem, nostack, preserves_flags)
            );
        }
        ((upper as u64) << 32) | lower as u64
    }

    #[inline]
    fn read_compare(&mut self) -> u64 {
        let lower: u32;
        let upper: u32;
        // Safety: Read of the physical compare value register, no side effects.
        unsafe {
            core::arch::asm!(
                "mrrc p15, 2, {lower}, {upper}, c14",
                lower = out(reg) lower,
                upper = out(reg) upper,
                options(nomem, nostack, preserves_flags)
            );
        }
        ((upper as u64) << 32) | lower as u64
    }

    #[inline]
    fn write_compare(&mut self, value: u64) {
        // Safety: Only affects the physical timer of the executing core.
        unsafe {
            core::arch::asm!(
                "mcrr p15, 2, {lower}, {upper}, c14",
                "isb",
                lower = in(reg) value as u32,
                upper = in(reg) (value >> 32) as u32,
                options(nostack, preserves_flags)
            );
        }
    }

    #[inline]
    fn write_control(&mut self, control: TimerControl) {
        // Safety: Only affects the physical timer of the executing core.
        unsafe {
            core::arch::asm!(
                "mcr p15, 0, {ctl}, c14, c2, 1",
                "isb",
                ctl = in(reg) control.raw_value(),
                options(nostack, preserves_flags)
            );
        }
    }

    #[inline]
    fn frequency(&mut self) -> Option<Hertz> {
        let frequency: u32;
        // Safety: Read of the counter frequency register, no side effects.
        unsafe {
            core::arch::asm!(
                "mrc p15, 0, {freq}, c14, c0, 0",
                freq = out(reg) frequency,
                options(nomem, nostack, preserves_flags)
            );
        }
        if frequency == 0 {
            return None;
        }
        Some(Hertz::from_raw(frequency))
    }
}

/// Blocking delays based on the counter of a [HardwareClock].
pub struct Delay<C: HardwareClock> {
    clock: C,
    frequency: Hertz,
}

impl<C: HardwareClock> Delay<C> {
    pub fn new(clock: C, frequency: Hertz) -> Self {
        Self { clock, frequency }
    }

    /// Counter ticks for a duration in nanoseconds, rounded up.
    #[inline]
    pub fn ns_to_ticks(&self, ns: u32) -> u64 {
        (ns as u64 * self.frequency.raw() as u64).div_ceil(1_000_000_000)
    }

    pub fn release(self) -> C {
        self.clock
    }
}

impl<C: HardwareClock> embedded_hal::delay::DelayNs for Delay<C> {
    fn delay_ns(&mut self, ns: u32) {
        let end_of_delay = self.clock.read_counter() + self.ns_to_ticks(ns);
        while self.clock.read_counter() < end_of_delay {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::delay::DelayNs;

    /// Counter which advances by a fixed step on every read.
    struct SteppingClock {
        counter: u64,
        step: u64,
        reads: usize,
    }

    impl HardwareClock for SteppingClock {
        fn read_counter(&mut self) -> u64 {
            self.reads += 1;
            self.counter += self.step;
            self.counter
        }

        fn read_compare(&mut self) -> u64 {
            0
        }

        fn write_compare(&mut self, _value: u64) {}

        fn write_control(&mut self, _control: TimerControl) {}
    }

    #[test]
    fn control_bits() {
        assert_eq!(TimerControl::ENABLED.raw_value(), 0b1);
        assert_eq!(TimerControl::DEFAULT.with_imask(true).raw_value(), 0b10);
        assert!(TimerControl::new_with_raw_value(0b101).istatus());
    }

    #[test]
    fn tick_conversion() {
        let clock = SteppingClock {
            counter: 0,
            step: 1,
            reads: 0,
        };
        let delay = Delay::new(clock, Hertz::from_raw(19_200_000));
        assert_eq!(delay.ns_to_ticks(1_000_000), 19_200);
        assert_eq!(delay.ns_to_ticks(1_000), 20);
        assert_eq!(delay.ns_to_ticks(0), 0);
    }

    #[test]
    fn delay_waits_for_counter() {
        let clock = SteppingClock {
            counter: 0,
            step: 100,
            reads: 0,
        };
        let mut delay = Delay::new(clock, Hertz::from_raw(1_000_000));
        // 10 us are 10 ticks at 1 MHz, the clock advances by 100 per read.
        delay.delay_us(10);
        let clock = delay.release();
        assert_eq!(clock.reads, 2);

        let clock = SteppingClock {
            counter: 0,
            step: 100,
            reads: 0,
        };
        let mut delay = Delay::new(clock, Hertz::from_raw(1_000_000));
        delay.delay_us(1000);
        // 1000 ticks, start at 100, done once the counter reached 1100.
        assert_eq!(delay.release().reads, 11);
    }
}
