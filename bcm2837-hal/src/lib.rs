//! # HAL for the BCM2837 SoC
//!
//! This crate makes the dual interrupt controller architecture of the BCM2837 usable for a
//! real-time kernel port which was written against the ARM Generic Interrupt Controller, and
//! derives the kernel tick from the ARM generic timer.
//!
//! - [vgic]: GIC stand-in in RAM which satisfies the priority accesses of the kernel port.
//! - [intc]: Drivers for the VideoCore peripheral interrupt controller and the ARM local
//!   interrupt controller, and the [intc::InterruptManager] which combines them with the
//!   virtual GIC.
//! - [generic_timer]: The [generic_timer::HardwareClock] abstraction of the generic timer.
//! - [tick]: Periodic tick driver on top of a [generic_timer::HardwareClock].
//! - [uart] and [log]: PL011 UART driver and a blocking UART logger.
//!
//! Violated invariants are reported with the [fatal_assert] macro, see the [fatal] module.
#![no_std]

pub mod fatal;
pub mod generic_timer;
pub mod intc;
pub mod log;
pub mod tick;
pub mod time;
pub mod uart;
pub mod vgic;

pub use bcm2837 as pac;

/// Halt the core forever.
pub fn halt() -> ! {
    loop {
        #[cfg(target_arch = "arm")]
        cortex_ar::asm::nop();
        #[cfg(not(target_arch = "arm"))]
        core::hint::spin_loop();
    }
}
