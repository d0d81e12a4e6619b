//! # Peripheral access API for the BCM2837 SoC
//!
//! This crate covers the register blocks required to run a GIC based real-time kernel port on
//! the BCM2837 (Raspberry Pi 2B v1.2 and Raspberry Pi 3):
//!
//! - [local_intc]: ARM local peripherals ("QA7"), the per-core interrupt controller.
//! - [periph_intc]: VideoCore interrupt controller for the shared peripheral interrupts.
//! - [vgic]: Register layout of the GIC CPU interface and priority table which is emulated in
//!   RAM, because the SoC does not contain a GIC.
//! - [uart]: PL011 UART0.
//!
//! All register blocks are generated with [derive_mmio]. Each block can be created at its
//! fixed base address with `new_mmio_fixed` or on top of an in-memory instance created with
//! `new_zeroed`, which is useful to test drivers on a host machine.
#![no_std]

pub mod local_intc;
pub mod periph_intc;
pub mod uart;
pub mod vgic;

/// Base address of the peripherals as seen by the ARM cores.
pub const PERIPHERAL_BASE_ADDR: usize = 0x3F00_0000;

/// Number of ARM cores.
pub const NUM_CORES: usize = 4;
