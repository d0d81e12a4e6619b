//! # Virtual GIC register module
//!
//! The BCM2837 does not contain a Generic Interrupt Controller, but kernel ports for the
//! Cortex-A cores expect one. This register block reproduces the subset of the GICv1/v2
//! register map those ports access: the CPU interface registers at the start of the block
//! (CPU interface offset 0) and the distributor priority registers at offset 0x400.
//!
//! There is no fixed address for this block. The backing store lives in RAM and is placed by
//! software, usually as an exported static.
use arbitrary_int::{u3, u10};
use static_assertions::const_assert_eq;

/// Offset of the interrupt priority registers, relative to the start of the block.
pub const PRIORITY_REGISTERS_OFFSET: usize = 0x400;

/// Number of interrupt IDs which have a priority field.
pub const NUM_PRIORITY_FIELDS: usize = 1024;

/// Priority Mask Register
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct PriorityRegister {
    #[bits(0..=7, rw)]
    priority: u8,
}

/// Binary Point Register
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct BinaryPointRegister {
    #[bits(0..=2, rw)]
    binary_point: u3,
}

/// Interrupt acknowledge register.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct InterruptSignalRegister {
    #[bits(10..=12, rw)]
    cpu_id: u3,
    #[bits(0..=9, rw)]
    ack_int_id: u10,
}

/// GIC CPU interface and priority table stand-in.
#[derive(derive_mmio::Mmio)]
#[repr(C, align(8))]
pub struct VirtualGic {
    /// CPU Interface Control Register (ICCICR).
    icr: u32,
    /// Interrupt Priority Mask Register (ICCPMR).
    pmr: PriorityRegister,
    /// Binary Point Register (ICCBPR).
    bpr: BinaryPointRegister,
    /// Interrupt Acknowledge Register (ICCIAR).
    iar: InterruptSignalRegister,
    /// End of Interrupt Register (ICCEOIR).
    eoir: InterruptSignalRegister,
    /// Running Priority Register (ICCRPR).
    rpr: PriorityRegister,
    /// Highest Pending Interrupt Register (ICCHPIR).
    hpir: InterruptSignalRegister,
    _reserved_0: [u32; 0xF9],
    /// Interrupt Priority Registers. Each register holds four byte-wide priority fields,
    /// interrupt ID `n` is located in byte `n % 4` of register `n / 4`.
    ipr: [u32; 0x100],
}

const_assert_eq!(core::mem::size_of::<VirtualGic>(), 0x800);

impl VirtualGic {
    /// Register block with all registers cleared.
    pub const fn new_zeroed() -> Self {
        Self {
            icr: 0,
            pmr: PriorityRegister::new_with_raw_value(0),
            bpr: BinaryPointRegister::new_with_raw_value(0),
            iar: InterruptSignalRegister::new_with_raw_value(0),
            eoir: InterruptSignalRegister::new_with_raw_value(0),
            rpr: PriorityRegister::new_with_raw_value(0),
            hpir: InterruptSignalRegister::new_with_raw_value(0),
            _reserved_0: [0; 0xF9],
            ipr: [0; 0x100],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::offset_of;

    #[test]
    fn register_offsets() {
        assert_eq!(offset_of!(VirtualGic, pmr), 0x04);
        assert_eq!(offset_of!(VirtualGic, bpr), 0x08);
        assert_eq!(offset_of!(VirtualGic, iar), 0x0C);
        assert_eq!(offset_of!(VirtualGic, eoir), 0x10);
        assert_eq!(offset_of!(VirtualGic, rpr), 0x14);
        assert_eq!(offset_of!(VirtualGic, ipr), PRIORITY_REGISTERS_OFFSET);
    }

    #[test]
    fn priority_table_covers_all_ids() {
        assert_eq!(
            core::mem::size_of::<VirtualGic>() - PRIORITY_REGISTERS_OFFSET,
            NUM_PRIORITY_FIELDS
        );
    }
}
