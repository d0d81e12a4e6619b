//! # VideoCore interrupt controller register module
//!
//! Controls the 64 shared GPU peripheral interrupts and the ARM specific "basic" interrupts.
//! See p.109 of the BCM2835 ARM peripherals document. The block sits at offset 0x200 of the
//! interrupt controller page.
use static_assertions::const_assert_eq;

pub const PERIPH_INTC_BASE_ADDR: usize = super::PERIPHERAL_BASE_ADDR + 0xB200;

/// Basic pending register. Bits 8 and 9 signal that one or more bits are set in pending
/// register 1 or 2. Bits 10 to 20 are shortcuts for a few selected GPU interrupts.
#[bitbybit::bitfield(u32, debug)]
pub struct BasicPending {
    #[bit(20, r)]
    gpu_irq_62: bool,
    #[bit(19, r)]
    gpu_irq_57: bool,
    #[bit(18, r)]
    gpu_irq_56: bool,
    #[bit(17, r)]
    gpu_irq_55: bool,
    #[bit(16, r)]
    gpu_irq_54: bool,
    #[bit(15, r)]
    gpu_irq_53: bool,
    #[bit(14, r)]
    gpu_irq_19: bool,
    #[bit(13, r)]
    gpu_irq_18: bool,
    #[bit(12, r)]
    gpu_irq_10: bool,
    #[bit(11, r)]
    gpu_irq_9: bool,
    #[bit(10, r)]
    gpu_irq_7: bool,
    #[bit(9, r)]
    pending_2: bool,
    #[bit(8, r)]
    pending_1: bool,
    #[bit(7, r)]
    illegal_access_0: bool,
    #[bit(6, r)]
    illegal_access_1: bool,
    #[bit(5, r)]
    gpu_1_halted: bool,
    #[bit(4, r)]
    gpu_0_halted: bool,
    #[bit(3, r)]
    doorbell_1: bool,
    #[bit(2, r)]
    doorbell_0: bool,
    #[bit(1, r)]
    mailbox: bool,
    #[bit(0, r)]
    arm_timer: bool,
}

/// VideoCore interrupt controller registers.
///
/// The enable registers only set bits and the disable registers only clear bits. Writing a
/// zero bit has no effect. No `modify` accessors are generated for these registers: a
/// read-modify-write cycle is never required and would race with other enable and disable
/// calls.
#[derive(derive_mmio::Mmio)]
#[repr(C)]
pub struct PeriphIntc {
    #[mmio(PureRead)]
    basic_pending: BasicPending,
    /// Pending register for the GPU interrupts 0 to 31.
    #[mmio(PureRead)]
    pending_1: u32,
    /// Pending register for the GPU interrupts 32 to 63.
    #[mmio(PureRead)]
    pending_2: u32,
    fiq_control: u32,
    #[mmio(PureRead, Write)]
    enable_1: u32,
    #[mmio(PureRead, Write)]
    enable_2: u32,
    #[mmio(PureRead, Write)]
    enable_basic: u32,
    #[mmio(PureRead, Write)]
    disable_1: u32,
    #[mmio(PureRead, Write)]
    disable_2: u32,
    #[mmio(PureRead, Write)]
    disable_basic: u32,
}

const_assert_eq!(core::mem::size_of::<PeriphIntc>(), 0x28);

impl PeriphIntc {
    /// Create a new VideoCore interrupt controller MMIO instance at the fixed base address.
    ///
    /// # Safety
    ///
    /// This API can be used to potentially create a driver to the same peripheral structure
    /// from multiple threads. The user must ensure that concurrent accesses are safe and do not
    /// interfere with each other.
    #[inline]
    pub const unsafe fn new_mmio_fixed() -> MmioPeriphIntc<'static> {
        unsafe { Self::new_mmio_at(PERIPH_INTC_BASE_ADDR) }
    }

    /// Register block with all registers cleared. Can be used as the backing store of a
    /// [MmioPeriphIntc] instance created with [Self::new_mmio].
    pub const fn new_zeroed() -> Self {
        Self {
            basic_pending: BasicPending::new_with_raw_value(0),
            pending_1: 0,
            pending_2: 0,
            fiq_control: 0,
            enable_1: 0,
            enable_2: 0,
            enable_basic: 0,
            disable_1: 0,
            disable_2: 0,
            disable_basic: 0,
        }
    }

    /// Register block with pre-set pending registers.
    pub const fn new_with_pending(basic: u32, pending_1: u32, pending_2: u32) -> Self {
        let mut regs = Self::new_zeroed();
        regs.basic_pending = BasicPending::new_with_raw_value(basic);
        regs.pending_1 = pending_1;
        regs.pending_2 = pending_2;
        regs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::offset_of;

    #[test]
    fn base_address() {
        assert_eq!(PERIPH_INTC_BASE_ADDR, 0x3F00_B200);
    }

    #[test]
    fn register_offsets() {
        assert_eq!(offset_of!(PeriphIntc, pending_1), 0x04);
        assert_eq!(offset_of!(PeriphIntc, pending_2), 0x08);
        assert_eq!(offset_of!(PeriphIntc, fiq_control), 0x0C);
        assert_eq!(offset_of!(PeriphIntc, enable_1), 0x10);
        assert_eq!(offset_of!(PeriphIntc, enable_2), 0x14);
        assert_eq!(offset_of!(PeriphIntc, enable_basic), 0x18);
        assert_eq!(offset_of!(PeriphIntc, disable_1), 0x1C);
        assert_eq!(offset_of!(PeriphIntc, disable_2), 0x20);
        assert_eq!(offset_of!(PeriphIntc, disable_basic), 0x24);
    }

    #[test]
    fn basic_pending_decode() {
        let pending = BasicPending::new_with_raw_value((1 << 9) | (1 << 19) | 1);
        assert!(pending.arm_timer());
        assert!(pending.pending_2());
        assert!(!pending.pending_1());
        assert!(pending.gpu_irq_57());
    }
}
