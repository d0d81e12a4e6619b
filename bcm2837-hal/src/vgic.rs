//! # Virtual priority controller
//!
//! Kernel ports for Cortex-A cores access the GIC directly: they determine the number of
//! implemented priority bits at boot, and read and write the priority mask, the binary point and
//! the interrupt priorities at run-time. The BCM2837 has no GIC, so these accesses go to a
//! [bcm2837::vgic::VirtualGic] block in RAM which is managed by this driver.
//!
//! None of the values stored here have an effect on interrupt delivery. Enabling, disabling and
//! routing interrupts is handled by the [crate::intc] module.
use arbitrary_int::u3;
use bcm2837::vgic::{BinaryPointRegister, MmioVirtualGic, NUM_PRIORITY_FIELDS, PriorityRegister};

use crate::{fatal_assert, fatal_unwrap};

/// Priority mask after [VirtualPriorityController::init]. No interrupt is masked.
pub const PRIORITY_MASK_RESET: u8 = 0xFF;

#[derive(Debug, thiserror::Error)]
#[error("invalid number of priority levels {0}, must be a power of two in [2, 128]")]
pub struct InvalidPriorityLevels(pub u8);

/// Number of unique interrupt priorities of the emulated GIC.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PriorityLevels(u8);

impl PriorityLevels {
    /// 32 priority levels, 5 implemented priority bits.
    pub const LEVELS_32: Self = Self(32);

    pub const fn new(levels: u8) -> Result<Self, InvalidPriorityLevels> {
        if levels < 2 || !levels.is_power_of_two() {
            return Err(InvalidPriorityLevels(levels));
        }
        Ok(Self(levels))
    }

    #[inline]
    pub const fn levels(&self) -> u8 {
        self.0
    }

    /// Number of implemented priority bits.
    #[inline]
    pub const fn bits(&self) -> u32 {
        self.0.trailing_zeros()
    }

    /// The value a GIC with this number of levels returns when `0xFF` is written to a priority
    /// field: the implemented bits are the most significant bits of the byte.
    #[inline]
    pub const fn encoding(&self) -> u8 {
        0xFF << (8 - self.bits())
    }

    /// Lowest priority, which is the highest numerical value.
    #[inline]
    pub const fn lowest_priority(&self) -> u8 {
        self.0 - 1
    }
}

/// Driver for the RAM based GIC stand-in.
pub struct VirtualPriorityController {
    regs: MmioVirtualGic<'static>,
    levels: Option<PriorityLevels>,
}

impl VirtualPriorityController {
    /// Create the driver. [Self::init] has to be called before the kernel starts.
    pub const fn new(regs: MmioVirtualGic<'static>) -> Self {
        Self { regs, levels: None }
    }

    /// Initialize the stand-in for `levels` priority levels.
    ///
    /// An invalid number of levels is a fatal error.
    pub fn init(&mut self, levels: u8) {
        self.init_with_levels(fatal_unwrap!(PriorityLevels::new(levels)));
    }

    /// Write the priority bit encoding to the priority field of interrupt ID 0, which is
    /// where the kernel port looks up the implemented bits, and reset the priority mask and the
    /// binary point.
    pub fn init_with_levels(&mut self, levels: PriorityLevels) {
        self.write(0, levels.encoding());
        self.regs.write_bpr(BinaryPointRegister::DEFAULT);
        self.regs
            .write_pmr(PriorityRegister::new_with_raw_value(PRIORITY_MASK_RESET as u32));
        // The port fails its boot check with a mismatch, catch it here already.
        fatal_assert!(self.read(0) == levels.encoding());
        self.levels = Some(levels);
        ::log::debug!(
            "virtual GIC: {} priority levels, encoding {:#04x}",
            levels.levels(),
            levels.encoding()
        );
    }

    /// Configured priority levels. [None] before [Self::init] was called.
    #[inline]
    pub fn levels(&self) -> Option<PriorityLevels> {
        self.levels
    }

    /// Read the priority field of an interrupt ID.
    ///
    /// IDs above 1023 are a fatal error.
    pub fn read(&mut self, id: usize) -> u8 {
        fatal_assert!(id < NUM_PRIORITY_FIELDS);
        let reg = fatal_unwrap!(self.regs.read_ipr(id / 4));
        (reg >> ((id % 4) * 8)) as u8
    }

    /// Write the priority field of an interrupt ID. Only the other fields of the same
    /// priority register are preserved, the value itself is stored unmodified.
    ///
    /// IDs above 1023 are a fatal error.
    pub fn write(&mut self, id: usize, value: u8) {
        fatal_assert!(id < NUM_PRIORITY_FIELDS);
        let shift = (id % 4) * 8;
        let mask = 0xFF << shift;
        fatal_unwrap!(
            self.regs
                .modify_ipr(id / 4, |v| (v & !mask) | ((value as u32) << shift))
        );
    }

    #[inline]
    pub fn priority_mask(&mut self) -> u8 {
        self.regs.read_pmr().priority()
    }

    #[inline]
    pub fn set_priority_mask(&mut self, mask: u8) {
        self.regs
            .write_pmr(PriorityRegister::new_with_raw_value(mask as u32));
    }

    #[inline]
    pub fn binary_point(&mut self) -> u3 {
        self.regs.read_bpr().binary_point()
    }

    #[inline]
    pub fn set_binary_point(&mut self, binary_point: u3) {
        self.regs
            .write_bpr(BinaryPointRegister::DEFAULT.with_binary_point(binary_point));
    }
}
