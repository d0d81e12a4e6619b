//! # Interrupt controller module
//!
//! The BCM2837 has two interrupt controllers which both have to be configured for a
//! peripheral interrupt to reach a core:
//!
//! 1. The VideoCore interrupt controller, driven by the [PeripheralInterruptController]. It
//!    enables and disables the 64 shared peripheral interrupts, which are split into two banks
//!    of 32 interrupts, and the ARM specific basic interrupts.
//! 2. The ARM local interrupt controller, driven by the [LocalInterruptController]. It routes
//!    the combined GPU interrupt line to exactly one core and enables the generic timer
//!    interrupts for each core.
//!
//! The [InterruptManager] combines both controllers with the
//! [crate::vgic::VirtualPriorityController] and performs the boot sequence.
//!
//! Invalid interrupt IDs and core indexes passed to the raw index API are fatal errors, see the
//! [crate::fatal] module. The typed API ([IrqBit], [CoreId], [PeripheralIrq]) can be used to
//! check values up front.
use arbitrary_int::u2;
use bcm2837::{
    local_intc::{
        CoreIrqSource, GpuIntRouting, LocalIntc, LocalTimerClearReload, MmioLocalIntc,
        TimerIntControl,
    },
    periph_intc::{BasicPending, MmioPeriphIntc, PeriphIntc},
    vgic::MmioVirtualGic,
};

use crate::{
    fatal_unwrap,
    vgic::{PriorityLevels, VirtualPriorityController},
};

/// Number of shared peripheral interrupts.
pub const NUM_PERIPHERAL_IRQS: usize = 64;

/// Written to all disable registers by [PeripheralInterruptController::init].
pub const DISABLE_ALL: u32 = 0xFFFF_FFFF;

#[derive(Debug, thiserror::Error)]
#[error("invalid peripheral interrupt ID {0}, range is [0, 63]")]
pub struct InvalidInterruptId(pub usize);

#[derive(Debug, thiserror::Error)]
#[error("invalid core index {0}, range is [0, 3]")]
pub struct InvalidCoreId(pub usize);

/// Index of one of the four ARM cores.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CoreId(u2);

impl CoreId {
    pub const CORE_0: Self = Self(u2::new(0));
    pub const CORE_1: Self = Self(u2::new(1));
    pub const CORE_2: Self = Self(u2::new(2));
    pub const CORE_3: Self = Self(u2::new(3));

    pub const fn new(index: usize) -> Result<Self, InvalidCoreId> {
        if index >= bcm2837::NUM_CORES {
            return Err(InvalidCoreId(index));
        }
        Ok(Self(u2::new(index as u8)))
    }

    #[inline]
    pub const fn index(&self) -> usize {
        self.0.value() as usize
    }

    #[inline]
    pub const fn raw(&self) -> u2 {
        self.0
    }
}

/// Named shared peripheral interrupts.
#[derive(Debug, Eq, PartialEq, Clone, Copy, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum PeripheralIrq {
    SystemTimer0 = 0,
    SystemTimer1 = 1,
    SystemTimer2 = 2,
    SystemTimer3 = 3,
    /// UART1 (mini UART), SPI1 and SPI2.
    Aux = 29,
    Gpio0 = 49,
    Gpio1 = 50,
    Gpio2 = 51,
    Gpio3 = 52,
    I2c = 53,
    Spi = 54,
    Pcm = 55,
    /// PL011 UART0.
    Uart = 57,
}

/// ARM specific interrupts of the basic bank.
#[derive(Debug, Eq, PartialEq, Clone, Copy, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum BasicIrq {
    ArmTimer = 0,
    ArmMailbox = 1,
    Doorbell0 = 2,
    Doorbell1 = 3,
    Gpu0Halted = 4,
    Gpu1Halted = 5,
    AccessError1 = 6,
    AccessError0 = 7,
}

impl BasicIrq {
    #[inline]
    pub const fn mask(&self) -> u32 {
        1 << (*self as u32)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Bank {
    /// Interrupt IDs 0 to 31.
    Bank1,
    /// Interrupt IDs 32 to 63.
    Bank2,
}

/// Bank and bit position of a shared peripheral interrupt.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IrqBit {
    bank: Bank,
    bit: u32,
}

impl IrqBit {
    pub const fn new(id: usize) -> Result<Self, InvalidInterruptId> {
        if id >= NUM_PERIPHERAL_IRQS {
            return Err(InvalidInterruptId(id));
        }
        if id < 32 {
            Ok(Self {
                bank: Bank::Bank1,
                bit: id as u32,
            })
        } else {
            Ok(Self {
                bank: Bank::Bank2,
                bit: (id - 32) as u32,
            })
        }
    }

    #[inline]
    pub const fn bank(&self) -> Bank {
        self.bank
    }

    #[inline]
    pub const fn bit(&self) -> u32 {
        self.bit
    }

    /// Single bit mask inside the bank register.
    #[inline]
    pub const fn mask(&self) -> u32 {
        1 << self.bit
    }

    #[inline]
    pub const fn id(&self) -> usize {
        match self.bank {
            Bank::Bank1 => self.bit as usize,
            Bank::Bank2 => self.bit as usize + 32,
        }
    }
}

impl From<PeripheralIrq> for IrqBit {
    fn from(irq: PeripheralIrq) -> Self {
        let id = irq as u32;
        if id < 32 {
            Self {
                bank: Bank::Bank1,
                bit: id,
            }
        } else {
            Self {
                bank: Bank::Bank2,
                bit: id - 32,
            }
        }
    }
}

/// Iterator over the IDs of the pending shared peripheral interrupts, in ascending order.
#[derive(Debug, Clone)]
pub struct PendingIrqs {
    bitmask: u64,
}

impl PendingIrqs {
    pub const fn new(bitmask: u64) -> Self {
        Self { bitmask }
    }
}

impl Iterator for PendingIrqs {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        if self.bitmask == 0 {
            return None;
        }
        let next = self.bitmask.trailing_zeros();
        self.bitmask &= !(1 << next);
        Some(next as usize)
    }
}

/// Generic timer interrupt source of a core.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TimerSource {
    PhysicalSecure,
    PhysicalNonSecure,
    Hypervisor,
    Virtual,
}

impl TimerSource {
    /// Set or clear the IRQ enable bit of this source.
    pub const fn apply(&self, ctrl: TimerIntControl, enable: bool) -> TimerIntControl {
        match self {
            TimerSource::PhysicalSecure => ctrl.with_cntps_irq(enable),
            TimerSource::PhysicalNonSecure => ctrl.with_cntpns_irq(enable),
            TimerSource::Hypervisor => ctrl.with_cnthp_irq(enable),
            TimerSource::Virtual => ctrl.with_cntv_irq(enable),
        }
    }

    /// Pending state of this source in a core interrupt source register.
    pub const fn is_pending(&self, source: CoreIrqSource) -> bool {
        match self {
            TimerSource::PhysicalSecure => source.cntps(),
            TimerSource::PhysicalNonSecure => source.cntpns(),
            TimerSource::Hypervisor => source.cnthp(),
            TimerSource::Virtual => source.cntv(),
        }
    }
}

/// Driver for the VideoCore interrupt controller.
pub struct PeripheralInterruptController {
    regs: MmioPeriphIntc<'static>,
}

impl PeripheralInterruptController {
    #[inline]
    pub const fn new(regs: MmioPeriphIntc<'static>) -> Self {
        Self { regs }
    }

    /// Create the driver with the fixed MMIO instance.
    ///
    /// # Safety
    ///
    /// Circumvents ownership checks.
    #[inline]
    pub unsafe fn steal() -> Self {
        Self::new(unsafe { PeriphIntc::new_mmio_fixed() })
    }

    /// Disable all peripheral and basic interrupts.
    ///
    /// This has to be called before any interrupt is enabled to start from a known state.
    pub fn init(&mut self) {
        self.regs.write_disable_1(DISABLE_ALL);
        self.regs.write_disable_2(DISABLE_ALL);
        self.regs.write_disable_basic(DISABLE_ALL);
    }

    /// Enable a shared peripheral interrupt. IDs above 63 are a fatal error.
    #[inline]
    pub fn enable(&mut self, id: usize) {
        self.enable_bit(fatal_unwrap!(IrqBit::new(id)));
    }

    /// Disable a shared peripheral interrupt. IDs above 63 are a fatal error.
    #[inline]
    pub fn disable(&mut self, id: usize) {
        self.disable_bit(fatal_unwrap!(IrqBit::new(id)));
    }

    #[inline]
    pub fn enable_irq(&mut self, irq: PeripheralIrq) {
        self.enable_bit(irq.into());
    }

    #[inline]
    pub fn disable_irq(&mut self, irq: PeripheralIrq) {
        self.disable_bit(irq.into());
    }

    /// Write a single set bit to the enable register of the bank. The hardware ORs it into the
    /// enabled interrupts, so enabling an enabled interrupt has no effect.
    pub fn enable_bit(&mut self, irq: IrqBit) {
        match irq.bank() {
            Bank::Bank1 => self.regs.write_enable_1(irq.mask()),
            Bank::Bank2 => self.regs.write_enable_2(irq.mask()),
        }
    }

    /// Write a single set bit to the disable register of the bank. This is a single store, the
    /// enable register is never read, so no critical section is required.
    pub fn disable_bit(&mut self, irq: IrqBit) {
        match irq.bank() {
            Bank::Bank1 => self.regs.write_disable_1(irq.mask()),
            Bank::Bank2 => self.regs.write_disable_2(irq.mask()),
        }
    }

    #[inline]
    pub fn enable_basic(&mut self, irq: BasicIrq) {
        self.regs.write_enable_basic(irq.mask());
    }

    #[inline]
    pub fn disable_basic(&mut self, irq: BasicIrq) {
        self.regs.write_disable_basic(irq.mask());
    }

    /// Enabled state of an interrupt, read back from the enable register of its bank.
    pub fn is_enabled(&self, irq: IrqBit) -> bool {
        let enabled = match irq.bank() {
            Bank::Bank1 => self.regs.read_enable_1(),
            Bank::Bank2 => self.regs.read_enable_2(),
        };
        enabled & irq.mask() != 0
    }

    /// Pending shared peripheral interrupts. Bank 1 in the lower 32 bits, bank 2 in the upper 32
    /// bits.
    #[inline]
    pub fn pending(&self) -> u64 {
        ((self.regs.read_pending_2() as u64) << 32) | self.regs.read_pending_1() as u64
    }

    #[inline]
    pub fn pending_irqs(&self) -> PendingIrqs {
        PendingIrqs::new(self.pending())
    }

    #[inline]
    pub fn basic_pending(&self) -> BasicPending {
        self.regs.read_basic_pending()
    }
}

/// Driver for the ARM local interrupt controller.
pub struct LocalInterruptController {
    regs: MmioLocalIntc<'static>,
}

impl LocalInterruptController {
    #[inline]
    pub const fn new(regs: MmioLocalIntc<'static>) -> Self {
        Self { regs }
    }

    /// Create the driver with the fixed MMIO instance.
    ///
    /// # Safety
    ///
    /// Circumvents ownership checks.
    #[inline]
    pub unsafe fn steal() -> Self {
        Self::new(unsafe { LocalIntc::new_mmio_fixed() })
    }

    /// Route the GPU IRQ line, which carries all shared peripheral interrupts, to one core.
    /// The GPU FIQ line is routed to core 0.
    #[inline]
    pub fn route_gpu_irq(&mut self, core: CoreId) {
        self.regs
            .write_gpu_int_routing(GpuIntRouting::DEFAULT.with_irq_core(core.raw()));
    }

    /// Core which currently receives the GPU IRQ line.
    #[inline]
    pub fn gpu_irq_core(&mut self) -> CoreId {
        CoreId(self.regs.read_gpu_int_routing().irq_core())
    }

    /// Enable the IRQ of one generic timer source for a core. The other sources of the core
    /// are preserved.
    pub fn enable_timer_interrupt(&mut self, core: CoreId, source: TimerSource) {
        fatal_unwrap!(
            self.regs
                .modify_timer_int_ctrl(core.index(), |ctrl| source.apply(ctrl, true))
        );
    }

    /// Disable the IRQ of one generic timer source for a core.
    pub fn disable_timer_interrupt(&mut self, core: CoreId, source: TimerSource) {
        fatal_unwrap!(
            self.regs
                .modify_timer_int_ctrl(core.index(), |ctrl| source.apply(ctrl, false))
        );
    }

    #[inline]
    pub fn timer_interrupt_control(&mut self, core: CoreId) -> TimerIntControl {
        fatal_unwrap!(self.regs.read_timer_int_ctrl(core.index()))
    }

    /// IRQ sources which are currently pending for a core.
    #[inline]
    pub fn irq_pending(&self, core: CoreId) -> CoreIrqSource {
        fatal_unwrap!(self.regs.read_irq_pending(core.index()))
    }

    #[inline]
    pub fn fiq_pending(&self, core: CoreId) -> CoreIrqSource {
        fatal_unwrap!(self.regs.read_fiq_pending(core.index()))
    }

    /// IRQ pending state of one generic timer source of a core.
    #[inline]
    pub fn timer_irq_pending(&self, core: CoreId, source: TimerSource) -> bool {
        source.is_pending(self.irq_pending(core))
    }

    /// Clear a stale interrupt flag of the local timer.
    #[inline]
    pub fn clear_local_timer_interrupt(&mut self) {
        self.regs.write_local_timer_clear_reload(
            LocalTimerClearReload::DEFAULT.with_clear_interrupt(true),
        );
    }
}

/// Interrupt controller configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IntcConfig {
    pub priority_levels: PriorityLevels,
    /// Core which receives all shared peripheral interrupts.
    pub gpu_irq_core: CoreId,
}

impl IntcConfig {
    /// 32 priority levels, shared peripheral interrupts routed to core 0.
    pub const fn new() -> Self {
        Self {
            priority_levels: PriorityLevels::LEVELS_32,
            gpu_irq_core: CoreId::CORE_0,
        }
    }

    pub const fn with_priority_levels(mut self, levels: PriorityLevels) -> Self {
        self.priority_levels = levels;
        self
    }

    pub const fn with_gpu_irq_core(mut self, core: CoreId) -> Self {
        self.gpu_irq_core = core;
        self
    }
}

impl Default for IntcConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Combines both interrupt controllers of the SoC with the GIC stand-in required by the kernel
/// port.
///
/// The flow of using this manager is as follows:
///
/// 1. Create it with [Self::new_with_init], which runs [Self::init]: all peripheral interrupts
///    are disabled, the virtual GIC is primed, the GPU interrupt line is routed to the configured
///    core and a stale local timer interrupt is cleared.
/// 2. Enable and disable interrupts with [Self::enable] and [Self::disable] at any time.
pub struct InterruptManager {
    vgic: VirtualPriorityController,
    periph: PeripheralInterruptController,
    local: LocalInterruptController,
}

impl InterruptManager {
    /// Create the manager without performing any initialization.
    pub const fn new(
        vgic: VirtualPriorityController,
        periph: PeripheralInterruptController,
        local: LocalInterruptController,
    ) -> Self {
        Self {
            vgic,
            periph,
            local,
        }
    }

    /// Create the manager and call [Self::init].
    pub fn new_with_init(
        vgic: VirtualPriorityController,
        periph: PeripheralInterruptController,
        local: LocalInterruptController,
        config: &IntcConfig,
    ) -> Self {
        let mut manager = Self::new(vgic, periph, local);
        manager.init(config);
        manager
    }

    /// Create the manager for the fixed hardware register blocks and the given virtual GIC
    /// block, and call [Self::init].
    ///
    /// # Safety
    ///
    /// Circumvents ownership checks for the interrupt controller register blocks.
    pub unsafe fn steal_with_init(vgic: MmioVirtualGic<'static>, config: &IntcConfig) -> Self {
        Self::new_with_init(
            VirtualPriorityController::new(vgic),
            unsafe { PeripheralInterruptController::steal() },
            unsafe { LocalInterruptController::steal() },
            config,
        )
    }

    /// Boot sequence. Has to be called once before the scheduler starts.
    pub fn init(&mut self, config: &IntcConfig) {
        self.periph.init();
        self.vgic.init_with_levels(config.priority_levels);
        self.route_all_to_core(config.gpu_irq_core.index());
        self.local.clear_local_timer_interrupt();
        ::log::info!(
            "interrupt controllers initialized, shared interrupts routed to core {}",
            config.gpu_irq_core.index()
        );
    }

    /// Route all shared peripheral interrupts to one core. Core indexes above 3 are a fatal
    /// error.
    pub fn route_all_to_core(&mut self, core: usize) {
        self.local.route_gpu_irq(fatal_unwrap!(CoreId::new(core)));
    }

    /// Enable a shared peripheral interrupt. IDs above 63 are a fatal error.
    #[inline]
    pub fn enable(&mut self, id: usize) {
        self.periph.enable(id);
    }

    /// Disable a shared peripheral interrupt. IDs above 63 are a fatal error.
    #[inline]
    pub fn disable(&mut self, id: usize) {
        self.periph.disable(id);
    }

    #[inline]
    pub fn vgic(&mut self) -> &mut VirtualPriorityController {
        &mut self.vgic
    }

    #[inline]
    pub fn periph(&mut self) -> &mut PeripheralInterruptController {
        &mut self.periph
    }

    #[inline]
    pub fn local(&mut self) -> &mut LocalInterruptController {
        &mut self.local
    }
}
