//! # ARM local peripherals (QA7) register module
//!
//! Per-core interrupt controller, core timer and mailboxes. Based on the "Quad-A7 control"
//! document (QA7_rev3.4) published for the BCM2836, which also applies to the BCM2837.
use arbitrary_int::{u2, u4, u28};
use static_assertions::const_assert_eq;

pub const LOCAL_INTC_BASE_ADDR: usize = 0x4000_0000;

/// Routing of the GPU (VideoCore) interrupt line. Only one core can receive the shared
/// interrupts at a time.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct GpuIntRouting {
    #[bits(2..=3, rw)]
    fiq_core: u2,
    #[bits(0..=1, rw)]
    irq_core: u2,
}

/// Core timer interrupt control. Enables the four generic timer interrupt sources of a core
/// as IRQ or FIQ. The FIQ bit has precedence over the IRQ bit.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct TimerIntControl {
    #[bit(7, rw)]
    cntv_fiq: bool,
    #[bit(6, rw)]
    cnthp_fiq: bool,
    #[bit(5, rw)]
    cntpns_fiq: bool,
    #[bit(4, rw)]
    cntps_fiq: bool,
    /// Virtual timer.
    #[bit(3, rw)]
    cntv_irq: bool,
    /// Hypervisor timer.
    #[bit(2, rw)]
    cnthp_irq: bool,
    /// Physical non-secure timer.
    #[bit(1, rw)]
    cntpns_irq: bool,
    /// Physical secure timer.
    #[bit(0, rw)]
    cntps_irq: bool,
}

/// Core interrupt source register, used for both the IRQ and the FIQ pending registers.
#[bitbybit::bitfield(u32, debug)]
pub struct CoreIrqSource {
    #[bit(11, r)]
    local_timer: bool,
    /// Only available for core 0.
    #[bit(10, r)]
    axi_outstanding: bool,
    #[bit(9, r)]
    pmu: bool,
    /// Only set for the core the GPU interrupt is routed to.
    #[bit(8, r)]
    gpu: bool,
    #[bits(4..=7, r)]
    mailbox: u4,
    #[bit(3, r)]
    cntv: bool,
    #[bit(2, r)]
    cnthp: bool,
    #[bit(1, r)]
    cntpns: bool,
    #[bit(0, r)]
    cntps: bool,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct LocalTimerControl {
    #[bit(31, r)]
    interrupt_flag: bool,
    #[bit(29, rw)]
    interrupt_enable: bool,
    #[bit(28, rw)]
    enable: bool,
    #[bits(0..=27, rw)]
    reload: u28,
}

/// Writing a one to a bit triggers the action. Reads return zero.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct LocalTimerClearReload {
    #[bit(31, rw)]
    clear_interrupt: bool,
    #[bit(30, rw)]
    reload: bool,
}

/// ARM local peripherals.
#[derive(derive_mmio::Mmio)]
#[repr(C)]
pub struct LocalIntc {
    control: u32,
    _reserved_0: u32,
    prescaler: u32,
    gpu_int_routing: GpuIntRouting,
    pm_routing_set: u32,
    pm_routing_clear: u32,
    _reserved_1: u32,
    /// Core timer, lower 32 bits.
    core_timer_lower: u32,
    /// Core timer, upper 32 bits.
    core_timer_upper: u32,
    local_int_routing: u32,
    _reserved_2: u32,
    axi_counters: u32,
    axi_irq: u32,
    local_timer_ctrl: LocalTimerControl,
    #[mmio(PureRead, Write)]
    local_timer_clear_reload: LocalTimerClearReload,
    _reserved_3: u32,
    /// Core timer interrupt control, one register per core.
    timer_int_ctrl: [TimerIntControl; 4],
    /// Mailbox interrupt control, one register per core.
    mailbox_int_ctrl: [u32; 4],
    #[mmio(PureRead)]
    irq_pending: [CoreIrqSource; 4],
    #[mmio(PureRead)]
    fiq_pending: [CoreIrqSource; 4],
    /// Mailbox write-set registers, four per core.
    mailbox_set: [u32; 16],
    /// Mailbox read and write-clear registers, four per core.
    mailbox_read_clear: [u32; 16],
}

const_assert_eq!(core::mem::size_of::<LocalIntc>(), 0x100);

impl LocalIntc {
    /// Create a new ARM local peripheral MMIO instance at the fixed base address.
    ///
    /// # Safety
    ///
    /// This API can be used to potentially create a driver to the same peripheral structure
    /// from multiple threads. The user must ensure that concurrent accesses are safe and do not
    /// interfere with each other.
    #[inline]
    pub const unsafe fn new_mmio_fixed() -> MmioLocalIntc<'static> {
        unsafe { Self::new_mmio_at(LOCAL_INTC_BASE_ADDR) }
    }

    /// Register block with all registers cleared. Can be used as the backing store of a
    /// [MmioLocalIntc] instance created with [Self::new_mmio].
    pub const fn new_zeroed() -> Self {
        Self {
            control: 0,
            _reserved_0: 0,
            prescaler: 0,
            gpu_int_routing: GpuIntRouting::new_with_raw_value(0),
            pm_routing_set: 0,
            pm_routing_clear: 0,
            _reserved_1: 0,
            core_timer_lower: 0,
            core_timer_upper: 0,
            local_int_routing: 0,
            _reserved_2: 0,
            axi_counters: 0,
            axi_irq: 0,
            local_timer_ctrl: LocalTimerControl::new_with_raw_value(0),
            local_timer_clear_reload: LocalTimerClearReload::new_with_raw_value(0),
            _reserved_3: 0,
            timer_int_ctrl: [TimerIntControl::new_with_raw_value(0); 4],
            mailbox_int_ctrl: [0; 4],
            irq_pending: [CoreIrqSource::new_with_raw_value(0); 4],
            fiq_pending: [CoreIrqSource::new_with_raw_value(0); 4],
            mailbox_set: [0; 16],
            mailbox_read_clear: [0; 16],
        }
    }

    /// Register block with preset IRQ pending registers, one entry per core, and all other
    /// registers cleared.
    pub const fn new_with_irq_pending(irq_pending: [u32; 4]) -> Self {
        let mut regs = Self::new_zeroed();
        regs.irq_pending = [
            CoreIrqSource::new_with_raw_value(irq_pending[0]),
            CoreIrqSource::new_with_raw_value(irq_pending[1]),
            CoreIrqSource::new_with_raw_value(irq_pending[2]),
            CoreIrqSource::new_with_raw_value(irq_pending[3]),
        ];
        regs
    }
}
