//! # Kernel port glue for the BCM2837
//!
//! The real-time kernel port for Cortex-A cores expects a GIC. This crate provides everything
//! the port needs on the BCM2837 instead:
//!
//! - The `bcm2837_virtual_gic` symbol, a [bcm2837_hal::pac::vgic::VirtualGic] block which the
//!   port uses as its GIC CPU interface and distributor priority table.
//! - The `vConfigureTickInterrupt` and `vClearTickInterrupt` hooks, which arm and acknowledge
//!   the tick of the generic timer.
//! - Forwarding of fatal assertions to the `vAssertCalled` handler of the kernel.
//!
//! The hardware independent part is the [Port], which can be used with any
//! [HardwareClock]. The exported symbols and the [init] function are only available on ARM
//! targets.
#![no_std]

use bcm2837_hal::{
    generic_timer::HardwareClock,
    intc::{
        InterruptManager, IntcConfig, LocalInterruptController, PeripheralInterruptController,
    },
    pac::vgic::MmioVirtualGic,
    tick::{TickConfig, TickTimer},
    vgic::VirtualPriorityController,
};

#[cfg(target_arch = "arm")]
mod hooks;
#[cfg(target_arch = "arm")]
pub use hooks::*;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct PortConfig {
    pub intc: IntcConfig,
    pub tick: TickConfig,
}

impl PortConfig {
    /// 32 priority levels, 1000 Hz tick from the 19.2 MHz physical timer of core 0, all
    /// interrupts routed to core 0.
    pub const fn new() -> Self {
        Self {
            intc: IntcConfig::new(),
            tick: TickConfig::new(),
        }
    }

    pub const fn with_intc(mut self, intc: IntcConfig) -> Self {
        self.intc = intc;
        self
    }

    pub const fn with_tick(mut self, tick: TickConfig) -> Self {
        self.tick = tick;
        self
    }
}

/// Interrupt controllers and tick timer of the kernel port.
pub struct Port<C: HardwareClock> {
    intc: InterruptManager,
    tick: TickTimer<C>,
}

impl<C: HardwareClock> Port<C> {
    /// Run the interrupt controller boot sequence. The tick is armed later with
    /// [Self::setup_tick].
    pub fn new_with_init(
        vgic: VirtualPriorityController,
        periph: PeripheralInterruptController,
        local: LocalInterruptController,
        clock: C,
        config: &PortConfig,
    ) -> Self {
        if config.tick.core != config.intc.gpu_irq_core {
            ::log::warn!(
                "tick serviced by core {}, shared interrupts routed to core {}",
                config.tick.core.index(),
                config.intc.gpu_irq_core.index()
            );
        }
        Self {
            intc: InterruptManager::new_with_init(vgic, periph, local, &config.intc),
            tick: TickTimer::new(clock, config.tick),
        }
    }

    /// Create the port for the fixed hardware register blocks.
    ///
    /// # Safety
    ///
    /// Circumvents ownership checks for the interrupt controller register blocks.
    pub unsafe fn steal_with_init(
        vgic: MmioVirtualGic<'static>,
        clock: C,
        config: &PortConfig,
    ) -> Self {
        Self::new_with_init(
            VirtualPriorityController::new(vgic),
            unsafe { PeripheralInterruptController::steal() },
            unsafe { LocalInterruptController::steal() },
            clock,
            config,
        )
    }

    /// Arm the kernel tick. Has to be called once, before the first context switch.
    #[inline]
    pub fn setup_tick(&mut self) {
        self.tick.setup(self.intc.local());
    }

    /// Schedule the next tick. Called once per tick from the kernel interrupt entry.
    #[inline]
    pub fn acknowledge_tick(&mut self) {
        self.tick.acknowledge();
    }

    #[inline]
    pub fn enable_interrupt(&mut self, id: usize) {
        self.intc.enable(id);
    }

    #[inline]
    pub fn disable_interrupt(&mut self, id: usize) {
        self.intc.disable(id);
    }

    #[inline]
    pub fn intc(&mut self) -> &mut InterruptManager {
        &mut self.intc
    }

    #[inline]
    pub fn tick(&mut self) -> &mut TickTimer<C> {
        &mut self.tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bcm2837_hal::{
        generic_timer::TimerControl,
        intc::{CoreId, PeripheralIrq},
        pac::{local_intc::LocalIntc, periph_intc::PeriphIntc, vgic::VirtualGic},
        time::Hertz,
    };

    struct FakeClock {
        counter: u64,
        compare: u64,
        control: TimerControl,
    }

    impl HardwareClock for FakeClock {
        fn read_counter(&mut self) -> u64 {
            self.counter
        }

        fn read_compare(&mut self) -> u64 {
            self.compare
        }

        fn write_compare(&mut self, value: u64) {
            self.compare = value;
        }

        fn write_control(&mut self, control: TimerControl) {
            self.control = control;
        }
    }

    struct Storage {
        vgic: VirtualGic,
        periph: PeriphIntc,
        local: LocalIntc,
    }

    impl Storage {
        const fn new() -> Self {
            Self {
                vgic: VirtualGic::new_zeroed(),
                periph: PeriphIntc::new_zeroed(),
                local: LocalIntc::new_zeroed(),
            }
        }

        fn port(&mut self, counter: u64, config: &PortConfig) -> Port<FakeClock> {
            Port::new_with_init(
                VirtualPriorityController::new(unsafe { VirtualGic::new_mmio(&raw mut self.vgic) }),
                PeripheralInterruptController::new(unsafe {
                    PeriphIntc::new_mmio(&raw mut self.periph)
                }),
                LocalInterruptController::new(unsafe {
                    LocalIntc::new_mmio(&raw mut self.local)
                }),
                FakeClock {
                    counter,
                    compare: 0,
                    control: TimerControl::DEFAULT,
                },
                config,
            )
        }
    }

    #[test]
    fn boot_and_tick() {
        let mut storage = Storage::new();
        let mut port = storage.port(0x1000, &PortConfig::new());
        assert_eq!(port.intc().vgic().read(0), 0xF8);
        assert_eq!(port.intc().vgic().priority_mask(), 0xFF);
        assert_eq!(port.intc().local().gpu_irq_core(), CoreId::CORE_0);
        assert!(!port.tick().is_armed());

        port.setup_tick();
        assert_eq!(port.tick().clock().compare, 0x1000 + 19_200);
        assert!(port.tick().clock().control.enable());
        assert_eq!(
            port.intc()
                .local()
                .timer_interrupt_control(CoreId::CORE_0)
                .raw_value(),
            1
        );

        for _ in 0..3 {
            port.acknowledge_tick();
        }
        assert_eq!(port.tick().clock().compare, 0x1000 + 4 * 19_200);
    }

    #[test]
    fn custom_tick_rate() {
        let mut storage = Storage::new();
        let config =
            PortConfig::new().with_tick(TickConfig::new().with_tick_rate(Hertz::from_raw(100)));
        let mut port = storage.port(0, &config);
        port.setup_tick();
        assert_eq!(port.tick().period(), Some(192_000));
    }

    #[test]
    fn serial_interrupt_enable() {
        let mut storage = Storage::new();
        let mut port = storage.port(0, &PortConfig::new());
        port.enable_interrupt(PeripheralIrq::Uart as usize);
        drop(port);
        let regs = unsafe { PeriphIntc::new_mmio(&raw mut storage.periph) };
        assert_eq!(regs.read_enable_2(), 1 << 25);
        assert_eq!(regs.read_enable_1(), 0);
    }

    #[test]
    fn disable_writes_single_bit() {
        let mut storage = Storage::new();
        let mut port = storage.port(0, &PortConfig::new());
        port.disable_interrupt(3);
        drop(port);
        let regs = unsafe { PeriphIntc::new_mmio(&raw mut storage.periph) };
        assert_eq!(regs.read_disable_1(), 1 << 3);
    }

    #[test]
    #[should_panic(expected = "fatal assertion failed")]
    fn tick_acknowledge_before_setup() {
        let mut storage = Storage::new();
        let mut port = storage.port(0, &PortConfig::new());
        port.acknowledge_tick();
    }

    #[test]
    #[should_panic(expected = "fatal assertion failed")]
    fn invalid_interrupt_id() {
        let mut storage = Storage::new();
        let mut port = storage.port(0, &PortConfig::new());
        port.enable_interrupt(64);
    }
}
