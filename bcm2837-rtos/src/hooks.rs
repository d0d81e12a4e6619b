//! Symbols and hooks used by the kernel port.
use core::{
    cell::RefCell,
    ffi::{CStr, c_char, c_ulong},
};

use bcm2837_hal::{
    fatal, fatal_unwrap,
    generic_timer::PhysicalTimer,
    log::uart_blocking,
    pac::vgic::VirtualGic,
    uart::{self, InvalidBaudRate, Uart},
};
use critical_section::Mutex;

use crate::{Port, PortConfig};

/// GIC stand-in accessed by the kernel port.
#[unsafe(export_name = "bcm2837_virtual_gic")]
static mut VIRTUAL_GIC: VirtualGic = VirtualGic::new_zeroed();

static PORT: Mutex<RefCell<Option<Port<PhysicalTimer>>>> = Mutex::new(RefCell::new(None));

#[allow(non_snake_case)]
unsafe extern "C" {
    fn vAssertCalled(line: c_ulong, file: *const c_char);
}

fn forward_assertion(line: u32, file: &'static CStr) {
    unsafe { vAssertCalled(line as c_ulong, file.as_ptr()) };
}

/// Initialize the interrupt controllers and register the kernel assertion handler as the
/// fatal assertion hook.
///
/// Has to be called once on the designated core before the scheduler is started. Further calls
/// have no effect.
pub fn init(config: &PortConfig) {
    // A hook registered by the application takes precedence.
    let _ = fatal::set_assert_hook(forward_assertion);
    critical_section::with(|cs| {
        let mut port = PORT.borrow(cs).borrow_mut();
        if port.is_some() {
            return;
        }
        // Safety: The virtual GIC is only accessed through this port and by the kernel port,
        // and the other register blocks are owned by the port.
        port.replace(unsafe {
            Port::steal_with_init(
                VirtualGic::new_mmio(&raw mut VIRTUAL_GIC),
                PhysicalTimer::steal(),
                config,
            )
        });
    });
}

/// Route the `log` output to UART0.
pub fn init_logger(config: uart::Config, level: log::LevelFilter) -> Result<(), InvalidBaudRate> {
    // Safety: UART0 is exclusively used by the logger.
    let uart = unsafe { Uart::steal_with_init(config)? };
    uart_blocking::init_with_locks(uart, level);
    Ok(())
}

/// Enable a shared peripheral interrupt. IDs above 63 are a fatal error.
pub fn enable_interrupt(id: usize) {
    with_port(|port| port.enable_interrupt(id));
}

/// Disable a shared peripheral interrupt. IDs above 63 are a fatal error.
pub fn disable_interrupt(id: usize) {
    with_port(|port| port.disable_interrupt(id));
}

fn with_port<R>(f: impl FnOnce(&mut Port<PhysicalTimer>) -> R) -> R {
    critical_section::with(|cs| {
        let mut port = PORT.borrow(cs).borrow_mut();
        f(fatal_unwrap!(port.as_mut().ok_or(())))
    })
}

/// Arm the kernel tick. Called by the kernel before the first task is started.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub extern "C" fn vConfigureTickInterrupt() {
    with_port(|port| port.setup_tick());
}

/// Schedule the next kernel tick. Called by the kernel interrupt entry on every tick.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub extern "C" fn vClearTickInterrupt() {
    with_port(|port| port.acknowledge_tick());
}
