//! # Simple logging providers

use core::sync::atomic::AtomicBool;

static LOGGER_INIT_DONE: AtomicBool = AtomicBool::new(false);

/// Blocking UART logger.
pub mod uart_blocking {
    use super::*;
    use core::cell::RefCell;
    use embedded_io::Write as _;

    use critical_section::Mutex;
    use log::{LevelFilter, set_logger, set_max_level};

    use crate::uart::Uart;

    pub struct UartLoggerBlocking(Mutex<RefCell<Option<Uart>>>);

    static UART_LOGGER_BLOCKING: UartLoggerBlocking =
        UartLoggerBlocking(Mutex::new(RefCell::new(None)));

    /// Initialize the logger with a blocking UART instance.
    ///
    /// The logger writes inside a critical section, so interrupts are disabled while a log
    /// message is written to the UART. It should not be used from the tick interrupt.
    ///
    /// Only the first call has an effect.
    pub fn init_with_locks(uart: Uart, level: LevelFilter) {
        if LOGGER_INIT_DONE.swap(true, core::sync::atomic::Ordering::Relaxed) {
            return;
        }
        critical_section::with(|cs| {
            UART_LOGGER_BLOCKING.0.borrow(cs).replace(Some(uart));
        });
        // Can only fail if a different logger was set already.
        let _ = set_logger(&UART_LOGGER_BLOCKING);
        set_max_level(level);
    }

    impl log::Log for UartLoggerBlocking {
        fn enabled(&self, _metadata: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            critical_section::with(|cs| {
                if let Some(uart) = self.0.borrow(cs).borrow_mut().as_mut() {
                    let _ = writeln!(uart, "{} - {}\r", record.level(), record.args());
                }
            })
        }

        fn flush(&self) {
            critical_section::with(|cs| {
                if let Some(uart) = self.0.borrow(cs).borrow_mut().as_mut() {
                    let _ = uart.flush();
                }
            });
        }
    }
}
