//! # PL011 UART driver
//!
//! Blocking driver for UART0, which is used for log output. The driver configures the UART for
//! 8 data bits, no parity, one stop bit with enabled FIFOs. Pin muxing of GPIO 14 and 15 is
//! expected to be done by the boot firmware.
//!
//! The [core::fmt::Write] implementation converts `\n` to `\r\n`, the [embedded_io::Write]
//! implementation writes the raw bytes.
use core::convert::Infallible;

use arbitrary_int::u2;
use bcm2837::uart::{Control, Data, ICR_CLEAR_ALL, LineControl, MmioUart, Uart as UartRegs};

use crate::time::Hertz;

/// UART reference clock configured by the boot firmware.
pub const DEFAULT_UART_CLOCK: Hertz = Hertz::from_raw(48_000_000);
pub const DEFAULT_BAUD: u32 = 115_200;

#[derive(Debug, thiserror::Error)]
#[error("baud rate {baud} can not be generated from a {clock} Hz UART clock")]
pub struct InvalidBaudRate {
    pub clock: u32,
    pub baud: u32,
}

/// Integer and fractional baud rate divisor.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BaudDivisor {
    integer: u16,
    fractional: u8,
}

impl BaudDivisor {
    /// Calculate the divisor for a baud rate. The divisor is `clock / (16 * baud)`, with a
    /// fractional part in units of 1/64, rounded to the nearest value.
    pub const fn new(clock: Hertz, baud: u32) -> Result<Self, InvalidBaudRate> {
        let err = InvalidBaudRate {
            clock: clock.raw(),
            baud,
        };
        if baud == 0 {
            return Err(err);
        }
        // 64 * clock / (16 * baud), rounded.
        let div_x64 = (4 * clock.raw() as u64 + baud as u64 / 2) / baud as u64;
        let integer = div_x64 >> 6;
        if integer == 0 || integer > u16::MAX as u64 {
            return Err(err);
        }
        Ok(Self {
            integer: integer as u16,
            fractional: (div_x64 & 0x3F) as u8,
        })
    }

    #[inline]
    pub const fn integer(&self) -> u16 {
        self.integer
    }

    #[inline]
    pub const fn fractional(&self) -> u8 {
        self.fractional
    }

    /// Baud rate which is actually generated with this divisor.
    #[inline]
    pub fn actual_baud(&self, clock: Hertz) -> f64 {
        clock.raw() as f64 / (16.0 * (self.integer as f64 + self.fractional as f64 / 64.0))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Config {
    pub clock: Hertz,
    pub baud: u32,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            clock: DEFAULT_UART_CLOCK,
            baud: DEFAULT_BAUD,
        }
    }

    pub const fn with_clock(mut self, clock: Hertz) -> Self {
        self.clock = clock;
        self
    }

    pub const fn with_baud(mut self, baud: u32) -> Self {
        self.baud = baud;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Uart {
    regs: MmioUart<'static>,
    config: Config,
    divisor: BaudDivisor,
}

impl Uart {
    /// Configure and enable the UART.
    pub fn new_with_init(
        mut regs: MmioUart<'static>,
        config: Config,
    ) -> Result<Self, InvalidBaudRate> {
        let divisor = BaudDivisor::new(config.clock, config.baud)?;
        regs.write_cr(Control::DEFAULT);
        regs.write_icr(ICR_CLEAR_ALL);
        regs.write_ibrd(divisor.integer() as u32);
        regs.write_fbrd(divisor.fractional() as u32);
        // The divisors are latched by the line control write.
        regs.write_lcrh(
            LineControl::DEFAULT
                .with_word_len(u2::new(0b11))
                .with_fifo_enable(true),
        );
        regs.write_cr(
            Control::DEFAULT
                .with_uart_enable(true)
                .with_tx_enable(true)
                .with_rx_enable(true),
        );
        Ok(Self {
            regs,
            config,
            divisor,
        })
    }

    /// UART0 at the fixed base address.
    ///
    /// # Safety
    ///
    /// Circumvents ownership checks.
    pub unsafe fn steal_with_init(config: Config) -> Result<Self, InvalidBaudRate> {
        Self::new_with_init(unsafe { UartRegs::new_mmio_fixed() }, config)
    }

    /// Write one byte, waiting for space in the TX FIFO.
    #[inline]
    pub fn write_byte(&mut self, byte: u8) {
        while self.regs.read_fr().tx_fifo_full() {}
        self.regs.write_dr(Data::new_with_raw_value(byte as u32));
    }

    /// Read one byte from the RX FIFO, if one is available.
    #[inline]
    pub fn read_byte(&mut self) -> Option<u8> {
        if self.regs.read_fr().rx_fifo_empty() {
            return None;
        }
        Some(self.regs.read_dr().data())
    }

    /// Wait until all bytes were sent.
    #[inline]
    pub fn flush_blocking(&mut self) {
        while self.regs.read_fr().busy() {}
    }

    #[inline]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub const fn divisor(&self) -> BaudDivisor {
        self.divisor
    }

    #[inline]
    pub const fn regs(&mut self) -> &mut MmioUart<'static> {
        &mut self.regs
    }
}

impl embedded_io::ErrorType for Uart {
    type Error = Infallible;
}

impl embedded_io::Write for Uart {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        for byte in buf {
            self.write_byte(*byte);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.flush_blocking();
        Ok(())
    }
}

impl embedded_io::Read for Uart {
    /// Blocks until at least one byte was received, and then returns all bytes which are
    /// available without waiting.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut read = 0;
        while read == 0 {
            while let Some(byte) = self.read_byte() {
                buf[read] = byte;
                read += 1;
                if read == buf.len() {
                    break;
                }
            }
        }
        Ok(read)
    }
}

/// Pass the bytes of a string to `sink`, with every `\n` preceded by a `\r`.
pub fn translate_newlines(s: &str, mut sink: impl FnMut(u8)) {
    for byte in s.bytes() {
        if byte == b'\n' {
            sink(b'\r');
        }
        sink(byte);
    }
}

impl core::fmt::Write for Uart {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        translate_newlines(s, |byte| self.write_byte(byte));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::abs_diff_eq;

    fn uart_with_storage(storage: &mut UartRegs) -> Uart {
        Uart::new_with_init(unsafe { UartRegs::new_mmio(storage) }, Config::new()).unwrap()
    }

    #[test]
    fn divisor_for_default_config() {
        let divisor = BaudDivisor::new(DEFAULT_UART_CLOCK, DEFAULT_BAUD).unwrap();
        assert_eq!(divisor.integer(), 26);
        assert_eq!(divisor.fractional(), 3);
        assert!(abs_diff_eq!(
            divisor.actual_baud(DEFAULT_UART_CLOCK),
            115_177.0,
            epsilon = 1.0
        ));
    }

    #[test]
    fn divisor_for_9600() {
        // 48 MHz / (16 * 9600) = 312.5
        let divisor = BaudDivisor::new(DEFAULT_UART_CLOCK, 9600).unwrap();
        assert_eq!(divisor.integer(), 312);
        assert_eq!(divisor.fractional(), 32);
        assert!(abs_diff_eq!(
            divisor.actual_baud(DEFAULT_UART_CLOCK),
            9600.0,
            epsilon = 0.01
        ));
    }

    #[test]
    fn invalid_baud_rates() {
        assert!(BaudDivisor::new(DEFAULT_UART_CLOCK, 0).is_err());
        assert!(BaudDivisor::new(DEFAULT_UART_CLOCK, 4_000_000).is_err());
        assert!(BaudDivisor::new(DEFAULT_UART_CLOCK, 10).is_err());
    }

    #[test]
    fn init_sequence() {
        let mut storage = UartRegs::new_zeroed();
        let mut uart = uart_with_storage(&mut storage);
        let regs = uart.regs();
        assert_eq!(regs.read_ibrd(), 26);
        assert_eq!(regs.read_fbrd(), 3);
        assert_eq!(regs.read_lcrh().raw_value(), 0x70);
        assert_eq!(regs.read_cr().raw_value(), 0x301);
        assert_eq!(regs.read_icr(), ICR_CLEAR_ALL);
    }

    #[test]
    fn write_and_read_data_register() {
        let mut storage = UartRegs::new_zeroed();
        let mut uart = uart_with_storage(&mut storage);
        uart.write_byte(b'A');
        assert_eq!(uart.regs().read_dr().data(), b'A');
        // RX FIFO empty flag is cleared in the zeroed register block.
        assert_eq!(uart.read_byte(), Some(b'A'));
    }

    #[test]
    fn newline_translation() {
        let mut out = [0u8; 8];
        let mut len = 0;
        translate_newlines("ok\na\n", |byte| {
            out[len] = byte;
            len += 1;
        });
        assert_eq!(&out[..len], b"ok\r\na\r\n");

        len = 0;
        translate_newlines("\r", |byte| {
            out[len] = byte;
            len += 1;
        });
        assert_eq!(&out[..len], b"\r");
    }

    #[test]
    fn fmt_write_ends_with_newline() {
        use core::fmt::Write;
        let mut storage = UartRegs::new_zeroed();
        let mut uart = uart_with_storage(&mut storage);
        // The data register only keeps the last byte.
        write!(uart, "ok\n").unwrap();
        assert_eq!(uart.regs().read_dr().data(), b'\n');
        write!(uart, "ok").unwrap();
        assert_eq!(uart.regs().read_dr().data(), b'k');
    }
}
