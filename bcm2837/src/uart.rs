//! # PL011 UART register module
//!
//! Only UART0 is a PL011 on the BCM2837. UART1 is the mini UART of the AUX block.
use arbitrary_int::u2;
use static_assertions::const_assert_eq;

pub const UART0_BASE_ADDR: usize = super::PERIPHERAL_BASE_ADDR + 0x0020_1000;

#[bitbybit::bitfield(u32, debug)]
pub struct Data {
    #[bit(11, r)]
    overrun_error: bool,
    #[bit(10, r)]
    break_error: bool,
    #[bit(9, r)]
    parity_error: bool,
    #[bit(8, r)]
    framing_error: bool,
    #[bits(0..=7, rw)]
    data: u8,
}

#[bitbybit::bitfield(u32, debug)]
pub struct Flags {
    #[bit(7, r)]
    tx_fifo_empty: bool,
    #[bit(6, r)]
    rx_fifo_full: bool,
    #[bit(5, r)]
    tx_fifo_full: bool,
    #[bit(4, r)]
    rx_fifo_empty: bool,
    #[bit(3, r)]
    busy: bool,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct LineControl {
    #[bit(7, rw)]
    stick_parity: bool,
    #[bits(5..=6, rw)]
    word_len: u2,
    #[bit(4, rw)]
    fifo_enable: bool,
    #[bit(3, rw)]
    two_stop_bits: bool,
    #[bit(2, rw)]
    even_parity: bool,
    #[bit(1, rw)]
    parity_enable: bool,
    #[bit(0, rw)]
    send_break: bool,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct Control {
    #[bit(15, rw)]
    cts_enable: bool,
    #[bit(14, rw)]
    rts_enable: bool,
    #[bit(9, rw)]
    rx_enable: bool,
    #[bit(8, rw)]
    tx_enable: bool,
    #[bit(7, rw)]
    loopback_enable: bool,
    #[bit(0, rw)]
    uart_enable: bool,
}

/// Mask to clear all interrupts with the interrupt clear register.
pub const ICR_CLEAR_ALL: u32 = 0x7FF;

/// PL011 UART registers.
#[derive(derive_mmio::Mmio)]
#[repr(C)]
pub struct Uart {
    #[mmio(Read, Write)]
    dr: Data,
    rsr_ecr: u32,
    _reserved_0: [u32; 4],
    #[mmio(PureRead)]
    fr: Flags,
    _reserved_1: u32,
    ilpr: u32,
    /// Integer baud rate divisor.
    ibrd: u32,
    /// Fractional baud rate divisor.
    fbrd: u32,
    lcrh: LineControl,
    cr: Control,
    ifls: u32,
    imsc: u32,
    #[mmio(PureRead)]
    ris: u32,
    #[mmio(PureRead)]
    mis: u32,
    #[mmio(PureRead, Write)]
    icr: u32,
    dmacr: u32,
}

const_assert_eq!(core::mem::size_of::<Uart>(), 0x4C);

impl Uart {
    /// Create a new UART0 MMIO instance at the fixed base address.
    ///
    /// # Safety
    ///
    /// This API can be used to potentially create a driver to the same peripheral structure
    /// from multiple threads. The user must ensure that concurrent accesses are safe and do not
    /// interfere with each other.
    #[inline]
    pub const unsafe fn new_mmio_fixed() -> MmioUart<'static> {
        unsafe { Self::new_mmio_at(UART0_BASE_ADDR) }
    }

    /// Register block with all registers cleared, which means an empty TX FIFO which is not
    /// full and an empty RX FIFO.
    pub const fn new_zeroed() -> Self {
        Self {
            dr: Data::new_with_raw_value(0),
            rsr_ecr: 0,
            _reserved_0: [0; 4],
            fr: Flags::new_with_raw_value(0),
            _reserved_1: 0,
            ilpr: 0,
            ibrd: 0,
            fbrd: 0,
            lcrh: LineControl::new_with_raw_value(0),
            cr: Control::new_with_raw_value(0),
            ifls: 0,
            imsc: 0,
            ris: 0,
            mis: 0,
            icr: 0,
            dmacr: 0,
        }
    }
}
