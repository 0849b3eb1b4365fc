use core::fmt;

use crate::bus::Bus;
use crate::chip::Config;
use crate::memory::Memory;

/// UART receive buffer register.
pub const UART_RBR: u32 = 0;
/// UART transmit holding register.
pub const UART_THR: u32 = 1;
/// UART line control register.
pub const UART_LCR: u32 = 3;
/// UART receive FIFO fill level.
pub const UART_RFBR: u32 = 5;
/// UART transmit FIFO free space.
pub const UART_TFBF: u32 = 6;

/// `UART_LCR`: 8 data bits, no parity, 1 stop bit.
pub const LCR_8N1: u8 = 0x03;

const TX_FIFO_READY: u8 = 8;
const TX_FIFO_EMPTY: u8 = 15;
// The free-space count reads as drained before the last byte leaves the
// shift register.
const DRAIN_SPINS: u32 = 200;

/// Blocking byte channel the console runs on.
pub trait Serial {
    /// Wait for a byte and return it.
    fn read_char(&mut self) -> u8;

    /// Wait for room and send a byte as is.
    fn write_char(&mut self, byte: u8);

    /// Wait until everything written so far has left the chip.
    fn flush(&mut self) {}
}

impl<S: Serial + ?Sized> Serial for &mut S {
    fn read_char(&mut self) -> u8 {
        (**self).read_char()
    }

    fn write_char(&mut self, byte: u8) {
        (**self).write_char(byte)
    }

    fn flush(&mut self) {
        (**self).flush()
    }
}

/// Text output on a [`Serial`], translating `\n` to `\r\n`.
pub struct TextWriter<'a, S: Serial + ?Sized> {
    serial: &'a mut S,
}

impl<'a, S: Serial + ?Sized> TextWriter<'a, S> {
    /// Wrap a serial channel.
    pub fn new(serial: &'a mut S) -> Self {
        Self { serial }
    }
}

impl<S: Serial + ?Sized> fmt::Write for TextWriter<'_, S> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.serial.write_char(b'\r');
            }
            self.serial.write_char(byte);
        }
        Ok(())
    }
}

/// The controller's memory-mapped UART.
pub struct Uart<B: Bus> {
    mem: Memory<B>,
    base: u32,
}

impl<B: Bus> Uart<B> {
    /// Driver for the UART of the given chip, if it has a known one.
    pub fn new(mem: Memory<B>, config: &Config) -> Option<Self> {
        config.uart_base.map(|base| Self { mem, base })
    }

    fn reg(&mut self, offset: u32) -> u8 {
        self.mem.read_byte(self.base + offset)
    }
}

impl<B: Bus> Serial for Uart<B> {
    fn read_char(&mut self) -> u8 {
        while self.reg(UART_RFBR) < 1 {
            core::hint::spin_loop();
        }
        self.reg(UART_RBR)
    }

    fn write_char(&mut self, byte: u8) {
        while self.reg(UART_TFBF) < TX_FIFO_READY {
            core::hint::spin_loop();
        }
        self.mem.write_byte(self.base + UART_THR, byte);
    }

    fn flush(&mut self) {
        while self.reg(UART_TFBF) < TX_FIFO_EMPTY {
            core::hint::spin_loop();
        }
        for _ in 0..DRAIN_SPINS {
            core::hint::spin_loop();
        }
    }
}
