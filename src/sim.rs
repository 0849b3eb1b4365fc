//! In-memory stand-ins for the hardware collaborators.
//!
//! [`SimBus`] models a banked controller: a sparse 24-bit data space reached
//! through the page register, a code image, the SFR file and, optionally, the
//! FIFO registers of a memory-mapped UART. Clones share the same state, so a
//! [`Uart`](crate::Uart) and the monitor can both hold one.
//!
//! [`ScriptedSerial`] feeds the console from a byte queue and records what the
//! monitor writes back.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::{HashMap, VecDeque};
use std::ops::Range;
use std::rc::Rc;

use crate::bus::Bus;
use crate::chip::TOKEN_OFFSET;
use crate::serial::{Serial, UART_LCR, UART_RBR, UART_RFBR, UART_TFBF, UART_THR};

/// Message of the panic raised by [`SimBus::halt`].
pub const HALT_MESSAGE: &str = "simulated chip halted";

const TX_FIFO_SIZE: u8 = 16;

/// UART FIFO model.
#[derive(Debug, Default)]
pub struct SimUart {
    /// Physical data address of the register block.
    pub base: u32,
    /// Bytes waiting in the receive FIFO.
    pub rx: VecDeque<u8>,
    /// Bytes written to the transmit register.
    pub tx: Vec<u8>,
    /// Last value written to the line control register.
    pub lcr: u8,
}

/// Address band that only responds while a power-control bit is set.
#[derive(Debug, Clone)]
pub struct LockedBand {
    /// Physical data addresses covered.
    pub range: Range<u32>,
    /// SFR holding the power-control bit.
    pub register: u8,
    /// Power-control bit.
    pub mask: u8,
}

/// Complete simulated chip state.
#[derive(Debug)]
pub struct SimState {
    /// Page-select register.
    pub page: u8,
    /// Number of writes to the page-select register.
    pub page_switches: usize,
    /// Sparse data space indexed by `page << 16 | offset`.
    pub data: HashMap<u32, u8>,
    /// Code image.
    pub code: Vec<u8>,
    /// SFR file. Registers below 0x80 are unmapped.
    pub sfr: [u8; 256],
    /// Memory-mapped UART, if attached.
    pub uart: Option<SimUart>,
    /// Power-gated band, if any.
    pub locked: Option<LockedBand>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            page: 0,
            page_switches: 0,
            data: HashMap::new(),
            code: Vec::new(),
            sfr: [0; 256],
            uart: None,
            locked: None,
        }
    }
}

impl SimState {
    fn reachable(&self, addr: u32) -> bool {
        match &self.locked {
            Some(band) if band.range.contains(&addr) => self.sfr[band.register as usize] & band.mask != 0,
            _ => true,
        }
    }

    fn uart_register(&self, addr: u32) -> Option<u32> {
        let uart = self.uart.as_ref()?;
        addr.checked_sub(uart.base).filter(|offset| *offset <= UART_TFBF)
    }

    fn load(&mut self, addr: u32) -> u8 {
        if let Some(offset) = self.uart_register(addr) {
            if let Some(uart) = self.uart.as_mut() {
                return match offset {
                    UART_RBR => uart.rx.pop_front().unwrap_or(0),
                    UART_LCR => uart.lcr,
                    UART_RFBR => uart.rx.len().min(u8::MAX as usize) as u8,
                    UART_TFBF => TX_FIFO_SIZE,
                    _ => 0,
                };
            }
        }
        if !self.reachable(addr) {
            return 0;
        }
        self.data.get(&addr).copied().unwrap_or(0)
    }

    fn store(&mut self, addr: u32, value: u8) {
        if let Some(offset) = self.uart_register(addr) {
            if let Some(uart) = self.uart.as_mut() {
                match offset {
                    UART_THR => uart.tx.push(value),
                    UART_LCR => uart.lcr = value,
                    _ => {}
                }
                return;
            }
        }
        if self.reachable(addr) {
            self.data.insert(addr, value);
        }
    }
}

/// Simulated [`Bus`] with shared state.
#[derive(Debug, Clone, Default)]
pub struct SimBus {
    state: Rc<RefCell<SimState>>,
}

impl SimBus {
    /// Blank chip: all memory reads as zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Chip whose code image carries the given identification token.
    pub fn with_token(token: &[u8]) -> Self {
        let bus = Self::new();
        bus.load_code(TOKEN_OFFSET, token);
        bus
    }

    /// Borrow the state.
    pub fn state(&self) -> Ref<'_, SimState> {
        self.state.borrow()
    }

    /// Borrow the state mutably.
    pub fn state_mut(&self) -> RefMut<'_, SimState> {
        self.state.borrow_mut()
    }

    /// Copy `image` into code space at `offset`, growing it as needed.
    pub fn load_code(&self, offset: u32, image: &[u8]) {
        let mut state = self.state_mut();
        let start = offset as usize;
        let end = start + image.len();
        if state.code.len() < end {
            state.code.resize(end, 0);
        }
        state.code[start..end].copy_from_slice(image);
    }

    /// Physical data byte, bypassing paging.
    pub fn peek(&self, addr: u32) -> u8 {
        self.state().data.get(&addr).copied().unwrap_or(0)
    }

    /// Set a physical data byte, bypassing paging.
    pub fn poke(&self, addr: u32, value: u8) {
        self.state_mut().data.insert(addr, value);
    }

    /// SFR value.
    pub fn sfr(&self, addr: u8) -> u8 {
        self.state().sfr[addr as usize]
    }

    /// Make `range` respond only while `mask` is set in SFR `register`.
    pub fn lock_band(&self, range: Range<u32>, register: u8, mask: u8) {
        self.state_mut().locked = Some(LockedBand {
            range,
            register,
            mask,
        });
    }

    /// Attach a UART register block at physical address `base`.
    pub fn attach_uart(&self, base: u32) {
        self.state_mut().uart = Some(SimUart {
            base,
            ..SimUart::default()
        });
    }

    /// Queue bytes into the UART receive FIFO.
    pub fn push_uart_input(&self, bytes: &[u8]) {
        if let Some(uart) = self.state_mut().uart.as_mut() {
            uart.rx.extend(bytes);
        }
    }

    /// Number of bytes left in the UART receive FIFO.
    pub fn uart_pending(&self) -> usize {
        self.state().uart.as_ref().map_or(0, |uart| uart.rx.len())
    }

    /// Drain what the chip transmitted.
    pub fn take_uart_output(&self) -> Vec<u8> {
        self.state_mut()
            .uart
            .as_mut()
            .map(|uart| std::mem::take(&mut uart.tx))
            .unwrap_or_default()
    }
}

impl Bus for SimBus {
    fn page(&mut self) -> u8 {
        self.state().page
    }

    fn set_page(&mut self, page: u8) {
        let mut state = self.state_mut();
        state.page = page;
        state.page_switches += 1;
    }

    fn load(&mut self, offset: u16) -> u8 {
        let mut state = self.state_mut();
        let addr = (state.page as u32) << 16 | offset as u32;
        state.load(addr)
    }

    fn store(&mut self, offset: u16, value: u8) {
        let mut state = self.state_mut();
        let addr = (state.page as u32) << 16 | offset as u32;
        state.store(addr, value);
    }

    fn read_code(&mut self, offset: u32) -> u8 {
        self.state().code.get(offset as usize).copied().unwrap_or(0)
    }

    fn get_register(&mut self, addr: u8) -> u8 {
        match addr {
            0x80..=0xff => self.state().sfr[addr as usize],
            _ => 0,
        }
    }

    fn set_register(&mut self, addr: u8, value: u8) {
        if let 0x80..=0xff = addr {
            self.state_mut().sfr[addr as usize] = value;
        }
    }

    fn halt(&mut self) -> ! {
        panic!("{}", HALT_MESSAGE)
    }
}

/// [`Serial`] fed from a queue, recording everything written.
#[derive(Debug, Default)]
pub struct ScriptedSerial {
    input: VecDeque<u8>,
    output: Vec<u8>,
    flushes: usize,
}

impl ScriptedSerial {
    /// Serial port with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue input bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.input.extend(bytes);
    }

    /// Number of queued input bytes not yet read.
    pub fn pending(&self) -> usize {
        self.input.len()
    }

    /// Everything written so far.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Drain the output as text.
    pub fn take_output(&mut self) -> String {
        String::from_utf8_lossy(&std::mem::take(&mut self.output)).into_owned()
    }

    /// Number of times the monitor waited for the transmitter to drain.
    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl Serial for ScriptedSerial {
    fn read_char(&mut self) -> u8 {
        match self.input.pop_front() {
            Some(byte) => byte,
            None => panic!("scripted serial input exhausted"),
        }
    }

    fn write_char(&mut self, byte: u8) {
        self.output.push(byte);
    }

    fn flush(&mut self) {
        self.flushes += 1;
    }
}
