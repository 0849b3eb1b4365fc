//! Binary bulk memory access mode.
//!
//! After the `bmo` console command answers `OK` the host talks raw bytes.
//! Every request starts with a one-byte opcode followed by little-endian
//! 32-bit fields:
//!
//! | Opcode | Fields | Response |
//! |---|---|---|
//! | `\r` exit | - | - |
//! | `R` read | address | 4 bytes of the word at address |
//! | `W` write | address, value | - |
//! | `r` memory read | address, length | `length` bytes |
//! | `w` memory write | address, length, `length` bytes | - |
//!
//! Unknown opcodes are skipped. There is no framing, checksum or
//! acknowledgement; flow control is left to the serial channel.

use log::{debug, trace};

use crate::bus::Bus;
use crate::memory::{Memory, Paging};
use crate::serial::Serial;

/// Leave bulk mode.
pub const OP_EXIT: u8 = b'\r';
/// Read one word.
pub const OP_READ: u8 = b'R';
/// Write one word.
pub const OP_WRITE: u8 = b'W';
/// Read a block of bytes.
pub const OP_MEM_READ: u8 = b'r';
/// Write a block of bytes.
pub const OP_MEM_WRITE: u8 = b'w';

/// Request opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Leave bulk mode
    Exit,
    /// Read one word
    Read,
    /// Write one word
    Write,
    /// Read a block of bytes
    MemRead,
    /// Write a block of bytes
    MemWrite,
}

impl Opcode {
    /// Decode an opcode byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            OP_EXIT => Some(Opcode::Exit),
            OP_READ => Some(Opcode::Read),
            OP_WRITE => Some(Opcode::Write),
            OP_MEM_READ => Some(Opcode::MemRead),
            OP_MEM_WRITE => Some(Opcode::MemWrite),
            _ => None,
        }
    }
}

/// Little-endian u32 assembled one byte at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Field {
    value: u32,
    count: u8,
}

impl Field {
    fn push(&mut self, byte: u8) -> Option<u32> {
        self.value |= (byte as u32) << (8 * self.count);
        self.count += 1;
        (self.count == 4).then_some(self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Address(Opcode, Field),
    Value(u32, Field),
    Length(Opcode, u32, Field),
    Data { addr: u32, remaining: u32 },
}

/// Whether the session continues after a byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep feeding bytes.
    Continue,
    /// The host sent the exit opcode.
    Exit,
}

/// One bulk mode session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkSession {
    state: State,
    word_reads: bool,
}

impl BulkSession {
    /// New session. Block reads go by words on banked chips and by bytes
    /// on chips with unified addressing.
    pub fn new<B: Bus>(mem: &Memory<B>) -> Self {
        Self {
            state: State::Idle,
            word_reads: mem.map().paging == Paging::Banked,
        }
    }

    /// Whether the session is between requests.
    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    /// Serve requests from `serial` until the host exits.
    pub fn run<B: Bus, S: Serial + ?Sized>(mut self, mem: &mut Memory<B>, serial: &mut S) {
        debug!("bulk mode entered");
        loop {
            let byte = serial.read_char();
            if self.feed(byte, mem, serial) == Flow::Exit {
                break;
            }
        }
        debug!("bulk mode left");
    }

    /// Advance the session by one received byte.
    pub fn feed<B: Bus, S: Serial + ?Sized>(
        &mut self,
        byte: u8,
        mem: &mut Memory<B>,
        serial: &mut S,
    ) -> Flow {
        self.state = match self.state {
            State::Idle => match Opcode::from_byte(byte) {
                Some(Opcode::Exit) => return Flow::Exit,
                Some(op) => State::Address(op, Field::default()),
                None => {
                    trace!("ignoring bulk byte {:#04x}", byte);
                    State::Idle
                }
            },
            State::Address(op, mut field) => match field.push(byte) {
                None => State::Address(op, field),
                Some(addr) => match op {
                    Opcode::Read => {
                        for byte in mem.read_word(addr).to_le_bytes() {
                            serial.write_char(byte);
                        }
                        State::Idle
                    }
                    Opcode::Write => State::Value(addr, Field::default()),
                    _ => State::Length(op, addr, Field::default()),
                },
            },
            State::Value(addr, mut field) => match field.push(byte) {
                None => State::Value(addr, field),
                Some(value) => {
                    mem.write_word(addr, value);
                    State::Idle
                }
            },
            State::Length(op, addr, mut field) => match field.push(byte) {
                None => State::Length(op, addr, field),
                Some(len) if op == Opcode::MemRead => {
                    self.send_block(addr, len, mem, serial);
                    State::Idle
                }
                Some(0) => State::Idle,
                Some(len) => State::Data {
                    addr,
                    remaining: len,
                },
            },
            State::Data { addr, remaining } => {
                mem.write_byte(addr, byte);
                match remaining - 1 {
                    0 => State::Idle,
                    remaining => State::Data {
                        addr: addr.wrapping_add(1),
                        remaining,
                    },
                }
            }
        };
        Flow::Continue
    }

    fn send_block<B: Bus, S: Serial + ?Sized>(
        &self,
        addr: u32,
        len: u32,
        mem: &mut Memory<B>,
        serial: &mut S,
    ) {
        trace!("bulk read {:#x} bytes at {:#x}", len, addr);
        let mut offset = 0;
        if self.word_reads {
            while len - offset >= 4 {
                for byte in mem.read_word(addr.wrapping_add(offset)).to_le_bytes() {
                    serial.write_char(byte);
                }
                offset += 4;
            }
        }
        while offset < len {
            serial.write_char(mem.read_byte(addr.wrapping_add(offset)));
            offset += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryMap;
    use crate::sim::{ScriptedSerial, SimBus};

    fn request(op: u8, fields: &[u32]) -> Vec<u8> {
        let mut bytes = vec![op];
        for field in fields {
            bytes.extend_from_slice(&field.to_le_bytes());
        }
        bytes
    }

    fn serve(mem: &mut Memory<SimBus>, input: &[u8]) -> Vec<u8> {
        let mut serial = ScriptedSerial::new();
        serial.push(input);
        serial.push(&[OP_EXIT]);
        BulkSession::new(mem).run(mem, &mut serial);
        assert_eq!(serial.pending(), 0);
        serial.output().to_vec()
    }

    fn banked() -> Memory<SimBus> {
        Memory::with_map(SimBus::new(), MemoryMap::BANKED, None)
    }

    #[test]
    fn word_write_then_read() {
        let mut mem = banked();
        let mut input = request(OP_WRITE, &[0x10, 0xdead_beef]);
        input.extend(request(OP_READ, &[0x10]));
        assert_eq!(serve(&mut mem, &input), [0xef, 0xbe, 0xad, 0xde]);
    }

    #[test]
    fn block_write_then_read() {
        let mut mem = banked();
        let mut input = request(OP_MEM_WRITE, &[0x1_fffe, 7]);
        input.extend_from_slice(b"monitor");
        input.extend(request(OP_MEM_READ, &[0x1_fffe, 7]));
        assert_eq!(serve(&mut mem, &input), b"monitor");
        assert_eq!(mem.bus().peek(0x2_0000), b'n');
    }

    #[test]
    fn unified_block_reads_go_by_bytes() {
        let mut mem = Memory::with_map(SimBus::new(), MemoryMap::UNIFIED, None);
        mem.write_word(0x100, 0x0403_0201);
        let input = request(OP_MEM_READ, &[0x100, 3]);
        assert_eq!(serve(&mut mem, &input), [1, 2, 3]);
    }

    #[test]
    fn exit_byte_inside_a_field_is_data() {
        let mut mem = banked();
        let input = request(OP_WRITE, &[0x0d0d, 0x0d0d_0d0d]);
        assert!(serve(&mut mem, &input).is_empty());
        assert_eq!(mem.read_word(0x0d0d), 0x0d0d_0d0d);
    }

    #[test]
    fn zero_length_requests_complete_immediately() {
        let mut mem = banked();
        let mut input = request(OP_MEM_WRITE, &[0x20, 0]);
        input.extend(request(OP_MEM_READ, &[0x20, 0]));
        assert!(serve(&mut mem, &input).is_empty());
    }

    #[test]
    fn unknown_opcodes_are_ignored() {
        let mut mem = banked();
        mem.write_byte(0x40, 0x99);
        let mut input = b"xS\n".to_vec();
        input.extend(request(OP_MEM_READ, &[0x40, 1]));
        assert_eq!(serve(&mut mem, &input), [0x99]);
    }

    #[test]
    fn session_tracks_partial_requests() {
        let mut mem = banked();
        let mut serial = ScriptedSerial::new();
        let mut session = BulkSession::new(&mem);
        assert!(session.is_idle());
        assert_eq!(session.feed(OP_READ, &mut mem, &mut serial), Flow::Continue);
        assert!(!session.is_idle());
        for byte in [0, 0, 0] {
            session.feed(byte, &mut mem, &mut serial);
        }
        assert!(!session.is_idle());
        session.feed(0, &mut mem, &mut serial);
        assert!(session.is_idle());
        assert_eq!(serial.output(), [0, 0, 0, 0]);
        assert_eq!(session.feed(OP_EXIT, &mut mem, &mut serial), Flow::Exit);
    }
}
