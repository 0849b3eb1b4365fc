use core::fmt;

use crate::bus::Bus;
use crate::chip::Config;

/// Highest address accepted by the console.
pub const ADDR_MAX: u32 = 0xff_ffff;

/// Start of the IDATA region.
pub const IDATA_BASE: u32 = 0x20_0000;
/// Start of the PDATA region.
pub const PDATA_BASE: u32 = 0x30_0000;
/// Start of the CODE region.
pub const CODE_BASE: u32 = 0x40_0000;
/// Start of the side-band (SFR) region.
pub const SFR_BASE: u32 = 0xc0_0000;
/// Bits of an address shown next to its region name.
pub const OFFSET_MASK: u32 = 0x1f_ffff;

/// Named subdivision of the flat address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// External data memory
    Xdata,
    /// Internal data memory
    Idata,
    /// Paged external data memory
    Pdata,
    /// Code memory
    Code,
    /// Special function registers
    Sfr,
}

impl Region {
    /// Name printed by the console.
    pub const fn name(self) -> &'static str {
        match self {
            Region::Xdata => "XDATA",
            Region::Idata => "IDATA",
            Region::Pdata => "PDATA",
            Region::Code => "CODE",
            Region::Sfr => "SFR",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Classify an address. Independent of the chip variant.
pub const fn region_of(addr: u32) -> Region {
    if addr < IDATA_BASE {
        Region::Xdata
    } else if addr < PDATA_BASE {
        Region::Idata
    } else if addr < CODE_BASE {
        Region::Pdata
    } else if addr < SFR_BASE {
        Region::Code
    } else {
        Region::Sfr
    }
}

/// How the data window is moved over the paged range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paging {
    /// Single 64 KiB window, no page-select register.
    Unified,
    /// Page-select register holds bits 16..24 of the address.
    Banked,
}

/// Per-variant layout of the flat address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryMap {
    /// How paged addresses reach the data window.
    pub paging: Paging,
    /// Addresses below this go through the data window.
    pub paging_threshold: u32,
    /// Addresses at or above this are side-band registers.
    pub sideband_threshold: u32,
}

impl MemoryMap {
    /// Map of chips with a page-select register.
    pub const BANKED: MemoryMap = MemoryMap {
        paging: Paging::Banked,
        paging_threshold: CODE_BASE,
        sideband_threshold: SFR_BASE,
    };

    /// Map of chips with unified 16-bit addressing.
    pub const UNIFIED: MemoryMap = MemoryMap {
        paging: Paging::Unified,
        ..MemoryMap::BANKED
    };
}

/// Side-band register bit that must be set to reach an address band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerGate {
    /// First gated address.
    pub start: u32,
    /// One past the last gated address.
    pub end: u32,
    /// Side-band register holding the power-control bit.
    pub register: u8,
    /// Power-control bit.
    pub mask: u8,
}

impl PowerGate {
    fn covers(&self, addr: u32) -> bool {
        (self.start..self.end).contains(&addr)
    }
}

/// Byte and word access to the flat 24-bit address space.
///
/// None of the accessors fail: unmapped addresses read as zero and writes to
/// them are dropped. Range checks belong to the caller.
///
/// Paged accesses save the page-select register, move the window and restore
/// the register afterwards. The sequence is not atomic, so `Memory` must not
/// be used from interrupt handlers while the main loop may be inside an
/// access.
pub struct Memory<B: Bus> {
    bus: B,
    map: MemoryMap,
    power_gate: Option<PowerGate>,
}

impl<B: Bus> Memory<B> {
    /// Create the access layer for the resolved chip configuration.
    pub fn new(bus: B, config: &Config) -> Self {
        Self::with_map(bus, config.map, config.power_gate)
    }

    /// Create the access layer with an explicit memory map.
    pub fn with_map(bus: B, map: MemoryMap, power_gate: Option<PowerGate>) -> Self {
        Self {
            bus,
            map,
            power_gate,
        }
    }

    /// Memory map in use.
    pub fn map(&self) -> &MemoryMap {
        &self.map
    }

    /// Underlying bus.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Underlying bus, mutably.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Read one byte.
    pub fn read_byte(&mut self, addr: u32) -> u8 {
        self.gated(addr, |mem| {
            if addr < mem.map.paging_threshold {
                match mem.window(addr) {
                    Some((page, offset)) => mem.paged(page, |bus| bus.load(offset)),
                    None => 0,
                }
            } else if addr < mem.map.sideband_threshold {
                mem.bus.read_code(addr - mem.map.paging_threshold)
            } else {
                mem.bus.get_register(addr as u8)
            }
        })
    }

    /// Write one byte. Code space is read-only.
    pub fn write_byte(&mut self, addr: u32, value: u8) {
        self.gated(addr, |mem| {
            if addr < mem.map.paging_threshold {
                if let Some((page, offset)) = mem.window(addr) {
                    mem.paged(page, |bus| bus.store(offset, value));
                }
            } else if addr >= mem.map.sideband_threshold {
                mem.bus.set_register(addr as u8, value);
            }
        })
    }

    /// Read a little-endian 32-bit word.
    pub fn read_word(&mut self, addr: u32) -> u32 {
        let mut bytes = [0u8; 4];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = self.read_byte(addr.wrapping_add(i as u32));
        }
        u32::from_le_bytes(bytes)
    }

    /// Write a little-endian 32-bit word.
    pub fn write_word(&mut self, addr: u32, value: u32) {
        for (i, byte) in value.to_le_bytes().into_iter().enumerate() {
            self.write_byte(addr.wrapping_add(i as u32), byte);
        }
    }

    /// Hand control to the hardware reset. Never returns.
    pub fn halt(&mut self) -> ! {
        self.bus.halt()
    }

    fn window(&self, addr: u32) -> Option<(u8, u16)> {
        let page = (addr >> 16) as u8;
        match self.map.paging {
            Paging::Unified if page != 0 => None,
            _ => Some((page, addr as u16)),
        }
    }

    fn paged<T>(&mut self, page: u8, access: impl FnOnce(&mut B) -> T) -> T {
        if self.map.paging == Paging::Unified {
            return access(&mut self.bus);
        }
        let saved = self.bus.page();
        self.bus.set_page(page);
        let ret = access(&mut self.bus);
        self.bus.set_page(saved);
        ret
    }

    fn gated<T>(&mut self, addr: u32, access: impl FnOnce(&mut Self) -> T) -> T {
        match self.power_gate {
            Some(gate) if gate.covers(addr) => {
                let saved = self.bus.get_register(gate.register);
                self.bus.set_register(gate.register, saved | gate.mask);
                let ret = access(self);
                self.bus.set_register(gate.register, saved);
                ret
            }
            _ => access(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimBus;

    fn banked() -> Memory<SimBus> {
        Memory::with_map(SimBus::new(), MemoryMap::BANKED, None)
    }

    #[test]
    fn classifies_regions() {
        assert_eq!(region_of(0x000010), Region::Xdata);
        assert_eq!(region_of(0x1f_ffff), Region::Xdata);
        assert_eq!(region_of(0x200000), Region::Idata);
        assert_eq!(region_of(0x300000), Region::Pdata);
        assert_eq!(region_of(0x700000), Region::Code);
        assert_eq!(region_of(0xbf_ffff), Region::Code);
        assert_eq!(region_of(0xd00000), Region::Sfr);
        assert_eq!(region_of(0xffff_ffff), Region::Sfr);
    }

    #[test]
    fn paged_bytes_read_back() {
        let mut mem = banked();
        for addr in [0x0, 0x10, 0xffff, 0x1_0000, 0x15_100, 0x20_0040, 0x3f_ffff] {
            mem.write_byte(addr, 0x5a);
            assert_eq!(mem.read_byte(addr), 0x5a, "addr {addr:#x}");
        }
        assert_eq!(mem.bus().peek(0x15_100), 0x5a);
    }

    #[test]
    fn page_register_is_restored() {
        let mut mem = banked();
        mem.bus_mut().state_mut().page = 0x07;
        mem.write_byte(0x12_3456, 1);
        mem.read_word(0x3f_fff0);
        let state = mem.bus().state();
        assert_eq!(state.page, 0x07);
        assert_eq!(state.page_switches, 2 * (1 + 4));
    }

    #[test]
    fn code_band_bytes_leave_page_alone() {
        let mut mem = banked();
        mem.read_word(0x3f_fffe);
        // Only the two bytes below CODE_BASE are paged.
        assert_eq!(mem.bus().state().page_switches, 2 * 2);
    }

    #[test]
    fn words_are_little_endian() {
        let mut mem = banked();
        mem.write_word(0x10, 0xdead_beef);
        assert_eq!(mem.read_byte(0x10), 0xef);
        assert_eq!(mem.read_byte(0x13), 0xde);
        assert_eq!(mem.read_word(0x10), 0xdead_beef);
    }

    #[test]
    fn unified_map_reaches_only_page_zero() {
        let mut mem = Memory::with_map(SimBus::new(), MemoryMap::UNIFIED, None);
        mem.write_byte(0x1234, 0x11);
        mem.write_byte(0x1_1234, 0x22);
        assert_eq!(mem.read_byte(0x1234), 0x11);
        assert_eq!(mem.read_byte(0x1_1234), 0);
        assert_eq!(mem.bus().state().page_switches, 0);
    }

    #[test]
    fn code_space_is_read_only() {
        let bus = SimBus::new();
        bus.load_code(0, &[0x02, 0x01, 0x00]);
        let mut mem = Memory::with_map(bus, MemoryMap::BANKED, None);
        assert_eq!(mem.read_byte(CODE_BASE), 0x02);
        assert_eq!(mem.read_byte(CODE_BASE + 1), 0x01);
        mem.write_byte(CODE_BASE, 0xff);
        assert_eq!(mem.read_byte(CODE_BASE), 0x02);
        assert_eq!(mem.read_byte(CODE_BASE + 0x10_0000), 0);

        mem.write_word(0x7f_fffc, 0xffff_ffff);
        assert_eq!(mem.read_word(0x7f_fffc), 0);
        assert_eq!(mem.bus().peek(0x7f_fffc), 0);
    }

    #[test]
    fn sideband_registers_use_low_byte() {
        let mut mem = banked();
        mem.write_byte(0xc0_0090, 0xa5);
        assert_eq!(mem.bus().sfr(0x90), 0xa5);
        assert_eq!(mem.read_byte(0xd0_0090), 0xa5);
        mem.write_word(0xc0_00a0, 0x0403_0201);
        assert_eq!(mem.bus().sfr(0xa3), 0x04);
        // Registers below 0x80 are not mapped.
        mem.write_byte(0xc0_0010, 0xff);
        assert_eq!(mem.read_byte(0xc0_0010), 0);
    }

    #[test]
    fn power_gate_is_toggled_around_gated_band() {
        let gate = PowerGate {
            start: 0x8000,
            end: 0x1_0000,
            register: 0x87,
            mask: 0x01,
        };
        let bus = SimBus::new();
        bus.lock_band(gate.start..gate.end, gate.register, gate.mask);
        bus.state_mut().sfr[0x87] = 0x80;

        let mut ungated = Memory::with_map(bus.clone(), MemoryMap::BANKED, None);
        ungated.write_byte(0x8000, 0x33);
        assert_eq!(ungated.read_byte(0x8000), 0);

        let mut mem = Memory::with_map(bus, MemoryMap::BANKED, Some(gate));
        mem.write_byte(0x8000, 0x33);
        assert_eq!(mem.read_byte(0x8000), 0x33);
        assert_eq!(mem.bus().sfr(0x87), 0x80);
    }
}
