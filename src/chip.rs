use log::{debug, warn};

use crate::bus::Bus;
use crate::memory::{Memory, MemoryMap, PowerGate};
use crate::serial::{LCR_8N1, UART_LCR};

/// Code-space offset of the identification token.
pub const TOKEN_OFFSET: u32 = 0x0087;
/// Length of the identification token.
pub const TOKEN_LEN: usize = 8;

/// Offset of the next-boot mode register in the CPU control block.
pub const CPU_MODE_NEXT: u32 = 0;
/// Offset of the execution control register in the CPU control block.
pub const CPU_EXEC_CTRL: u32 = 2;
/// `CPU_MODE_NEXT`: boot from code RAM. Cleared, the mask ROM reloads code from flash.
pub const CPU_MODE_CODE_RAM: u8 = 1 << 0;
/// `CPU_EXEC_CTRL`: reset the CPU.
pub const CPU_EXEC_CTRL_RESET: u8 = 1 << 0;

/// Chip variant, as determined from the identification token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// ASM1042
    Asm1042,
    /// ASM1042A
    Asm1042A,
    /// ASM1142
    Asm1142,
    /// ASM2142
    Asm2142,
    /// ASM3242
    Asm3242,
    /// Token did not match any known chip
    Unknown,
}

const KNOWN_TOKENS: [(&[u8; TOKEN_LEN], Variant); 5] = [
    (b"U2104_FW", Variant::Asm1042),
    (b"2104B_FW", Variant::Asm1042A),
    (b"2114A_FW", Variant::Asm1142),
    (b"2214A_FW", Variant::Asm2142),
    (b"2324A_FW", Variant::Asm3242),
];

impl Variant {
    /// Known variants, in identification order.
    pub const KNOWN: [Variant; 5] = [
        Variant::Asm1042,
        Variant::Asm1042A,
        Variant::Asm1142,
        Variant::Asm2142,
        Variant::Asm3242,
    ];

    /// Marketing name of the chip.
    pub const fn name(self) -> &'static str {
        match self {
            Variant::Asm1042 => "ASM1042",
            Variant::Asm1042A => "ASM1042A",
            Variant::Asm1142 => "ASM1142",
            Variant::Asm2142 => "ASM2142",
            Variant::Asm3242 => "ASM3242",
            Variant::Unknown => "UNKNOWN",
        }
    }

    /// Case-insensitive lookup by marketing name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::KNOWN
            .into_iter()
            .find(|variant| variant.name().eq_ignore_ascii_case(name))
    }

    /// Identification token embedded in this variant's firmware.
    pub fn token(self) -> Option<&'static [u8; TOKEN_LEN]> {
        KNOWN_TOKENS
            .iter()
            .find(|(_, variant)| *variant == self)
            .map(|(token, _)| *token)
    }
}

/// Read the identification token from code space.
pub fn read_token<B: Bus>(bus: &mut B) -> [u8; TOKEN_LEN] {
    let mut token = [0u8; TOKEN_LEN];
    for (i, byte) in token.iter_mut().enumerate() {
        *byte = bus.read_code(TOKEN_OFFSET + i as u32);
    }
    token
}

/// Map an identification token to a chip variant.
///
/// Only the first [`TOKEN_LEN`] bytes take part in the comparison.
pub fn identify(token: &[u8]) -> Variant {
    let Some(token) = token.get(..TOKEN_LEN) else {
        return Variant::Unknown;
    };
    KNOWN_TOKENS
        .iter()
        .find(|(known, _)| known.as_slice() == token)
        .map_or(Variant::Unknown, |(_, variant)| *variant)
}

/// Clock-select register with its two possible speeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockConfig {
    /// Address of the clock-select register.
    pub select_reg: u32,
    /// Bit that selects the divided clock.
    pub divided_mask: u8,
    /// Undivided clock in MHz.
    pub base_mhz: u32,
    /// Divided clock in MHz.
    pub divided_mhz: u32,
}

impl ClockConfig {
    /// Speed selected by the given register value.
    pub fn speed_mhz(&self, select: u8) -> u32 {
        if select & self.divided_mask != 0 {
            self.divided_mhz
        } else {
            self.base_mhz
        }
    }
}

/// Per-chip configuration, resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Chip variant.
    pub variant: Variant,
    /// Address space layout.
    pub map: MemoryMap,
    /// Base address of the UART register block.
    pub uart_base: Option<u32>,
    /// Base address of the CPU control block.
    pub cpu_con_base: Option<u32>,
    /// Address of the chip version register.
    pub version_reg: Option<u32>,
    /// Clock-select register.
    pub clock: Option<ClockConfig>,
    /// Power-control bit guarding part of the data space.
    pub power_gate: Option<PowerGate>,
}

impl Config {
    /// Configuration of an unrecognized chip: no register blocks.
    pub const UNKNOWN: Config = Config {
        variant: Variant::Unknown,
        map: MemoryMap::BANKED,
        uart_base: None,
        cpu_con_base: None,
        version_reg: None,
        clock: None,
        power_gate: None,
    };

    /// Chip name printed by the console.
    pub fn name(&self) -> &'static str {
        self.variant.name()
    }

    /// Program the UART line settings. Does nothing without a UART.
    pub fn init_uart<B: Bus>(&self, mem: &mut Memory<B>) {
        if let Some(base) = self.uart_base {
            mem.write_byte(base + UART_LCR, LCR_8N1);
        }
    }

    /// Current value of the chip version register.
    pub fn chip_version<B: Bus>(&self, mem: &mut Memory<B>) -> Option<u8> {
        self.version_reg.map(|reg| mem.read_byte(reg))
    }

    /// Current CPU clock in MHz.
    pub fn clock_mhz<B: Bus>(&self, mem: &mut Memory<B>) -> Option<u32> {
        self.clock
            .map(|clock| clock.speed_mhz(mem.read_byte(clock.select_reg)))
    }
}

/// Register layout of a chip variant.
pub fn resolve_config(variant: Variant) -> Config {
    match variant {
        Variant::Asm1042 | Variant::Asm1042A => Config {
            variant,
            map: MemoryMap::UNIFIED,
            uart_base: Some(0xf100),
            cpu_con_base: Some(0xf340),
            ..Config::UNKNOWN
        },
        Variant::Asm1142 => Config {
            variant,
            uart_base: Some(0xf100),
            cpu_con_base: Some(0xf340),
            ..Config::UNKNOWN
        },
        Variant::Asm2142 => Config {
            variant,
            uart_base: Some(0x1_5100),
            cpu_con_base: Some(0x1_5040),
            version_reg: Some(0x1_5030),
            ..Config::UNKNOWN
        },
        Variant::Asm3242 => Config {
            variant,
            uart_base: Some(0x5100),
            cpu_con_base: Some(0x5040),
            version_reg: Some(0x5030),
            clock: Some(ClockConfig {
                select_reg: 0x5032,
                divided_mask: 1 << 0,
                base_mhz: 250,
                divided_mhz: 125,
            }),
            power_gate: Some(PowerGate {
                start: 0x8000,
                end: 0x1_0000,
                register: 0x87,
                mask: 1 << 0,
            }),
            ..Config::UNKNOWN
        },
        Variant::Unknown => Config::UNKNOWN,
    }
}

/// Identify the chip, build the access layer and set up the UART.
///
/// Runs once, before the console starts.
pub fn init<B: Bus>(mut bus: B) -> (Config, Memory<B>) {
    let token = read_token(&mut bus);
    let variant = identify(&token);
    let config = resolve_config(variant);
    match variant {
        Variant::Unknown => warn!("unrecognized firmware token {:02x?}", token),
        _ => debug!("identified {}", variant.name()),
    }

    let mut mem = Memory::new(bus, &config);
    config.init_uart(&mut mem);
    (config, mem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimBus;

    #[test]
    fn identifies_known_tokens() {
        assert_eq!(identify(b"U2104_FW"), Variant::Asm1042);
        assert_eq!(identify(b"2104B_FW"), Variant::Asm1042A);
        assert_eq!(identify(b"2114A_FW"), Variant::Asm1142);
        assert_eq!(identify(b"2214A_FW"), Variant::Asm2142);
        assert_eq!(identify(b"2324A_FW"), Variant::Asm3242);
    }

    #[test]
    fn comparison_is_length_bounded() {
        assert_eq!(identify(b"2214A_FW_EXTRA"), Variant::Asm2142);
        assert_eq!(identify(b"2214A_F"), Variant::Unknown);
        assert_eq!(identify(b"2214a_fw"), Variant::Unknown);
        assert_eq!(identify(&[0xff; TOKEN_LEN]), Variant::Unknown);
    }

    #[test]
    fn token_is_read_from_code_space() {
        let mut bus = SimBus::with_token(b"2324A_FW");
        assert_eq!(&read_token(&mut bus), b"2324A_FW");
        assert_eq!(identify(&read_token(&mut SimBus::new())), Variant::Unknown);
    }

    #[test]
    fn names_and_tokens_agree() {
        for variant in Variant::KNOWN {
            assert_eq!(Variant::from_name(variant.name()), Some(variant));
            let token = variant.token().unwrap();
            assert_eq!(identify(token), variant);
        }
        assert_eq!(Variant::from_name("asm2142"), Some(Variant::Asm2142));
        assert_eq!(Variant::from_name("UNKNOWN"), None);
        assert_eq!(Variant::Unknown.token(), None);
    }

    #[test]
    fn unknown_chip_has_no_register_blocks() {
        let config = resolve_config(Variant::Unknown);
        assert_eq!(config.name(), "UNKNOWN");
        assert_eq!(config.uart_base, None);
        assert_eq!(config.cpu_con_base, None);
        assert_eq!(config.version_reg, None);
    }

    #[test]
    fn narrow_chips_use_unified_addressing() {
        assert_eq!(resolve_config(Variant::Asm1042).map, MemoryMap::UNIFIED);
        assert_eq!(resolve_config(Variant::Asm1042A).map, MemoryMap::UNIFIED);
        assert_eq!(resolve_config(Variant::Asm2142).map, MemoryMap::BANKED);
    }

    #[test]
    fn init_programs_uart_line_settings() {
        let bus = SimBus::with_token(b"2214A_FW");
        bus.attach_uart(0x1_5100);
        let (config, mem) = init(bus);
        assert_eq!(config.variant, Variant::Asm2142);
        assert_eq!(mem.bus().state().uart.as_ref().unwrap().lcr, LCR_8N1);
    }

    #[test]
    fn clock_speed_follows_select_register() {
        let config = resolve_config(Variant::Asm3242);
        let bus = SimBus::new();
        let mut mem = Memory::new(bus.clone(), &config);
        assert_eq!(config.clock_mhz(&mut mem), Some(250));
        bus.poke(0x5032, 0x01);
        assert_eq!(config.clock_mhz(&mut mem), Some(125));
        assert_eq!(resolve_config(Variant::Asm1142).clock_mhz(&mut mem), None);
    }
}
