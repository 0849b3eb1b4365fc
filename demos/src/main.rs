use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use xhc_monitor::chip::{self, Config, Variant};
use xhc_monitor::sim::SimBus;
use xhc_monitor::{BuildInfo, InterruptLatches, Memory, Monitor, Serial, Uart};

// Set by the interrupt handlers on hardware; nothing raises them here.
static LATCHES: InterruptLatches = InterruptLatches::new();

const BUILD: BuildInfo = BuildInfo {
    version: env!("CARGO_PKG_VERSION"),
    time: match option_env!("MONITOR_BUILD_TIME") {
        Some(time) => time,
        None => "unknown",
    },
};

/// Run the debug monitor against a simulated USB host controller.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Chip to simulate: ASM1042, ASM1042A, ASM1142, ASM2142 or ASM3242
    #[arg(long, default_value = "ASM2142")]
    chip: String,

    /// Raw code image to load at offset 0; its identification token decides the chip
    #[arg(long)]
    image: Option<PathBuf>,

    /// Route the console through the simulated memory-mapped UART
    #[arg(long)]
    uart: bool,
}

// Console on the host terminal. Terminals send `\n` for Enter.
struct Stdio {
    input: io::Stdin,
    output: io::Stdout,
}

impl Stdio {
    fn new() -> Self {
        Self {
            input: io::stdin(),
            output: io::stdout(),
        }
    }

    fn next_byte(&mut self) -> u8 {
        let mut byte = [0u8; 1];
        match self.input.read_exact(&mut byte) {
            Ok(()) if byte[0] == b'\n' => b'\r',
            Ok(()) => byte[0],
            Err(_) => {
                let _ = self.output.flush();
                info!("stdin closed, exiting");
                process::exit(0)
            }
        }
    }
}

impl Serial for Stdio {
    fn read_char(&mut self) -> u8 {
        let _ = self.output.flush();
        self.next_byte()
    }

    fn write_char(&mut self, byte: u8) {
        let _ = self.output.write_all(&[byte]);
    }

    fn flush(&mut self) {
        let _ = self.output.flush();
    }
}

// Terminal wired to the simulated UART FIFOs.
struct UartBridge {
    uart: Uart<SimBus>,
    bus: SimBus,
    stdio: Stdio,
}

impl UartBridge {
    fn forward_output(&mut self) {
        for byte in self.bus.take_uart_output() {
            self.stdio.write_char(byte);
        }
    }
}

impl Serial for UartBridge {
    fn read_char(&mut self) -> u8 {
        self.forward_output();
        if self.bus.uart_pending() == 0 {
            let byte = self.stdio.read_char();
            self.bus.push_uart_input(&[byte]);
        }
        self.uart.read_char()
    }

    fn write_char(&mut self, byte: u8) {
        self.uart.write_char(byte);
    }

    fn flush(&mut self) {
        self.uart.flush();
        self.forward_output();
        self.stdio.flush();
    }
}

fn build_bus(args: &Args) -> Result<SimBus> {
    match &args.image {
        Some(path) => {
            let image = fs::read(path)
                .with_context(|| format!("failed to read code image {}", path.display()))?;
            let bus = SimBus::new();
            bus.load_code(0, &image);
            Ok(bus)
        }
        None => {
            let Some(variant) = Variant::from_name(&args.chip) else {
                bail!("unknown chip {:?}", args.chip);
            };
            let token = variant.token().context("chip has no identification token")?;
            Ok(SimBus::with_token(token))
        }
    }
}

fn serve<S: Serial>(mem: Memory<SimBus>, serial: S, config: Config) -> ! {
    Monitor::new(mem, serial, config, BUILD, &LATCHES).run()
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let bus = build_bus(&args)?;
    let probe = resolve_uart_base(&bus);
    if args.uart {
        let Some(base) = probe else {
            bail!("chip has no UART to route the console through");
        };
        bus.attach_uart(base);
    }

    let (config, mem) = chip::init(bus.clone());
    info!("simulating {}", config.name());

    if args.uart {
        let uart = Uart::new(Memory::new(bus.clone(), &config), &config)
            .context("chip has no UART")?;
        let bridge = UartBridge {
            uart,
            bus,
            stdio: Stdio::new(),
        };
        serve(mem, bridge, config)
    } else {
        serve(mem, Stdio::new(), config)
    }
}

// The UART must be in place before `chip::init` programs its line settings.
fn resolve_uart_base(bus: &SimBus) -> Option<u32> {
    let token = chip::read_token(&mut bus.clone());
    chip::resolve_config(chip::identify(&token)).uart_base
}
