use core::fmt::Write;

use log::{debug, warn};

use crate::bulk::BulkSession;
use crate::bus::Bus;
use crate::chip::{Config, CPU_EXEC_CTRL, CPU_EXEC_CTRL_RESET, CPU_MODE_CODE_RAM, CPU_MODE_NEXT};
use crate::error::CommandError;
use crate::hex::{format_dec, format_hex, parse_hex};
use crate::irq::InterruptLatches;
use crate::memory::{region_of, Memory, ADDR_MAX, OFFSET_MASK};
use crate::serial::{Serial, TextWriter};

/// Longest command line, in bytes.
pub const MAX_LINE_LEN: usize = 80;
/// Tokens kept from a command line.
pub const MAX_ARGS: usize = 3;

const PROMPT: &str = "> ";

const CTRL_C: u8 = 0x03;
const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7f;
const ESCAPE: u8 = 0x1b;
const ENTER: u8 = b'\r';

/// Build identification printed by the banner and `version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    /// Version string.
    pub version: &'static str,
    /// Build timestamp.
    pub time: &'static str,
}

/// A committed command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line {
    buf: [u8; MAX_LINE_LEN],
    len: usize,
}

impl Line {
    const EMPTY: Line = Line {
        buf: [0; MAX_LINE_LEN],
        len: 0,
    };

    /// Line text. Only printable ASCII is ever stored.
    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditState {
    Normal,
    Escape,
    Csi,
    CsiParam,
    Ss3,
}

/// Line assembly with echo, backspace, Ctrl-C and escape sequence handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEditor {
    line: Line,
    state: EditState,
}

impl Default for LineEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl LineEditor {
    /// Editor with an empty line.
    pub const fn new() -> Self {
        Self {
            line: Line::EMPTY,
            state: EditState::Normal,
        }
    }

    /// Text typed so far.
    pub fn pending(&self) -> &str {
        self.line.as_str()
    }

    /// Process one input byte, echoing to `serial`. Returns the line once
    /// it is committed with Enter or abandoned with Ctrl-C.
    pub fn feed<S: Serial + ?Sized>(&mut self, byte: u8, serial: &mut S) -> Option<Line> {
        match self.state {
            EditState::Normal => return self.feed_normal(byte, serial),
            EditState::Escape => {
                self.state = match byte {
                    b'[' => EditState::Csi,
                    b'O' => EditState::Ss3,
                    _ => {
                        echo_unknown(serial, b"^[", byte);
                        EditState::Normal
                    }
                }
            }
            EditState::Csi => {
                self.state = match byte {
                    // Arrow keys.
                    b'A'..=b'D' => EditState::Normal,
                    // Home, Insert, Delete, End, Page Up, Page Down.
                    b'1'..=b'6' => EditState::CsiParam,
                    _ => {
                        echo_unknown(serial, b"^[[", byte);
                        EditState::Normal
                    }
                }
            }
            EditState::CsiParam => self.state = EditState::Normal,
            EditState::Ss3 => {
                if byte != b'F' {
                    echo_unknown(serial, b"^[O", byte);
                }
                self.state = EditState::Normal;
            }
        }
        None
    }

    fn feed_normal<S: Serial + ?Sized>(&mut self, byte: u8, serial: &mut S) -> Option<Line> {
        match byte {
            ENTER => {
                newline(serial);
                Some(core::mem::replace(&mut self.line, Line::EMPTY))
            }
            CTRL_C => {
                self.line = Line::EMPTY;
                newline(serial);
                Some(Line::EMPTY)
            }
            BACKSPACE | DELETE => {
                if self.line.len > 0 {
                    self.line.len -= 1;
                    for byte in *b"\x08 \x08" {
                        serial.write_char(byte);
                    }
                }
                None
            }
            ESCAPE => {
                self.state = EditState::Escape;
                None
            }
            b'\t' | b' '..=b'~' => {
                if self.line.len < MAX_LINE_LEN {
                    self.line.buf[self.line.len] = byte;
                    self.line.len += 1;
                    serial.write_char(byte);
                }
                None
            }
            _ => None,
        }
    }
}

fn echo_unknown<S: Serial + ?Sized>(serial: &mut S, prefix: &[u8], byte: u8) {
    for &b in prefix {
        serial.write_char(b);
    }
    serial.write_char(byte);
}

fn newline<S: Serial + ?Sized>(serial: &mut S) {
    serial.write_char(b'\r');
    serial.write_char(b'\n');
}

/// Up to [`MAX_ARGS`] whitespace-separated tokens of a command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Args<'a> {
    tokens: [&'a str; MAX_ARGS],
    len: usize,
}

impl<'a> Args<'a> {
    /// Split on spaces and tabs. Tokens past [`MAX_ARGS`] are dropped.
    pub fn parse(line: &'a str) -> Self {
        let mut args = Args {
            tokens: [""; MAX_ARGS],
            len: 0,
        };
        for token in line
            .split(|c: char| c == ' ' || c == '\t')
            .filter(|token| !token.is_empty())
            .take(MAX_ARGS)
        {
            args.tokens[args.len] = token;
            args.len += 1;
        }
        args
    }

    /// Number of tokens, command name included.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the line was blank.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Token `index`, where 0 is the command name.
    pub fn get(&self, index: usize) -> Option<&'a str> {
        self.tokens[..self.len].get(index).copied()
    }
}

/// Console command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// List commands
    Help,
    /// Print build and chip information
    Version,
    /// Read a byte
    Mrb,
    /// Read a word
    Mrw,
    /// Write a byte
    Mwb,
    /// Write a word
    Mww,
    /// Reset the chip
    Reset,
    /// Enter bulk mode
    Bmo,
}

impl Command {
    /// Command table, in the order `help` lists and lookup scans it.
    pub const ALL: [Command; 8] = [
        Command::Help,
        Command::Version,
        Command::Mrb,
        Command::Mrw,
        Command::Mwb,
        Command::Mww,
        Command::Reset,
        Command::Bmo,
    ];

    /// Name typed on the console.
    pub const fn name(self) -> &'static str {
        match self {
            Command::Help => "help",
            Command::Version => "version",
            Command::Mrb => "mrb",
            Command::Mrw => "mrw",
            Command::Mwb => "mwb",
            Command::Mww => "mww",
            Command::Reset => "reset",
            Command::Bmo => "bmo",
        }
    }

    /// Find a command by exact, case-sensitive name.
    pub fn lookup(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.name() == name)
    }

    const fn usage(self) -> &'static str {
        match self {
            Command::Mrb => {
                "Usage: mrb address\nExamples:\n    mrb 0x00000000\n    mrb 0x8\n    mrb 00000\n    mrb c\n    mrb 00201000\n    mrb 201000"
            }
            Command::Mrw => {
                "Usage: mrw address\nExamples:\n    mrw 0x00000000\n    mrw 0x8\n    mrw 00000\n    mrw c\n    mrw 00201000\n    mrw 201000"
            }
            Command::Mwb => {
                "Usage: mwb address value\nExamples:\n    mwb 0x00200000 0\n    mwb 0x100008 c0\n    mwb 100000 0x08\n    mwb 20100c 0x1\n    mwb 00201000 0"
            }
            Command::Mww => {
                "Usage: mww address value\nExamples:\n    mww 0x00200000 0\n    mww 0x100008 1234\n    mww 100000 0x008\n    mww 20100c 0x1\n    mww 00201000 0"
            }
            Command::Reset => "Usage: reset [rom]",
            Command::Help | Command::Version | Command::Bmo => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Width {
    Byte,
    Word,
}

impl Width {
    const fn digits(self) -> usize {
        match self {
            Width::Byte => 2,
            Width::Word => 8,
        }
    }

    fn read<B: Bus>(self, mem: &mut Memory<B>, addr: u32) -> u32 {
        match self {
            Width::Byte => mem.read_byte(addr) as u32,
            Width::Word => mem.read_word(addr),
        }
    }

    fn write<B: Bus>(self, mem: &mut Memory<B>, addr: u32, value: u32) {
        match self {
            Width::Byte => mem.write_byte(addr, value as u8),
            Width::Word => mem.write_word(addr, value),
        }
    }

    // Word writes take any 32-bit value.
    fn check(self, value: u32) -> Result<u32, CommandError<'static>> {
        match self {
            Width::Byte if value > u8::MAX as u32 => Err(CommandError::ValueTooLarge),
            _ => Ok(value),
        }
    }
}

fn parse_addr(token: &str) -> Result<u32, CommandError<'static>> {
    let addr = parse_hex(token)?;
    if addr > ADDR_MAX {
        return Err(CommandError::AddressTooLarge);
    }
    Ok(addr)
}

/// The monitor: console command interpreter plus its collaborators.
pub struct Monitor<'a, B: Bus, S: Serial> {
    mem: Memory<B>,
    serial: S,
    config: Config,
    build: BuildInfo,
    latches: &'a InterruptLatches,
    editor: LineEditor,
}

impl<'a, B: Bus, S: Serial> Monitor<'a, B, S> {
    /// Assemble a monitor from the resolved chip configuration.
    pub fn new(
        mem: Memory<B>,
        serial: S,
        config: Config,
        build: BuildInfo,
        latches: &'a InterruptLatches,
    ) -> Self {
        Self {
            mem,
            serial,
            config,
            build,
            latches,
            editor: LineEditor::new(),
        }
    }

    /// Memory access layer.
    pub fn memory(&mut self) -> &mut Memory<B> {
        &mut self.mem
    }

    /// Console channel.
    pub fn serial(&mut self) -> &mut S {
        &mut self.serial
    }

    /// Resolved chip configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Interrupt latches shared with the interrupt handlers.
    pub fn latches(&self) -> &'a InterruptLatches {
        self.latches
    }

    /// Print the banner and serve the console forever.
    pub fn run(&mut self) -> ! {
        self.start();
        loop {
            self.poll();
        }
    }

    /// Print the banner and the first prompt.
    pub fn start(&mut self) {
        let build = self.build;
        let mut out = TextWriter::new(&mut self.serial);
        let _ = writeln!(out, "\nHello from monitor!");
        let _ = writeln!(
            out,
            "monitor version {} (built on {})",
            build.version, build.time
        );
        let _ = out.write_str(PROMPT);
    }

    /// Wait for one input byte and act on it. A committed line is executed
    /// and followed by a fresh prompt.
    pub fn poll(&mut self) {
        let byte = self.serial.read_char();
        if let Some(line) = self.editor.feed(byte, &mut self.serial) {
            // Failures are reported on the console; the loop carries on.
            let _ = self.execute(line.as_str());
            let _ = TextWriter::new(&mut self.serial).write_str(PROMPT);
        }
    }

    /// Tokenize and run one command line, printing any error.
    ///
    /// A blank line does nothing.
    pub fn execute<'l>(&mut self, line: &'l str) -> Result<(), CommandError<'l>> {
        let args = Args::parse(line);
        let Some(name) = args.get(0) else {
            return Ok(());
        };

        let result = match Command::lookup(name) {
            Some(command) => {
                debug!("dispatching {} ({} args)", command.name(), args.len() - 1);
                self.dispatch(command, &args)
            }
            None => Err(CommandError::UnknownCommand(name)),
        };

        if let Err(err) = &result {
            let mut out = TextWriter::new(&mut self.serial);
            let _ = writeln!(out, "Error: {}", err);
            if let CommandError::TooFewArguments { usage } = err {
                let _ = writeln!(out, "{}", usage);
            }
        }
        result
    }

    fn dispatch<'l>(&mut self, command: Command, args: &Args<'l>) -> Result<(), CommandError<'l>> {
        match command {
            Command::Help => self.help(),
            Command::Version => self.version(),
            Command::Mrb => self.memory_read(command, args, Width::Byte),
            Command::Mrw => self.memory_read(command, args, Width::Word),
            Command::Mwb => self.memory_write(command, args, Width::Byte),
            Command::Mww => self.memory_write(command, args, Width::Word),
            Command::Reset => self.reset(args.len() > 1),
            Command::Bmo => self.bulk(),
        }
    }

    fn help(&mut self) -> Result<(), CommandError<'static>> {
        let mut out = TextWriter::new(&mut self.serial);
        writeln!(out, "Commands available:")?;
        for command in Command::ALL {
            writeln!(out, " - {}", command.name())?;
        }
        Ok(())
    }

    fn version(&mut self) -> Result<(), CommandError<'static>> {
        let chip_version = self.config.chip_version(&mut self.mem);
        let clock = self.config.clock_mhz(&mut self.mem);

        let mut out = TextWriter::new(&mut self.serial);
        writeln!(out, "Build version: {}", self.build.version)?;
        writeln!(out, "Build time: {}", self.build.time)?;
        writeln!(out, "Chip name: {}", self.config.name())?;
        if let Some(value) = chip_version {
            writeln!(out, "Chip version: {}", format_hex(value as u32, 2))?;
        }
        if let Some(mhz) = clock {
            writeln!(out, "Clock speed: {} MHz", format_dec(mhz, 0))?;
        }
        Ok(())
    }

    fn print_value(&mut self, addr: u32, width: Width) -> Result<(), CommandError<'static>> {
        let value = width.read(&mut self.mem, addr);
        let mut out = TextWriter::new(&mut self.serial);
        writeln!(
            out,
            "{} {}: {}",
            region_of(addr),
            format_hex(addr & OFFSET_MASK, 6),
            format_hex(value, width.digits())
        )?;
        Ok(())
    }

    fn memory_read<'l>(
        &mut self,
        command: Command,
        args: &Args<'l>,
        width: Width,
    ) -> Result<(), CommandError<'l>> {
        let usage = command.usage();
        let addr = parse_addr(args.get(1).ok_or(CommandError::TooFewArguments { usage })?)?;
        self.print_value(addr, width)?;
        Ok(())
    }

    fn memory_write<'l>(
        &mut self,
        command: Command,
        args: &Args<'l>,
        width: Width,
    ) -> Result<(), CommandError<'l>> {
        let usage = command.usage();
        let (Some(addr), Some(value)) = (args.get(1), args.get(2)) else {
            return Err(CommandError::TooFewArguments { usage });
        };

        let addr = parse_addr(addr)?;
        self.print_value(addr, width)?;

        let value = width.check(parse_hex(value)?)?;
        width.write(&mut self.mem, addr, value);
        self.print_value(addr, width)?;
        Ok(())
    }

    fn reset(&mut self, reload: bool) -> ! {
        let mut out = TextWriter::new(&mut self.serial);
        let _ = write!(out, "Resetting chip");
        if reload {
            let _ = write!(out, " to mask ROM");
        }
        let _ = writeln!(out, "...");
        self.serial.flush();

        match self.config.cpu_con_base {
            Some(base) => {
                warn!("resetting {} (reload: {})", self.config.name(), reload);
                if reload {
                    let mode = self.mem.read_byte(base + CPU_MODE_NEXT);
                    self.mem
                        .write_byte(base + CPU_MODE_NEXT, mode & !CPU_MODE_CODE_RAM);
                }
                let ctrl = self.mem.read_byte(base + CPU_EXEC_CTRL);
                self.mem
                    .write_byte(base + CPU_EXEC_CTRL, ctrl | CPU_EXEC_CTRL_RESET);
            }
            None => warn!("no CPU control block on {}, halting", self.config.name()),
        }

        self.mem.halt()
    }

    fn bulk(&mut self) -> Result<(), CommandError<'static>> {
        writeln!(TextWriter::new(&mut self.serial), "OK")?;
        BulkSession::new(&self.mem).run(&mut self.mem, &mut self.serial);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::ScriptedSerial;

    fn edit(input: &[u8]) -> (Vec<Line>, String, LineEditor) {
        let mut editor = LineEditor::new();
        let mut serial = ScriptedSerial::new();
        let lines = input
            .iter()
            .filter_map(|&byte| editor.feed(byte, &mut serial))
            .collect();
        (lines, serial.take_output(), editor)
    }

    #[test]
    fn enter_commits_line() {
        let (lines, echo, editor) = edit(b"mrb 10\r");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].as_str(), "mrb 10");
        assert_eq!(echo, "mrb 10\r\n");
        assert_eq!(editor.pending(), "");
    }

    #[test]
    fn backspace_erases() {
        let (lines, echo, _) = edit(b"hx\x08elq\x7fp\r\x08");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].as_str(), "help");
        assert_eq!(echo, "hx\x08 \x08elq\x08 \x08p\r\n");
    }

    #[test]
    fn ctrl_c_abandons_line() {
        let (lines, echo, _) = edit(b"mww 1\x03");
        assert_eq!(lines, [Line::EMPTY]);
        assert_eq!(echo, "mww 1\r\n");
    }

    #[test]
    fn line_length_is_capped() {
        let input = [b'a'; MAX_LINE_LEN + 5];
        let (lines, echo, editor) = edit(&input);
        assert!(lines.is_empty());
        assert_eq!(editor.pending().len(), MAX_LINE_LEN);
        assert_eq!(echo.len(), MAX_LINE_LEN);
    }

    #[test]
    fn known_escape_sequences_are_swallowed() {
        let (_, echo, editor) = edit(b"a\x1b[A\x1b[D\x1b[5~\x1bOFb");
        assert_eq!(editor.pending(), "ab");
        assert_eq!(echo, "ab");
    }

    #[test]
    fn unknown_escape_sequences_are_echoed() {
        let (_, echo, editor) = edit(b"\x1bx\x1b[Z\x1bOQ");
        assert_eq!(echo, "^[x^[[Z^[OQ");
        assert_eq!(editor.pending(), "");
    }

    #[test]
    fn control_bytes_are_ignored() {
        let (_, echo, editor) = edit(b"\n\x01ok\x00");
        assert_eq!(editor.pending(), "ok");
        assert_eq!(echo, "ok");
    }

    #[test]
    fn tokenizes_on_spaces_and_tabs() {
        let args = Args::parse("  mwb\t0x10   ff  ");
        assert_eq!(args.len(), 3);
        assert_eq!(args.get(0), Some("mwb"));
        assert_eq!(args.get(1), Some("0x10"));
        assert_eq!(args.get(2), Some("ff"));
        assert_eq!(args.get(3), None);
    }

    #[test]
    fn extra_tokens_are_dropped() {
        let args = Args::parse("mww 1 2 3 4");
        assert_eq!(args.len(), MAX_ARGS);
        assert_eq!(args.get(2), Some("2"));
        assert!(Args::parse(" \t ").is_empty());
    }

    #[test]
    fn lookup_is_exact_and_case_sensitive() {
        assert_eq!(Command::lookup("help"), Some(Command::Help));
        assert_eq!(Command::lookup("bmo"), Some(Command::Bmo));
        assert_eq!(Command::lookup("HELP"), None);
        assert_eq!(Command::lookup("mr"), None);
        assert_eq!(Command::lookup("mrbx"), None);
        for command in Command::ALL {
            assert_eq!(Command::lookup(command.name()), Some(command));
        }
    }

    #[test]
    fn byte_width_rejects_wide_values() {
        assert_eq!(Width::Byte.check(0xff), Ok(0xff));
        assert_eq!(Width::Byte.check(0x100), Err(CommandError::ValueTooLarge));
        assert_eq!(Width::Word.check(u32::MAX), Ok(u32::MAX));
    }

    #[test]
    fn addresses_are_validated() {
        assert_eq!(parse_addr("0xffffff"), Ok(ADDR_MAX));
        assert_eq!(parse_addr("1000000"), Err(CommandError::AddressTooLarge));
        assert!(matches!(parse_addr("0xq"), Err(CommandError::Parse(_))));
    }
}
