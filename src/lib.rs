#![cfg_attr(not(any(test, feature = "sim")), no_std)]
#![deny(missing_docs)]

//! Resident debug monitor for USB host controller microcontrollers
//!
//! The monitor sits on the controller's UART and offers two interfaces:
//! * a line-oriented console for reading and writing memory and registers,
//!   inspecting the chip identity and resetting the device
//! * a binary bulk mode (entered with the `bmo` console command) for fast
//!   memory transfers from a host-side tool
//!
//! The controller core addresses 16 bits natively, so everything above the
//! first 64 KiB is reached through a page-select register. This crate hides
//! that behind [`Memory`], which maps a flat 24-bit address space onto the
//! native window, the code space and the side-band (SFR) registers.
//!
//! Hardware access is provided by the user through the [`Bus`] trait and the
//! console byte stream through the [`Serial`] trait. [`Uart`] implements the
//! latter on top of the controller's memory-mapped UART.

/// Native CPU access trait
pub mod bus;
/// Bulk binary sub-protocol
pub mod bulk;
/// Chip identification and per-chip configuration
pub mod chip;
/// Command interpreter
pub mod console;
/// Console error types
pub mod error;
/// Hex parsing and formatting
pub mod hex;
/// Interrupt latches
pub mod irq;
/// Addressed memory access layer
pub mod memory;
/// Serial channel abstraction
pub mod serial;
/// Simulated hardware for host-side use
#[cfg(any(test, feature = "sim"))]
pub mod sim;


pub use crate::bus::Bus;
pub use crate::bulk::BulkSession;
pub use crate::chip::{identify, read_token, resolve_config, Config, Variant};
pub use crate::console::{BuildInfo, Command, Monitor};
pub use crate::error::{CommandError, ParseError};
pub use crate::hex::{format_dec, format_hex, parse_hex};
pub use crate::irq::{InterruptLatches, Line};
pub use crate::memory::{region_of, Memory, MemoryMap, Region, ADDR_MAX};
pub use crate::serial::{Serial, TextWriter, Uart};
