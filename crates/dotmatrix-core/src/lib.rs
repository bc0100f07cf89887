//! Clocked Game Boy / Game Boy Color emulation core.
//!
//! This crate holds the platform-agnostic machine: CPU, memory bus, PPU,
//! timer, serial, joypad, sound registers and cartridge mappers. Hosts drive
//! it through the [`gameboy`] facade.

/// 8/16-bit arithmetic primitives and flag semantics.
pub mod alu;

/// Sound register block and the audio collaborator trait.
pub mod audio;

/// Execute and write breakpoints.
pub mod breakpoints;

/// Cartridge header parsing and mapper families.
pub mod cartridge;

/// Cycle broadcast to clock subscribers.
pub mod clock;

/// LR35902 CPU core.
pub mod cpu;

pub mod error;

/// High-level facade that wires the CPU and MMU into a single machine.
pub mod gameboy;

/// Console models and post-boot state.
pub mod hardware;

/// Opcode table and instruction descriptors.
pub mod instructions;

pub mod interrupts;

/// Joypad input register.
pub mod joypad;

/// Memory cells and address-space regions.
pub mod memory;

/// Memory map and hardware plumbing.
pub mod mmu;

/// Pixel Processing Unit (PPU) emulation.
pub mod ppu;

pub mod registers;

/// Serial unit and link cable plumbing.
pub mod serial;

/// Divider/timer unit.
pub mod timer;

pub use cartridge::Cartridge;
pub use error::{CartridgeError, CoreError, DecodeError};
pub use gameboy::{GameBoy, PauseToken, RunOutcome, Snapshot};
pub use hardware::Model;
