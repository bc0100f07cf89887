use std::fmt;
use std::io;

use thiserror::Error;

/// An opcode as fetched from the instruction stream, including whether it
/// followed the `0xCB` prefix byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    pub code: u8,
    pub prefixed: bool,
}

impl Opcode {
    pub const fn base(code: u8) -> Self {
        Self {
            code,
            prefixed: false,
        }
    }

    pub const fn prefixed(code: u8) -> Self {
        Self {
            code,
            prefixed: true,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefixed {
            write!(f, "CB {:02X}", self.code)
        } else {
            write!(f, "{:02X}", self.code)
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("instruction not found for opcode {opcode}")]
    InstructionNotFound { opcode: Opcode },
}

#[derive(Error, Debug)]
pub enum CartridgeError {
    #[error("unknown cartridge type {0:#04X}")]
    UnknownType(u8),
    #[error("ROM image too small ({0} bytes, header needs 0x150)")]
    TooSmall(usize),
    #[error("failed to read ROM image: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{source} at PC={pc:#06X}")]
    Decode { source: DecodeError, pc: u16 },
    #[error(transparent)]
    Cartridge(#[from] CartridgeError),
}

impl CoreError {
    /// The opcode that failed to decode, if this is a decode failure.
    pub fn opcode(&self) -> Option<Opcode> {
        match self {
            CoreError::Decode {
                source: DecodeError::InstructionNotFound { opcode },
                ..
            } => Some(*opcode),
            CoreError::Cartridge(_) => None,
        }
    }
}
