#![allow(dead_code)]

use dotmatrix_core::cartridge::Cartridge;
use dotmatrix_core::gameboy::GameBoy;
use dotmatrix_core::hardware::Model;

pub const ROM_BANK_SIZE: usize = 0x4000;
/// Where [`RomBuilder`] places the program; the entry point jumps here.
pub const PROGRAM_START: u16 = 0x0150;

/// Assembles a cartridge image with a valid header and a program reached
/// from the 0x0100 entry point.
#[derive(Debug, Clone)]
pub struct RomBuilder {
    title: &'static str,
    cart_type: u8,
    banks: usize,
    ram_code: u8,
    cgb: bool,
    program: Vec<u8>,
    patches: Vec<(usize, Vec<u8>)>,
}

impl RomBuilder {
    pub fn new(program: &[u8]) -> Self {
        Self {
            title: "DOTMATRIX",
            cart_type: 0x00,
            banks: 2,
            ram_code: 0x00,
            cgb: false,
            program: program.to_vec(),
            patches: Vec::new(),
        }
    }

    pub fn cart_type(mut self, cart_type: u8, ram_code: u8) -> Self {
        self.cart_type = cart_type;
        self.ram_code = ram_code;
        self
    }

    pub fn banks(mut self, banks: usize) -> Self {
        self.banks = banks;
        self
    }

    pub fn cgb(mut self) -> Self {
        self.cgb = true;
        self
    }

    /// Place `bytes` at `addr`, e.g. an interrupt handler.
    pub fn patch(mut self, addr: u16, bytes: &[u8]) -> Self {
        self.patches.push((addr as usize, bytes.to_vec()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut rom = vec![0u8; self.banks * ROM_BANK_SIZE];
        // Tag every switchable bank with its own number at 0x4000.
        for bank in 1..self.banks {
            rom[bank * ROM_BANK_SIZE] = bank as u8;
        }
        // NOP ; JP PROGRAM_START
        let [lo, hi] = PROGRAM_START.to_le_bytes();
        rom[0x0100..0x0104].copy_from_slice(&[0x00, 0xC3, lo, hi]);
        rom[0x0134..0x0134 + self.title.len()].copy_from_slice(self.title.as_bytes());
        if self.cgb {
            rom[0x0143] = 0x80;
        }
        rom[0x0147] = self.cart_type;
        rom[0x0148] = (self.banks / 2).trailing_zeros() as u8;
        rom[0x0149] = self.ram_code;
        rom[0x014D] = rom[0x0134..=0x014C]
            .iter()
            .fold(0u8, |acc, &b| acc.wrapping_sub(b).wrapping_sub(1));
        let start = PROGRAM_START as usize;
        rom[start..start + self.program.len()].copy_from_slice(&self.program);
        for (addr, bytes) in &self.patches {
            rom[*addr..*addr + bytes.len()].copy_from_slice(bytes);
        }
        rom
    }

    pub fn cartridge(&self) -> Cartridge {
        Cartridge::load(self.build()).expect("synthetic ROM should load")
    }
}

/// A post-boot console with `program` loaded on a ROM-only cartridge.
pub fn gameboy_with(model: Model, program: &[u8]) -> GameBoy {
    let mut gb = GameBoy::new(model);
    gb.load_cartridge(RomBuilder::new(program).cartridge());
    gb
}

/// Step until PC reaches `pc`, panicking after `max_steps`.
pub fn run_until_pc(gb: &mut GameBoy, pc: u16, max_steps: usize) {
    for _ in 0..max_steps {
        if gb.cpu.regs.pc == pc {
            return;
        }
        gb.step().expect("step failed");
    }
    panic!("PC never reached {pc:04X}, stuck at {:04X}", gb.cpu.regs.pc);
}

/// Step `count` instructions.
pub fn steps(gb: &mut GameBoy, count: usize) {
    for _ in 0..count {
        gb.step().expect("step failed");
    }
}
