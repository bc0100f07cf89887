use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Contents of the F register. Bits 3-0 do not exist in hardware and
    /// always read back as zero.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u8 {
        const ZERO = 0x80;
        const SUBTRACT = 0x40;
        const HALF_CARRY = 0x20;
        const CARRY = 0x10;
    }
}

impl Flags {
    pub fn from_byte(value: u8) -> Self {
        Self::from_bits_truncate(value)
    }

    pub fn zero(self) -> bool {
        self.contains(Flags::ZERO)
    }

    pub fn subtract(self) -> bool {
        self.contains(Flags::SUBTRACT)
    }

    pub fn half_carry(self) -> bool {
        self.contains(Flags::HALF_CARRY)
    }

    pub fn carry(self) -> bool {
        self.contains(Flags::CARRY)
    }

    /// Build a flag set from the four individual conditions.
    pub fn with(zero: bool, subtract: bool, half_carry: bool, carry: bool) -> Self {
        let mut flags = Flags::empty();
        flags.set(Flags::ZERO, zero);
        flags.set(Flags::SUBTRACT, subtract);
        flags.set(Flags::HALF_CARRY, half_carry);
        flags.set(Flags::CARRY, carry);
        flags
    }
}

/// A fixed-width storage location. Arithmetic through this trait wraps at the
/// cell's declared width.
pub trait Cell: Copy {
    const BITS: u32;

    fn to_u32(self) -> u32;
    fn from_u32(value: u32) -> Self;

    fn mask() -> u32 {
        (1u32 << Self::BITS) - 1
    }

    /// Add `value` modulo 2^BITS. Returns true when the unmasked sum exceeded
    /// the cell's width.
    fn add_with_carry_mask(&mut self, value: u32) -> bool {
        let sum = self.to_u32() + (value & Self::mask());
        *self = Self::from_u32(sum & Self::mask());
        sum > Self::mask()
    }

    fn increment(&mut self) {
        self.add_with_carry_mask(1);
    }

    fn decrement(&mut self) {
        self.add_with_carry_mask(Self::mask());
    }
}

impl Cell for u8 {
    const BITS: u32 = 8;

    fn to_u32(self) -> u32 {
        self as u32
    }

    fn from_u32(value: u32) -> Self {
        value as u8
    }
}

impl Cell for u16 {
    const BITS: u32 = 16;

    fn to_u32(self) -> u32 {
        self as u32
    }

    fn from_u32(value: u32) -> Self {
        value as u16
    }
}

/// 8-bit register names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg8 {
    A,
    F,
    B,
    C,
    D,
    E,
    H,
    L,
}

impl fmt::Display for Reg8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reg8::A => "A",
            Reg8::F => "F",
            Reg8::B => "B",
            Reg8::C => "C",
            Reg8::D => "D",
            Reg8::E => "E",
            Reg8::H => "H",
            Reg8::L => "L",
        };
        f.write_str(name)
    }
}

/// 16-bit register names. The composite pairs are views over two 8-bit
/// registers, high byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg16 {
    AF,
    BC,
    DE,
    HL,
    SP,
    PC,
}

impl fmt::Display for Reg16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reg16::AF => "AF",
            Reg16::BC => "BC",
            Reg16::DE => "DE",
            Reg16::HL => "HL",
            Reg16::SP => "SP",
            Reg16::PC => "PC",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Registers {
    pub a: u8,
    pub f: Flags,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub sp: u16,
    pub pc: u16,
}

impl Registers {
    pub fn read8(&self, reg: Reg8) -> u8 {
        match reg {
            Reg8::A => self.a,
            Reg8::F => self.f.bits(),
            Reg8::B => self.b,
            Reg8::C => self.c,
            Reg8::D => self.d,
            Reg8::E => self.e,
            Reg8::H => self.h,
            Reg8::L => self.l,
        }
    }

    pub fn write8(&mut self, reg: Reg8, value: u8) {
        match reg {
            Reg8::A => self.a = value,
            Reg8::F => self.f = Flags::from_byte(value),
            Reg8::B => self.b = value,
            Reg8::C => self.c = value,
            Reg8::D => self.d = value,
            Reg8::E => self.e = value,
            Reg8::H => self.h = value,
            Reg8::L => self.l = value,
        }
    }

    pub fn read16(&self, reg: Reg16) -> u16 {
        match reg {
            Reg16::AF => u16::from_be_bytes([self.a, self.f.bits()]),
            Reg16::BC => u16::from_be_bytes([self.b, self.c]),
            Reg16::DE => u16::from_be_bytes([self.d, self.e]),
            Reg16::HL => u16::from_be_bytes([self.h, self.l]),
            Reg16::SP => self.sp,
            Reg16::PC => self.pc,
        }
    }

    pub fn write16(&mut self, reg: Reg16, value: u16) {
        let [hi, lo] = value.to_be_bytes();
        match reg {
            Reg16::AF => {
                self.a = hi;
                self.f = Flags::from_byte(lo);
            }
            Reg16::BC => {
                self.b = hi;
                self.c = lo;
            }
            Reg16::DE => {
                self.d = hi;
                self.e = lo;
            }
            Reg16::HL => {
                self.h = hi;
                self.l = lo;
            }
            Reg16::SP => self.sp = value,
            Reg16::PC => self.pc = value,
        }
    }

    pub fn hl(&self) -> u16 {
        self.read16(Reg16::HL)
    }

    pub fn set_hl(&mut self, value: u16) {
        self.write16(Reg16::HL, value);
    }

    /// Apply a width-aware update to a 16-bit register through its [`Cell`].
    pub fn update16(&mut self, reg: Reg16, f: impl FnOnce(&mut u16)) {
        let mut value = self.read16(reg);
        f(&mut value);
        self.write16(reg, value);
    }

    /// Read PC and advance it by one byte.
    pub fn advance_pc(&mut self) -> u16 {
        let pc = self.pc;
        self.pc.increment();
        pc
    }
}

impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "A:{:02X} F:{:02X} B:{:02X} C:{:02X} D:{:02X} E:{:02X} H:{:02X} L:{:02X} SP:{:04X} PC:{:04X}",
            self.a,
            self.f.bits(),
            self.b,
            self.c,
            self.d,
            self.e,
            self.h,
            self.l,
            self.sp,
            self.pc
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_pairs_round_trip() {
        let mut regs = Registers::default();
        for (reg, value) in [
            (Reg16::BC, 0x1234),
            (Reg16::DE, 0xBEEF),
            (Reg16::HL, 0x8000),
            (Reg16::SP, 0xFFFE),
            (Reg16::PC, 0x0100),
        ] {
            regs.write16(reg, value);
            assert_eq!(regs.read16(reg), value, "{reg} should read back");
        }
        assert_eq!(regs.b, 0x12);
        assert_eq!(regs.c, 0x34);
        assert_eq!(regs.d, 0xBE);
        assert_eq!(regs.e, 0xEF);
    }

    #[test]
    fn af_masks_low_nibble_of_f() {
        let mut regs = Registers::default();
        regs.write16(Reg16::AF, 0x12FF);
        assert_eq!(regs.read16(Reg16::AF), 0x12F0);
        assert_eq!(regs.a, 0x12);
        assert!(regs.f.zero() && regs.f.subtract() && regs.f.half_carry() && regs.f.carry());

        regs.write8(Reg8::F, 0x0F);
        assert_eq!(regs.read8(Reg8::F), 0x00);
    }

    #[test]
    fn cells_wrap_at_declared_width() {
        let mut byte: u8 = 0xFF;
        byte.increment();
        assert_eq!(byte, 0x00);
        byte.decrement();
        assert_eq!(byte, 0xFF);

        let mut word: u16 = 0xFFFF;
        word.increment();
        assert_eq!(word, 0x0000);
        word.decrement();
        assert_eq!(word, 0xFFFF);

        let mut carry_probe: u8 = 0xF0;
        assert!(carry_probe.add_with_carry_mask(0x20));
        assert_eq!(carry_probe, 0x10);
        assert!(!carry_probe.add_with_carry_mask(0x01));
    }

    #[test]
    fn update16_applies_cell_arithmetic() {
        let mut regs = Registers::default();
        regs.write16(Reg16::BC, 0x00FF);
        regs.update16(Reg16::BC, |bc| bc.increment());
        assert_eq!(regs.read16(Reg16::BC), 0x0100);
        regs.update16(Reg16::BC, |bc| bc.decrement());
        assert_eq!(regs.read16(Reg16::BC), 0x00FF);
    }
}
