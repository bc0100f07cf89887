//! Arithmetic and logic primitives. Every function is pure: it takes the
//! operands (and the incoming flags where they matter) and returns the result
//! along with the new flag state.

use std::fmt;

use crate::registers::Flags;

/// Eight-operand ALU group selected by bits 5-3 of `0x80..=0xBF` and the
/// `0xC6`-column immediates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
}

impl AluOp {
    pub const ALL: [AluOp; 8] = [
        AluOp::Add,
        AluOp::Adc,
        AluOp::Sub,
        AluOp::Sbc,
        AluOp::And,
        AluOp::Xor,
        AluOp::Or,
        AluOp::Cp,
    ];

    /// Apply the operation to the accumulator. For `Cp` the returned value is
    /// the unchanged accumulator.
    pub fn apply(self, a: u8, value: u8, flags: Flags) -> (u8, Flags) {
        match self {
            AluOp::Add => add8(a, value, false),
            AluOp::Adc => add8(a, value, flags.carry()),
            AluOp::Sub => sub8(a, value, false),
            AluOp::Sbc => sub8(a, value, flags.carry()),
            AluOp::And => and8(a, value),
            AluOp::Xor => xor8(a, value),
            AluOp::Or => or8(a, value),
            AluOp::Cp => (a, sub8(a, value, false).1),
        }
    }

    /// Operand prefix used by disassembly (`ADD A,`, `SUB `, ...).
    pub fn prefix(self) -> &'static str {
        match self {
            AluOp::Add => "ADD A,",
            AluOp::Adc => "ADC A,",
            AluOp::Sub => "SUB ",
            AluOp::Sbc => "SBC A,",
            AluOp::And => "AND ",
            AluOp::Xor => "XOR ",
            AluOp::Or => "OR ",
            AluOp::Cp => "CP ",
        }
    }
}

/// Rotate/shift group selected by bits 5-3 of the CB-prefixed `0x00..=0x3F`
/// range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Rlc,
    Rrc,
    Rl,
    Rr,
    /// Arithmetic shift left: bit 7 to carry, bit 0 cleared.
    Sla,
    /// Arithmetic shift right: bit 0 to carry, bit 7 kept.
    Sra,
    Swap,
    /// Logical shift right: bit 0 to carry, bit 7 cleared.
    Srl,
}

impl ShiftOp {
    pub const ALL: [ShiftOp; 8] = [
        ShiftOp::Rlc,
        ShiftOp::Rrc,
        ShiftOp::Rl,
        ShiftOp::Rr,
        ShiftOp::Sla,
        ShiftOp::Sra,
        ShiftOp::Swap,
        ShiftOp::Srl,
    ];

    /// Returns the shifted value and the carry-out bit.
    pub fn shift(self, value: u8, carry_in: bool) -> (u8, bool) {
        match self {
            ShiftOp::Rlc => (value.rotate_left(1), value & 0x80 != 0),
            ShiftOp::Rrc => (value.rotate_right(1), value & 0x01 != 0),
            ShiftOp::Rl => ((value << 1) | carry_in as u8, value & 0x80 != 0),
            ShiftOp::Rr => ((value >> 1) | ((carry_in as u8) << 7), value & 0x01 != 0),
            ShiftOp::Sla => (value << 1, value & 0x80 != 0),
            ShiftOp::Sra => ((value >> 1) | (value & 0x80), value & 0x01 != 0),
            ShiftOp::Swap => (value.rotate_left(4), false),
            ShiftOp::Srl => (value >> 1, value & 0x01 != 0),
        }
    }

    /// CB-prefixed form: Z reflects the result.
    pub fn apply(self, value: u8, flags: Flags) -> (u8, Flags) {
        let (result, carry) = self.shift(value, flags.carry());
        (result, Flags::with(result == 0, false, false, carry))
    }

    /// Accumulator form (`RLCA`, `RRCA`, `RLA`, `RRA`): Z is always cleared.
    pub fn apply_accumulator(self, value: u8, flags: Flags) -> (u8, Flags) {
        let (result, carry) = self.shift(value, flags.carry());
        (result, Flags::with(false, false, false, carry))
    }
}

impl fmt::Display for ShiftOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShiftOp::Rlc => "RLC",
            ShiftOp::Rrc => "RRC",
            ShiftOp::Rl => "RL",
            ShiftOp::Rr => "RR",
            ShiftOp::Sla => "SLA",
            ShiftOp::Sra => "SRA",
            ShiftOp::Swap => "SWAP",
            ShiftOp::Srl => "SRL",
        };
        f.write_str(name)
    }
}

/// 8-bit addition. Half-carry comes from bit 3, carry from comparing the
/// unmasked sum against the 8-bit result.
pub fn add8(a: u8, value: u8, carry_in: bool) -> (u8, Flags) {
    let c = carry_in as u16;
    let half = (a & 0x0F) as u16 + (value & 0x0F) as u16 + c > 0x0F;
    let full = a as u16 + value as u16 + c;
    let result = full as u8;
    (result, Flags::with(result == 0, false, half, full > 0xFF))
}

pub fn sub8(a: u8, value: u8, borrow_in: bool) -> (u8, Flags) {
    let c = borrow_in as u16;
    let half = ((a & 0x0F) as u16) < (value & 0x0F) as u16 + c;
    let carry = (a as u16) < value as u16 + c;
    let result = a.wrapping_sub(value).wrapping_sub(c as u8);
    (result, Flags::with(result == 0, true, half, carry))
}

pub fn and8(a: u8, value: u8) -> (u8, Flags) {
    let result = a & value;
    (result, Flags::with(result == 0, false, true, false))
}

pub fn xor8(a: u8, value: u8) -> (u8, Flags) {
    let result = a ^ value;
    (result, Flags::with(result == 0, false, false, false))
}

pub fn or8(a: u8, value: u8) -> (u8, Flags) {
    let result = a | value;
    (result, Flags::with(result == 0, false, false, false))
}

/// Increment; carry is left as it was.
pub fn inc8(value: u8, flags: Flags) -> (u8, Flags) {
    let result = value.wrapping_add(1);
    let half = value & 0x0F == 0x0F;
    (result, Flags::with(result == 0, false, half, flags.carry()))
}

/// Decrement; carry is left as it was.
pub fn dec8(value: u8, flags: Flags) -> (u8, Flags) {
    let result = value.wrapping_sub(1);
    let half = value & 0x0F == 0x00;
    (result, Flags::with(result == 0, true, half, flags.carry()))
}

/// `ADD HL,rr`: Z untouched, half-carry out of bit 11, carry out of bit 15.
pub fn add16(hl: u16, value: u16, flags: Flags) -> (u16, Flags) {
    let half = (hl & 0x0FFF) + (value & 0x0FFF) > 0x0FFF;
    let full = hl as u32 + value as u32;
    (
        full as u16,
        Flags::with(flags.zero(), false, half, full > 0xFFFF),
    )
}

/// `ADD SP,e8` and `LD HL,SP+e8`: flags come from the unsigned low-byte add.
pub fn add_sp_offset(sp: u16, offset: u8) -> (u16, Flags) {
    let result = sp.wrapping_add(offset as i8 as i16 as u16);
    let half = (sp & 0x000F) + (offset as u16 & 0x000F) > 0x000F;
    let carry = (sp & 0x00FF) + offset as u16 > 0x00FF;
    (result, Flags::with(false, false, half, carry))
}

/// `BIT n,r`: Z set when the tested bit is clear; carry preserved.
pub fn bit(index: u8, value: u8, flags: Flags) -> Flags {
    Flags::with(value & (1 << index) == 0, false, true, flags.carry())
}

/// Decimal-adjust the accumulator after a BCD add or subtract.
pub fn daa(a: u8, flags: Flags) -> (u8, Flags) {
    let mut correction = 0u8;
    let mut carry = flags.carry();
    if flags.half_carry() || (!flags.subtract() && a & 0x0F > 0x09) {
        correction |= 0x06;
    }
    if flags.carry() || (!flags.subtract() && a > 0x99) {
        correction |= 0x60;
        carry = true;
    }
    let result = if flags.subtract() {
        a.wrapping_sub(correction)
    } else {
        a.wrapping_add(correction)
    };
    (
        result,
        Flags::with(result == 0, flags.subtract(), false, carry),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_sets_zero_half_and_carry() {
        let (result, flags) = add8(0x3A, 0xC6, false);
        assert_eq!(result, 0x00);
        assert_eq!(flags, Flags::ZERO | Flags::HALF_CARRY | Flags::CARRY);
    }

    #[test]
    fn adc_includes_carry_in_half_carry() {
        let (result, flags) = add8(0x0F, 0x00, true);
        assert_eq!(result, 0x10);
        assert_eq!(flags, Flags::HALF_CARRY);
    }

    #[test]
    fn sub_and_sbc_borrow() {
        let (result, flags) = sub8(0x3E, 0x3E, false);
        assert_eq!(result, 0);
        assert_eq!(flags, Flags::ZERO | Flags::SUBTRACT);

        let (result, flags) = sub8(0x10, 0x01, false);
        assert_eq!(result, 0x0F);
        assert_eq!(flags, Flags::SUBTRACT | Flags::HALF_CARRY);

        let (result, flags) = sub8(0x00, 0x00, true);
        assert_eq!(result, 0xFF);
        assert_eq!(flags, Flags::SUBTRACT | Flags::HALF_CARRY | Flags::CARRY);
    }

    #[test]
    fn cp_leaves_accumulator() {
        let (a, flags) = AluOp::Cp.apply(0x3C, 0x40, Flags::empty());
        assert_eq!(a, 0x3C);
        assert_eq!(flags, Flags::SUBTRACT | Flags::CARRY);
    }

    #[test]
    fn logic_ops_flags() {
        assert_eq!(and8(0xF0, 0x0F), (0x00, Flags::ZERO | Flags::HALF_CARRY));
        assert_eq!(or8(0xF0, 0x0F), (0xFF, Flags::empty()));
        assert_eq!(xor8(0xAA, 0xAA), (0x00, Flags::ZERO));
    }

    #[test]
    fn inc_from_ff_wraps_and_keeps_carry() {
        let (result, flags) = inc8(0xFF, Flags::CARRY);
        assert_eq!(result, 0x00);
        assert_eq!(flags, Flags::ZERO | Flags::HALF_CARRY | Flags::CARRY);

        let (_, flags) = inc8(0xFF, Flags::empty());
        assert!(!flags.carry());
    }

    #[test]
    fn dec_from_zero_wraps() {
        let (result, flags) = dec8(0x00, Flags::empty());
        assert_eq!(result, 0xFF);
        assert_eq!(flags, Flags::SUBTRACT | Flags::HALF_CARRY);

        let (result, flags) = dec8(0x01, Flags::CARRY);
        assert_eq!(result, 0x00);
        assert_eq!(flags, Flags::ZERO | Flags::SUBTRACT | Flags::CARRY);
    }

    #[test]
    fn add16_half_carry_from_bit_11() {
        let (result, flags) = add16(0x0FFF, 0x0001, Flags::ZERO);
        assert_eq!(result, 0x1000);
        assert_eq!(flags, Flags::ZERO | Flags::HALF_CARRY);

        let (result, flags) = add16(0xFFFF, 0x0001, Flags::empty());
        assert_eq!(result, 0x0000);
        assert_eq!(flags, Flags::HALF_CARRY | Flags::CARRY);
    }

    #[test]
    fn sp_offset_uses_low_byte_flags() {
        let (result, flags) = add_sp_offset(0xFFF8, 0x08);
        assert_eq!(result, 0x0000);
        assert_eq!(flags, Flags::HALF_CARRY | Flags::CARRY);

        let (result, flags) = add_sp_offset(0x0100, 0xFF);
        assert_eq!(result, 0x00FF);
        assert_eq!(flags, Flags::empty());
    }

    #[test]
    fn sla_and_sra_differ_in_direction() {
        let (sla, flags) = ShiftOp::Sla.apply(0x81, Flags::empty());
        assert_eq!(sla, 0x02);
        assert!(flags.carry());

        let (sra, flags) = ShiftOp::Sra.apply(0x81, Flags::empty());
        assert_eq!(sra, 0xC0);
        assert!(flags.carry());

        let (srl, _) = ShiftOp::Srl.apply(0x81, Flags::empty());
        assert_eq!(srl, 0x40);
    }

    #[test]
    fn rotates_through_carry() {
        assert_eq!(ShiftOp::Rl.shift(0x80, false), (0x00, true));
        assert_eq!(ShiftOp::Rl.shift(0x00, true), (0x01, false));
        assert_eq!(ShiftOp::Rr.shift(0x01, false), (0x00, true));
        assert_eq!(ShiftOp::Rr.shift(0x00, true), (0x80, false));
        assert_eq!(ShiftOp::Rlc.shift(0x80, false), (0x01, true));
        assert_eq!(ShiftOp::Swap.shift(0xF1, true), (0x1F, false));
    }

    #[test]
    fn accumulator_rotate_clears_zero() {
        let (result, flags) = ShiftOp::Rlc.apply_accumulator(0x00, Flags::ZERO);
        assert_eq!(result, 0x00);
        assert_eq!(flags, Flags::empty());
    }

    #[test]
    fn bit_test_preserves_carry() {
        assert_eq!(bit(7, 0x7F, Flags::CARRY), Flags::ZERO | Flags::HALF_CARRY | Flags::CARRY);
        assert_eq!(bit(0, 0x01, Flags::empty()), Flags::HALF_CARRY);
    }

    #[test]
    fn daa_adjusts_bcd_sums() {
        // 0x45 + 0x38 = 0x7D -> 0x83
        let (sum, flags) = add8(0x45, 0x38, false);
        let (adjusted, flags) = daa(sum, flags);
        assert_eq!(adjusted, 0x83);
        assert!(!flags.carry());

        // 0x99 + 0x01 = 0x9A -> 0x00 with carry
        let (sum, flags) = add8(0x99, 0x01, false);
        let (adjusted, flags) = daa(sum, flags);
        assert_eq!(adjusted, 0x00);
        assert_eq!(flags, Flags::ZERO | Flags::CARRY);

        // 0x83 - 0x38 = 0x4B -> 0x45
        let (diff, flags) = sub8(0x83, 0x38, false);
        let (adjusted, flags) = daa(diff, flags);
        assert_eq!(adjusted, 0x45);
        assert!(flags.subtract());
        assert!(!flags.half_carry());
    }
}
