//! Instruction descriptors and the 512-entry dispatch table.
//!
//! The base and CB-prefixed opcode pages are built once from a short list of
//! irregular opcodes plus bit-pattern rules over the regular register grid.
//! Every code point has an entry; the eleven holes in the base page are
//! explicit [`Slot::Unimplemented`] entries that decode to an error.

use std::fmt;
use std::sync::OnceLock;

use crate::alu::{AluOp, ShiftOp};
use crate::error::{DecodeError, Opcode};
use crate::registers::{Reg8, Reg16};

/// Base-page opcodes with no instruction.
pub const UNIMPLEMENTED_OPCODES: [u8; 11] = [
    0xD3, 0xDB, 0xDD, 0xE3, 0xE4, 0xEB, 0xEC, 0xED, 0xF4, 0xFC, 0xFD,
];

/// 8-bit operand addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand8 {
    Reg(Reg8),
    /// (HL)
    IndirectHl,
    /// (HL) then HL += 1
    IndirectHlInc,
    /// (HL) then HL -= 1
    IndirectHlDec,
    IndirectBc,
    IndirectDe,
    /// d8
    Immediate,
    /// (a16)
    Absolute,
    /// (0xFF00 + a8)
    HighImmediate,
    /// (0xFF00 + C)
    HighC,
}

impl Operand8 {
    /// Grid order used by the register fields of an opcode.
    pub const GRID: [Operand8; 8] = [
        Operand8::Reg(Reg8::B),
        Operand8::Reg(Reg8::C),
        Operand8::Reg(Reg8::D),
        Operand8::Reg(Reg8::E),
        Operand8::Reg(Reg8::H),
        Operand8::Reg(Reg8::L),
        Operand8::IndirectHl,
        Operand8::Reg(Reg8::A),
    ];

    pub fn from_grid(index: u8) -> Self {
        Self::GRID[(index & 0x07) as usize]
    }

    /// Extra cycles spent reaching the operand once.
    fn access_cycles(self) -> u8 {
        match self {
            Operand8::Reg(_) => 0,
            Operand8::IndirectHl
            | Operand8::IndirectHlInc
            | Operand8::IndirectHlDec
            | Operand8::IndirectBc
            | Operand8::IndirectDe
            | Operand8::Immediate
            | Operand8::HighC => 4,
            Operand8::HighImmediate => 8,
            Operand8::Absolute => 12,
        }
    }

    fn operand_bytes(self) -> u8 {
        match self {
            Operand8::Immediate | Operand8::HighImmediate => 1,
            Operand8::Absolute => 2,
            _ => 0,
        }
    }
}

impl fmt::Display for Operand8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand8::Reg(reg) => write!(f, "{reg}"),
            Operand8::IndirectHl => f.write_str("(HL)"),
            Operand8::IndirectHlInc => f.write_str("(HL+)"),
            Operand8::IndirectHlDec => f.write_str("(HL-)"),
            Operand8::IndirectBc => f.write_str("(BC)"),
            Operand8::IndirectDe => f.write_str("(DE)"),
            Operand8::Immediate => f.write_str("d8"),
            Operand8::Absolute => f.write_str("(a16)"),
            Operand8::HighImmediate => f.write_str("(FF00+a8)"),
            Operand8::HighC => f.write_str("(FF00+C)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Always,
    NotZero,
    Zero,
    NotCarry,
    Carry,
}

impl Condition {
    const GRID: [Condition; 4] = [
        Condition::NotZero,
        Condition::Zero,
        Condition::NotCarry,
        Condition::Carry,
    ];

    fn from_grid(index: u8) -> Self {
        Self::GRID[(index & 0x03) as usize]
    }

    /// Mnemonic prefix including the trailing comma where one is needed.
    fn prefix(self) -> &'static str {
        match self {
            Condition::Always => "",
            Condition::NotZero => "NZ,",
            Condition::Zero => "Z,",
            Condition::NotCarry => "NC,",
            Condition::Carry => "C,",
        }
    }
}

const REG16_GRID: [Reg16; 4] = [Reg16::BC, Reg16::DE, Reg16::HL, Reg16::SP];
const STACK_GRID: [Reg16; 4] = [Reg16::BC, Reg16::DE, Reg16::HL, Reg16::AF];

/// What an instruction does. Executed by [`Cpu`](crate::cpu::Cpu).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Nop,
    Stop,
    Halt,
    Di,
    Ei,
    Daa,
    Cpl,
    Scf,
    Ccf,
    /// RLCA / RRCA / RLA / RRA
    RotateA(ShiftOp),
    Ld {
        dst: Operand8,
        src: Operand8,
    },
    /// LD rr,d16
    LdImm16(Reg16),
    /// LD (a16),SP
    StoreSp,
    /// LD SP,HL
    LdSpHl,
    /// LD HL,SP+r8
    LdHlSpOffset,
    /// ADD SP,r8
    AddSpOffset,
    Alu {
        op: AluOp,
        src: Operand8,
    },
    Inc(Operand8),
    Dec(Operand8),
    Inc16(Reg16),
    Dec16(Reg16),
    AddHl(Reg16),
    Jp(Condition),
    JpHl,
    Jr(Condition),
    Call(Condition),
    Ret(Condition),
    Reti,
    Rst(u8),
    Push(Reg16),
    Pop(Reg16),
    /// 0xCB: the next byte selects from the prefixed page.
    Prefix,
    Shift {
        op: ShiftOp,
        target: Operand8,
    },
    Bit {
        index: u8,
        target: Operand8,
    },
    Res {
        index: u8,
        target: Operand8,
    },
    Set {
        index: u8,
        target: Operand8,
    },
}

/// Static description of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: u8,
    pub prefixed: bool,
    /// Cost in CPU cycles; for conditional control flow, the not-taken cost.
    /// Prefixed entries include the prefix fetch.
    pub cycles: u8,
    /// Added to `cycles` when a conditional branch is taken.
    pub branch_extra: u8,
    /// Immediate bytes following the opcode.
    pub operand_bytes: u8,
    pub op: Op,
}

impl Instruction {
    const fn new(opcode: u8, op: Op, cycles: u8, operand_bytes: u8) -> Self {
        Self {
            opcode,
            prefixed: false,
            cycles,
            branch_extra: 0,
            operand_bytes,
            op,
        }
    }

    const fn branching(mut self, extra: u8) -> Self {
        self.branch_extra = extra;
        self
    }

    /// Total bytes including the opcode (and prefix).
    pub fn length(&self) -> u8 {
        1 + self.prefixed as u8 + self.operand_bytes
    }

    pub fn cycles_for(&self, taken: bool) -> u32 {
        let extra = if taken { self.branch_extra } else { 0 };
        self.cycles as u32 + extra as u32
    }

    pub fn opcode_id(&self) -> Opcode {
        Opcode {
            code: self.opcode,
            prefixed: self.prefixed,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            Op::Nop => f.write_str("NOP"),
            Op::Stop => f.write_str("STOP"),
            Op::Halt => f.write_str("HALT"),
            Op::Di => f.write_str("DI"),
            Op::Ei => f.write_str("EI"),
            Op::Daa => f.write_str("DAA"),
            Op::Cpl => f.write_str("CPL"),
            Op::Scf => f.write_str("SCF"),
            Op::Ccf => f.write_str("CCF"),
            Op::RotateA(op) => write!(f, "{op}A"),
            Op::Ld { dst, src } => write!(f, "LD {dst},{src}"),
            Op::LdImm16(reg) => write!(f, "LD {reg},d16"),
            Op::StoreSp => f.write_str("LD (a16),SP"),
            Op::LdSpHl => f.write_str("LD SP,HL"),
            Op::LdHlSpOffset => f.write_str("LD HL,SP+r8"),
            Op::AddSpOffset => f.write_str("ADD SP,r8"),
            Op::Alu { op, src } => write!(f, "{}{src}", op.prefix()),
            Op::Inc(target) => write!(f, "INC {target}"),
            Op::Dec(target) => write!(f, "DEC {target}"),
            Op::Inc16(reg) => write!(f, "INC {reg}"),
            Op::Dec16(reg) => write!(f, "DEC {reg}"),
            Op::AddHl(reg) => write!(f, "ADD HL,{reg}"),
            Op::Jp(cond) => write!(f, "JP {}a16", cond.prefix()),
            Op::JpHl => f.write_str("JP HL"),
            Op::Jr(cond) => write!(f, "JR {}r8", cond.prefix()),
            Op::Call(cond) => write!(f, "CALL {}a16", cond.prefix()),
            Op::Ret(Condition::Always) => f.write_str("RET"),
            Op::Ret(cond) => write!(f, "RET {}", cond.prefix().trim_end_matches(',')),
            Op::Reti => f.write_str("RETI"),
            Op::Rst(vector) => write!(f, "RST {vector:02X}H"),
            Op::Push(reg) => write!(f, "PUSH {reg}"),
            Op::Pop(reg) => write!(f, "POP {reg}"),
            Op::Prefix => f.write_str("PREFIX CB"),
            Op::Shift { op, target } => write!(f, "{op} {target}"),
            Op::Bit { index, target } => write!(f, "BIT {index},{target}"),
            Op::Res { index, target } => write!(f, "RES {index},{target}"),
            Op::Set { index, target } => write!(f, "SET {index},{target}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Implemented(Instruction),
    Unimplemented(Opcode),
}

/// A bit-pattern decode rule: opcodes with `code & mask == pattern` are
/// built by `build`.
struct DecodeRule {
    mask: u8,
    pattern: u8,
    build: fn(u8) -> Instruction,
}

fn ld(code: u8, dst: Operand8, src: Operand8) -> Instruction {
    let cycles = 4 + dst.access_cycles() + src.access_cycles();
    let bytes = dst.operand_bytes() + src.operand_bytes();
    Instruction::new(code, Op::Ld { dst, src }, cycles, bytes)
}

fn alu(code: u8, op: AluOp, src: Operand8) -> Instruction {
    Instruction::new(
        code,
        Op::Alu { op, src },
        4 + src.access_cycles(),
        src.operand_bytes(),
    )
}

// Read and write back.
fn read_modify_write(base: u8, target: Operand8) -> u8 {
    base + 2 * target.access_cycles()
}

const BASE_RULES: &[DecodeRule] = &[
    DecodeRule {
        mask: 0xC0,
        pattern: 0x40,
        build: |code| ld(code, Operand8::from_grid(code >> 3), Operand8::from_grid(code)),
    },
    DecodeRule {
        mask: 0xC0,
        pattern: 0x80,
        build: |code| alu(code, AluOp::ALL[((code >> 3) & 7) as usize], Operand8::from_grid(code)),
    },
    DecodeRule {
        mask: 0xC7,
        pattern: 0xC6,
        build: |code| alu(code, AluOp::ALL[((code >> 3) & 7) as usize], Operand8::Immediate),
    },
    DecodeRule {
        mask: 0xC7,
        pattern: 0x04,
        build: |code| {
            let target = Operand8::from_grid(code >> 3);
            Instruction::new(code, Op::Inc(target), read_modify_write(4, target), 0)
        },
    },
    DecodeRule {
        mask: 0xC7,
        pattern: 0x05,
        build: |code| {
            let target = Operand8::from_grid(code >> 3);
            Instruction::new(code, Op::Dec(target), read_modify_write(4, target), 0)
        },
    },
    DecodeRule {
        mask: 0xC7,
        pattern: 0x06,
        build: |code| ld(code, Operand8::from_grid(code >> 3), Operand8::Immediate),
    },
    DecodeRule {
        mask: 0xCF,
        pattern: 0x01,
        build: |code| Instruction::new(code, Op::LdImm16(REG16_GRID[(code >> 4) as usize & 3]), 12, 2),
    },
    DecodeRule {
        mask: 0xCF,
        pattern: 0x03,
        build: |code| Instruction::new(code, Op::Inc16(REG16_GRID[(code >> 4) as usize & 3]), 8, 0),
    },
    DecodeRule {
        mask: 0xCF,
        pattern: 0x0B,
        build: |code| Instruction::new(code, Op::Dec16(REG16_GRID[(code >> 4) as usize & 3]), 8, 0),
    },
    DecodeRule {
        mask: 0xCF,
        pattern: 0x09,
        build: |code| Instruction::new(code, Op::AddHl(REG16_GRID[(code >> 4) as usize & 3]), 8, 0),
    },
    DecodeRule {
        mask: 0xCF,
        pattern: 0xC5,
        build: |code| Instruction::new(code, Op::Push(STACK_GRID[(code >> 4) as usize & 3]), 16, 0),
    },
    DecodeRule {
        mask: 0xCF,
        pattern: 0xC1,
        build: |code| Instruction::new(code, Op::Pop(STACK_GRID[(code >> 4) as usize & 3]), 12, 0),
    },
    DecodeRule {
        mask: 0xE7,
        pattern: 0x20,
        build: |code| Instruction::new(code, Op::Jr(Condition::from_grid(code >> 3)), 8, 1).branching(4),
    },
    DecodeRule {
        mask: 0xE7,
        pattern: 0xC0,
        build: |code| Instruction::new(code, Op::Ret(Condition::from_grid(code >> 3)), 8, 0).branching(12),
    },
    DecodeRule {
        mask: 0xE7,
        pattern: 0xC2,
        build: |code| Instruction::new(code, Op::Jp(Condition::from_grid(code >> 3)), 12, 2).branching(4),
    },
    DecodeRule {
        mask: 0xE7,
        pattern: 0xC4,
        build: |code| Instruction::new(code, Op::Call(Condition::from_grid(code >> 3)), 12, 2).branching(12),
    },
    DecodeRule {
        mask: 0xC7,
        pattern: 0xC7,
        build: |code| Instruction::new(code, Op::Rst(code & 0x38), 16, 0),
    },
];

/// Irregular base-page opcodes, consulted before the rules. HALT sits where
/// `LD (HL),(HL)` would be.
fn static_exception(code: u8) -> Option<Instruction> {
    use Operand8::*;
    let a = Reg(Reg8::A);
    let instruction = match code {
        0x00 => Instruction::new(code, Op::Nop, 4, 0),
        0x10 => Instruction::new(code, Op::Stop, 4, 1),
        0x76 => Instruction::new(code, Op::Halt, 4, 0),
        0xF3 => Instruction::new(code, Op::Di, 4, 0),
        0xFB => Instruction::new(code, Op::Ei, 4, 0),
        0x27 => Instruction::new(code, Op::Daa, 4, 0),
        0x2F => Instruction::new(code, Op::Cpl, 4, 0),
        0x37 => Instruction::new(code, Op::Scf, 4, 0),
        0x3F => Instruction::new(code, Op::Ccf, 4, 0),
        0x07 => Instruction::new(code, Op::RotateA(ShiftOp::Rlc), 4, 0),
        0x0F => Instruction::new(code, Op::RotateA(ShiftOp::Rrc), 4, 0),
        0x17 => Instruction::new(code, Op::RotateA(ShiftOp::Rl), 4, 0),
        0x1F => Instruction::new(code, Op::RotateA(ShiftOp::Rr), 4, 0),
        0x02 => ld(code, IndirectBc, a),
        0x12 => ld(code, IndirectDe, a),
        0x22 => ld(code, IndirectHlInc, a),
        0x32 => ld(code, IndirectHlDec, a),
        0x0A => ld(code, a, IndirectBc),
        0x1A => ld(code, a, IndirectDe),
        0x2A => ld(code, a, IndirectHlInc),
        0x3A => ld(code, a, IndirectHlDec),
        0xE0 => ld(code, HighImmediate, a),
        0xF0 => ld(code, a, HighImmediate),
        0xE2 => ld(code, HighC, a),
        0xF2 => ld(code, a, HighC),
        0xEA => ld(code, Absolute, a),
        0xFA => ld(code, a, Absolute),
        0x08 => Instruction::new(code, Op::StoreSp, 20, 2),
        0xF9 => Instruction::new(code, Op::LdSpHl, 8, 0),
        0xE8 => Instruction::new(code, Op::AddSpOffset, 16, 1),
        0xF8 => Instruction::new(code, Op::LdHlSpOffset, 12, 1),
        0xC3 => Instruction::new(code, Op::Jp(Condition::Always), 16, 2),
        0xE9 => Instruction::new(code, Op::JpHl, 4, 0),
        0x18 => Instruction::new(code, Op::Jr(Condition::Always), 12, 1),
        0xCD => Instruction::new(code, Op::Call(Condition::Always), 24, 2),
        0xC9 => Instruction::new(code, Op::Ret(Condition::Always), 16, 0),
        0xD9 => Instruction::new(code, Op::Reti, 16, 0),
        0xCB => Instruction::new(code, Op::Prefix, 4, 0),
        _ => return None,
    };
    Some(instruction)
}

fn base_slot(code: u8) -> Slot {
    let decoded = static_exception(code).or_else(|| {
        BASE_RULES
            .iter()
            .find(|rule| code & rule.mask == rule.pattern)
            .map(|rule| (rule.build)(code))
    });
    let unimplemented = UNIMPLEMENTED_OPCODES.contains(&code);
    match (decoded, unimplemented) {
        (Some(instruction), false) => Slot::Implemented(instruction),
        (None, true) => Slot::Unimplemented(Opcode::base(code)),
        (Some(_), true) => panic!("opcode {code:02X} is both decoded and listed as unimplemented"),
        (None, false) => panic!("opcode {code:02X} matches no decode rule"),
    }
}

fn prefixed_slot(code: u8) -> Slot {
    let target = Operand8::from_grid(code);
    let index = (code >> 3) & 0x07;
    let (op, cycles) = match code >> 6 {
        0 => (
            Op::Shift {
                op: ShiftOp::ALL[index as usize],
                target,
            },
            read_modify_write(8, target),
        ),
        1 => (Op::Bit { index, target }, 8 + target.access_cycles()),
        2 => (Op::Res { index, target }, read_modify_write(8, target)),
        _ => (Op::Set { index, target }, read_modify_write(8, target)),
    };
    Slot::Implemented(Instruction {
        opcode: code,
        prefixed: true,
        cycles,
        branch_extra: 0,
        operand_bytes: 0,
        op,
    })
}

pub struct InstructionTable {
    base: [Slot; 256],
    prefixed: [Slot; 256],
}

impl InstructionTable {
    fn build() -> Self {
        Self {
            base: std::array::from_fn(|code| base_slot(code as u8)),
            prefixed: std::array::from_fn(|code| prefixed_slot(code as u8)),
        }
    }

    pub fn slot(&self, opcode: Opcode) -> &Slot {
        if opcode.prefixed {
            &self.prefixed[opcode.code as usize]
        } else {
            &self.base[opcode.code as usize]
        }
    }

    pub fn decode(&self, opcode: Opcode) -> Result<&Instruction, DecodeError> {
        match self.slot(opcode) {
            Slot::Implemented(instruction) => Ok(instruction),
            Slot::Unimplemented(opcode) => Err(DecodeError::InstructionNotFound { opcode: *opcode }),
        }
    }

    /// All 512 slots, base page first.
    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.base.iter().chain(self.prefixed.iter())
    }
}

static TABLE: OnceLock<InstructionTable> = OnceLock::new();

pub fn table() -> &'static InstructionTable {
    TABLE.get_or_init(InstructionTable::build)
}

/// Look up the instruction for `opcode`.
pub fn decode(opcode: Opcode) -> Result<&'static Instruction, DecodeError> {
    table().decode(opcode)
}
