//! Fetch/decode/execute loop and interrupt dispatch.

use crate::alu;
use crate::breakpoints::BreakpointHit;
use crate::error::{CoreError, DecodeError, Opcode};
use crate::hardware::Model;
use crate::instructions::{self, Condition, Instruction, Op, Operand8};
use crate::memory::MemoryCell;
use crate::mmu::Mmu;
use crate::registers::{Cell, Flags, Reg16, Registers};

// Halted CPU idles one M-cycle per step.
const HALT_CYCLES: u32 = 4;
const INTERRUPT_DISPATCH_CYCLES: u32 = 20;

/// Result of one [`Cpu::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step completed and its cycles were granted to every subscriber.
    Ran { cycles: u32 },
    /// A breakpoint tripped. For execute breakpoints nothing ran; for write
    /// breakpoints the instruction completed but its bus writes and cycles
    /// are held back until the next step.
    Breakpoint(BreakpointHit),
    /// The CPU is in STOP and waiting for a button press.
    Stopped,
}

#[derive(Debug, Clone)]
pub struct Cpu {
    pub regs: Registers,
    pub ime: bool,
    pub halted: bool,
    pub stopped: bool,
    /// Total cycles executed.
    pub cycles: u64,
    /// EI was executed; IME turns on after the next instruction.
    ime_pending: bool,
    /// The next opcode fetch does not advance PC.
    halt_bug: bool,
    /// Cycles withheld from subscribers after a write breakpoint.
    deferred_cycles: u32,
    /// Execute breakpoint that already fired at this PC.
    resume_at: Option<u16>,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    /// Power-on state: zeroed registers, PC at the boot ROM entry.
    pub fn new() -> Self {
        Self {
            regs: Registers::default(),
            ime: false,
            halted: false,
            stopped: false,
            cycles: 0,
            ime_pending: false,
            halt_bug: false,
            deferred_cycles: 0,
            resume_at: None,
        }
    }

    /// State at the cartridge entry point after the boot ROM has run.
    pub fn post_boot(model: Model) -> Self {
        Self {
            regs: model.post_boot_registers(),
            ..Self::new()
        }
    }

    /// Execute one instruction (or one idle HALT period), dispatch a pending
    /// interrupt and grant the elapsed cycles to the clock subscribers.
    pub fn step(&mut self, mmu: &mut Mmu) -> Result<StepOutcome, CoreError> {
        mmu.release_held_writes();
        if self.deferred_cycles > 0 {
            mmu.tick(std::mem::take(&mut self.deferred_cycles));
        }

        if self.stopped {
            if !mmu.joypad().any_pressed() {
                return Ok(StepOutcome::Stopped);
            }
            self.stopped = false;
        }

        let mut cycles = if self.halted {
            HALT_CYCLES
        } else {
            let pc = self.regs.pc;
            if self.resume_at.take() != Some(pc) && mmu.breakpoints_mut().check_execute(pc) {
                self.resume_at = Some(pc);
                if let Some(hit) = mmu.breakpoints_mut().take_hit() {
                    return Ok(StepOutcome::Breakpoint(hit));
                }
            }

            let enable_after = self.ime_pending;
            let instruction = self.fetch_instruction(mmu)?;
            #[cfg(feature = "cpu-trace")]
            log::trace!("{pc:04X}: {instruction} | {}", self.regs);
            let operand = self.fetch_operand(mmu, instruction);
            mmu.set_cpu_pc(pc);
            let cycles = self.execute(instruction, operand, mmu);
            if enable_after && self.ime_pending {
                self.ime_pending = false;
                self.ime = true;
            }
            cycles
        };

        cycles += mmu.take_stall_cycles();
        cycles += self.service_interrupts(mmu);
        self.cycles += cycles as u64;

        if let Some(hit) = mmu.breakpoints_mut().take_hit() {
            self.deferred_cycles = cycles;
            return Ok(StepOutcome::Breakpoint(hit));
        }
        mmu.tick(cycles);
        Ok(StepOutcome::Ran { cycles })
    }

    fn fetch_instruction(&mut self, mmu: &mut Mmu) -> Result<&'static Instruction, CoreError> {
        let start = self.regs.pc;
        let halt_bug = self.halt_bug;
        let code = mmu.read(start);
        if halt_bug {
            self.halt_bug = false;
        } else {
            self.regs.pc = start.wrapping_add(1);
        }
        let rewind = |cpu: &mut Self, source: DecodeError| {
            cpu.regs.pc = start;
            cpu.halt_bug = halt_bug;
            CoreError::Decode { source, pc: start }
        };
        let instruction = match instructions::decode(Opcode::base(code)) {
            Ok(instruction) => instruction,
            Err(source) => return Err(rewind(self, source)),
        };
        if instruction.op != Op::Prefix {
            return Ok(instruction);
        }
        let code = self.fetch8(mmu);
        instructions::decode(Opcode::prefixed(code)).map_err(|source| rewind(self, source))
    }

    fn fetch_operand(&mut self, mmu: &mut Mmu, instruction: &Instruction) -> u16 {
        match instruction.operand_bytes {
            0 => 0,
            1 => self.fetch8(mmu) as u16,
            _ => {
                let lo = self.fetch8(mmu);
                let hi = self.fetch8(mmu);
                u16::from_le_bytes([lo, hi])
            }
        }
    }

    fn fetch8(&mut self, mmu: &mut Mmu) -> u8 {
        let pc = self.regs.advance_pc();
        mmu.read(pc)
    }

    fn push(&mut self, mmu: &mut Mmu, value: u16) {
        let [hi, lo] = value.to_be_bytes();
        self.regs.sp.decrement();
        mmu.write(self.regs.sp, hi);
        self.regs.sp.decrement();
        mmu.write(self.regs.sp, lo);
    }

    fn pop(&mut self, mmu: &mut Mmu) -> u16 {
        let lo = mmu.read(self.regs.sp);
        self.regs.sp.increment();
        let hi = mmu.read(self.regs.sp);
        self.regs.sp.increment();
        u16::from_le_bytes([lo, hi])
    }

    fn condition(&self, condition: Condition) -> bool {
        let flags = self.regs.f;
        match condition {
            Condition::Always => true,
            Condition::NotZero => !flags.zero(),
            Condition::Zero => flags.zero(),
            Condition::NotCarry => !flags.carry(),
            Condition::Carry => flags.carry(),
        }
    }

    /// Memory address an indirect operand refers to, applying HL+/HL-.
    fn operand_addr(&mut self, operand: Operand8, immediate: u16) -> Option<u16> {
        let addr = match operand {
            Operand8::Reg(_) | Operand8::Immediate => return None,
            Operand8::IndirectHl => self.regs.hl(),
            Operand8::IndirectHlInc => {
                let hl = self.regs.hl();
                self.regs.update16(Reg16::HL, |v| v.increment());
                hl
            }
            Operand8::IndirectHlDec => {
                let hl = self.regs.hl();
                self.regs.update16(Reg16::HL, |v| v.decrement());
                hl
            }
            Operand8::IndirectBc => self.regs.read16(Reg16::BC),
            Operand8::IndirectDe => self.regs.read16(Reg16::DE),
            Operand8::Absolute => immediate,
            Operand8::HighImmediate => 0xFF00 | (immediate & 0x00FF),
            Operand8::HighC => 0xFF00 | self.regs.c as u16,
        };
        Some(addr)
    }

    fn read_operand(&mut self, mmu: &mut Mmu, operand: Operand8, immediate: u16) -> u8 {
        match operand {
            Operand8::Reg(reg) => self.regs.read8(reg),
            Operand8::Immediate => immediate as u8,
            _ => match self.operand_addr(operand, immediate) {
                Some(addr) => mmu.read(addr),
                None => 0xFF,
            },
        }
    }

    fn write_operand(&mut self, mmu: &mut Mmu, operand: Operand8, immediate: u16, value: u8) {
        match operand {
            Operand8::Reg(reg) => self.regs.write8(reg, value),
            Operand8::Immediate => {}
            _ => {
                if let Some(addr) = self.operand_addr(operand, immediate) {
                    mmu.write(addr, value);
                }
            }
        }
    }

    /// Read-modify-write through the operand's cell.
    fn modify(&mut self, mmu: &mut Mmu, target: Operand8, f: impl FnOnce(u8, Flags) -> (u8, Flags)) {
        if let Operand8::Reg(reg) = target {
            let (value, flags) = f(self.regs.read8(reg), self.regs.f);
            self.regs.write8(reg, value);
            self.regs.f = flags;
        } else if let Some(addr) = self.operand_addr(target, 0) {
            let mut cell = mmu.cell_at(addr);
            let (value, flags) = f(cell.read(), self.regs.f);
            cell.write(value);
            self.regs.f = flags;
        }
    }

    /// Apply `instruction` with its already-fetched immediate operand.
    /// Returns the cycles it cost.
    pub fn execute(&mut self, instruction: &Instruction, operand: u16, mmu: &mut Mmu) -> u32 {
        let mut taken = false;
        match instruction.op {
            Op::Nop | Op::Prefix => {}
            Op::Stop => {
                mmu.reset_div();
                if mmu.speed_switch_armed() {
                    mmu.switch_speed();
                } else {
                    self.stopped = true;
                }
            }
            Op::Halt => {
                if !self.ime && mmu.interrupts().any_pending() {
                    self.halt_bug = true;
                } else {
                    self.halted = true;
                }
            }
            Op::Di => {
                self.ime = false;
                self.ime_pending = false;
            }
            Op::Ei => self.ime_pending = true,
            Op::Daa => {
                let (a, flags) = alu::daa(self.regs.a, self.regs.f);
                self.regs.a = a;
                self.regs.f = flags;
            }
            Op::Cpl => {
                self.regs.a = !self.regs.a;
                self.regs.f.insert(Flags::SUBTRACT | Flags::HALF_CARRY);
            }
            Op::Scf => {
                self.regs.f = Flags::with(self.regs.f.zero(), false, false, true);
            }
            Op::Ccf => {
                let flags = self.regs.f;
                self.regs.f = Flags::with(flags.zero(), false, false, !flags.carry());
            }
            Op::RotateA(op) => {
                let (a, flags) = op.apply_accumulator(self.regs.a, self.regs.f);
                self.regs.a = a;
                self.regs.f = flags;
            }
            Op::Ld { dst, src } => {
                let value = self.read_operand(mmu, src, operand);
                self.write_operand(mmu, dst, operand, value);
            }
            Op::LdImm16(reg) => self.regs.write16(reg, operand),
            Op::StoreSp => {
                let [hi, lo] = self.regs.sp.to_be_bytes();
                mmu.write(operand, lo);
                mmu.write(operand.wrapping_add(1), hi);
            }
            Op::LdSpHl => self.regs.sp = self.regs.hl(),
            Op::LdHlSpOffset => {
                let (value, flags) = alu::add_sp_offset(self.regs.sp, operand as u8);
                self.regs.set_hl(value);
                self.regs.f = flags;
            }
            Op::AddSpOffset => {
                let (value, flags) = alu::add_sp_offset(self.regs.sp, operand as u8);
                self.regs.sp = value;
                self.regs.f = flags;
            }
            Op::Alu { op, src } => {
                let value = self.read_operand(mmu, src, operand);
                let (a, flags) = op.apply(self.regs.a, value, self.regs.f);
                self.regs.a = a;
                self.regs.f = flags;
            }
            Op::Inc(target) => self.modify(mmu, target, alu::inc8),
            Op::Dec(target) => self.modify(mmu, target, alu::dec8),
            Op::Inc16(reg) => self.regs.update16(reg, |v| v.increment()),
            Op::Dec16(reg) => self.regs.update16(reg, |v| v.decrement()),
            Op::AddHl(reg) => {
                let (value, flags) = alu::add16(self.regs.hl(), self.regs.read16(reg), self.regs.f);
                self.regs.set_hl(value);
                self.regs.f = flags;
            }
            Op::Jp(condition) => {
                taken = self.condition(condition);
                if taken {
                    self.regs.pc = operand;
                }
            }
            Op::JpHl => self.regs.pc = self.regs.hl(),
            Op::Jr(condition) => {
                taken = self.condition(condition);
                if taken {
                    let offset = operand as u8 as i8 as i16;
                    self.regs.pc = self.regs.pc.wrapping_add_signed(offset);
                }
            }
            Op::Call(condition) => {
                taken = self.condition(condition);
                if taken {
                    self.push(mmu, self.regs.pc);
                    self.regs.pc = operand;
                }
            }
            Op::Ret(condition) => {
                taken = self.condition(condition);
                if taken {
                    self.regs.pc = self.pop(mmu);
                }
            }
            Op::Reti => {
                self.regs.pc = self.pop(mmu);
                self.ime = true;
            }
            Op::Rst(vector) => {
                self.push(mmu, self.regs.pc);
                self.regs.pc = vector as u16;
            }
            Op::Push(reg) => self.push(mmu, self.regs.read16(reg)),
            Op::Pop(reg) => {
                let value = self.pop(mmu);
                self.regs.write16(reg, value);
            }
            Op::Shift { op, target } => self.modify(mmu, target, |v, f| op.apply(v, f)),
            Op::Bit { index, target } => {
                let value = self.read_operand(mmu, target, operand);
                self.regs.f = alu::bit(index, value, self.regs.f);
            }
            Op::Res { index, target } => self.modify(mmu, target, |v, f| (v & !(1 << index), f)),
            Op::Set { index, target } => self.modify(mmu, target, |v, f| (v | (1 << index), f)),
        }
        instruction.cycles_for(taken)
    }

    /// Dispatch the highest-priority pending interrupt. A halted CPU wakes on
    /// any pending line; without IME it only wakes.
    fn service_interrupts(&mut self, mmu: &mut Mmu) -> u32 {
        let Some(interrupt) = mmu.interrupts().pending() else {
            return 0;
        };
        if !self.ime {
            self.halted = false;
            return 0;
        }
        self.halted = false;
        self.ime = false;
        mmu.interrupts_mut().acknowledge(interrupt);
        self.push(mmu, self.regs.pc);
        self.regs.pc = interrupt.vector();
        INTERRUPT_DISPATCH_CYCLES
    }
}
