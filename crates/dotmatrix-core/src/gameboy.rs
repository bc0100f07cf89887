use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};

use crate::breakpoints::{Breakpoint, BreakpointHit};
use crate::cartridge::Cartridge;
use crate::cpu::{Cpu, StepOutcome};
use crate::error::CoreError;
use crate::hardware::Model;
use crate::joypad::Button;
use crate::mmu::Mmu;
use crate::ppu::{Mode, SCREEN_HEIGHT, SCREEN_WIDTH};
use crate::registers::Registers;

/// Why [`GameBoy::run_frame`] or [`GameBoy::run_cycles`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    FrameComplete,
    Breakpoint(BreakpointHit),
    Paused,
    /// The CPU executed STOP and is waiting for input.
    Stopped,
    CyclesElapsed,
}

/// Handle a host thread can use to interrupt a running frame.
#[derive(Debug, Clone, Default)]
pub struct PauseToken(Arc<AtomicBool>);

impl PauseToken {
    pub fn pause(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// Read-only view of the machine state for debuggers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub regs: Registers,
    pub ime: bool,
    pub halted: bool,
    pub stopped: bool,
    pub cycles: u64,
    pub ly: u8,
    pub mode: Mode,
    pub ie: u8,
    pub if_: u8,
}

pub struct GameBoy {
    pub cpu: Cpu,
    pub mmu: Mmu,
    model: Model,
    pause: PauseToken,
}

impl GameBoy {
    /// A console in the state the boot ROM leaves behind, with no cartridge.
    pub fn new(model: Model) -> Self {
        Self {
            cpu: Cpu::post_boot(model),
            mmu: Mmu::new(model),
            model,
            pause: PauseToken::default(),
        }
    }

    /// A console at power-on that starts executing `boot_rom` at 0x0000.
    pub fn with_boot_rom(model: Model, boot_rom: Vec<u8>) -> Self {
        if boot_rom.len() < model.boot_rom_size() {
            warn!(
                "boot ROM is {} bytes, {:?} expects {}",
                boot_rom.len(),
                model,
                model.boot_rom_size()
            );
        }
        Self {
            cpu: Cpu::new(),
            mmu: Mmu::power_on(model, boot_rom),
            model,
            pause: PauseToken::default(),
        }
    }

    pub fn model(&self) -> Model {
        self.model
    }

    /// Insert a cartridge. A DMG-only cartridge on CGB hardware runs with
    /// the compatibility palettes.
    pub fn load_cartridge(&mut self, cart: Cartridge) {
        if self.model.is_cgb() && !cart.cgb() {
            debug!("DMG cartridge on CGB, using compatibility palettes");
            self.mmu.ppu_mut().enter_compatibility_mode();
        }
        self.mmu.load_cartridge(cart);
    }

    /// Execute a single instruction.
    pub fn step(&mut self) -> Result<StepOutcome, CoreError> {
        self.cpu.step(&mut self.mmu)
    }

    /// Run until the PPU completes a frame, a breakpoint trips, a pause is
    /// requested or the CPU stops.
    pub fn run_frame(&mut self) -> Result<RunOutcome, CoreError> {
        loop {
            if let Some(outcome) = self.run_one()? {
                return Ok(outcome);
            }
            if self.mmu.ppu().frame_ready() {
                self.mmu.ppu_mut().clear_frame_flag();
                return Ok(RunOutcome::FrameComplete);
            }
        }
    }

    /// Run for at least `budget` cycles, stopping early on a breakpoint,
    /// a pause request or STOP. Completed frames do not end the run.
    pub fn run_cycles(&mut self, budget: u64) -> Result<RunOutcome, CoreError> {
        let target = self.cpu.cycles.saturating_add(budget);
        while self.cpu.cycles < target {
            if let Some(outcome) = self.run_one()? {
                return Ok(outcome);
            }
            self.mmu.ppu_mut().clear_frame_flag();
        }
        Ok(RunOutcome::CyclesElapsed)
    }

    fn run_one(&mut self) -> Result<Option<RunOutcome>, CoreError> {
        if self.pause.take() {
            return Ok(Some(RunOutcome::Paused));
        }
        match self.step()? {
            StepOutcome::Ran { .. } => Ok(None),
            StepOutcome::Breakpoint(hit) => {
                debug!("breakpoint {} ({:?}) at PC={:04X}", hit.id, hit.kind, hit.pc);
                Ok(Some(RunOutcome::Breakpoint(hit)))
            }
            StepOutcome::Stopped => Ok(Some(RunOutcome::Stopped)),
        }
    }

    pub fn pause_token(&self) -> PauseToken {
        self.pause.clone()
    }

    pub fn add_breakpoint(&mut self, breakpoint: Breakpoint) -> u32 {
        self.mmu.breakpoints_mut().add(breakpoint)
    }

    pub fn remove_breakpoint(&mut self, id: u32) -> bool {
        self.mmu.breakpoints_mut().remove(id)
    }

    pub fn press(&mut self, button: Button) {
        self.mmu.press(button);
    }

    pub fn release(&mut self, button: Button) {
        self.mmu.release(button);
    }

    pub fn framebuffer(&self) -> &[u32; SCREEN_WIDTH * SCREEN_HEIGHT] {
        self.mmu.ppu().framebuffer()
    }

    /// Bytes shifted out over the serial port since the last call.
    pub fn take_serial(&mut self) -> Vec<u8> {
        self.mmu.take_serial()
    }

    pub fn snapshot(&self) -> Snapshot {
        let irq = self.mmu.interrupts();
        Snapshot {
            regs: self.cpu.regs,
            ime: self.cpu.ime,
            halted: self.cpu.halted,
            stopped: self.cpu.stopped,
            cycles: self.cpu.cycles,
            ly: self.mmu.ppu().ly(),
            mode: self.mmu.ppu().mode(),
            ie: irq.read_ie(),
            if_: irq.read_if(),
        }
    }
}

impl Default for GameBoy {
    fn default() -> Self {
        Self::new(Model::default())
    }
}
