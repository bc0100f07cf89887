use log::{debug, trace};

use crate::audio::{AudioRegisters, AudioSink};
use crate::breakpoints::BreakpointEngine;
use crate::cartridge::Cartridge;
use crate::clock::{ClockSchedule, ClockSlot, ClockSubscriber};
use crate::hardware::Model;
use crate::interrupts::InterruptController;
use crate::joypad::{Button, Joypad};
use crate::memory::{MaskedCell, MemoryCell, Region};
use crate::ppu::{Lcdc, Ppu};
use crate::serial::{LinkPort, Serial};
use crate::timer::Timer;

const WRAM_BANK_SIZE: usize = 0x1000;
const WRAM_BANKS: usize = 8;
const HRAM_SIZE: usize = 0x7F;
const OAM_DMA_LEN: u16 = 0xA0;
const VRAM_DMA_BLOCK: u16 = 0x10;
/// Setup overhead of a general-purpose VRAM DMA.
const GDMA_OVERHEAD_CYCLES: u32 = 4;
/// Four cycles per two bytes.
const VRAM_DMA_BLOCK_CYCLES: u32 = 32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct VramDma {
    source: u16,
    dest: u16,
    /// Blocks still to copy. Kept after a cancel so FF55 can report them.
    blocks_left: u8,
    hblank_active: bool,
}

impl VramDma {
    #[inline]
    fn sanitize_dest(addr: u16) -> u16 {
        0x8000 | (addr & 0x1FF0)
    }

    fn status(&self) -> u8 {
        let remaining = self.blocks_left.wrapping_sub(1) & 0x7F;
        if self.hblank_active { remaining } else { 0x80 | remaining }
    }
}

/// The address-space dispatcher. Owns every memory-mapped component and
/// broadcasts elapsed cycles to them in schedule order.
pub struct Mmu {
    model: Model,
    cart: Option<Cartridge>,
    boot_rom: Option<Vec<u8>>,
    boot_mapped: bool,
    wram: [[u8; WRAM_BANK_SIZE]; WRAM_BANKS],
    svbk: MaskedCell,
    hram: [u8; HRAM_SIZE],
    irq: InterruptController,
    ppu: Ppu,
    timer: Timer,
    serial: Serial,
    audio: AudioRegisters,
    joypad: Joypad,
    /// Last value written to FF46.
    dma: u8,
    vram_dma: VramDma,
    /// KEY1 bit 7 (current speed) and bit 0 (switch armed).
    key1: u8,
    double_speed: bool,
    breakpoints: BreakpointEngine,
    /// CPU writes made after a write breakpoint tripped, stored on resume.
    held_writes: Vec<(u16, u8)>,
    cpu_pc: u16,
    stall_cycles: u32,
    schedule: ClockSchedule,
    subscribers: Vec<Box<dyn ClockSubscriber>>,
}

impl Mmu {
    /// Bus in the state the boot ROM leaves behind.
    pub fn new(model: Model) -> Self {
        let mut mmu = Self::base(model);
        mmu.timer = Timer::with_counter(model.post_boot_div());
        mmu.ppu.apply_post_boot();
        mmu.irq.write_if(0x01);
        mmu
    }

    /// Bus at power-on with `boot_rom` mapped over the cartridge.
    pub fn power_on(model: Model, boot_rom: Vec<u8>) -> Self {
        let mut mmu = Self::base(model);
        mmu.boot_rom = Some(boot_rom);
        mmu.boot_mapped = true;
        mmu
    }

    fn base(model: Model) -> Self {
        let cgb = model.is_cgb();
        Self {
            model,
            cart: None,
            boot_rom: None,
            boot_mapped: false,
            wram: [[0; WRAM_BANK_SIZE]; WRAM_BANKS],
            svbk: MaskedCell::new(0, 0x07, 0xF8),
            hram: [0; HRAM_SIZE],
            irq: InterruptController::new(),
            ppu: Ppu::new(cgb),
            timer: Timer::new(),
            serial: Serial::new(cgb),
            audio: AudioRegisters::default(),
            joypad: Joypad::new(),
            dma: 0xFF,
            vram_dma: VramDma::default(),
            key1: 0,
            double_speed: false,
            breakpoints: BreakpointEngine::default(),
            held_writes: Vec::new(),
            cpu_pc: 0,
            stall_cycles: 0,
            schedule: ClockSchedule::default(),
            subscribers: Vec::new(),
        }
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn load_cartridge(&mut self, cart: Cartridge) {
        self.cart = Some(cart);
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.cart.as_ref()
    }

    pub fn cartridge_mut(&mut self) -> Option<&mut Cartridge> {
        self.cart.as_mut()
    }

    pub fn attach_audio(&mut self, sink: Box<dyn AudioSink>) {
        self.audio.attach(sink);
    }

    pub fn connect_link(&mut self, port: Box<dyn LinkPort>) {
        self.serial.connect(port);
    }

    /// Register a host subscriber after the built-in ones. Returns its index.
    pub fn subscribe(&mut self, subscriber: Box<dyn ClockSubscriber>) -> usize {
        let index = self.subscribers.len();
        self.subscribers.push(subscriber);
        self.schedule.push(ClockSlot::External(index));
        index
    }

    pub fn schedule(&self) -> &ClockSchedule {
        &self.schedule
    }

    pub fn boot_rom_mapped(&self) -> bool {
        self.boot_mapped
    }

    fn wram_bank(&self) -> usize {
        if self.model.is_cgb() {
            (self.svbk.raw() as usize & 0x07).max(1)
        } else {
            1
        }
    }

    fn boot_rom_byte(&self, addr: u16) -> Option<u8> {
        if !self.boot_mapped {
            return None;
        }
        let overlaid = match self.model {
            Model::Dmg => addr < 0x100,
            Model::Cgb => addr < 0x100 || (0x200..0x900).contains(&addr),
        };
        if !overlaid {
            return None;
        }
        let rom = self.boot_rom.as_ref()?;
        Some(rom.get(addr as usize).copied().unwrap_or(0xFF))
    }

    /// Read a byte as the CPU sees it, including writes held back by a
    /// write breakpoint.
    pub fn read(&self, addr: u16) -> u8 {
        if let Some(&(_, value)) = self.held_writes.iter().rev().find(|(a, _)| *a == addr) {
            return value;
        }
        self.load(addr, true)
    }

    /// Side-effect-free read for debuggers. Shows committed memory only.
    pub fn peek(&self, addr: u16) -> u8 {
        self.load(addr, false)
    }

    fn load(&self, addr: u16, log_unmapped: bool) -> u8 {
        match Region::of(addr) {
            Region::CartridgeRom => match self.boot_rom_byte(addr) {
                Some(byte) => byte,
                None => self.cart.as_ref().map_or(0xFF, |c| c.read_rom(addr)),
            },
            Region::Vram => self.ppu.read_vram(addr),
            Region::CartridgeRam => self.cart.as_ref().map_or(0xFF, |c| c.read_ram(addr)),
            Region::WorkRamFixed => self.wram[0][Region::offset(addr)].read(),
            Region::WorkRamBanked => self.wram[self.wram_bank()][Region::offset(addr)].read(),
            Region::Echo => self.load(addr - 0x2000, log_unmapped),
            Region::Oam => self.ppu.read_oam(addr),
            Region::Unusable => 0xFF,
            Region::Io => self.read_io(addr, log_unmapped),
            Region::HighRam => self.hram[Region::offset(addr)].read(),
            Region::InterruptEnable => self.irq.read_ie(),
        }
    }

    fn read_io(&self, addr: u16, log_unmapped: bool) -> u8 {
        let cgb = self.model.is_cgb();
        match addr {
            0xFF00 => self.joypad.read(),
            0xFF01 | 0xFF02 => self.serial.read(addr),
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F => self.irq.read_if(),
            0xFF10..=0xFF3F => self.audio.read(addr),
            0xFF46 => self.dma,
            0xFF40..=0xFF4B | 0xFF4F | 0xFF68..=0xFF6C => self.ppu.read_reg(addr),
            0xFF4D if cgb => self.key1 | 0x7E,
            0xFF55 if cgb => self.vram_dma.status(),
            0xFF70 if cgb => self.svbk.read(),
            _ => {
                if log_unmapped {
                    trace!("read from unmapped I/O {addr:04X}");
                }
                0xFF
            }
        }
    }

    /// Write a byte as the CPU does. Once a write breakpoint trips, that
    /// write and every later one are held until [`Mmu::release_held_writes`].
    pub fn write(&mut self, addr: u16, value: u8) {
        self.breakpoints.note_write(self.cpu_pc, addr, value);
        if self.breakpoints.has_hit() || !self.held_writes.is_empty() {
            self.held_writes.push((addr, value));
            return;
        }
        self.store(addr, value);
    }

    /// Store the writes held back by a write breakpoint, in program order.
    pub fn release_held_writes(&mut self) {
        for (addr, value) in std::mem::take(&mut self.held_writes) {
            self.store(addr, value);
        }
    }

    pub fn has_held_writes(&self) -> bool {
        !self.held_writes.is_empty()
    }

    fn store(&mut self, addr: u16, value: u8) {
        match Region::of(addr) {
            Region::CartridgeRom => {
                if let Some(cart) = self.cart.as_mut() {
                    cart.rom_cell(addr).write(value);
                }
            }
            Region::Vram => self.ppu.write_vram(addr, value),
            Region::CartridgeRam => {
                if let Some(cart) = self.cart.as_mut() {
                    cart.ram_cell(addr).write(value);
                }
            }
            Region::WorkRamFixed => self.wram[0][Region::offset(addr)].write(value),
            Region::WorkRamBanked => {
                let bank = self.wram_bank();
                self.wram[bank][Region::offset(addr)].write(value);
            }
            Region::Echo => self.store(addr - 0x2000, value),
            Region::Oam => self.ppu.write_oam(addr, value),
            Region::Unusable => {}
            Region::Io => self.write_io(addr, value),
            Region::HighRam => self.hram[Region::offset(addr)].write(value),
            Region::InterruptEnable => self.irq.enable_cell().write(value),
        }
    }

    fn write_io(&mut self, addr: u16, value: u8) {
        let cgb = self.model.is_cgb();
        match addr {
            0xFF00 => self.joypad.write(value),
            0xFF01 | 0xFF02 => self.serial.write(addr, value),
            0xFF04..=0xFF07 => self.timer.write(addr, value, &mut self.irq),
            0xFF0F => self.irq.flag_cell().write(value),
            0xFF10..=0xFF3F => self.audio.write(addr, value),
            0xFF46 => self.oam_dma(value),
            0xFF40..=0xFF4B | 0xFF4F | 0xFF68..=0xFF6C => {
                self.ppu.write_reg(addr, value, &mut self.irq)
            }
            0xFF4D if cgb => self.key1 = (self.key1 & 0x80) | (value & 0x01),
            0xFF50 if value != 0 && self.boot_mapped => {
                debug!("boot ROM unmapped");
                self.boot_mapped = false;
            }
            0xFF51 if cgb => {
                self.vram_dma.source = (self.vram_dma.source & 0x00FF) | (u16::from(value) << 8)
            }
            0xFF52 if cgb => {
                self.vram_dma.source = (self.vram_dma.source & 0xFF00) | u16::from(value & 0xF0)
            }
            0xFF53 if cgb => {
                let dest = (self.vram_dma.dest & 0x00FF) | (u16::from(value) << 8);
                self.vram_dma.dest = VramDma::sanitize_dest(dest);
            }
            0xFF54 if cgb => {
                let dest = (self.vram_dma.dest & 0xFF00) | u16::from(value);
                self.vram_dma.dest = VramDma::sanitize_dest(dest);
            }
            0xFF55 if cgb => self.write_vram_dma_control(value),
            0xFF70 if cgb => self.svbk.write(value),
            _ => trace!("write {value:02X} to unmapped I/O {addr:04X} dropped"),
        }
    }

    /// A cell view of `addr` for read-modify-write instructions.
    pub fn cell_at(&mut self, addr: u16) -> BusCell<'_> {
        BusCell { mmu: self, addr }
    }

    fn oam_dma(&mut self, value: u8) {
        self.dma = value;
        let mut source = u16::from(value) << 8;
        if source >= 0xE000 {
            source -= 0x2000;
        }
        debug!("OAM DMA from {source:04X}");
        for offset in 0..OAM_DMA_LEN {
            let byte = self.peek(source + offset);
            self.ppu.write_oam(0xFE00 + offset, byte);
        }
    }

    fn write_vram_dma_control(&mut self, value: u8) {
        let blocks = (value & 0x7F) + 1;
        if self.vram_dma.hblank_active && value & 0x80 == 0 {
            debug!("HBlank DMA cancelled with {} blocks left", self.vram_dma.blocks_left);
            self.vram_dma.hblank_active = false;
        } else if value & 0x80 == 0 {
            debug!(
                "general DMA {:04X} -> {:04X}, {blocks} blocks",
                self.vram_dma.source, self.vram_dma.dest
            );
            for _ in 0..blocks {
                self.copy_vram_dma_block();
            }
            self.vram_dma.blocks_left = 0;
            self.stall_cycles += GDMA_OVERHEAD_CYCLES + u32::from(blocks) * VRAM_DMA_BLOCK_CYCLES;
        } else {
            debug!(
                "HBlank DMA {:04X} -> {:04X}, {blocks} blocks",
                self.vram_dma.source, self.vram_dma.dest
            );
            self.vram_dma.blocks_left = blocks;
            self.vram_dma.hblank_active = true;
            let lcd_on = self.ppu.lcdc().contains(Lcdc::ENABLE);
            if !lcd_on || self.ppu.in_hblank() {
                self.hblank_dma_block();
            }
        }
    }

    fn copy_vram_dma_block(&mut self) {
        for _ in 0..VRAM_DMA_BLOCK {
            let byte = self.peek(self.vram_dma.source);
            self.ppu.write_vram(self.vram_dma.dest, byte);
            self.vram_dma.source = self.vram_dma.source.wrapping_add(1);
            self.vram_dma.dest = 0x8000 | (self.vram_dma.dest.wrapping_add(1) & 0x1FFF);
        }
    }

    fn hblank_dma_block(&mut self) {
        if !self.vram_dma.hblank_active {
            return;
        }
        self.copy_vram_dma_block();
        self.vram_dma.blocks_left -= 1;
        if self.vram_dma.blocks_left == 0 {
            self.vram_dma.hblank_active = false;
        }
        self.stall_cycles += VRAM_DMA_BLOCK_CYCLES;
    }

    /// Service one DMA block per HBlank the PPU entered since the last grant.
    fn run_hblank_dma(&mut self) {
        let entries = self.ppu.take_hblank_entries();
        for _ in 0..entries {
            self.hblank_dma_block();
        }
    }

    /// Broadcast `cycles` CPU cycles to every subscriber in schedule order.
    pub fn tick(&mut self, cycles: u32) {
        if cycles == 0 {
            return;
        }
        for index in 0..self.schedule.len() {
            let Some(slot) = self.schedule.get(index) else {
                break;
            };
            let scaled = slot.domain().scale(cycles, self.double_speed);
            match slot {
                ClockSlot::Timer => self.timer.update_clock(scaled, &mut self.irq),
                ClockSlot::Ppu => self.ppu.update_clock(scaled, &mut self.irq),
                ClockSlot::Dma => self.run_hblank_dma(),
                ClockSlot::Serial => self.serial.update_clock(scaled, &mut self.irq),
                ClockSlot::Audio => self.audio.update_clock(scaled, &mut self.irq),
                ClockSlot::Cartridge => {
                    if let Some(cart) = self.cart.as_mut() {
                        cart.update_clock(scaled, &mut self.irq);
                    }
                }
                ClockSlot::External(i) => {
                    if let Some(subscriber) = self.subscribers.get_mut(i) {
                        subscriber.update_clock(scaled, &mut self.irq);
                    }
                }
            }
        }
    }

    /// Cycles the CPU lost to a blocking DMA since the last call.
    pub fn take_stall_cycles(&mut self) -> u32 {
        std::mem::take(&mut self.stall_cycles)
    }

    pub fn set_cpu_pc(&mut self, pc: u16) {
        self.cpu_pc = pc;
    }

    pub fn speed_switch_armed(&self) -> bool {
        self.model.is_cgb() && self.key1 & 0x01 != 0
    }

    pub fn switch_speed(&mut self) {
        self.double_speed = !self.double_speed;
        self.key1 = if self.double_speed { 0x80 } else { 0x00 };
        debug!(
            "switched to {} speed",
            if self.double_speed { "double" } else { "normal" }
        );
    }

    pub fn double_speed(&self) -> bool {
        self.double_speed
    }

    pub fn reset_div(&mut self) {
        self.timer.reset_div(&mut self.irq);
    }

    pub fn press(&mut self, button: Button) {
        self.joypad.press(button, &mut self.irq);
    }

    pub fn release(&mut self, button: Button) {
        self.joypad.release(button);
    }

    pub fn joypad(&self) -> &Joypad {
        &self.joypad
    }

    pub fn take_serial(&mut self) -> Vec<u8> {
        self.serial.take_output()
    }

    pub fn serial(&self) -> &Serial {
        &self.serial
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn ppu(&self) -> &Ppu {
        &self.ppu
    }

    pub fn ppu_mut(&mut self) -> &mut Ppu {
        &mut self.ppu
    }

    pub fn interrupts(&self) -> &InterruptController {
        &self.irq
    }

    pub fn interrupts_mut(&mut self) -> &mut InterruptController {
        &mut self.irq
    }

    pub fn breakpoints(&self) -> &BreakpointEngine {
        &self.breakpoints
    }

    pub fn breakpoints_mut(&mut self) -> &mut BreakpointEngine {
        &mut self.breakpoints
    }
}

/// One bus address viewed as a [`MemoryCell`].
pub struct BusCell<'a> {
    mmu: &'a mut Mmu,
    addr: u16,
}

impl MemoryCell for BusCell<'_> {
    fn read(&self) -> u8 {
        self.mmu.read(self.addr)
    }

    fn write(&mut self, value: u8) {
        self.mmu.write(self.addr, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ppu::Mode;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn lcdc_round_trips() {
        let mut mmu = Mmu::new(Model::Dmg);
        mmu.write(0xFF40, 0x93);
        assert_eq!(mmu.read(0xFF40), 0x93);
        assert_eq!(Region::of(0x8500), Region::Vram);
        mmu.write(0x8500, 0x5A);
        assert_eq!(mmu.read(0x8500), 0x5A);
    }

    #[test]
    fn echo_mirrors_work_ram() {
        let mut mmu = Mmu::new(Model::Dmg);
        mmu.write(0xC123, 0x42);
        assert_eq!(mmu.read(0xE123), 0x42);
        mmu.write(0xFD00, 0x24);
        assert_eq!(mmu.read(0xDD00), 0x24);
    }

    #[test]
    fn cgb_work_ram_is_banked() {
        let mut mmu = Mmu::new(Model::Cgb);
        mmu.write(0xFF70, 0x02);
        mmu.write(0xD000, 0x22);
        mmu.write(0xFF70, 0x00);
        assert_eq!(mmu.read(0xFF70), 0xF8);
        mmu.write(0xD000, 0x11);
        mmu.write(0xFF70, 0x02);
        assert_eq!(mmu.read(0xD000), 0x22);
        mmu.write(0xFF70, 0x01);
        assert_eq!(mmu.read(0xD000), 0x11);
    }

    #[test]
    fn unmapped_and_cgb_only_registers_read_ff() {
        let mut mmu = Mmu::new(Model::Dmg);
        assert_eq!(mmu.read(0xFF03), 0xFF);
        assert_eq!(mmu.read(0xFEA0), 0xFF);
        mmu.write(0xFF70, 0x03);
        assert_eq!(mmu.read(0xFF70), 0xFF);
        assert_eq!(mmu.read(0xFF4D), 0xFF);
        assert_eq!(mmu.read(0xFF55), 0xFF);
        assert_eq!(mmu.read(0x4000), 0xFF);
    }

    #[test]
    fn interrupt_registers_mask_unused_bits() {
        let mut mmu = Mmu::new(Model::Dmg);
        mmu.write(0xFF0F, 0x04);
        assert_eq!(mmu.read(0xFF0F), 0xE4);
        mmu.write(0xFFFF, 0x1F);
        assert_eq!(mmu.read(0xFFFF) & 0x1F, 0x1F);
    }

    #[test]
    fn oam_dma_copies_160_bytes() {
        let mut mmu = Mmu::new(Model::Dmg);
        for i in 0..0xA0u16 {
            mmu.write(0xC000 + i, i as u8);
        }
        mmu.write(0xFF46, 0xC0);
        assert_eq!(mmu.read(0xFF46), 0xC0);
        assert_eq!(mmu.read(0xFE00), 0x00);
        assert_eq!(mmu.read(0xFE9F), 0x9F);
    }

    fn program_vram_dma(mmu: &mut Mmu, source: u16, dest: u16) {
        for i in 0..0x40u16 {
            mmu.write(source + i, 0x80 | i as u8);
        }
        mmu.write(0xFF51, (source >> 8) as u8);
        mmu.write(0xFF52, source as u8);
        mmu.write(0xFF53, (dest >> 8) as u8);
        mmu.write(0xFF54, dest as u8);
    }

    #[test]
    fn general_dma_copies_immediately_and_stalls() {
        let mut mmu = Mmu::new(Model::Cgb);
        program_vram_dma(&mut mmu, 0xC000, 0x8800);
        mmu.write(0xFF55, 0x01);
        assert_eq!(mmu.read(0x8800), 0x80);
        assert_eq!(mmu.read(0x881F), 0x9F);
        assert_eq!(mmu.read(0x8820), 0x00);
        assert_eq!(mmu.take_stall_cycles(), 4 + 2 * 32);
        assert_eq!(mmu.read(0xFF55), 0xFF);
    }

    #[test]
    fn hblank_dma_copies_one_block_per_hblank() {
        let mut mmu = Mmu::new(Model::Cgb);
        program_vram_dma(&mut mmu, 0xC000, 0x9000);
        mmu.write(0xFF55, 0x82);
        assert_eq!(mmu.read(0xFF55), 0x02);
        assert_eq!(mmu.read(0x9000), 0x00);

        // OAM scan + pixel transfer ends in HBlank
        mmu.tick(80 + 172);
        assert_eq!(mmu.ppu().mode(), Mode::HBlank);
        assert_eq!(mmu.read(0x900F), 0x8F);
        assert_eq!(mmu.read(0x9010), 0x00);
        assert_eq!(mmu.read(0xFF55), 0x01);
        assert_eq!(mmu.take_stall_cycles(), 32);

        mmu.tick(204 + 80 + 172);
        assert_eq!(mmu.read(0x901F), 0x9F);
        assert_eq!(mmu.read(0xFF55), 0xFF);
    }

    #[test]
    fn cancelled_hblank_dma_reports_remaining_blocks() {
        let mut mmu = Mmu::new(Model::Cgb);
        program_vram_dma(&mut mmu, 0xC000, 0x9000);
        mmu.write(0xFF55, 0x83);
        mmu.tick(80 + 172);
        mmu.write(0xFF55, 0x00);
        assert_eq!(mmu.read(0xFF55), 0x80 | 0x02);
        mmu.tick(204 + 80 + 172);
        assert_eq!(mmu.read(0x9010), 0x00);
    }

    #[test]
    fn boot_rom_overlays_until_ff50() {
        let mut boot = vec![0u8; 0x100];
        boot[0] = 0x31;
        let mut mmu = Mmu::power_on(Model::Dmg, boot);
        let mut rom = vec![0u8; 0x8000];
        rom[0x147] = 0x00;
        rom[0] = 0xAA;
        rom[0x100] = 0xBB;
        mmu.load_cartridge(Cartridge::load(rom).unwrap());
        assert!(mmu.boot_rom_mapped());
        assert_eq!(mmu.read(0x0000), 0x31);
        assert_eq!(mmu.read(0x0100), 0xBB);
        mmu.write(0xFF50, 0x01);
        assert!(!mmu.boot_rom_mapped());
        assert_eq!(mmu.read(0x0000), 0xAA);
    }

    struct Counter(Rc<Cell<u32>>);

    impl ClockSubscriber for Counter {
        fn update_clock(&mut self, cycles: u32, _irq: &mut InterruptController) {
            self.0.set(self.0.get() + cycles);
        }
    }

    #[test]
    fn external_subscriber_receives_cpu_cycles() {
        let mut mmu = Mmu::new(Model::Dmg);
        let seen = Rc::new(Cell::new(0));
        let index = mmu.subscribe(Box::new(Counter(seen.clone())));
        assert_eq!(index, 0);
        assert_eq!(mmu.schedule().slots().last(), Some(&ClockSlot::External(0)));
        mmu.tick(12);
        mmu.tick(8);
        assert_eq!(seen.get(), 20);
    }

    #[test]
    fn double_speed_halves_dot_clock() {
        let mut mmu = Mmu::new(Model::Cgb);
        mmu.write(0xFF4D, 0x01);
        assert!(mmu.speed_switch_armed());
        mmu.switch_speed();
        assert!(mmu.double_speed());
        mmu.tick(456);
        assert_eq!(mmu.ppu().ly(), 0);
        mmu.tick(456);
        assert_eq!(mmu.ppu().ly(), 1);
    }

    #[test]
    fn bus_cell_goes_through_dispatch() {
        let mut mmu = Mmu::new(Model::Dmg);
        let mut cell = mmu.cell_at(0xFF80);
        cell.write(0x77);
        assert_eq!(cell.read(), 0x77);
        assert_eq!(mmu.read(0xFF80), 0x77);
    }
}
