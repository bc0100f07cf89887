//! Picture processing unit: LCD mode state machine, video registers and the
//! scanline compositor.

pub mod palette;
pub mod render;
pub mod sprite;

use bitflags::bitflags;
use log::debug;

use crate::clock::ClockSubscriber;
use crate::interrupts::{Interrupt, InterruptController};
use crate::memory::{MaskedCell, MemoryCell};

use palette::{PaletteRegisters, PaletteStrategy};
use sprite::{LineSprites, OAM_SIZE, SpritePriority};

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;

// Mode budgets in dots; one line is 456.
const OAM_SCAN_CYCLES: u32 = 80;
const TRANSFER_CYCLES: u32 = 172;
const HBLANK_CYCLES: u32 = 204;
const LINE_CYCLES: u32 = 456;
const VBLANK_LINES: u8 = 10;
const LAST_LINE: u8 = SCREEN_HEIGHT as u8 + VBLANK_LINES - 1;
pub const FRAME_CYCLES: u32 = LINE_CYCLES * (SCREEN_HEIGHT as u32 + VBLANK_LINES as u32);

const VRAM_BANK_SIZE: usize = 0x2000;

bitflags! {
    /// LCDC (0xFF40).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Lcdc: u8 {
        const ENABLE = 0x80;
        const WINDOW_MAP = 0x40;
        const WINDOW_ENABLE = 0x20;
        /// Unsigned tile numbers from 0x8000.
        const TILE_DATA = 0x10;
        const BG_MAP = 0x08;
        const OBJ_SIZE = 0x04;
        const OBJ_ENABLE = 0x02;
        const BG_ENABLE = 0x01;
    }
}

// STAT interrupt source selects.
const STAT_LYC: u8 = 0x40;
const STAT_OAM: u8 = 0x20;
const STAT_VBLANK: u8 = 0x10;
const STAT_HBLANK: u8 = 0x08;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Mode 2
    ScanlineOam,
    /// Mode 3
    ScanlineVram,
    /// Mode 0
    HBlank,
    /// Mode 1
    VBlank,
}

impl Mode {
    /// STAT bits 1-0.
    pub const fn bits(self) -> u8 {
        match self {
            Mode::HBlank => 0,
            Mode::VBlank => 1,
            Mode::ScanlineOam => 2,
            Mode::ScanlineVram => 3,
        }
    }

    const fn cycles(self) -> u32 {
        match self {
            Mode::ScanlineOam => OAM_SCAN_CYCLES,
            Mode::ScanlineVram => TRANSFER_CYCLES,
            Mode::HBlank => HBLANK_CYCLES,
            Mode::VBlank => LINE_CYCLES,
        }
    }
}

pub struct Ppu {
    vram: [[u8; VRAM_BANK_SIZE]; 2],
    vbk: MaskedCell,
    oam: [u8; OAM_SIZE],

    /// CGB features (attribute maps, VRAM bank 1, palette RAM) active.
    cgb: bool,
    strategy: PaletteStrategy,
    palettes: PaletteRegisters,

    lcdc: Lcdc,
    stat: MaskedCell,
    scy: u8,
    scx: u8,
    ly: u8,
    lyc: u8,
    wy: u8,
    wx: u8,
    opri: MaskedCell,
    lyc_match: bool,

    mode: Mode,
    mode_clock: u32,
    /// Dots elapsed with the LCD off, for frame pacing.
    off_clock: u32,
    /// Window rows drawn so far this frame.
    window_line: u8,
    line_sprites: LineSprites,
    stat_irq_line: bool,
    hblank_entries: u32,

    framebuffer: Box<[u32; SCREEN_WIDTH * SCREEN_HEIGHT]>,
    frame_ready: bool,
    frames: u64,
}

impl Ppu {
    /// A PPU with the LCD off. `cgb` enables CGB video features and selects
    /// the CGB palette strategy.
    pub fn new(cgb: bool) -> Self {
        Self {
            vram: [[0; VRAM_BANK_SIZE]; 2],
            vbk: MaskedCell::new(0, 0x01, 0xFE),
            oam: [0; OAM_SIZE],
            cgb,
            strategy: if cgb {
                PaletteStrategy::Cgb
            } else {
                PaletteStrategy::default()
            },
            palettes: PaletteRegisters::default(),
            lcdc: Lcdc::empty(),
            stat: MaskedCell::new(0, 0x78, 0x80),
            scy: 0,
            scx: 0,
            ly: 0,
            lyc: 0,
            wy: 0,
            wx: 0,
            opri: MaskedCell::new(0, 0x01, 0xFE),
            lyc_match: false,
            mode: Mode::HBlank,
            mode_clock: 0,
            off_clock: 0,
            window_line: 0,
            line_sprites: LineSprites::default(),
            stat_irq_line: false,
            hblank_entries: 0,
            framebuffer: Box::new([0; SCREEN_WIDTH * SCREEN_HEIGHT]),
            frame_ready: false,
            frames: 0,
        }
    }

    /// Register state left behind by the boot ROM.
    pub fn apply_post_boot(&mut self) {
        self.lcdc = Lcdc::from_bits_retain(0x91);
        self.palettes.bgp = 0xFC;
        self.mode = Mode::ScanlineOam;
        self.mode_clock = 0;
        self.ly = 0;
        self.window_line = 0;
        self.lyc_match = self.ly == self.lyc;
        if self.cgb {
            self.palettes.bg_ram.fill(0x7FFF);
        }
    }

    /// Run a DMG-only cartridge on CGB hardware.
    pub fn enter_compatibility_mode(&mut self) {
        self.cgb = false;
        self.strategy = PaletteStrategy::cgb_compatibility();
    }

    pub fn set_palette_strategy(&mut self, strategy: PaletteStrategy) {
        self.strategy = strategy;
    }

    pub fn palette_strategy(&self) -> &PaletteStrategy {
        &self.strategy
    }

    pub fn is_cgb(&self) -> bool {
        self.cgb
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn ly(&self) -> u8 {
        self.ly
    }

    pub fn lcdc(&self) -> Lcdc {
        self.lcdc
    }

    pub fn in_hblank(&self) -> bool {
        self.mode == Mode::HBlank
    }

    pub fn window_line_counter(&self) -> u8 {
        self.window_line
    }

    pub fn framebuffer(&self) -> &[u32; SCREEN_WIDTH * SCREEN_HEIGHT] {
        &self.framebuffer
    }

    pub fn frame_ready(&self) -> bool {
        self.frame_ready
    }

    pub fn clear_frame_flag(&mut self) {
        self.frame_ready = false;
    }

    /// Completed frames since power-on.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// HBlank periods entered since the last call.
    pub fn take_hblank_entries(&mut self) -> u32 {
        std::mem::take(&mut self.hblank_entries)
    }

    pub fn vram_bank(&self) -> usize {
        if self.cgb { (self.vbk.raw() & 0x01) as usize } else { 0 }
    }

    pub fn read_vram(&self, addr: u16) -> u8 {
        self.vram[self.vram_bank()][(addr & 0x1FFF) as usize]
    }

    pub fn write_vram(&mut self, addr: u16, value: u8) {
        let bank = self.vram_bank();
        self.vram[bank][(addr & 0x1FFF) as usize] = value;
    }

    pub fn read_oam(&self, addr: u16) -> u8 {
        self.oam.get((addr & 0xFF) as usize).copied().unwrap_or(0xFF)
    }

    pub fn write_oam(&mut self, addr: u16, value: u8) {
        if let Some(byte) = self.oam.get_mut((addr & 0xFF) as usize) {
            *byte = value;
        }
    }

    pub fn read_reg(&self, addr: u16) -> u8 {
        match addr {
            0xFF40 => self.lcdc.bits(),
            0xFF41 => self.stat.read() | self.mode.bits() | if self.lyc_match { 0x04 } else { 0 },
            0xFF42 => self.scy,
            0xFF43 => self.scx,
            0xFF44 => self.ly,
            0xFF45 => self.lyc,
            0xFF47 => self.palettes.bgp,
            0xFF48 => self.palettes.obp0,
            0xFF49 => self.palettes.obp1,
            0xFF4A => self.wy,
            0xFF4B => self.wx,
            0xFF4F if self.cgb => self.vbk.read(),
            0xFF68 if self.cgb => self.palettes.bg_ram.read_index(),
            0xFF69 if self.cgb => self.palettes.bg_ram.read_data(),
            0xFF6A if self.cgb => self.palettes.obj_ram.read_index(),
            0xFF6B if self.cgb => self.palettes.obj_ram.read_data(),
            0xFF6C if self.cgb => self.opri.read(),
            _ => 0xFF,
        }
    }

    pub fn write_reg(&mut self, addr: u16, value: u8, irq: &mut InterruptController) {
        match addr {
            0xFF40 => self.write_lcdc(value, irq),
            0xFF41 => {
                self.stat.write(value);
                self.update_stat_irq(irq);
            }
            0xFF42 => self.scy = value,
            0xFF43 => self.scx = value,
            0xFF45 => {
                self.lyc = value;
                self.update_lyc_compare();
                self.update_stat_irq(irq);
            }
            0xFF47 => self.palettes.bgp = value,
            0xFF48 => self.palettes.obp0 = value,
            0xFF49 => self.palettes.obp1 = value,
            0xFF4A => self.wy = value,
            0xFF4B => self.wx = value,
            0xFF4F if self.cgb => self.vbk.write(value),
            0xFF68 if self.cgb => self.palettes.bg_ram.write_index(value),
            0xFF69 if self.cgb => self.palettes.bg_ram.write_data(value),
            0xFF6A if self.cgb => self.palettes.obj_ram.write_index(value),
            0xFF6B if self.cgb => self.palettes.obj_ram.write_data(value),
            0xFF6C if self.cgb => self.opri.write(value),
            _ => {}
        }
    }

    fn write_lcdc(&mut self, value: u8, irq: &mut InterruptController) {
        let was_on = self.lcdc.contains(Lcdc::ENABLE);
        self.lcdc = Lcdc::from_bits_retain(value);
        let is_on = self.lcdc.contains(Lcdc::ENABLE);
        if was_on && !is_on {
            debug!("LCD off at LY={}", self.ly);
            self.mode = Mode::HBlank;
            self.mode_clock = 0;
            self.off_clock = 0;
            self.ly = 0;
            self.window_line = 0;
            self.stat_irq_line = false;
        } else if !was_on && is_on {
            debug!("LCD on");
            self.mode = Mode::ScanlineOam;
            self.mode_clock = 0;
            self.ly = 0;
            self.window_line = 0;
            self.update_lyc_compare();
            self.update_stat_irq(irq);
        }
    }

    fn sprite_height(&self) -> i16 {
        if self.lcdc.contains(Lcdc::OBJ_SIZE) { 16 } else { 8 }
    }

    fn sprite_priority(&self) -> SpritePriority {
        if self.cgb && self.opri.raw() & 0x01 == 0 {
            SpritePriority::OamOrder
        } else {
            SpritePriority::Coordinate
        }
    }

    fn update_lyc_compare(&mut self) {
        self.lyc_match = self.ly == self.lyc;
    }

    fn set_ly(&mut self, ly: u8) {
        self.ly = ly;
        self.update_lyc_compare();
    }

    /// Advance by `cycles` dots.
    pub fn step(&mut self, cycles: u32, irq: &mut InterruptController) {
        if !self.lcdc.contains(Lcdc::ENABLE) {
            // keep presenting frames at the normal rate while the LCD is off
            self.off_clock += cycles;
            while self.off_clock >= FRAME_CYCLES {
                self.off_clock -= FRAME_CYCLES;
                let blank = render::compose(render::BackgroundPixel::BLANK, None, true);
                let color = self.strategy.resolve(&blank, &self.palettes, 0, 0);
                self.framebuffer.fill(color);
                self.complete_frame();
            }
            return;
        }

        let mut remaining = cycles;
        while remaining > 0 {
            let chunk = remaining.min(self.mode.cycles() - self.mode_clock);
            self.mode_clock += chunk;
            remaining -= chunk;
            if self.mode_clock >= self.mode.cycles() {
                self.mode_clock = 0;
                self.advance_mode(irq);
                #[cfg(feature = "ppu-trace")]
                log::trace!("PPU LY={} mode={:?}", self.ly, self.mode);
            }
        }
    }

    fn advance_mode(&mut self, irq: &mut InterruptController) {
        match self.mode {
            Mode::ScanlineOam => {
                self.line_sprites =
                    LineSprites::scan(&self.oam, self.ly, self.sprite_height(), self.sprite_priority());
                self.mode = Mode::ScanlineVram;
            }
            Mode::ScanlineVram => {
                self.render_scanline();
                self.hblank_entries += 1;
                self.mode = Mode::HBlank;
            }
            Mode::HBlank => {
                self.set_ly(self.ly + 1);
                if self.ly as usize == SCREEN_HEIGHT {
                    irq.request(Interrupt::VBlank);
                    self.complete_frame();
                    self.mode = Mode::VBlank;
                } else {
                    self.mode = Mode::ScanlineOam;
                }
            }
            Mode::VBlank => {
                if self.ly == LAST_LINE {
                    self.set_ly(0);
                    self.window_line = 0;
                    self.mode = Mode::ScanlineOam;
                } else {
                    self.set_ly(self.ly + 1);
                }
            }
        }
        self.update_stat_irq(irq);
    }

    fn complete_frame(&mut self) {
        self.frame_ready = true;
        self.frames = self.frames.wrapping_add(1);
    }

    /// Request the LCD interrupt on a rising edge of the combined STAT line.
    fn update_stat_irq(&mut self, irq: &mut InterruptController) {
        if !self.lcdc.contains(Lcdc::ENABLE) {
            return;
        }
        let select = self.stat.raw();
        let mode_line = match self.mode {
            Mode::HBlank => select & STAT_HBLANK != 0,
            Mode::VBlank => select & STAT_VBLANK != 0,
            Mode::ScanlineOam => select & STAT_OAM != 0,
            Mode::ScanlineVram => false,
        };
        let line = mode_line || (self.lyc_match && select & STAT_LYC != 0);
        if line && !self.stat_irq_line {
            irq.request(Interrupt::Lcd);
        }
        self.stat_irq_line = line;
    }
}

impl ClockSubscriber for Ppu {
    fn update_clock(&mut self, cycles: u32, irq: &mut InterruptController) {
        self.step(cycles, irq);
    }
}
