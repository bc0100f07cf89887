use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::clock::ClockSubscriber;
use crate::error::CartridgeError;
use crate::interrupts::InterruptController;
use crate::memory::MemoryCell;

const ROM_BANK_SIZE: usize = 0x4000;
const RAM_BANK_SIZE: usize = 0x2000;
const HEADER_END: usize = 0x0150;
const MBC2_RAM_SIZE: usize = 0x200;

const RTC_CYCLES_PER_SECOND: u32 = 4_194_304;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcType {
    RomOnly,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
}

/// Fields decoded from the cartridge header at 0x0134-0x014F.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub title: String,
    pub cgb: bool,
    pub cart_type: u8,
    pub rom_size_code: u8,
    pub ram_size_code: u8,
    pub checksum_ok: bool,
}

impl Header {
    fn parse(data: &[u8]) -> Self {
        let raw_title = &data[0x0134..0x0143];
        let title_end = raw_title.iter().position(|&b| b == 0).unwrap_or(raw_title.len());
        let checksum = data[0x0134..=0x014C]
            .iter()
            .fold(0u8, |acc, &b| acc.wrapping_sub(b).wrapping_sub(1));
        Self {
            title: String::from_utf8_lossy(&raw_title[..title_end]).trim().to_string(),
            cgb: data[0x0143] & 0x80 != 0,
            cart_type: data[0x0147],
            rom_size_code: data[0x0148],
            ram_size_code: data[0x0149],
            checksum_ok: checksum == data[0x014D],
        }
    }

    pub fn mbc_type(&self) -> Result<MbcType, CartridgeError> {
        match self.cart_type {
            0x00 | 0x08 | 0x09 => Ok(MbcType::RomOnly),
            0x01..=0x03 => Ok(MbcType::Mbc1),
            0x05 | 0x06 => Ok(MbcType::Mbc2),
            0x0F..=0x13 => Ok(MbcType::Mbc3),
            0x19..=0x1E => Ok(MbcType::Mbc5),
            other => Err(CartridgeError::UnknownType(other)),
        }
    }

    pub fn has_battery(&self) -> bool {
        matches!(
            self.cart_type,
            0x03 | 0x06 | 0x09 | 0x0F | 0x10 | 0x13 | 0x1B | 0x1E
        )
    }

    pub fn has_rtc(&self) -> bool {
        matches!(self.cart_type, 0x0F | 0x10)
    }

    pub fn has_rumble(&self) -> bool {
        matches!(self.cart_type, 0x1C..=0x1E)
    }

    fn ram_size(&self) -> usize {
        if matches!(self.cart_type, 0x05 | 0x06) {
            return MBC2_RAM_SIZE;
        }
        match self.ram_size_code {
            0x01 => 0x800,
            0x02 => 0x2000,
            0x03 => 0x8000,
            0x04 => 0x20000,
            0x05 => 0x10000,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RtcRegisters {
    seconds: u8,
    minutes: u8,
    hours: u8,
    days: u16,
    halt: bool,
    carry: bool,
}

impl RtcRegisters {
    fn control_byte(&self) -> u8 {
        let mut out = ((self.days >> 8) as u8) & 0x01;
        if self.halt {
            out |= 0x40;
        }
        if self.carry {
            out |= 0x80;
        }
        out
    }
}

/// MBC3 clock counters plus the copy visible through the latch.
#[derive(Debug, Clone, Default)]
struct Rtc {
    live: RtcRegisters,
    latched: RtcRegisters,
    subsecond_cycles: u32,
}

impl Rtc {
    fn read(&self, select: u8) -> u8 {
        match select {
            0x08 => self.latched.seconds & 0x3F,
            0x09 => self.latched.minutes & 0x3F,
            0x0A => self.latched.hours & 0x1F,
            0x0B => self.latched.days as u8,
            0x0C => self.latched.control_byte(),
            _ => 0xFF,
        }
    }

    fn write(&mut self, select: u8, value: u8) {
        match select {
            0x08 => {
                self.live.seconds = value & 0x3F;
                self.subsecond_cycles = 0;
            }
            0x09 => self.live.minutes = value & 0x3F,
            0x0A => self.live.hours = value & 0x1F,
            0x0B => self.live.days = (self.live.days & 0x0100) | value as u16,
            0x0C => {
                self.live.days = (self.live.days & 0x00FF) | (((value & 0x01) as u16) << 8);
                self.live.halt = value & 0x40 != 0;
                self.live.carry = value & 0x80 != 0;
            }
            _ => {}
        }
        self.latched = self.live;
    }

    fn latch(&mut self) {
        self.latched = self.live;
    }

    fn add_cycles(&mut self, cycles: u32) {
        if self.live.halt {
            return;
        }
        self.subsecond_cycles += cycles;
        while self.subsecond_cycles >= RTC_CYCLES_PER_SECOND {
            self.subsecond_cycles -= RTC_CYCLES_PER_SECOND;
            self.second_tick();
        }
    }

    // Out-of-range values written by software keep counting up to the
    // register width before wrapping, without carrying into the next unit.
    fn second_tick(&mut self) {
        match self.live.seconds {
            59 => {
                self.live.seconds = 0;
                self.minute_tick();
            }
            s => self.live.seconds = (s + 1) & 0x3F,
        }
    }

    fn minute_tick(&mut self) {
        match self.live.minutes {
            59 => {
                self.live.minutes = 0;
                self.hour_tick();
            }
            m => self.live.minutes = (m + 1) & 0x3F,
        }
    }

    fn hour_tick(&mut self) {
        match self.live.hours {
            23 => {
                self.live.hours = 0;
                self.day_tick();
            }
            h => self.live.hours = (h + 1) & 0x1F,
        }
    }

    fn day_tick(&mut self) {
        if self.live.days >= 0x01FF {
            self.live.days = 0;
            self.live.carry = true;
        } else {
            self.live.days += 1;
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Mbc1 {
    ram_enable: bool,
    /// Lower 5 bits of the ROM bank (0x2000-0x3FFF).
    rom_bank: u8,
    /// 2-bit register at 0x4000-0x5FFF: RAM bank or ROM bank bits 5-6.
    upper: u8,
    /// 0x6000-0x7FFF: 0 = simple banking, 1 = advanced.
    advanced: bool,
}

#[derive(Debug, Clone, Default)]
struct Mbc2 {
    ram_enable: bool,
    rom_bank: u8,
}

#[derive(Debug, Clone, Default)]
struct Mbc3 {
    ram_enable: bool,
    rom_bank: u8,
    /// 0x00-0x07 RAM bank, 0x08-0x0C RTC register.
    select: u8,
    latch_armed: bool,
    rtc: Option<Rtc>,
}

#[derive(Debug, Clone, Default)]
struct Mbc5 {
    ram_enable: bool,
    rom_bank: u16,
    ram_bank: u8,
    rumble: bool,
}

#[derive(Debug, Clone)]
enum Mapper {
    RomOnly,
    Mbc1(Mbc1),
    Mbc2(Mbc2),
    Mbc3(Mbc3),
    Mbc5(Mbc5),
}

#[derive(Debug, Clone)]
pub struct Cartridge {
    rom: Vec<u8>,
    ram: Vec<u8>,
    header: Header,
    mbc: MbcType,
    mapper: Mapper,
}

impl Cartridge {
    pub fn load(data: Vec<u8>) -> Result<Self, CartridgeError> {
        if data.len() < HEADER_END {
            return Err(CartridgeError::TooSmall(data.len()));
        }
        let header = Header::parse(&data);
        let mbc = header.mbc_type()?;
        if !header.checksum_ok {
            warn!("header checksum mismatch for \"{}\"", header.title);
        }
        let mapper = match mbc {
            MbcType::RomOnly => Mapper::RomOnly,
            MbcType::Mbc1 => Mapper::Mbc1(Mbc1::default()),
            MbcType::Mbc2 => Mapper::Mbc2(Mbc2::default()),
            MbcType::Mbc3 => Mapper::Mbc3(Mbc3 {
                rtc: header.has_rtc().then(Rtc::default),
                ..Mbc3::default()
            }),
            MbcType::Mbc5 => Mapper::Mbc5(Mbc5 {
                rom_bank: 1,
                rumble: header.has_rumble(),
                ..Mbc5::default()
            }),
        };
        info!(
            "loaded cartridge \"{}\" ({:?}, type {:#04X}, {} KiB ROM, {} KiB RAM, cgb={})",
            header.title,
            mbc,
            header.cart_type,
            data.len() / 1024,
            header.ram_size() / 1024,
            header.cgb
        );
        Ok(Self {
            ram: vec![0; header.ram_size()],
            rom: data,
            header,
            mbc,
            mapper,
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CartridgeError> {
        let data = fs::read(path)?;
        Self::load(data)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn title(&self) -> &str {
        &self.header.title
    }

    pub fn mbc(&self) -> MbcType {
        self.mbc
    }

    pub fn cgb(&self) -> bool {
        self.header.cgb
    }

    /// External RAM contents, for hosts that persist battery saves.
    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    /// Replace external RAM contents. Extra bytes are ignored.
    pub fn load_ram(&mut self, data: &[u8]) {
        let len = data.len().min(self.ram.len());
        self.ram[..len].copy_from_slice(&data[..len]);
    }

    fn rom_bank_count(&self) -> usize {
        (self.rom.len() / ROM_BANK_SIZE).max(1)
    }

    fn ram_bank_count(&self) -> usize {
        self.ram.len().div_ceil(RAM_BANK_SIZE)
    }

    fn rom_byte(&self, bank: usize, addr: u16) -> u8 {
        let bank = bank % self.rom_bank_count();
        let offset = bank * ROM_BANK_SIZE + (addr as usize & (ROM_BANK_SIZE - 1));
        self.rom.get(offset).copied().unwrap_or(0xFF)
    }

    /// Read 0x0000-0x7FFF through the current ROM banking.
    pub fn read_rom(&self, addr: u16) -> u8 {
        let upper_half = addr >= 0x4000;
        let bank = match &self.mapper {
            Mapper::RomOnly => upper_half as usize,
            Mapper::Mbc1(m) => {
                if upper_half {
                    let low = if m.rom_bank == 0 { 1 } else { m.rom_bank };
                    ((m.upper as usize) << 5) | low as usize
                } else if m.advanced {
                    (m.upper as usize) << 5
                } else {
                    0
                }
            }
            Mapper::Mbc2(m) => {
                if upper_half {
                    m.rom_bank.max(1) as usize
                } else {
                    0
                }
            }
            Mapper::Mbc3(m) => {
                if upper_half {
                    m.rom_bank.max(1) as usize
                } else {
                    0
                }
            }
            Mapper::Mbc5(m) => {
                if upper_half {
                    m.rom_bank as usize
                } else {
                    0
                }
            }
        };
        self.rom_byte(bank, addr)
    }

    /// Writes to 0x0000-0x7FFF program the mapper's control registers.
    pub fn write_rom(&mut self, addr: u16, value: u8) {
        match &mut self.mapper {
            Mapper::RomOnly => {}
            Mapper::Mbc1(m) => match addr {
                0x0000..=0x1FFF => m.ram_enable = value & 0x0F == 0x0A,
                0x2000..=0x3FFF => m.rom_bank = value & 0x1F,
                0x4000..=0x5FFF => m.upper = value & 0x03,
                _ => m.advanced = value & 0x01 != 0,
            },
            Mapper::Mbc2(m) => {
                // address bit 8 selects between RAM enable and ROM bank
                if addr < 0x4000 {
                    if addr & 0x0100 == 0 {
                        m.ram_enable = value & 0x0F == 0x0A;
                    } else {
                        m.rom_bank = value & 0x0F;
                    }
                }
            }
            Mapper::Mbc3(m) => match addr {
                0x0000..=0x1FFF => m.ram_enable = value & 0x0F == 0x0A,
                0x2000..=0x3FFF => m.rom_bank = value & 0x7F,
                0x4000..=0x5FFF => m.select = value & 0x0F,
                _ => {
                    if value == 0x01 && m.latch_armed {
                        if let Some(rtc) = m.rtc.as_mut() {
                            rtc.latch();
                        }
                    }
                    m.latch_armed = value == 0x00;
                }
            },
            Mapper::Mbc5(m) => match addr {
                0x0000..=0x1FFF => m.ram_enable = value & 0x0F == 0x0A,
                0x2000..=0x2FFF => m.rom_bank = (m.rom_bank & 0x100) | value as u16,
                0x3000..=0x3FFF => {
                    m.rom_bank = (m.rom_bank & 0x0FF) | (((value & 0x01) as u16) << 8)
                }
                0x4000..=0x5FFF => {
                    m.ram_bank = if m.rumble { value & 0x07 } else { value & 0x0F }
                }
                _ => {}
            },
        }
    }

    /// Offset into `ram` for an address in 0xA000-0xBFFF, or None when
    /// RAM is disabled or absent.
    fn ram_offset(&self, addr: u16) -> Option<usize> {
        let within = (addr as usize - 0xA000) & (RAM_BANK_SIZE - 1);
        let banks = self.ram_bank_count();
        if banks == 0 {
            return None;
        }
        let bank = match &self.mapper {
            Mapper::RomOnly => 0,
            Mapper::Mbc1(m) => {
                if !m.ram_enable {
                    return None;
                }
                if m.advanced { m.upper as usize } else { 0 }
            }
            Mapper::Mbc2(m) => {
                if !m.ram_enable {
                    return None;
                }
                return Some(within & (MBC2_RAM_SIZE - 1));
            }
            Mapper::Mbc3(m) => {
                if !m.ram_enable || m.select > 0x07 {
                    return None;
                }
                m.select as usize
            }
            Mapper::Mbc5(m) => {
                if !m.ram_enable {
                    return None;
                }
                m.ram_bank as usize
            }
        };
        Some(((bank % banks) * RAM_BANK_SIZE + within) % self.ram.len())
    }

    /// Read 0xA000-0xBFFF: external RAM or an MBC3 clock register.
    pub fn read_ram(&self, addr: u16) -> u8 {
        if let Mapper::Mbc3(m) = &self.mapper {
            if m.ram_enable && (0x08..=0x0C).contains(&m.select) {
                return m.rtc.as_ref().map_or(0xFF, |rtc| rtc.read(m.select));
            }
        }
        match self.ram_offset(addr) {
            Some(offset) if self.mbc == MbcType::Mbc2 => 0xF0 | (self.ram[offset] & 0x0F),
            Some(offset) => self.ram[offset],
            None => 0xFF,
        }
    }

    pub fn write_ram(&mut self, addr: u16, value: u8) {
        if let Mapper::Mbc3(m) = &mut self.mapper {
            if m.ram_enable && (0x08..=0x0C).contains(&m.select) {
                if let Some(rtc) = m.rtc.as_mut() {
                    rtc.write(m.select, value);
                }
                return;
            }
        }
        if let Some(offset) = self.ram_offset(addr) {
            self.ram[offset] = if self.mbc == MbcType::Mbc2 {
                value & 0x0F
            } else {
                value
            };
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Window {
    Rom,
    Ram,
}

/// One cartridge address seen as a [`MemoryCell`]. ROM writes program the
/// mapper and RAM accesses follow the current RAM/RTC selection.
pub struct CartridgeCell<'a> {
    cart: &'a mut Cartridge,
    addr: u16,
    window: Window,
}

impl MemoryCell for CartridgeCell<'_> {
    fn read(&self) -> u8 {
        match self.window {
            Window::Rom => self.cart.read_rom(self.addr),
            Window::Ram => self.cart.read_ram(self.addr),
        }
    }

    fn write(&mut self, value: u8) {
        match self.window {
            Window::Rom => self.cart.write_rom(self.addr, value),
            Window::Ram => self.cart.write_ram(self.addr, value),
        }
    }
}

impl Cartridge {
    /// Cell for an address in 0x0000-0x7FFF.
    pub fn rom_cell(&mut self, addr: u16) -> CartridgeCell<'_> {
        CartridgeCell {
            cart: self,
            addr,
            window: Window::Rom,
        }
    }

    /// Cell for an address in 0xA000-0xBFFF.
    pub fn ram_cell(&mut self, addr: u16) -> CartridgeCell<'_> {
        CartridgeCell {
            cart: self,
            addr,
            window: Window::Ram,
        }
    }
}

impl ClockSubscriber for Cartridge {
    fn update_clock(&mut self, cycles: u32, _irq: &mut InterruptController) {
        if let Mapper::Mbc3(Mbc3 { rtc: Some(rtc), .. }) = &mut self.mapper {
            rtc.add_cycles(cycles);
        }
    }
}
