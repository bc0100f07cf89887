//! Byte cells and address-space regions.
//!
//! Every addressable byte is reached through [`MemoryCell`], whether it is
//! plain storage or a register with read/write masks. Registers whose writes
//! have effects outside their own storage (DMA triggers, LCDC, palette data)
//! are dispatched by the [`Mmu`](crate::mmu::Mmu) after the cell is updated.

/// A readable and writable byte.
pub trait MemoryCell {
    fn read(&self) -> u8;
    fn write(&mut self, value: u8);
}

/// Plain read/write storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteCell(pub u8);

impl MemoryCell for ByteCell {
    fn read(&self) -> u8 {
        self.0
    }

    fn write(&mut self, value: u8) {
        self.0 = value;
    }
}

impl MemoryCell for u8 {
    fn read(&self) -> u8 {
        *self
    }

    fn write(&mut self, value: u8) {
        *self = value;
    }
}

/// A register where only `writable` bits accept writes and `unused` bits
/// always read back as 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskedCell {
    value: u8,
    writable: u8,
    unused: u8,
}

impl MaskedCell {
    pub const fn new(value: u8, writable: u8, unused: u8) -> Self {
        Self {
            value,
            writable,
            unused,
        }
    }

    /// Set the stored bits directly, bypassing the write mask.
    pub fn set_raw(&mut self, value: u8) {
        self.value = value;
    }

    pub fn raw(&self) -> u8 {
        self.value
    }
}

impl MemoryCell for MaskedCell {
    fn read(&self) -> u8 {
        self.value | self.unused
    }

    fn write(&mut self, value: u8) {
        self.value = (self.value & !self.writable) | (value & self.writable);
    }
}

/// A cell that ignores writes and always reads the same byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstCell(pub u8);

impl MemoryCell for ConstCell {
    fn read(&self) -> u8 {
        self.0
    }

    fn write(&mut self, _value: u8) {}
}

/// Open bus: reads 0xFF, drops writes.
pub const UNMAPPED: ConstCell = ConstCell(0xFF);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// 0x0000-0x7FFF, with the boot ROM overlaid while mapped.
    CartridgeRom,
    /// 0x8000-0x9FFF
    Vram,
    /// 0xA000-0xBFFF
    CartridgeRam,
    /// 0xC000-0xCFFF
    WorkRamFixed,
    /// 0xD000-0xDFFF, banked on CGB.
    WorkRamBanked,
    /// 0xE000-0xFDFF mirrors 0xC000-0xDDFF.
    Echo,
    /// 0xFE00-0xFE9F
    Oam,
    /// 0xFEA0-0xFEFF
    Unusable,
    /// 0xFF00-0xFF7F
    Io,
    /// 0xFF80-0xFFFE
    HighRam,
    /// 0xFFFF
    InterruptEnable,
}

impl Region {
    /// Resolve the region owning `addr`. Total over the 16-bit space.
    pub const fn of(addr: u16) -> Self {
        match addr {
            0x0000..=0x7FFF => Region::CartridgeRom,
            0x8000..=0x9FFF => Region::Vram,
            0xA000..=0xBFFF => Region::CartridgeRam,
            0xC000..=0xCFFF => Region::WorkRamFixed,
            0xD000..=0xDFFF => Region::WorkRamBanked,
            0xE000..=0xFDFF => Region::Echo,
            0xFE00..=0xFE9F => Region::Oam,
            0xFEA0..=0xFEFF => Region::Unusable,
            0xFF00..=0xFF7F => Region::Io,
            0xFF80..=0xFFFE => Region::HighRam,
            0xFFFF => Region::InterruptEnable,
        }
    }

    /// First address of the region.
    pub const fn base(self) -> u16 {
        match self {
            Region::CartridgeRom => 0x0000,
            Region::Vram => 0x8000,
            Region::CartridgeRam => 0xA000,
            Region::WorkRamFixed => 0xC000,
            Region::WorkRamBanked => 0xD000,
            Region::Echo => 0xE000,
            Region::Oam => 0xFE00,
            Region::Unusable => 0xFEA0,
            Region::Io => 0xFF00,
            Region::HighRam => 0xFF80,
            Region::InterruptEnable => 0xFFFF,
        }
    }

    /// Offset of `addr` inside its region.
    pub const fn offset(addr: u16) -> usize {
        (addr - Self::of(addr).base()) as usize
    }
}
