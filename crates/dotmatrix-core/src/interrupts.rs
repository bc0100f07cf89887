use bitflags::bitflags;

use crate::memory::MemoryCell;

bitflags! {
    /// Interrupt lines in IE/IF bit order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InterruptFlags: u8 {
        const VBLANK = 0x01;
        const LCD = 0x02;
        const TIMER = 0x04;
        const SERIAL = 0x08;
        const JOYPAD = 0x10;
    }
}

/// Interrupt sources, lowest bit first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    VBlank,
    Lcd,
    Timer,
    Serial,
    Joypad,
}

impl Interrupt {
    /// Highest priority first.
    pub const ALL: [Interrupt; 5] = [
        Interrupt::VBlank,
        Interrupt::Lcd,
        Interrupt::Timer,
        Interrupt::Serial,
        Interrupt::Joypad,
    ];

    pub const fn flag(self) -> InterruptFlags {
        match self {
            Interrupt::VBlank => InterruptFlags::VBLANK,
            Interrupt::Lcd => InterruptFlags::LCD,
            Interrupt::Timer => InterruptFlags::TIMER,
            Interrupt::Serial => InterruptFlags::SERIAL,
            Interrupt::Joypad => InterruptFlags::JOYPAD,
        }
    }

    /// Service routine address.
    // https://gbdev.io/pandocs/Interrupt_Sources.html
    pub const fn vector(self) -> u16 {
        match self {
            Interrupt::VBlank => 0x0040,
            Interrupt::Lcd => 0x0048,
            Interrupt::Timer => 0x0050,
            Interrupt::Serial => 0x0058,
            Interrupt::Joypad => 0x0060,
        }
    }
}

/// The IE (0xFFFF) and IF (0xFF0F) registers.
#[derive(Debug, Clone, Default)]
pub struct InterruptController {
    /// IE keeps all 8 written bits; only the low five take part in dispatch.
    enable: u8,
    request: InterruptFlags,
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, interrupt: Interrupt) {
        self.request.insert(interrupt.flag());
    }

    pub fn acknowledge(&mut self, interrupt: Interrupt) {
        self.request.remove(interrupt.flag());
    }

    pub fn requested(&self) -> InterruptFlags {
        self.request
    }

    pub fn enabled(&self) -> InterruptFlags {
        InterruptFlags::from_bits_truncate(self.enable)
    }

    pub fn is_requested(&self, interrupt: Interrupt) -> bool {
        self.request.contains(interrupt.flag())
    }

    /// Lines both enabled and requested.
    pub fn active(&self) -> InterruptFlags {
        self.enabled() & self.request
    }

    pub fn any_pending(&self) -> bool {
        !self.active().is_empty()
    }

    /// The highest-priority line that is both enabled and requested.
    pub fn pending(&self) -> Option<Interrupt> {
        let active = self.active();
        Interrupt::ALL
            .into_iter()
            .find(|interrupt| active.contains(interrupt.flag()))
    }

    pub fn read_if(&self) -> u8 {
        self.request.bits() | 0xE0
    }

    pub fn write_if(&mut self, value: u8) {
        self.request = InterruptFlags::from_bits_truncate(value);
    }

    pub fn read_ie(&self) -> u8 {
        self.enable
    }

    pub fn write_ie(&mut self, value: u8) {
        self.enable = value;
    }

    /// IF viewed as a [`MemoryCell`].
    pub fn flag_cell(&mut self) -> FlagRegister<'_> {
        FlagRegister(self)
    }

    /// IE viewed as a [`MemoryCell`].
    pub fn enable_cell(&mut self) -> EnableRegister<'_> {
        EnableRegister(self)
    }
}

pub struct FlagRegister<'a>(&'a mut InterruptController);

impl MemoryCell for FlagRegister<'_> {
    fn read(&self) -> u8 {
        self.0.read_if()
    }

    fn write(&mut self, value: u8) {
        self.0.write_if(value);
    }
}

pub struct EnableRegister<'a>(&'a mut InterruptController);

impl MemoryCell for EnableRegister<'_> {
    fn read(&self) -> u8 {
        self.0.read_ie()
    }

    fn write(&mut self, value: u8) {
        self.0.write_ie(value);
    }
}
