use crate::interrupts::{Interrupt, InterruptController};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Right,
    Left,
    Up,
    Down,
    A,
    B,
    Select,
    Start,
}

impl Button {
    /// (select line, bit) for the P1 matrix. Line 0 is the d-pad (P14),
    /// line 1 the action buttons (P15).
    fn matrix(self) -> (usize, u8) {
        match self {
            Button::Right => (0, 0x01),
            Button::Left => (0, 0x02),
            Button::Up => (0, 0x04),
            Button::Down => (0, 0x08),
            Button::A => (1, 0x01),
            Button::B => (1, 0x02),
            Button::Select => (1, 0x04),
            Button::Start => (1, 0x08),
        }
    }
}

/// P1/JOYP register at 0xFF00.
#[derive(Debug, Clone)]
pub struct Joypad {
    /// Select bits 5-4 as written (0 = line selected).
    select: u8,
    /// Pressed state per line, 1 = pressed.
    pressed: [u8; 2],
}

impl Default for Joypad {
    fn default() -> Self {
        Self {
            select: 0x30,
            pressed: [0; 2],
        }
    }
}

impl Joypad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> u8 {
        let mut low = 0x0F;
        if self.select & 0x10 == 0 {
            low &= !self.pressed[0];
        }
        if self.select & 0x20 == 0 {
            low &= !self.pressed[1];
        }
        0xC0 | self.select | (low & 0x0F)
    }

    pub fn write(&mut self, value: u8) {
        self.select = value & 0x30;
    }

    pub fn press(&mut self, button: Button, irq: &mut InterruptController) {
        let (line, bit) = button.matrix();
        let was_pressed = self.pressed[line] & bit != 0;
        self.pressed[line] |= bit;
        let selected = self.select & (0x10 << line) == 0;
        if !was_pressed && selected {
            irq.request(Interrupt::Joypad);
        }
    }

    pub fn release(&mut self, button: Button) {
        let (line, bit) = button.matrix();
        self.pressed[line] &= !bit;
    }

    pub fn any_pressed(&self) -> bool {
        self.pressed.iter().any(|line| *line != 0)
    }
}
