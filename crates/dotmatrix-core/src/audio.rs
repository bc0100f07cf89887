//! Sound register block (0xFF10-0xFF3F).
//!
//! Synthesis lives outside the core. The block stores the registers with
//! their documented read masks, applies NR52 power control, and forwards
//! writes and channel triggers to an [`AudioSink`].

use crate::clock::ClockSubscriber;
use crate::interrupts::InterruptController;

const REG_BASE: u16 = 0xFF10;
const REG_COUNT: usize = 0x30;
const NR52: u16 = 0xFF26;
const WAVE_RAM: std::ops::RangeInclusive<u16> = 0xFF30..=0xFF3F;

// Bits that read back as 1 regardless of the stored value.
// https://gbdev.io/pandocs/Audio_Registers.html
const READ_MASKS: [u8; 0x20] = [
    0x80, 0x3F, 0x00, 0xFF, 0xBF, // NR10-NR14
    0xFF, 0x3F, 0x00, 0xFF, 0xBF, // unused, NR21-NR24
    0x7F, 0xFF, 0x9F, 0xFF, 0xBF, // NR30-NR34
    0xFF, 0xFF, 0x00, 0x00, 0xBF, // unused, NR41-NR44
    0x00, 0x00, 0x70, // NR50-NR52
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, // 0xFF27-0xFF2F
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Pulse1,
    Pulse2,
    Wave,
    Noise,
}

impl Channel {
    /// Channel whose NRx4 control register lives at `addr`.
    pub fn from_control_register(addr: u16) -> Option<Self> {
        match addr {
            0xFF14 => Some(Channel::Pulse1),
            0xFF19 => Some(Channel::Pulse2),
            0xFF1E => Some(Channel::Wave),
            0xFF23 => Some(Channel::Noise),
            _ => None,
        }
    }
}

/// Audio backend driven by register writes and the clock broadcast.
pub trait AudioSink: ClockSubscriber + Send {
    /// A register in the block was written (after masking and power gating).
    fn register_written(&mut self, _addr: u16, _value: u8) {}

    /// An NRx4 write with bit 7 set restarted `channel`.
    fn trigger(&mut self, channel: Channel);
}

/// Sink that discards everything.
#[derive(Debug, Default)]
pub struct NullAudio;

impl ClockSubscriber for NullAudio {
    fn update_clock(&mut self, _cycles: u32, _irq: &mut InterruptController) {}
}

impl AudioSink for NullAudio {
    fn trigger(&mut self, _channel: Channel) {}
}

pub struct AudioRegisters {
    regs: [u8; REG_COUNT],
    sink: Box<dyn AudioSink>,
}

impl Default for AudioRegisters {
    fn default() -> Self {
        Self::new(Box::new(NullAudio))
    }
}

impl AudioRegisters {
    pub fn new(sink: Box<dyn AudioSink>) -> Self {
        let mut regs = [0; REG_COUNT];
        regs[(NR52 - REG_BASE) as usize] = 0x80;
        Self { regs, sink }
    }

    pub fn attach(&mut self, sink: Box<dyn AudioSink>) {
        self.sink = sink;
    }

    pub fn powered(&self) -> bool {
        self.regs[(NR52 - REG_BASE) as usize] & 0x80 != 0
    }

    pub fn read(&self, addr: u16) -> u8 {
        let index = (addr - REG_BASE) as usize;
        match READ_MASKS.get(index) {
            Some(mask) => self.regs[index] | mask,
            None => self.regs[index],
        }
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        if !(REG_BASE..REG_BASE + REG_COUNT as u16).contains(&addr) {
            return;
        }
        let index = (addr - REG_BASE) as usize;
        if addr == NR52 {
            let was_on = self.powered();
            self.regs[index] = value & 0x80;
            if was_on && !self.powered() {
                // powering off clears every register except wave RAM
                self.regs[..index].fill(0);
            }
            self.sink.register_written(addr, self.regs[index]);
            return;
        }
        if !self.powered() && !WAVE_RAM.contains(&addr) {
            return;
        }
        self.regs[index] = value;
        self.sink.register_written(addr, value);
        if value & 0x80 != 0 {
            if let Some(channel) = Channel::from_control_register(addr) {
                self.sink.trigger(channel);
            }
        }
    }

    pub fn sink_mut(&mut self) -> &mut dyn AudioSink {
        self.sink.as_mut()
    }
}

impl ClockSubscriber for AudioRegisters {
    fn update_clock(&mut self, cycles: u32, irq: &mut InterruptController) {
        self.sink.update_clock(cycles, irq);
    }
}
