//! Cycle broadcast to the components that advance alongside the CPU.

use crate::interrupts::InterruptController;

/// A component that advances by a number of elapsed cycles and may raise
/// interrupt requests while doing so.
pub trait ClockSubscriber {
    fn update_clock(&mut self, cycles: u32, irq: &mut InterruptController);
}

/// Which clock domain a subscriber runs in. In CGB double-speed mode the
/// CPU clock runs twice as fast as the LCD/audio clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockDomain {
    Cpu,
    Dot,
}

impl ClockDomain {
    /// Convert a CPU cycle count into cycles of this domain.
    pub fn scale(self, cpu_cycles: u32, double_speed: bool) -> u32 {
        match self {
            ClockDomain::Dot if double_speed => cpu_cycles / 2,
            _ => cpu_cycles,
        }
    }
}

/// An entry in the broadcast order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSlot {
    Timer,
    Ppu,
    /// HBlank-gated VRAM DMA; runs after the PPU so a transition into
    /// HBlank in the same grant is serviced immediately.
    Dma,
    Serial,
    Audio,
    Cartridge,
    /// Host-registered subscriber, by registration index.
    External(usize),
}

impl ClockSlot {
    pub fn domain(self) -> ClockDomain {
        match self {
            ClockSlot::Ppu | ClockSlot::Dma | ClockSlot::Audio | ClockSlot::Cartridge => {
                ClockDomain::Dot
            }
            ClockSlot::Timer | ClockSlot::Serial | ClockSlot::External(_) => ClockDomain::Cpu,
        }
    }
}

/// Ordered list of subscribers; each receives every grant in list order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockSchedule {
    slots: Vec<ClockSlot>,
}

impl ClockSchedule {
    pub fn slots(&self) -> &[ClockSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<ClockSlot> {
        self.slots.get(index).copied()
    }

    /// Append a subscriber at the end of the broadcast order.
    pub fn push(&mut self, slot: ClockSlot) {
        self.slots.push(slot);
    }
}

impl Default for ClockSchedule {
    fn default() -> Self {
        Self {
            slots: vec![
                ClockSlot::Timer,
                ClockSlot::Ppu,
                ClockSlot::Dma,
                ClockSlot::Serial,
                ClockSlot::Audio,
                ClockSlot::Cartridge,
            ],
        }
    }
}
