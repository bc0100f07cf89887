use crate::clock::ClockSubscriber;
use crate::interrupts::{Interrupt, InterruptController};

// Counter bit whose falling edge clocks TIMA, indexed by TAC bits 1-0.
// https://gbdev.io/pandocs/Timer_Obscure_Behaviour.html
const TAC_SELECT_BITS: [u16; 4] = [9, 3, 5, 7];

const M_CYCLE: u32 = 4;

/// DIV/TIMA/TMA/TAC block at 0xFF04-0xFF07.
#[derive(Debug, Clone, Default)]
pub struct Timer {
    /// Internal 16-bit counter. DIV is the upper byte.
    counter: u16,
    tima: u8,
    tma: u8,
    tac: u8,
    /// TIMA overflowed during the previous M-cycle and reloads on the next.
    reload_pending: bool,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a specific internal counter value (post-boot DIV phase).
    pub fn with_counter(counter: u16) -> Self {
        Self {
            counter,
            ..Self::default()
        }
    }

    pub fn counter(&self) -> u16 {
        self.counter
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF04 => (self.counter >> 8) as u8,
            0xFF05 => self.tima,
            0xFF06 => self.tma,
            0xFF07 => self.tac | 0xF8,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, value: u8, irq: &mut InterruptController) {
        match addr {
            0xFF04 => self.reset_div(irq),
            0xFF05 => {
                // a write during the overflow cycle cancels the reload
                self.tima = value;
                self.reload_pending = false;
            }
            0xFF06 => self.tma = value,
            0xFF07 => {
                let before = self.signal();
                self.tac = value & 0x07;
                if before && !self.signal() {
                    self.increment_tima();
                }
            }
            _ => {}
        }
    }

    /// Clear the internal counter. A high selected bit falling to zero
    /// clocks TIMA once.
    pub fn reset_div(&mut self, irq: &mut InterruptController) {
        self.apply_reload(irq);
        let before = self.signal();
        self.counter = 0;
        if before {
            self.increment_tima();
        }
    }

    fn signal(&self) -> bool {
        let enabled = self.tac & 0x04 != 0;
        let bit = TAC_SELECT_BITS[(self.tac & 0x03) as usize];
        enabled && (self.counter >> bit) & 1 != 0
    }

    fn increment_tima(&mut self) {
        let (value, overflow) = self.tima.overflowing_add(1);
        self.tima = value;
        if overflow {
            self.reload_pending = true;
        }
    }

    fn apply_reload(&mut self, irq: &mut InterruptController) {
        if self.reload_pending {
            self.reload_pending = false;
            self.tima = self.tma;
            irq.request(Interrupt::Timer);
        }
    }
}

impl ClockSubscriber for Timer {
    fn update_clock(&mut self, cycles: u32, irq: &mut InterruptController) {
        let mut remaining = cycles;
        while remaining > 0 {
            let step = remaining.min(M_CYCLE);
            remaining -= step;
            self.apply_reload(irq);
            let before = self.signal();
            self.counter = self.counter.wrapping_add(step as u16);
            if before && !self.signal() {
                self.increment_tima();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn div_counts_at_16384_hz() {
        let mut timer = Timer::new();
        let mut irq = InterruptController::new();
        timer.update_clock(255, &mut irq);
        assert_eq!(timer.read(0xFF04), 0);
        timer.update_clock(1, &mut irq);
        assert_eq!(timer.read(0xFF04), 1);
    }

    #[test]
    fn div_write_resets_counter() {
        let mut timer = Timer::new();
        let mut irq = InterruptController::new();
        timer.update_clock(0x1234, &mut irq);
        timer.write(0xFF04, 0x99, &mut irq);
        assert_eq!(timer.read(0xFF04), 0);
        assert_eq!(timer.counter(), 0);
    }

    #[test]
    fn tima_fastest_rate_is_16_cycles() {
        let mut timer = Timer::new();
        let mut irq = InterruptController::new();
        timer.write(0xFF07, 0x05, &mut irq);
        timer.update_clock(16 * 10, &mut irq);
        assert_eq!(timer.read(0xFF05), 10);
    }

    #[test]
    fn overflow_reloads_tma_and_requests_interrupt() {
        let mut timer = Timer::new();
        let mut irq = InterruptController::new();
        timer.write(0xFF06, 0xAB, &mut irq);
        timer.write(0xFF05, 0xFF, &mut irq);
        timer.write(0xFF07, 0x05, &mut irq);

        timer.update_clock(16, &mut irq);
        assert_eq!(timer.read(0xFF05), 0x00, "TIMA reads zero during the overflow cycle");
        assert!(!irq.is_requested(Interrupt::Timer));

        timer.update_clock(4, &mut irq);
        assert_eq!(timer.read(0xFF05), 0xAB);
        assert!(irq.is_requested(Interrupt::Timer));
    }

    #[test]
    fn tima_write_cancels_pending_reload() {
        let mut timer = Timer::new();
        let mut irq = InterruptController::new();
        timer.write(0xFF06, 0xAB, &mut irq);
        timer.write(0xFF05, 0xFF, &mut irq);
        timer.write(0xFF07, 0x05, &mut irq);
        timer.update_clock(16, &mut irq);
        timer.write(0xFF05, 0x10, &mut irq);
        timer.update_clock(4, &mut irq);
        assert_eq!(timer.read(0xFF05), 0x10);
        assert!(!irq.is_requested(Interrupt::Timer));
    }

    #[test]
    fn disabled_timer_does_not_count() {
        let mut timer = Timer::new();
        let mut irq = InterruptController::new();
        timer.write(0xFF07, 0x01, &mut irq);
        timer.update_clock(4096, &mut irq);
        assert_eq!(timer.read(0xFF05), 0);
        assert_eq!(timer.read(0xFF07), 0xF9);
    }

    #[test]
    fn div_reset_with_selected_bit_high_clocks_tima() {
        let mut timer = Timer::new();
        let mut irq = InterruptController::new();
        timer.write(0xFF07, 0x05, &mut irq);
        // bit 3 set, no falling edge yet
        timer.update_clock(8, &mut irq);
        assert_eq!(timer.read(0xFF05), 0);
        timer.write(0xFF04, 0, &mut irq);
        assert_eq!(timer.read(0xFF05), 1);
    }
}
