use crate::clock::ClockSubscriber;
use crate::interrupts::{Interrupt, InterruptController};

// CPU cycles per shifted bit with the internal clock.
const BIT_CYCLES_NORMAL: u32 = 512;
const BIT_CYCLES_FAST: u32 = 16;
/// Captured bytes kept for the host. Older half is dropped when full.
pub const OUTPUT_CAPACITY: usize = 0x1_0000;

pub trait LinkPort: Send {
    /// Exchange a byte with the link partner. Returns the byte the partner
    /// shifted back.
    fn transfer(&mut self, byte: u8) -> u8;
}

/// No cable attached. Incoming bits are all 1, so transfers receive 0xFF.
/// With `loopback` the outgoing byte is echoed back instead.
#[derive(Debug, Default)]
pub struct NullLinkPort {
    loopback: bool,
}

impl NullLinkPort {
    pub fn new(loopback: bool) -> Self {
        Self { loopback }
    }
}

impl LinkPort for NullLinkPort {
    fn transfer(&mut self, byte: u8) -> u8 {
        if self.loopback { byte } else { 0xFF }
    }
}

struct Transfer {
    outgoing: u8,
    incoming: u8,
    remaining_bits: u8,
    bit_cycles: u32,
    elapsed: u32,
}

/// SB/SC registers at 0xFF01-0xFF02.
pub struct Serial {
    sb: u8,
    sc: u8,
    cgb: bool,
    port: Box<dyn LinkPort>,
    transfer: Option<Transfer>,
    output: Vec<u8>,
}

impl Serial {
    pub fn new(cgb: bool) -> Self {
        Self {
            sb: 0,
            sc: 0,
            cgb,
            port: Box::new(NullLinkPort::default()),
            transfer: None,
            output: Vec::new(),
        }
    }

    pub fn connect(&mut self, port: Box<dyn LinkPort>) {
        self.port = port;
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF01 => self.sb,
            0xFF02 if self.cgb => self.sc | 0x7C,
            0xFF02 => self.sc | 0x7E,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        match addr {
            0xFF01 => self.sb = value,
            0xFF02 => {
                self.sc = if self.cgb { value & 0x83 } else { value & 0x81 };
                self.transfer = None;
                // external-clock transfers wait for a partner that never
                // arrives, so only internal-clock starts are scheduled
                if self.sc & 0x81 == 0x81 {
                    let fast = self.cgb && self.sc & 0x02 != 0;
                    self.transfer = Some(Transfer {
                        outgoing: self.sb,
                        incoming: 0,
                        remaining_bits: 8,
                        bit_cycles: if fast {
                            BIT_CYCLES_FAST
                        } else {
                            BIT_CYCLES_NORMAL
                        },
                        elapsed: 0,
                    });
                }
            }
            _ => {}
        }
    }

    pub fn transfer_active(&self) -> bool {
        self.sc & 0x80 != 0
    }

    /// Bytes sent since the last call.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    pub fn peek_output(&self) -> &[u8] {
        &self.output
    }

    fn record_output(&mut self, byte: u8) {
        if self.output.len() >= OUTPUT_CAPACITY {
            self.output.drain(..OUTPUT_CAPACITY / 2);
        }
        self.output.push(byte);
    }
}

impl ClockSubscriber for Serial {
    fn update_clock(&mut self, cycles: u32, irq: &mut InterruptController) {
        let Some(transfer) = self.transfer.as_mut() else {
            return;
        };
        if transfer.remaining_bits == 8 && transfer.elapsed == 0 {
            transfer.incoming = self.port.transfer(transfer.outgoing);
        }
        transfer.elapsed += cycles;
        while transfer.elapsed >= transfer.bit_cycles && transfer.remaining_bits > 0 {
            transfer.elapsed -= transfer.bit_cycles;
            let bit = (transfer.incoming >> (transfer.remaining_bits - 1)) & 1;
            self.sb = (self.sb << 1) | bit;
            transfer.remaining_bits -= 1;
        }
        if transfer.remaining_bits == 0 {
            let outgoing = transfer.outgoing;
            self.record_output(outgoing);
            self.transfer = None;
            self.sc &= 0x7F;
            irq.request(Interrupt::Serial);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLinkPort {
        reply: u8,
    }

    impl LinkPort for FixedLinkPort {
        fn transfer(&mut self, _byte: u8) -> u8 {
            self.reply
        }
    }

    #[test]
    fn undrained_output_keeps_only_recent_bytes() {
        let mut serial = Serial::new(false);
        for i in 0..=OUTPUT_CAPACITY {
            serial.record_output(i as u8);
        }
        let kept = serial.peek_output();
        assert_eq!(kept.len(), OUTPUT_CAPACITY / 2 + 1);
        assert_eq!(kept.last(), Some(&(OUTPUT_CAPACITY as u8)));
        assert_eq!(kept[0], (OUTPUT_CAPACITY / 2) as u8);
    }

    #[test]
    fn internal_clock_transfer_completes_and_requests_irq() {
        let mut serial = Serial::new(false);
        serial.connect(Box::new(FixedLinkPort { reply: 0x34 }));
        let mut irq = InterruptController::new();

        serial.write(0xFF01, 0x12);
        serial.write(0xFF02, 0x81);
        serial.update_clock(7 * 512, &mut irq);
        assert!(serial.transfer_active());
        assert!(!irq.is_requested(Interrupt::Serial));

        serial.update_clock(512, &mut irq);
        assert!(!serial.transfer_active());
        assert!(irq.is_requested(Interrupt::Serial));
        assert_eq!(serial.read(0xFF01), 0x34);
        assert_eq!(serial.take_output(), vec![0x12]);
        assert!(serial.peek_output().is_empty());
    }

    #[test]
    fn no_partner_receives_ff() {
        let mut serial = Serial::new(false);
        let mut irq = InterruptController::new();
        serial.write(0xFF01, 0x12);
        serial.write(0xFF02, 0x81);
        serial.update_clock(4096, &mut irq);
        assert_eq!(serial.read(0xFF01), 0xFF);
    }

    #[test]
    fn external_clock_stalls() {
        let mut serial = Serial::new(false);
        let mut irq = InterruptController::new();
        serial.write(0xFF01, 0x12);
        serial.write(0xFF02, 0x80);
        serial.update_clock(60_000, &mut irq);
        assert!(serial.transfer_active());
        assert!(!irq.is_requested(Interrupt::Serial));
    }

    #[test]
    fn clearing_sc_cancels_transfer() {
        let mut serial = Serial::new(false);
        let mut irq = InterruptController::new();
        serial.write(0xFF02, 0x81);
        serial.write(0xFF02, 0x00);
        serial.update_clock(4096, &mut irq);
        assert!(!irq.is_requested(Interrupt::Serial));
        assert_eq!(serial.read(0xFF02), 0x7E);
    }

    #[test]
    fn cgb_fast_clock_shifts_every_16_cycles() {
        let mut serial = Serial::new(true);
        serial.connect(Box::new(NullLinkPort::new(true)));
        let mut irq = InterruptController::new();
        serial.write(0xFF01, 0x5A);
        serial.write(0xFF02, 0x83);
        serial.update_clock(127, &mut irq);
        assert!(serial.transfer_active());
        serial.update_clock(1, &mut irq);
        assert!(!serial.transfer_active());
        assert_eq!(serial.read(0xFF01), 0x5A);
    }
}
