use crate::registers::{Flags, Registers};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
/// Console model being emulated.
pub enum Model {
    #[default]
    Dmg,
    Cgb,
}

impl Model {
    #[inline]
    pub const fn is_cgb(self) -> bool {
        matches!(self, Model::Cgb)
    }

    /// Register file as left by the boot ROM.
    // https://gbdev.io/pandocs/Power_Up_Sequence.html#cpu-registers
    pub fn post_boot_registers(self) -> Registers {
        match self {
            Model::Dmg => Registers {
                a: 0x01,
                f: Flags::from_byte(0xB0),
                b: 0x00,
                c: 0x13,
                d: 0x00,
                e: 0xD8,
                h: 0x01,
                l: 0x4D,
                sp: 0xFFFE,
                pc: 0x0100,
            },
            Model::Cgb => Registers {
                a: 0x11,
                f: Flags::from_byte(0x80),
                b: 0x00,
                c: 0x00,
                d: 0x00,
                e: 0x08,
                h: 0x00,
                l: 0x7C,
                sp: 0xFFFE,
                pc: 0x0100,
            },
        }
    }

    /// Internal DIV counter phase at the first post-boot instruction.
    pub const fn post_boot_div(self) -> u16 {
        match self {
            Model::Dmg => 0xABCC,
            Model::Cgb => 0x1EA0,
        }
    }

    /// Size of the boot ROM image this model expects.
    pub const fn boot_rom_size(self) -> usize {
        match self {
            Model::Dmg => 0x100,
            Model::Cgb => 0x900,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::Reg16;

    #[test]
    fn dmg_post_boot_pairs() {
        let regs = Model::Dmg.post_boot_registers();
        assert_eq!(regs.read16(Reg16::AF), 0x01B0);
        assert_eq!(regs.read16(Reg16::BC), 0x0013);
        assert_eq!(regs.read16(Reg16::DE), 0x00D8);
        assert_eq!(regs.read16(Reg16::HL), 0x014D);
    }

    #[test]
    fn cgb_identifies_by_accumulator() {
        let regs = Model::Cgb.post_boot_registers();
        assert_eq!(regs.a, 0x11);
        assert!(Model::Cgb.is_cgb());
        assert!(!Model::Dmg.is_cgb());
    }
}
