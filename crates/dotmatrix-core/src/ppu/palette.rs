//! Color resolution. The compositor decides which layer supplies a pixel and
//! with which color index; a [`PaletteStrategy`] turns that into an RGB value.

use super::render::{Layer, Pixel};

pub const PALETTE_RAM_SIZE: usize = 0x40;
const INDEX_MASK: u8 = 0x3F;
const INDEX_UNUSED_BIT: u8 = 0x40;
const AUTO_INCREMENT_BIT: u8 = 0x80;

pub const SGB_ATTRIBUTE_COLUMNS: usize = 20;
pub const SGB_ATTRIBUTE_ROWS: usize = 18;

/// Default DMG shades as 0x00RRGGBB, lightest first.
pub const DMG_SHADES: [u32; 4] = [0x009BBC0F, 0x008BAC0F, 0x00306230, 0x000F380F];

/// The compatibility palettes a CGB applies to DMG-only cartridges, as
/// RGB555 words.
const COMPAT_BG: [u16; 4] = [0x7FFF, 0x1BEF, 0x6180, 0x0000];
const COMPAT_OBJ: [u16; 4] = [0x7FFF, 0x421F, 0x1CF2, 0x0000];

/// Expand an RGB555 color (`lo`, `hi` as stored in palette RAM) to
/// 0x00RRGGBB.
pub fn decode_cgb_color(lo: u8, hi: u8) -> u32 {
    let raw = u16::from_le_bytes([lo, hi]);
    let expand = |component: u16| {
        let c = (component & 0x1F) as u32;
        (c << 3) | (c >> 2)
    };
    (expand(raw) << 16) | (expand(raw >> 5) << 8) | expand(raw >> 10)
}

fn compat_palette(words: [u16; 4]) -> [u32; 4] {
    words.map(|word| {
        let [lo, hi] = word.to_le_bytes();
        decode_cgb_color(lo, hi)
    })
}

/// 2-bit shade a DMG palette register assigns to `color_id`.
#[inline]
pub fn dmg_shade(palette: u8, color_id: u8) -> usize {
    ((palette >> (color_id * 2)) & 0x03) as usize
}

/// BGPI/OBPI plus the 64 bytes of palette RAM they address.
#[derive(Debug, Clone)]
pub struct PaletteRam {
    index: u8,
    data: [u8; PALETTE_RAM_SIZE],
}

impl Default for PaletteRam {
    fn default() -> Self {
        Self {
            index: INDEX_UNUSED_BIT,
            data: [0; PALETTE_RAM_SIZE],
        }
    }
}

impl PaletteRam {
    pub fn read_index(&self) -> u8 {
        self.index
    }

    pub fn write_index(&mut self, value: u8) {
        self.index = (value & (AUTO_INCREMENT_BIT | INDEX_MASK)) | INDEX_UNUSED_BIT;
    }

    pub fn read_data(&self) -> u8 {
        self.data[(self.index & INDEX_MASK) as usize]
    }

    /// Store at the current index, then advance it if auto-increment is set.
    pub fn write_data(&mut self, value: u8) {
        self.data[(self.index & INDEX_MASK) as usize] = value;
        if self.index & AUTO_INCREMENT_BIT != 0 {
            let next = (self.index & INDEX_MASK).wrapping_add(1) & INDEX_MASK;
            self.index = AUTO_INCREMENT_BIT | INDEX_UNUSED_BIT | next;
        }
    }

    pub fn color(&self, palette: u8, color_id: u8) -> u32 {
        let offset = (palette as usize & 0x07) * 8 + color_id as usize * 2;
        decode_cgb_color(self.data[offset], self.data[offset + 1])
    }

    /// Fill every entry with one RGB555 color.
    pub fn fill(&mut self, word: u16) {
        for pair in self.data.chunks_exact_mut(2) {
            pair.copy_from_slice(&word.to_le_bytes());
        }
    }
}

/// DMG palette registers and CGB palette RAM, as seen by a strategy.
#[derive(Debug, Clone, Default)]
pub struct PaletteRegisters {
    pub bgp: u8,
    pub obp0: u8,
    pub obp1: u8,
    pub bg_ram: PaletteRam,
    pub obj_ram: PaletteRam,
}

impl PaletteRegisters {
    fn dmg_register(&self, pixel: &Pixel) -> u8 {
        match pixel.layer {
            Layer::Background | Layer::Window => self.bgp,
            Layer::Sprite if pixel.palette & 0x01 != 0 => self.obp1,
            Layer::Sprite => self.obp0,
        }
    }
}

/// How composited pixels become colors. The compositing rules are the same
/// for every variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaletteStrategy {
    /// Four fixed shades selected through BGP/OBP0/OBP1.
    DmgMonochrome { shades: [u32; 4] },
    /// DMG register shading mapped through per-layer color tables.
    DmgColorized {
        bg: [u32; 4],
        obj0: [u32; 4],
        obj1: [u32; 4],
    },
    /// Per-tile and per-sprite palettes from CGB palette RAM.
    Cgb,
    /// DMG register shading with a per-8x8-block palette selection.
    SgbOverlay {
        palettes: [[u32; 4]; 4],
        attributes: Box<[u8; SGB_ATTRIBUTE_COLUMNS * SGB_ATTRIBUTE_ROWS]>,
    },
}

impl Default for PaletteStrategy {
    fn default() -> Self {
        PaletteStrategy::DmgMonochrome {
            shades: DMG_SHADES,
        }
    }
}

impl PaletteStrategy {
    /// Palettes a CGB uses for cartridges without CGB support.
    pub fn cgb_compatibility() -> Self {
        let obj = compat_palette(COMPAT_OBJ);
        PaletteStrategy::DmgColorized {
            bg: compat_palette(COMPAT_BG),
            obj0: obj,
            obj1: obj,
        }
    }

    /// SGB overlay with every block on palette 0.
    pub fn sgb(palettes: [[u32; 4]; 4]) -> Self {
        PaletteStrategy::SgbOverlay {
            palettes,
            attributes: Box::new([0; SGB_ATTRIBUTE_COLUMNS * SGB_ATTRIBUTE_ROWS]),
        }
    }

    pub fn is_cgb(&self) -> bool {
        matches!(self, PaletteStrategy::Cgb)
    }

    pub fn resolve(&self, pixel: &Pixel, regs: &PaletteRegisters, x: usize, y: usize) -> u32 {
        match self {
            PaletteStrategy::DmgMonochrome { shades } => {
                shades[dmg_shade(regs.dmg_register(pixel), pixel.color_id)]
            }
            PaletteStrategy::DmgColorized { bg, obj0, obj1 } => {
                let table = match pixel.layer {
                    Layer::Background | Layer::Window => bg,
                    Layer::Sprite if pixel.palette & 0x01 != 0 => obj1,
                    Layer::Sprite => obj0,
                };
                table[dmg_shade(regs.dmg_register(pixel), pixel.color_id)]
            }
            PaletteStrategy::Cgb => match pixel.layer {
                Layer::Background | Layer::Window => regs.bg_ram.color(pixel.palette, pixel.color_id),
                Layer::Sprite => regs.obj_ram.color(pixel.palette, pixel.color_id),
            },
            PaletteStrategy::SgbOverlay {
                palettes,
                attributes,
            } => {
                let block = (y / 8) * SGB_ATTRIBUTE_COLUMNS + x / 8;
                let selected = attributes.get(block).copied().unwrap_or(0) & 0x03;
                palettes[selected as usize][dmg_shade(regs.dmg_register(pixel), pixel.color_id)]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(layer: Layer, color_id: u8, palette: u8) -> Pixel {
        Pixel {
            layer,
            color_id,
            palette,
        }
    }

    #[test]
    fn cgb_color_expands_five_bit_components() {
        assert_eq!(decode_cgb_color(0xFF, 0x7F), 0x00FF_FFFF);
        assert_eq!(decode_cgb_color(0x1F, 0x00), 0x00FF_0000);
        assert_eq!(decode_cgb_color(0x00, 0x7C), 0x0000_00FF);
    }

    #[test]
    fn palette_index_auto_increments_and_wraps() {
        let mut ram = PaletteRam::default();
        ram.write_index(0x80 | 0x3F);
        assert_eq!(ram.read_index(), 0xFF);
        ram.write_data(0x12);
        assert_eq!(ram.read_index(), 0xC0);
        ram.write_data(0x34);
        ram.write_index(0x3F);
        assert_eq!(ram.read_data(), 0x12);
        ram.write_index(0x00);
        assert_eq!(ram.read_data(), 0x34);
    }

    #[test]
    fn monochrome_goes_through_bgp_shading() {
        let regs = PaletteRegisters {
            bgp: 0b11_10_01_00,
            obp0: 0b00_00_00_11,
            ..PaletteRegisters::default()
        };
        let strategy = PaletteStrategy::default();
        assert_eq!(strategy.resolve(&pixel(Layer::Background, 2, 0), &regs, 0, 0), DMG_SHADES[2]);
        assert_eq!(strategy.resolve(&pixel(Layer::Sprite, 0, 0), &regs, 0, 0), DMG_SHADES[3]);
    }

    #[test]
    fn sgb_overlay_selects_palette_per_block() {
        let mut palettes = [[0u32; 4]; 4];
        palettes[2] = [0x10, 0x11, 0x12, 0x13];
        let mut strategy = PaletteStrategy::sgb(palettes);
        if let PaletteStrategy::SgbOverlay { attributes, .. } = &mut strategy {
            attributes[SGB_ATTRIBUTE_COLUMNS + 1] = 2;
        }
        let regs = PaletteRegisters {
            bgp: 0b11_10_01_00,
            ..PaletteRegisters::default()
        };
        let px = pixel(Layer::Window, 1, 0);
        assert_eq!(strategy.resolve(&px, &regs, 9, 9), 0x11);
        assert_eq!(strategy.resolve(&px, &regs, 0, 0), 0);
    }

    #[test]
    fn cgb_reads_palette_ram_per_layer() {
        let mut regs = PaletteRegisters::default();
        regs.obj_ram.write_index(0x80 | 8 * 3 + 2);
        regs.obj_ram.write_data(0x1F);
        regs.obj_ram.write_data(0x00);
        let strategy = PaletteStrategy::Cgb;
        assert_eq!(strategy.resolve(&pixel(Layer::Sprite, 1, 3), &regs, 0, 0), 0x00FF_0000);
        assert_eq!(strategy.resolve(&pixel(Layer::Background, 1, 3), &regs, 0, 0), 0);
    }
}
