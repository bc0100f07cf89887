use bitflags::bitflags;

pub const OAM_SIZE: usize = 0xA0;
pub const TOTAL_SPRITES: usize = 40;
pub const MAX_SPRITES_PER_LINE: usize = 10;

bitflags! {
    /// OAM byte 3.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SpriteAttributes: u8 {
        /// Drawn behind nonzero background/window colors.
        const BEHIND_BG = 0x80;
        const FLIP_Y = 0x40;
        const FLIP_X = 0x20;
        /// DMG palette select (OBP1).
        const DMG_PALETTE = 0x10;
        /// CGB tile bank.
        const BANK = 0x08;
        /// CGB palette number.
        const CGB_PALETTE = 0x07;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sprite {
    pub x: i16,
    pub y: i16,
    pub tile: u8,
    pub attributes: SpriteAttributes,
    pub oam_index: usize,
}

impl Sprite {
    fn from_oam(oam: &[u8; OAM_SIZE], index: usize) -> Self {
        let base = index * 4;
        Self {
            y: oam[base] as i16 - 16,
            x: oam[base + 1] as i16 - 8,
            tile: oam[base + 2],
            attributes: SpriteAttributes::from_bits_retain(oam[base + 3]),
            oam_index: index,
        }
    }

    pub fn cgb_palette(&self) -> u8 {
        (self.attributes & SpriteAttributes::CGB_PALETTE).bits()
    }
}

/// Which rule orders overlapping sprites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpritePriority {
    /// Lower X first, then lower OAM index.
    Coordinate,
    /// OAM index only.
    OamOrder,
}

/// Sprites selected for one scanline, in drawing priority order.
#[derive(Debug, Clone, Default)]
pub struct LineSprites {
    sprites: [Sprite; MAX_SPRITES_PER_LINE],
    count: usize,
    /// Sprite height in effect when the line was scanned.
    height: i16,
}

impl LineSprites {
    /// Select up to ten sprites overlapping `ly`, scanning OAM in order.
    pub fn scan(oam: &[u8; OAM_SIZE], ly: u8, height: i16, priority: SpritePriority) -> Self {
        let mut line = Self {
            height,
            ..Self::default()
        };
        for index in 0..TOTAL_SPRITES {
            if line.count == MAX_SPRITES_PER_LINE {
                break;
            }
            let sprite = Sprite::from_oam(oam, index);
            let row = ly as i16 - sprite.y;
            if (0..height).contains(&row) {
                line.sprites[line.count] = sprite;
                line.count += 1;
            }
        }
        let selected = &mut line.sprites[..line.count];
        match priority {
            SpritePriority::Coordinate => selected.sort_by_key(|s| (s.x, s.oam_index)),
            SpritePriority::OamOrder => selected.sort_by_key(|s| s.oam_index),
        }
        line
    }

    pub fn as_slice(&self) -> &[Sprite] {
        &self.sprites[..self.count]
    }

    pub fn height(&self) -> i16 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
