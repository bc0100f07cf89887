//! Scanline compositor.

use bitflags::bitflags;

use super::sprite::SpriteAttributes;
use super::{Lcdc, Ppu, SCREEN_HEIGHT, SCREEN_WIDTH};

const BG_MAP_0: usize = 0x1800;
const BG_MAP_1: usize = 0x1C00;
const WINDOW_X_MAX: u8 = 166;

bitflags! {
    /// CGB background map attribute byte (VRAM bank 1).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TileAttributes: u8 {
        const PRIORITY = 0x80;
        const FLIP_Y = 0x40;
        const FLIP_X = 0x20;
        const BANK = 0x08;
        const PALETTE = 0x07;
    }
}

/// Layer a pixel came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Background,
    Window,
    Sprite,
}

/// A composited pixel before color resolution. `palette` is the CGB palette
/// number, or for DMG sprites the OBP0/OBP1 select bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pixel {
    pub layer: Layer,
    pub color_id: u8,
    pub palette: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundPixel {
    pub layer: Layer,
    pub color_id: u8,
    pub palette: u8,
    /// CGB tile attribute priority.
    pub priority: bool,
}

impl BackgroundPixel {
    pub const BLANK: Self = Self {
        layer: Layer::Background,
        color_id: 0,
        palette: 0,
        priority: false,
    };

    fn pixel(self) -> Pixel {
        Pixel {
            layer: self.layer,
            color_id: self.color_id,
            palette: self.palette,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpritePixel {
    pub color_id: u8,
    pub palette: u8,
    pub behind_bg: bool,
}

/// Resolve one column. A sprite pixel wins unless the background/window
/// color is nonzero and either the sprite is behind it or the tile carries the
/// CGB priority attribute. `master_priority` clear (CGB LCDC bit 0) lets
/// sprites win unconditionally.
pub fn compose(bg: BackgroundPixel, sprite: Option<SpritePixel>, master_priority: bool) -> Pixel {
    if let Some(sprite) = sprite {
        let bg_wins = master_priority && bg.color_id != 0 && (sprite.behind_bg || bg.priority);
        if !bg_wins {
            return Pixel {
                layer: Layer::Sprite,
                color_id: sprite.color_id,
                palette: sprite.palette,
            };
        }
    }
    bg.pixel()
}

fn tile_color(lo: u8, hi: u8, column: usize) -> u8 {
    let bit = 7 - column;
    (((hi >> bit) & 1) << 1) | ((lo >> bit) & 1)
}

impl Ppu {
    pub(super) fn render_scanline(&mut self) {
        let ly = self.ly as usize;
        if !self.lcdc.contains(Lcdc::ENABLE) || ly >= SCREEN_HEIGHT {
            return;
        }

        // DMG: LCDC bit 0 blanks background and window.
        // CGB: it only drops their priority over sprites.
        let bg_enabled = self.cgb || self.lcdc.contains(Lcdc::BG_ENABLE);
        let master_priority = !self.cgb || self.lcdc.contains(Lcdc::BG_ENABLE);

        let mut background = [BackgroundPixel::BLANK; SCREEN_WIDTH];
        if bg_enabled {
            self.fetch_background(&mut background);
            if self.fetch_window(&mut background) {
                self.window_line = self.window_line.wrapping_add(1);
            }
        }
        let sprites = self.fetch_sprites();

        for x in 0..SCREEN_WIDTH {
            let pixel = compose(background[x], sprites[x], master_priority);
            let color = self.strategy.resolve(&pixel, &self.palettes, x, ly);
            self.framebuffer[ly * SCREEN_WIDTH + x] = color;
        }
    }

    fn tile_row(&self, bank: usize, tile: usize, row: usize) -> (u8, u8) {
        let addr = tile * 16 + row * 2;
        (self.vram[bank][addr], self.vram[bank][addr + 1])
    }

    /// Tile data offset for a background/window tile number.
    fn bg_tile(&self, index: u8) -> usize {
        if self.lcdc.contains(Lcdc::TILE_DATA) {
            index as usize
        } else {
            (256 + index as i8 as i32) as usize
        }
    }

    fn map_pixel(&self, map_base: usize, map_x: usize, map_y: usize, layer: Layer) -> BackgroundPixel {
        let map_index = map_base + (map_y / 8) * 32 + map_x / 8;
        let tile = self.bg_tile(self.vram[0][map_index]);
        let attributes = if self.cgb {
            TileAttributes::from_bits_retain(self.vram[1][map_index])
        } else {
            TileAttributes::empty()
        };
        let mut row = map_y % 8;
        if attributes.contains(TileAttributes::FLIP_Y) {
            row = 7 - row;
        }
        let mut column = map_x % 8;
        if attributes.contains(TileAttributes::FLIP_X) {
            column = 7 - column;
        }
        let bank = attributes.contains(TileAttributes::BANK) as usize;
        let (lo, hi) = self.tile_row(bank, tile, row);
        BackgroundPixel {
            layer,
            color_id: tile_color(lo, hi, column),
            palette: (attributes & TileAttributes::PALETTE).bits(),
            priority: attributes.contains(TileAttributes::PRIORITY),
        }
    }

    fn fetch_background(&self, line: &mut [BackgroundPixel; SCREEN_WIDTH]) {
        let map_base = if self.lcdc.contains(Lcdc::BG_MAP) {
            BG_MAP_1
        } else {
            BG_MAP_0
        };
        let map_y = self.ly.wrapping_add(self.scy) as usize;
        for (x, slot) in line.iter_mut().enumerate() {
            let map_x = (x as u8).wrapping_add(self.scx) as usize;
            *slot = self.map_pixel(map_base, map_x, map_y, Layer::Background);
        }
    }

    /// Draw the window over `line`. Returns whether it was visible on this
    /// scanline.
    fn fetch_window(&self, line: &mut [BackgroundPixel; SCREEN_WIDTH]) -> bool {
        if !self.lcdc.contains(Lcdc::WINDOW_ENABLE) || self.ly < self.wy || self.wx > WINDOW_X_MAX {
            return false;
        }
        let map_base = if self.lcdc.contains(Lcdc::WINDOW_MAP) {
            BG_MAP_1
        } else {
            BG_MAP_0
        };
        let start = self.wx as i16 - 7;
        let map_y = self.window_line as usize;
        for x in start.max(0) as usize..SCREEN_WIDTH {
            let map_x = (x as i16 - start) as usize;
            line[x] = self.map_pixel(map_base, map_x, map_y, Layer::Window);
        }
        true
    }

    fn fetch_sprites(&self) -> [Option<SpritePixel>; SCREEN_WIDTH] {
        let mut line = [None; SCREEN_WIDTH];
        if !self.lcdc.contains(Lcdc::OBJ_ENABLE) {
            return line;
        }
        // the OAM scan fixed both the selection and the height for this line
        let height = self.line_sprites.height();
        for sprite in self.line_sprites.as_slice() {
            let flags = sprite.attributes;
            let offset = self.ly as i16 - sprite.y;
            if !(0..height).contains(&offset) {
                continue;
            }
            let mut row = offset as usize;
            if flags.contains(SpriteAttributes::FLIP_Y) {
                row = height as usize - 1 - row;
            }
            let tile = if height == 16 {
                (sprite.tile & 0xFE) as usize
            } else {
                sprite.tile as usize
            };
            let bank = (self.cgb && flags.contains(SpriteAttributes::BANK)) as usize;
            let (lo, hi) = self.tile_row(bank, tile + row / 8, row % 8);
            let palette = if self.cgb {
                sprite.cgb_palette()
            } else {
                flags.contains(SpriteAttributes::DMG_PALETTE) as u8
            };

            for px in 0..8usize {
                let sx = sprite.x + px as i16;
                if !(0..SCREEN_WIDTH as i16).contains(&sx) {
                    continue;
                }
                let slot = &mut line[sx as usize];
                if slot.is_some() {
                    continue;
                }
                let column = if flags.contains(SpriteAttributes::FLIP_X) {
                    7 - px
                } else {
                    px
                };
                let color_id = tile_color(lo, hi, column);
                if color_id == 0 {
                    continue;
                }
                *slot = Some(SpritePixel {
                    color_id,
                    palette,
                    behind_bg: flags.contains(SpriteAttributes::BEHIND_BG),
                });
            }
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupts::InterruptController;
    use crate::ppu::palette::DMG_SHADES;

    fn bg(color_id: u8) -> BackgroundPixel {
        BackgroundPixel {
            color_id,
            ..BackgroundPixel::BLANK
        }
    }

    fn sprite(behind_bg: bool) -> Option<SpritePixel> {
        Some(SpritePixel {
            color_id: 3,
            palette: 0,
            behind_bg,
        })
    }

    #[test]
    fn zero_background_never_hides_low_priority_sprite() {
        assert_eq!(compose(bg(0), sprite(true), true).layer, Layer::Sprite);
    }

    #[test]
    fn nonzero_background_hides_low_priority_sprite() {
        let pixel = compose(bg(2), sprite(true), true);
        assert_eq!(pixel.layer, Layer::Background);
        assert_eq!(pixel.color_id, 2);
    }

    #[test]
    fn high_priority_sprite_wins_over_any_background() {
        for color_id in 0..4 {
            assert_eq!(compose(bg(color_id), sprite(false), true).layer, Layer::Sprite);
        }
    }

    #[test]
    fn tile_priority_attribute_beats_sprites_on_nonzero_color() {
        let tile = BackgroundPixel {
            priority: true,
            ..bg(1)
        };
        assert_eq!(compose(tile, sprite(false), true).layer, Layer::Background);
        let transparent = BackgroundPixel {
            priority: true,
            ..bg(0)
        };
        assert_eq!(compose(transparent, sprite(false), true).layer, Layer::Sprite);
        assert_eq!(compose(tile, sprite(false), false).layer, Layer::Sprite);
    }

    #[test]
    fn empty_column_falls_back_to_color_zero() {
        let pixel = compose(BackgroundPixel::BLANK, None, true);
        assert_eq!(pixel.color_id, 0);
        assert_eq!(pixel.layer, Layer::Background);
    }

    fn solid_tile(ppu: &mut Ppu, tile: u16, color_id: u8) {
        let lo = if color_id & 1 != 0 { 0xFF } else { 0x00 };
        let hi = if color_id & 2 != 0 { 0xFF } else { 0x00 };
        for row in 0..8 {
            ppu.write_vram(0x8000 + tile * 16 + row * 2, lo);
            ppu.write_vram(0x8000 + tile * 16 + row * 2 + 1, hi);
        }
    }

    fn render_first_line(ppu: &mut Ppu) {
        let mut irq = InterruptController::new();
        ppu.step(80 + 172, &mut irq);
    }

    #[test]
    fn sprite_behind_background_shows_through_color_zero_only() {
        let mut ppu = Ppu::new(false);
        let mut irq = InterruptController::new();
        ppu.write_reg(0xFF47, 0b11_10_01_00, &mut irq);
        ppu.write_reg(0xFF48, 0b11_10_01_00, &mut irq);
        // tile 1 is solid color 2, tile 2 solid color 3
        solid_tile(&mut ppu, 1, 2);
        solid_tile(&mut ppu, 2, 3);
        // map column 1 uses tile 1, column 0 keeps tile 0 (color 0)
        ppu.write_vram(0x9801, 1);
        // behind-bg sprite spanning columns 4..12
        ppu.write_oam(0xFE00, 16);
        ppu.write_oam(0xFE01, 12);
        ppu.write_oam(0xFE02, 2);
        ppu.write_oam(0xFE03, 0x80);
        ppu.write_reg(0xFF40, 0x93, &mut irq);

        render_first_line(&mut ppu);
        let line = &ppu.framebuffer()[..SCREEN_WIDTH];
        assert_eq!(line[0], DMG_SHADES[0]);
        assert_eq!(line[4], DMG_SHADES[3]);
        assert_eq!(line[8], DMG_SHADES[2]);
    }

    #[test]
    fn flipped_tall_sprite_reads_the_bottom_tile_first() {
        let mut ppu = Ppu::new(false);
        let mut irq = InterruptController::new();
        ppu.write_reg(0xFF47, 0b11_10_01_00, &mut irq);
        ppu.write_reg(0xFF48, 0b11_10_01_00, &mut irq);
        // tile 2 stays transparent, tile 3 is solid color 3
        solid_tile(&mut ppu, 3, 3);
        ppu.write_oam(0xFE00, 16);
        ppu.write_oam(0xFE01, 8);
        ppu.write_oam(0xFE02, 2);
        ppu.write_oam(0xFE03, 0x40);
        ppu.write_reg(0xFF40, 0x97, &mut irq);

        render_first_line(&mut ppu);
        let line = &ppu.framebuffer()[..SCREEN_WIDTH];
        assert_eq!(line[0], DMG_SHADES[3]);
        assert_eq!(line[7], DMG_SHADES[3]);
        assert_eq!(line[8], DMG_SHADES[0]);
    }

    #[test]
    fn sprite_size_change_during_transfer_keeps_scanned_height() {
        let mut ppu = Ppu::new(false);
        let mut irq = InterruptController::new();
        ppu.write_reg(0xFF47, 0b11_10_01_00, &mut irq);
        ppu.write_reg(0xFF48, 0b11_10_01_00, &mut irq);
        solid_tile(&mut ppu, 4, 3);
        // visible from line -8, so line 0 is row 8 of a 16-pixel sprite
        ppu.write_oam(0xFE00, 8);
        ppu.write_oam(0xFE01, 8);
        ppu.write_oam(0xFE02, 4);
        ppu.write_oam(0xFE03, 0x40);
        ppu.write_reg(0xFF40, 0x97, &mut irq);

        ppu.step(80, &mut irq);
        ppu.write_reg(0xFF40, 0x93, &mut irq);
        ppu.step(172, &mut irq);

        // flipped row 8 of 16 is row 7 of the top tile
        let line = &ppu.framebuffer()[..SCREEN_WIDTH];
        assert_eq!(line[0], DMG_SHADES[3]);
        assert_eq!(line[8], DMG_SHADES[0]);
    }

    #[test]
    fn window_line_counter_skips_hidden_lines() {
        let mut ppu = Ppu::new(false);
        let mut irq = InterruptController::new();
        ppu.write_reg(0xFF4A, 0, &mut irq);
        ppu.write_reg(0xFF4B, 7, &mut irq);
        ppu.write_reg(0xFF40, 0xB1, &mut irq);
        ppu.step(456 * 2, &mut irq);
        assert_eq!(ppu.window_line_counter(), 2);
        // push the window off screen for two lines
        ppu.write_reg(0xFF4B, 200, &mut irq);
        ppu.step(456 * 2, &mut irq);
        assert_eq!(ppu.window_line_counter(), 2);
        ppu.write_reg(0xFF4B, 7, &mut irq);
        ppu.step(456, &mut irq);
        assert_eq!(ppu.window_line_counter(), 3);
    }
}
