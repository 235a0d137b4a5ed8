//! Diagonal tiled text overlay.
//!
//! Text is drawn from the 8x8 `font8x8` bitmaps, scaled by an integer
//! factor. Every output pixel is mapped into the rotated text plane and
//! tested against the glyph grid, so the overlay covers the whole page at
//! any angle. Rows are staggered by half a tile.

use std::io::Cursor;

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::error::WatermarkError;

use super::{text_only, SessionFacts, WatermarkPolicy, WatermarkStyle};

const GLYPH_SIZE: u32 = 8;

#[derive(Debug, Clone)]
pub struct WatermarkCompositor {
    color: [u8; 3],
    opacity: f32,
    scale: u32,
    sin: f32,
    cos: f32,
    tile_gap: u32,
    row_height: u32,
}

impl WatermarkCompositor {
    pub fn new(style: &WatermarkStyle) -> Result<Self, WatermarkError> {
        let color = parse_hex_color(&style.color)
            .ok_or_else(|| WatermarkError::InvalidStyle(format!("color {:?}", style.color)))?;
        if !(0.0..=1.0).contains(&style.opacity) {
            return Err(WatermarkError::InvalidStyle(format!(
                "opacity {}",
                style.opacity
            )));
        }
        if style.scale == 0 {
            return Err(WatermarkError::InvalidStyle("scale 0".into()));
        }
        let (sin, cos) = style.angle_degrees.to_radians().sin_cos();
        Ok(Self {
            color,
            opacity: style.opacity,
            scale: style.scale,
            sin,
            cos,
            tile_gap: style.tile_gap,
            row_height: style.row_height.max(GLYPH_SIZE * style.scale),
        })
    }

    /// Stamp the session's watermark onto `image` and encode it as PNG.
    ///
    /// Returns the PNG bytes together with the exact text that was stamped.
    pub fn composite(
        &self,
        mut image: RgbaImage,
        facts: &SessionFacts,
        policy: &WatermarkPolicy,
    ) -> Result<(Vec<u8>, String), WatermarkError> {
        let text = text_only(facts, policy);
        self.stamp(&mut image, &text);
        Ok((encode_png(image)?, text))
    }

    /// Like [`composite`](Self::composite) for an already encoded PNG page.
    pub fn composite_png(
        &self,
        png: &[u8],
        facts: &SessionFacts,
        policy: &WatermarkPolicy,
    ) -> Result<(Vec<u8>, String), WatermarkError> {
        let image = image::load_from_memory_with_format(png, ImageFormat::Png)
            .map_err(WatermarkError::Decode)?
            .to_rgba8();
        self.composite(image, facts, policy)
    }

    /// Tile `text` across the whole image in place. Dimensions and the alpha
    /// channel are left untouched.
    pub fn stamp(&self, image: &mut RgbaImage, text: &str) {
        let glyphs: Vec<[u8; 8]> = text.chars().map(glyph).collect();
        if glyphs.is_empty() || self.opacity == 0.0 {
            return;
        }

        let cell = (GLYPH_SIZE * self.scale) as f32;
        let text_width = cell * glyphs.len() as f32;
        let tile_width = text_width + self.tile_gap as f32;
        let row_height = self.row_height as f32;
        let cx = image.width() as f32 / 2.0;
        let cy = image.height() as f32 / 2.0;
        let alpha = self.opacity;

        for (x, y, pixel) in image.enumerate_pixels_mut() {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            // Rotate the pixel back into the unrotated text plane.
            let u = dx * self.cos + dy * self.sin;
            let v = -dx * self.sin + dy * self.cos;

            let row = (v / row_height).floor();
            let stagger = if row.rem_euclid(2.0) == 0.0 {
                0.0
            } else {
                tile_width / 2.0
            };
            let tu = (u + stagger).rem_euclid(tile_width);
            let tv = v.rem_euclid(row_height);
            if tu >= text_width || tv >= cell {
                continue;
            }

            let index = (tu / cell) as usize;
            let gx = ((tu % cell) / self.scale as f32) as usize;
            let gy = (tv / self.scale as f32) as usize;
            let Some(bits) = glyphs.get(index) else {
                continue;
            };
            if gy >= 8 || gx >= 8 || bits[gy] & (1 << gx) == 0 {
                continue;
            }

            for (channel, &ink) in pixel.0.iter_mut().take(3).zip(self.color.iter()) {
                let blended = f32::from(*channel) * (1.0 - alpha) + f32::from(ink) * alpha;
                *channel = blended.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Bitmap for `c`; characters outside the basic set render as `?`.
fn glyph(c: char) -> [u8; 8] {
    BASIC_FONTS
        .get(c)
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

fn parse_hex_color(hex: &str) -> Option<[u8; 3]> {
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

fn encode_png(image: RgbaImage) -> Result<Vec<u8>, WatermarkError> {
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .map_err(WatermarkError::Encode)?;
    Ok(out)
}
