//! Private per-tile working copies.

use super::Tile;
use crate::api::EngineError;
use crate::image::{ImageBuffer, InpaintMask};

/// A worker's private copy of one tile's bordered region.
///
/// The kernel mutates [`pixels_mut()`](Self::pixels_mut) in place; the
/// merger later copies the core rectangle back into the shared image.
#[derive(Debug, Clone)]
pub struct TileBuffer {
    tile: Tile,
    pixels: ImageBuffer,
    mask: Option<Vec<u8>>,
}

impl TileBuffer {
    /// Copy the bordered rectangle of `tile` (and the matching mask values,
    /// if any) out of `source`.
    pub fn extract(
        source: &ImageBuffer,
        mask: Option<&InpaintMask>,
        tile: Tile,
    ) -> Result<Self, EngineError> {
        let pixels = source.crop(tile.bordered)?;
        let mask = mask.map(|m| m.crop(tile.bordered));
        Ok(Self { tile, pixels, mask })
    }

    #[inline]
    pub fn tile(&self) -> &Tile {
        &self.tile
    }

    #[inline]
    pub fn pixels(&self) -> &ImageBuffer {
        &self.pixels
    }

    #[inline]
    pub fn pixels_mut(&mut self) -> &mut ImageBuffer {
        &mut self.pixels
    }

    /// Row-major mask over the bordered region; `None` means every pixel may change.
    #[inline]
    pub fn mask(&self) -> Option<&[u8]> {
        self.mask.as_deref()
    }

    /// Whether the pixel at bordered-local `(x, y)` may be modified.
    #[inline]
    pub fn is_writable(&self, x: usize, y: usize) -> bool {
        match &self.mask {
            Some(mask) => mask[y * self.pixels.width() + x] != 0,
            None => true,
        }
    }

    /// Whether the mask leaves nothing to do in this tile.
    pub fn is_fully_masked_out(&self) -> bool {
        self.mask
            .as_ref()
            .is_some_and(|mask| mask.iter().all(|&m| m == 0))
    }
}
