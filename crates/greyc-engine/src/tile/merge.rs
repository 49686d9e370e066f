//! Writing finished tiles back into the shared image.
//!
//! [`TileWriter`] takes the image by exclusive borrow for the duration of one
//! pass and splits it up front: every core row of every channel becomes its
//! own `&mut` slice, owned by the tile whose core covers it. Core rectangles
//! of one [`TilePlan`] are pairwise disjoint, so workers committing different
//! tiles never contend. Commits of the *same* tile are serialized by that
//! tile's lock.

use std::sync::{Mutex, PoisonError};

use super::{Tile, TileBuffer, TilePlan};
use crate::api::EngineError;
use crate::image::ImageBuffer;

/// Destination rows of one tile core, channel-major.
type CoreRows<'a> = Vec<&'a mut [u8]>;

/// Concurrent writer of tile cores into one image.
pub struct TileWriter<'a> {
    channels: usize,
    plan: TilePlan,
    cores: Vec<Mutex<CoreRows<'a>>>,
}

impl<'a> TileWriter<'a> {
    /// Borrow `image` for committing tiles of `plan`.
    pub fn new(image: &'a mut ImageBuffer, plan: TilePlan) -> Result<Self, EngineError> {
        if plan.image_size() != (image.width(), image.height()) {
            return Err(EngineError::invalid(format!(
                "plan covers {:?} but image is {}x{}",
                plan.image_size(),
                image.width(),
                image.height()
            )));
        }
        let (width, channels, plane_len) = (image.width(), image.channels(), image.plane_len());
        let tiles: Vec<Tile> = plan.iter().collect();
        let mut cores: Vec<CoreRows<'a>> = tiles.iter().map(|_| Vec::new()).collect();

        for plane in image.as_mut_slice().chunks_mut(plane_len) {
            for (y, row) in plane.chunks_mut(width).enumerate() {
                let mut rest = row;
                let mut consumed = 0;
                // Tiles of one band come in increasing x order.
                for tile in tiles
                    .iter()
                    .filter(|t| t.core.y <= y && y < t.core.bottom())
                {
                    let (_, tail) = std::mem::take(&mut rest).split_at_mut(tile.core.x - consumed);
                    let (segment, tail) = tail.split_at_mut(tile.core.width);
                    cores[tile.index].push(segment);
                    rest = tail;
                    consumed = tile.core.right();
                }
            }
        }

        Ok(Self {
            channels,
            plan,
            cores: cores.into_iter().map(Mutex::new).collect(),
        })
    }

    /// Copy the core rectangle of `buffer` into the image.
    ///
    /// The border margin is never written. Committing the same buffer twice
    /// leaves the image as committing it once.
    pub fn commit(&self, buffer: &TileBuffer) -> Result<(), EngineError> {
        let tile = *buffer.tile();
        if self.plan.tile(tile.index) != Some(tile) {
            return Err(EngineError::invalid(format!(
                "tile {} does not belong to this plan",
                tile.index
            )));
        }
        let src = buffer.pixels();
        if src.channels() != self.channels
            || src.width() != tile.bordered.width
            || src.height() != tile.bordered.height
        {
            return Err(EngineError::invalid(format!(
                "tile {} buffer is {}x{}x{}, expected {}x{}x{}",
                tile.index,
                src.width(),
                src.height(),
                src.channels(),
                tile.bordered.width,
                tile.bordered.height,
                self.channels
            )));
        }

        let core = tile.core;
        let (ox, oy) = tile.core_offset();
        let mut rows = self.cores[tile.index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for (i, dst) in rows.iter_mut().enumerate() {
            let (c, row) = (i / core.height, i % core.height);
            let s = (oy + row) * src.width() + ox;
            dst.copy_from_slice(&src.plane(c)[s..s + core.width]);
        }
        Ok(())
    }

    pub fn plan(&self) -> &TilePlan {
        &self.plan
    }
}
