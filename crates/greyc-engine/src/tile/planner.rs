//! Tile planning.
//!
//! A [`TilePlan`] splits an image into a row-major grid of disjoint core
//! rectangles. Each tile also carries a bordered rectangle, the core grown by
//! the border margin and clipped to the image, which the kernel reads as
//! context. Only the core is ever written back.

use crate::api::EngineError;

/// Axis-aligned rectangle in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Rect {
    #[inline]
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    #[inline]
    pub fn right(&self) -> usize {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    #[inline]
    pub fn bottom(&self) -> usize {
        self.y + self.height
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

/// One unit of work: a core rectangle plus its clipped border context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// Position in the plan's row-major order.
    pub index: usize,
    /// Region written back to the image.
    pub core: Rect,
    /// Region read by the kernel: `core` grown by `border`, clipped to the image.
    pub bordered: Rect,
    /// Requested border margin. The effective margin is smaller at image edges.
    pub border: usize,
}

impl Tile {
    /// Offset of the core's top-left corner inside the bordered rectangle.
    #[inline]
    pub fn core_offset(&self) -> (usize, usize) {
        (self.core.x - self.bordered.x, self.core.y - self.bordered.y)
    }
}

/// Tiling of an image, computed on demand.
///
/// A plan is a small `Copy` value: iterating it does not allocate, and the
/// same plan can be iterated again for every pass of a run.
///
/// # Example
///
/// ```
/// use greyc_engine::plan;
///
/// let plan = plan(512, 512, 256, 4).unwrap();
/// assert_eq!(plan.len(), 4);
///
/// let first = plan.iter().next().unwrap();
/// assert_eq!(first.core.width, 256);
/// assert_eq!(first.bordered.x, 0); // clipped at the image edge
/// assert_eq!(first.bordered.width, 260);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePlan {
    width: usize,
    height: usize,
    tile_size: usize,
    border: usize,
    cols: usize,
    rows: usize,
}

/// Plan the tiles covering a `width × height` image.
///
/// `tile_size == 0` disables tiling: the whole image becomes one tile with
/// zero border.
pub fn plan(
    width: usize,
    height: usize,
    tile_size: usize,
    border: usize,
) -> Result<TilePlan, EngineError> {
    if width == 0 || height == 0 {
        return Err(EngineError::invalid(format!(
            "cannot tile an empty {}x{} image",
            width, height
        )));
    }
    let (cols, rows, border) = if tile_size == 0 {
        (1, 1, 0)
    } else {
        (width.div_ceil(tile_size), height.div_ceil(tile_size), border)
    };
    Ok(TilePlan {
        width,
        height,
        tile_size,
        border,
        cols,
        rows,
    })
}

impl TilePlan {
    #[inline]
    pub fn len(&self) -> usize {
        self.cols * self.rows
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the plan is the single-tile, untiled fallback.
    #[inline]
    pub fn is_untiled(&self) -> bool {
        self.tile_size == 0
    }

    #[inline]
    pub fn image_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    #[inline]
    pub fn border(&self) -> usize {
        self.border
    }

    /// Grid dimensions as `(columns, rows)`.
    #[inline]
    pub fn grid(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    /// Tile at `index` in row-major order.
    pub fn tile(&self, index: usize) -> Option<Tile> {
        if index >= self.len() {
            return None;
        }
        if self.tile_size == 0 {
            let whole = Rect::new(0, 0, self.width, self.height);
            return Some(Tile {
                index,
                core: whole,
                bordered: whole,
                border: 0,
            });
        }

        let (col, row) = (index % self.cols, index / self.cols);
        let x = col * self.tile_size;
        let y = row * self.tile_size;
        let core = Rect::new(
            x,
            y,
            self.tile_size.min(self.width - x),
            self.tile_size.min(self.height - y),
        );

        let bx0 = core.x.saturating_sub(self.border);
        let by0 = core.y.saturating_sub(self.border);
        let bx1 = (core.right() + self.border).min(self.width);
        let by1 = (core.bottom() + self.border).min(self.height);

        Some(Tile {
            index,
            core,
            bordered: Rect::new(bx0, by0, bx1 - bx0, by1 - by0),
            border: self.border,
        })
    }

    /// Lazily iterate the tiles in row-major order.
    pub fn iter(&self) -> Tiles {
        Tiles {
            plan: *self,
            next: 0,
        }
    }
}

impl IntoIterator for TilePlan {
    type Item = Tile;
    type IntoIter = Tiles;

    fn into_iter(self) -> Tiles {
        self.iter()
    }
}

/// Iterator over the tiles of a [`TilePlan`].
#[derive(Debug, Clone)]
pub struct Tiles {
    plan: TilePlan,
    next: usize,
}

impl Iterator for Tiles {
    type Item = Tile;

    fn next(&mut self) -> Option<Tile> {
        let tile = self.plan.tile(self.next)?;
        self.next += 1;
        Some(tile)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.plan.len() - self.next.min(self.plan.len());
        (left, Some(left))
    }
}

impl ExactSizeIterator for Tiles {}
