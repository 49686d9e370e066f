//! Inpainting masks.
//!
//! An [`InpaintMask`] marks the pixels a run is allowed to reconstruct. When a
//! mask is passed to a run, the kernel leaves every unmasked pixel exactly as
//! it was, so known image content is used as boundary data only.

use rand::Rng;

use super::ImageBuffer;
use crate::api::EngineError;
use crate::tile::Rect;

/// How masked pixels are pre-filled before the first iteration.
///
/// Diffusion converges much faster when the hole starts close to its final
/// value; [`Smart`](InpaintInit::Smart) propagates known neighbours inwards
/// and is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InpaintInit {
    /// Fill masked pixels with 0.
    Black,
    /// Fill masked pixels with 255.
    White,
    /// Fill masked pixels with uniform random values.
    Noise,
    /// Keep whatever the image holds under the mask.
    Unchanged,
    /// Peel the mask from its boundary, setting each pixel to the mean of its
    /// already known 4-neighbours.
    #[default]
    Smart,
}

/// Binary mask with the same width and height as the image it applies to.
///
/// Non-zero entries mark pixels to reconstruct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InpaintMask {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl InpaintMask {
    /// Wrap row-major mask values (non-zero = masked).
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> Result<Self, EngineError> {
        if width == 0 || height == 0 {
            return Err(EngineError::invalid("mask dimensions must be positive"));
        }
        if data.len() != width * height {
            return Err(EngineError::invalid(format!(
                "mask has {} entries, expected {}x{}",
                data.len(),
                width,
                height
            )));
        }
        let data = data.into_iter().map(|v| u8::from(v != 0)).collect();
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Build a mask from an image: a pixel is masked when any channel is non-zero.
    pub fn from_image(image: &ImageBuffer) -> Self {
        let mut data = vec![0u8; image.plane_len()];
        for c in 0..image.channels() {
            for (m, &v) in data.iter_mut().zip(image.plane(c)) {
                if v != 0 {
                    *m = 1;
                }
            }
        }
        Self {
            width: image.width(),
            height: image.height(),
            data,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn is_masked(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x] != 0
    }

    /// Number of masked pixels.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    /// Row-major 0/1 values.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Grow the masked region by `radius` pixels (square structuring element).
    pub fn dilate(&self, radius: usize) -> Self {
        if radius == 0 {
            return self.clone();
        }
        let (w, h) = (self.width, self.height);

        // Separable max filter: rows, then columns.
        let mut rows = vec![0u8; w * h];
        for y in 0..h {
            for x in 0..w {
                let x0 = x.saturating_sub(radius);
                let x1 = (x + radius).min(w - 1);
                rows[y * w + x] = self.data[y * w + x0..=y * w + x1]
                    .iter()
                    .copied()
                    .max()
                    .unwrap_or(0);
            }
        }
        let mut data = vec![0u8; w * h];
        for y in 0..h {
            let y0 = y.saturating_sub(radius);
            let y1 = (y + radius).min(h - 1);
            for x in 0..w {
                data[y * w + x] = (y0..=y1).map(|yy| rows[yy * w + x]).max().unwrap_or(0);
            }
        }
        Self {
            width: w,
            height: h,
            data,
        }
    }

    /// Copy of the mask values inside `rect`, row-major.
    pub fn crop(&self, rect: Rect) -> Vec<u8> {
        let mut out = Vec::with_capacity(rect.width * rect.height);
        for y in rect.y..rect.bottom() {
            let start = y * self.width + rect.x;
            out.extend_from_slice(&self.data[start..start + rect.width]);
        }
        out
    }

    /// Check the mask can be applied to `image`.
    pub fn check_matches(&self, image: &ImageBuffer) -> Result<(), EngineError> {
        if self.width != image.width() || self.height != image.height() {
            return Err(EngineError::invalid(format!(
                "mask is {}x{} but image is {}x{}",
                self.width,
                self.height,
                image.width(),
                image.height()
            )));
        }
        Ok(())
    }

    /// Pre-fill the masked pixels of `image` according to `init`.
    pub fn prefill<R: Rng>(
        &self,
        image: &mut ImageBuffer,
        init: InpaintInit,
        rng: &mut R,
    ) -> Result<(), EngineError> {
        self.check_matches(image)?;
        match init {
            InpaintInit::Black => self.fill_constant(image, 0),
            InpaintInit::White => self.fill_constant(image, 255),
            InpaintInit::Noise => {
                for c in 0..image.channels() {
                    for (v, &m) in image.plane_mut(c).iter_mut().zip(&self.data) {
                        if m != 0 {
                            *v = rng.gen();
                        }
                    }
                }
            }
            InpaintInit::Unchanged => {}
            InpaintInit::Smart => self.fill_smart(image),
        }
        Ok(())
    }

    fn fill_constant(&self, image: &mut ImageBuffer, value: u8) {
        for c in 0..image.channels() {
            for (v, &m) in image.plane_mut(c).iter_mut().zip(&self.data) {
                if m != 0 {
                    *v = value;
                }
            }
        }
    }

    fn fill_smart(&self, image: &mut ImageBuffer) {
        let (w, h) = (self.width, self.height);
        let mut pending = self.data.clone();
        let mut remaining = self.count();

        while remaining > 0 {
            let mut next = pending.clone();
            let mut filled = 0;
            for y in 0..h {
                for x in 0..w {
                    if pending[y * w + x] == 0 {
                        continue;
                    }
                    let known: Vec<(usize, usize)> = neighbours4(x, y, w, h)
                        .filter(|&(nx, ny)| pending[ny * w + nx] == 0)
                        .collect();
                    if known.is_empty() {
                        continue;
                    }
                    for c in 0..image.channels() {
                        let sum: u32 = known.iter().map(|&(nx, ny)| image.get(nx, ny, c) as u32).sum();
                        let mean = (sum as f32 / known.len() as f32).round() as u8;
                        image.set(x, y, c, mean);
                    }
                    next[y * w + x] = 0;
                    filled += 1;
                }
            }
            if filled == 0 {
                // Mask covers the whole image: nothing known to propagate.
                break;
            }
            remaining -= filled;
            pending = next;
        }
    }
}

fn neighbours4(x: usize, y: usize, w: usize, h: usize) -> impl Iterator<Item = (usize, usize)> {
    let left = x.checked_sub(1).map(|nx| (nx, y));
    let right = (x + 1 < w).then_some((x + 1, y));
    let up = y.checked_sub(1).map(|ny| (x, ny));
    let down = (y + 1 < h).then_some((x, y + 1));
    [left, right, up, down].into_iter().flatten()
}
