//! Geometry changes around a diffusion run.
//!
//! Enlarging works in two steps: [`upscale`] produces a first estimate with
//! the original samples placed on an anchor grid, and [`anchor_mask`] marks
//! everything except those anchors for reconstruction. Running the diffusion
//! kernel with that mask then fills the gaps along the image's contours.

use super::{ImageBuffer, InpaintMask};
use crate::api::EngineError;

/// First estimate of the enlarged image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeInit {
    /// Replicate each source pixel over its block.
    Block,
    /// Bilinear interpolation between source pixel centres.
    #[default]
    Linear,
}

/// Position of source column (or row) `i` on a grid enlarged from `from` to `to`.
#[inline]
fn anchor(i: usize, from: usize, to: usize) -> usize {
    i * to / from
}

fn check_enlarge(image: &ImageBuffer, width: usize, height: usize) -> Result<(), EngineError> {
    if width < image.width() || height < image.height() {
        return Err(EngineError::invalid(format!(
            "cannot enlarge {}x{} to {}x{}",
            image.width(),
            image.height(),
            width,
            height
        )));
    }
    Ok(())
}

/// Enlarge `image` to `width × height`.
///
/// Source pixel `(x, y)` is copied unchanged to its anchor
/// `(x·width/w, y·height/h)`; the other pixels follow `init`.
pub fn upscale(
    image: &ImageBuffer,
    width: usize,
    height: usize,
    init: ResizeInit,
) -> Result<ImageBuffer, EngineError> {
    check_enlarge(image, width, height)?;
    let (sw, sh) = (image.width(), image.height());
    let mut out = ImageBuffer::new(width, height, image.channels())?;

    for c in 0..image.channels() {
        let src = image.plane(c);
        let dst = out.plane_mut(c);
        for y in 0..height {
            for x in 0..width {
                dst[y * width + x] = match init {
                    ResizeInit::Block => src[(y * sh / height) * sw + x * sw / width],
                    ResizeInit::Linear => bilinear(src, sw, sh, x, y, width, height),
                };
            }
        }
        for y in 0..sh {
            for x in 0..sw {
                dst[anchor(y, sh, height) * width + anchor(x, sw, width)] = src[y * sw + x];
            }
        }
    }
    Ok(out)
}

fn bilinear(src: &[u8], sw: usize, sh: usize, x: usize, y: usize, w: usize, h: usize) -> u8 {
    let fx = ((x as f32 + 0.5) * sw as f32 / w as f32 - 0.5).clamp(0.0, (sw - 1) as f32);
    let fy = ((y as f32 + 0.5) * sh as f32 / h as f32 - 0.5).clamp(0.0, (sh - 1) as f32);
    let (x0, y0) = (fx as usize, fy as usize);
    let (x1, y1) = ((x0 + 1).min(sw - 1), (y0 + 1).min(sh - 1));
    let (tx, ty) = (fx - x0 as f32, fy - y0 as f32);
    let at = |x: usize, y: usize| src[y * sw + x] as f32;
    let top = at(x0, y0) * (1.0 - tx) + at(x1, y0) * tx;
    let bottom = at(x0, y1) * (1.0 - tx) + at(x1, y1) * tx;
    (top * (1.0 - ty) + bottom * ty).round().clamp(0.0, 255.0) as u8
}

/// Shrink `image` to `width × height` by averaging the source pixels each
/// target pixel covers.
pub fn downscale_average(
    image: &ImageBuffer,
    width: usize,
    height: usize,
) -> Result<ImageBuffer, EngineError> {
    let (sw, sh) = (image.width(), image.height());
    if width == 0 || height == 0 || width > sw || height > sh {
        return Err(EngineError::invalid(format!(
            "cannot shrink {}x{} to {}x{}",
            sw, sh, width, height
        )));
    }
    let mut out = ImageBuffer::new(width, height, image.channels())?;
    for c in 0..image.channels() {
        let src = image.plane(c);
        let dst = out.plane_mut(c);
        for y in 0..height {
            let rows = y * sh / height..(y + 1) * sh / height;
            for x in 0..width {
                let cols = x * sw / width..(x + 1) * sw / width;
                let count = (rows.len() * cols.len()) as u32;
                let sum: u32 = rows
                    .clone()
                    .flat_map(|sy| cols.clone().map(move |sx| src[sy * sw + sx] as u32))
                    .sum();
                dst[y * width + x] = ((sum + count / 2) / count) as u8;
            }
        }
    }
    Ok(out)
}

/// Reconstruction mask for an image enlarged from `source` to `target` size.
///
/// With `keep_anchors` every pixel except the anchor grid is masked, so the
/// original samples survive the run untouched. Without it the whole image is
/// masked.
pub fn anchor_mask(
    source: (usize, usize),
    target: (usize, usize),
    keep_anchors: bool,
) -> Result<InpaintMask, EngineError> {
    let ((sw, sh), (width, height)) = (source, target);
    if sw == 0 || sh == 0 || width < sw || height < sh {
        return Err(EngineError::invalid(format!(
            "no anchor grid from {}x{} to {}x{}",
            sw, sh, width, height
        )));
    }
    let mut data = vec![1u8; width * height];
    if keep_anchors {
        for y in 0..sh {
            for x in 0..sw {
                data[anchor(y, sh, height) * width + anchor(x, sw, width)] = 0;
            }
        }
    }
    InpaintMask::new(width, height, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ramp(width: usize, height: usize) -> ImageBuffer {
        let data = (0..width * height).map(|i| (i * 7 % 256) as u8).collect();
        ImageBuffer::from_planar(width, height, 1, data).unwrap()
    }

    #[test]
    fn test_anchors_keep_source_values() {
        let image = ramp(3, 2);
        for init in [ResizeInit::Block, ResizeInit::Linear] {
            let big = upscale(&image, 7, 5, init).unwrap();
            for y in 0..2 {
                for x in 0..3 {
                    assert_eq!(big.get(x * 7 / 3, y * 5 / 2, 0), image.get(x, y, 0));
                }
            }
        }
    }

    #[test]
    fn test_block_replicates() {
        let image = ImageBuffer::from_planar(2, 1, 1, vec![10, 200]).unwrap();
        let big = upscale(&image, 4, 2, ResizeInit::Block).unwrap();
        assert_eq!(big.plane(0), &[10, 10, 200, 200, 10, 10, 200, 200]);
    }

    #[test]
    fn test_linear_is_between_neighbours() {
        let image = ImageBuffer::from_planar(2, 1, 1, vec![0, 200]).unwrap();
        let big = upscale(&image, 4, 1, ResizeInit::Linear).unwrap();
        let row = big.plane(0);
        assert_eq!(row[0], 0);
        assert_eq!(row[2], 200);
        assert!(row[1] > 0 && row[1] < 200);
    }

    #[test]
    fn test_shrinking_rejected_by_upscale() {
        let image = ramp(8, 8);
        assert!(upscale(&image, 4, 8, ResizeInit::Linear).is_err());
    }

    #[test]
    fn test_downscale_averages_blocks() {
        let image = ImageBuffer::from_planar(4, 2, 1, vec![0, 10, 20, 30, 10, 20, 30, 40]).unwrap();
        let small = downscale_average(&image, 2, 1).unwrap();
        assert_eq!(small.plane(0), &[10, 30]);
        assert!(downscale_average(&image, 5, 1).is_err());
    }

    #[test]
    fn test_anchor_mask_counts() {
        let mask = anchor_mask((3, 2), (7, 5), true).unwrap();
        assert_eq!(mask.count(), 35 - 6);
        assert!(!mask.is_masked(0, 0));
        assert!(!mask.is_masked(4, 2));

        let all = anchor_mask((3, 2), (7, 5), false).unwrap();
        assert_eq!(all.count(), 35);
    }

    #[test]
    fn test_same_size_keeps_every_pixel() {
        let image = ramp(4, 3);
        assert_eq!(upscale(&image, 4, 3, ResizeInit::Linear).unwrap(), image);
        assert_eq!(anchor_mask((4, 3), (4, 3), true).unwrap().count(), 0);
    }
}
