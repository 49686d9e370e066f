//! Non-local means over a tile.

use super::field::Field;
use super::{KernelContext, KernelError, PatchParams, TileStatus};
use crate::tile::TileBuffer;

/// With the fast approximation, candidates whose normalized patch distance
/// exceeds this are skipped (their weight is below `e^-5`).
const FAST_CUTOFF: f32 = 5.0;

pub(super) fn denoise(
    tile: &mut TileBuffer,
    params: &PatchParams,
    ctx: &KernelContext<'_>,
) -> Result<TileStatus, KernelError> {
    let (width, height, channels) = {
        let pixels = tile.pixels();
        (pixels.width(), pixels.height(), pixels.channels())
    };
    let source = (0..channels)
        .map(|c| Field::from_u8(tile.pixels().plane(c), width, height))
        .collect::<Result<Vec<_>, _>>()?;
    let mut out = source.clone();

    // Even sizes extend one further towards negative offsets.
    let patch_lo = (params.patch_size / 2) as isize;
    let patch_hi = (params.patch_size - 1) as isize - patch_lo;
    let radius = (params.lookup_size / 2) as isize;
    let patch_norm = (params.patch_size * params.patch_size * channels) as f32;
    let inv_p2 = 1.0 / (params.sigma_p * params.sigma_p);
    let inv_s2 = 1.0 / (params.sigma_s * params.sigma_s);

    let mut sums = vec![0.0f32; channels];
    for y in 0..height {
        for x in 0..width {
            if !tile.is_writable(x, y) {
                continue;
            }
            sums.iter_mut().for_each(|s| *s = 0.0);
            let mut total = 0.0f32;
            let (xi, yi) = (x as isize, y as isize);

            for qy in (yi - radius).max(0)..=(yi + radius).min(height as isize - 1) {
                for qx in (xi - radius).max(0)..=(xi + radius).min(width as isize - 1) {
                    let mut dist = 0.0f32;
                    for field in &source {
                        for dy in -patch_lo..=patch_hi {
                            for dx in -patch_lo..=patch_hi {
                                let d = field.clamped(xi + dx, yi + dy)
                                    - field.clamped(qx + dx, qy + dy);
                                dist += d * d;
                            }
                        }
                    }
                    let similarity = dist / patch_norm * inv_p2;
                    if params.fast_approx && similarity > FAST_CUTOFF {
                        continue;
                    }
                    let spatial = ((qx - xi).pow(2) + (qy - yi).pow(2)) as f32 * inv_s2;
                    let w = (-similarity - spatial).exp();
                    for (s, field) in sums.iter_mut().zip(&source) {
                        *s += w * field.at(qx as usize, qy as usize);
                    }
                    total += w;
                }
            }

            for (channel, (o, s)) in out.iter_mut().zip(&sums).enumerate() {
                let value = s / total;
                if !value.is_finite() {
                    return Err(KernelError::NonFinite { x, y, channel });
                }
                *o.at_mut(x, y) = value;
            }
        }
        ctx.report(100.0 * (y + 1) as f32 / height as f32);
        if ctx.should_stop() {
            return Ok(TileStatus::Cancelled);
        }
    }

    let pixels = tile.pixels_mut();
    for (c, field) in out.iter().enumerate() {
        for (dst, v) in pixels.plane_mut(c).iter_mut().zip(&field.data) {
            *dst = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(TileStatus::Done)
}
