//! Synthetic noise for experiments and inpainting pre-fill.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use super::ImageBuffer;
use crate::api::EngineError;

/// Add zero-mean Gaussian noise with standard deviation `sigma` to every
/// sample, saturating at the 8-bit range.
pub fn add_gaussian_noise<R: Rng>(
    image: &mut ImageBuffer,
    sigma: f32,
    rng: &mut R,
) -> Result<(), EngineError> {
    if sigma == 0.0 {
        return Ok(());
    }
    let normal = Normal::new(0.0, sigma)
        .map_err(|e| EngineError::invalid(format!("gaussian noise sigma {sigma}: {e}")))?;
    for v in image.as_mut_slice() {
        let noisy = *v as f32 + normal.sample(rng);
        *v = noisy.round().clamp(0.0, 255.0) as u8;
    }
    Ok(())
}

/// Add uniform noise in `[-amplitude, amplitude]` to every sample.
pub fn add_uniform_noise<R: Rng>(image: &mut ImageBuffer, amplitude: f32, rng: &mut R) {
    if amplitude <= 0.0 {
        return;
    }
    for v in image.as_mut_slice() {
        let noisy = *v as f32 + rng.gen_range(-amplitude..=amplitude);
        *v = noisy.round().clamp(0.0, 255.0) as u8;
    }
}

/// Replace `percent`% of the pixels with black or white, all channels at once.
pub fn add_salt_pepper_noise<R: Rng>(image: &mut ImageBuffer, percent: f32, rng: &mut R) {
    if percent.is_nan() || percent <= 0.0 {
        return;
    }
    let p = (percent / 100.0).min(1.0) as f64;
    let (width, height) = (image.width(), image.height());
    for y in 0..height {
        for x in 0..width {
            if !rng.gen_bool(p) {
                continue;
            }
            let value = if rng.gen() { 255 } else { 0 };
            for c in 0..image.channels() {
                image.set(x, y, c, value);
            }
        }
    }
}
