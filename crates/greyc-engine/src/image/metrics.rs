//! Image quality metrics.

use super::ImageBuffer;
use crate::api::EngineError;

/// Mean squared error between two images of identical shape.
pub fn mse(a: &ImageBuffer, b: &ImageBuffer) -> Result<f64, EngineError> {
    if !a.same_shape(b) {
        return Err(EngineError::invalid(format!(
            "cannot compare {}x{}x{} with {}x{}x{}",
            a.width(),
            a.height(),
            a.channels(),
            b.width(),
            b.height(),
            b.channels()
        )));
    }
    let sum: f64 = a
        .as_slice()
        .iter()
        .zip(b.as_slice())
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum();
    Ok(sum / a.as_slice().len() as f64)
}

/// Peak signal-to-noise ratio in dB for 8-bit images.
///
/// Returns `Ok(None)` when the images are identical (infinite PSNR).
pub fn psnr(a: &ImageBuffer, b: &ImageBuffer) -> Result<Option<f64>, EngineError> {
    let mse = mse(a, b)?;
    if mse == 0.0 {
        return Ok(None);
    }
    Ok(Some(10.0 * (255.0 * 255.0 / mse).log10()))
}
