//! RGB / YCbCr conversion of whole images.
//!
//! Integer BT.601 studio-swing transform: Y in `[16, 235]`, Cb and Cr in
//! `[16, 240]`. Working in YCbCr lets a run smooth chroma harder than luma
//! or touch only one of them.

use super::ImageBuffer;
use crate::api::EngineError;

/// Convert a three-channel RGB image to YCbCr in place.
pub fn rgb_to_ycbcr(image: &mut ImageBuffer) -> Result<(), EngineError> {
    convert(image, |r, g, b| {
        let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
        let cb = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
        let cr = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
        (y, cb, cr)
    })
}

/// Convert a three-channel YCbCr image back to RGB in place.
pub fn ycbcr_to_rgb(image: &mut ImageBuffer) -> Result<(), EngineError> {
    convert(image, |y, cb, cr| {
        let c = 298 * (y - 16);
        let (d, e) = (cb - 128, cr - 128);
        let r = (c + 409 * e + 128) >> 8;
        let g = (c - 100 * d - 208 * e + 128) >> 8;
        let b = (c + 516 * d + 128) >> 8;
        (r, g, b)
    })
}

fn convert(
    image: &mut ImageBuffer,
    f: impl Fn(i32, i32, i32) -> (i32, i32, i32),
) -> Result<(), EngineError> {
    if image.channels() != 3 {
        return Err(EngineError::invalid(format!(
            "colour conversion needs 3 channels, got {}",
            image.channels()
        )));
    }
    let len = image.plane_len();
    let (first, rest) = image.as_mut_slice().split_at_mut(len);
    let (second, third) = rest.split_at_mut(len);
    for ((p, q), s) in first.iter_mut().zip(second.iter_mut()).zip(third.iter_mut()) {
        let (a, b, c) = f(*p as i32, *q as i32, *s as i32);
        *p = a.clamp(0, 255) as u8;
        *q = b.clamp(0, 255) as u8;
        *s = c.clamp(0, 255) as u8;
    }
    Ok(())
}
