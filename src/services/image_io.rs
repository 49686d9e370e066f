//! PNG reading and writing for engine image buffers.
//!
//! Grey and grey-alpha files load as one channel; RGB, RGBA and indexed files
//! load as three. Alpha is dropped. 16-bit samples are reduced to 8 bits and
//! low bit depths are expanded.

use std::io::Cursor;
use std::path::Path;

use greyc_engine::{ImageBuffer, InpaintMask};

use crate::error::AppError;

/// Decode PNG bytes into a planar buffer.
pub fn decode_png(bytes: &[u8]) -> Result<ImageBuffer, AppError> {
    let mut decoder = png::Decoder::new(Cursor::new(bytes));
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder
        .read_info()
        .map_err(|e| AppError::PngDecode(e.to_string()))?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| AppError::PngDecode(e.to_string()))?;
    if info.bit_depth != png::BitDepth::Eight {
        return Err(AppError::UnsupportedImage(format!(
            "bit depth {:?} after expansion",
            info.bit_depth
        )));
    }

    let (stride, keep) = match info.color_type {
        png::ColorType::Grayscale => (1, 1),
        png::ColorType::GrayscaleAlpha => (2, 1),
        png::ColorType::Rgb => (3, 3),
        png::ColorType::Rgba => (4, 3),
        other => {
            return Err(AppError::UnsupportedImage(format!(
                "color type {:?}",
                other
            )))
        }
    };
    let (width, height) = (info.width as usize, info.height as usize);
    let mut interleaved = Vec::with_capacity(width * height * keep);
    for row in buf.chunks(info.line_size).take(height) {
        for pixel in row[..width * stride].chunks_exact(stride) {
            interleaved.extend_from_slice(&pixel[..keep]);
        }
    }
    Ok(ImageBuffer::from_interleaved(width, height, keep, &interleaved)?)
}

/// Encode a one- or three-channel buffer as an 8-bit PNG.
pub fn encode_png(image: &ImageBuffer) -> Result<Vec<u8>, AppError> {
    let color = match image.channels() {
        1 => png::ColorType::Grayscale,
        3 => png::ColorType::Rgb,
        n => {
            return Err(AppError::UnsupportedImage(format!(
                "cannot write {} channels",
                n
            )))
        }
    };
    let mut buf = Cursor::new(Vec::new());
    {
        let mut encoder = png::Encoder::new(&mut buf, image.width() as u32, image.height() as u32);
        encoder.set_color(color);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_compression(png::Compression::Default);
        let mut writer = encoder
            .write_header()
            .map_err(|e| AppError::PngEncode(e.to_string()))?;
        writer
            .write_image_data(&image.to_interleaved())
            .map_err(|e| AppError::PngEncode(e.to_string()))?;
    }
    Ok(buf.into_inner())
}

pub fn load_png(path: &Path) -> Result<ImageBuffer, AppError> {
    let bytes = std::fs::read(path)?;
    let image = decode_png(&bytes)?;
    tracing::debug!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        channels = image.channels(),
        "Loaded image"
    );
    Ok(image)
}

pub fn save_png(path: &Path, image: &ImageBuffer) -> Result<(), AppError> {
    let bytes = encode_png(image)?;
    std::fs::write(path, &bytes)?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "Wrote image");
    Ok(())
}

/// Load a mask image; any non-zero sample marks a pixel to reconstruct.
pub fn load_mask(path: &Path, width: usize, height: usize) -> Result<InpaintMask, AppError> {
    let image = load_png(path)?;
    if (image.width(), image.height()) != (width, height) {
        return Err(AppError::SizeMismatch {
            what: "mask",
            got: format!("{}x{}", image.width(), image.height()),
            expected: format!("{}x{}", width, height),
        });
    }
    Ok(InpaintMask::from_image(&image))
}
