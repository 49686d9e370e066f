//! Planar 8-bit image storage.

use std::ops::Range;

use crate::api::EngineError;
use crate::tile::Rect;

/// A contiguous planar image of `width × height × channels` 8-bit samples.
///
/// Samples are stored channel plane after channel plane, each plane in
/// row-major order: sample `(x, y, c)` lives at
/// `c * width * height + y * width + x`. Image files and host applications
/// usually hold interleaved pixels; use [`from_interleaved()`](Self::from_interleaved)
/// and [`to_interleaved()`](Self::to_interleaved) at that boundary.
///
/// # Example
///
/// ```
/// use greyc_engine::ImageBuffer;
///
/// let rgb = [10, 20, 30, 40, 50, 60];
/// let image = ImageBuffer::from_interleaved(2, 1, 3, &rgb).unwrap();
///
/// assert_eq!(image.get(1, 0, 0), 40);
/// assert_eq!(image.plane(2), &[30, 60]);
/// assert_eq!(image.to_interleaved(), rgb);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<u8>,
}

impl ImageBuffer {
    /// Create a zero-filled image.
    pub fn new(width: usize, height: usize, channels: usize) -> Result<Self, EngineError> {
        Self::filled(width, height, channels, 0)
    }

    /// Create an image with every sample set to `value`.
    pub fn filled(
        width: usize,
        height: usize,
        channels: usize,
        value: u8,
    ) -> Result<Self, EngineError> {
        let len = checked_len(width, height, channels)?;
        Ok(Self {
            width,
            height,
            channels,
            data: vec![value; len],
        })
    }

    /// Wrap planar sample data.
    ///
    /// Fails if `data.len()` does not match `width * height * channels`.
    pub fn from_planar(
        width: usize,
        height: usize,
        channels: usize,
        data: Vec<u8>,
    ) -> Result<Self, EngineError> {
        let len = checked_len(width, height, channels)?;
        if data.len() != len {
            return Err(EngineError::invalid(format!(
                "planar data has {} samples, expected {}x{}x{} = {}",
                data.len(),
                width,
                height,
                channels,
                len
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Convert interleaved pixels (`[c0, c1, .., c0, c1, ..]`) into a planar image.
    pub fn from_interleaved(
        width: usize,
        height: usize,
        channels: usize,
        pixels: &[u8],
    ) -> Result<Self, EngineError> {
        let len = checked_len(width, height, channels)?;
        if pixels.len() != len {
            return Err(EngineError::invalid(format!(
                "interleaved data has {} samples, expected {}",
                pixels.len(),
                len
            )));
        }
        let plane = width * height;
        let mut data = vec![0u8; len];
        for (i, pixel) in pixels.chunks_exact(channels).enumerate() {
            for (c, &v) in pixel.iter().enumerate() {
                data[c * plane + i] = v;
            }
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Interleave the channel planes back into pixel order.
    pub fn to_interleaved(&self) -> Vec<u8> {
        let plane = self.plane_len();
        let mut out = vec![0u8; self.data.len()];
        for c in 0..self.channels {
            for (i, &v) in self.plane(c).iter().enumerate() {
                out[i * self.channels + c] = v;
            }
        }
        out
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
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of samples in one channel plane.
    #[inline]
    pub fn plane_len(&self) -> usize {
        self.width * self.height
    }

    /// Offset of sample `(x, y, c)` in the planar data.
    #[inline]
    pub fn index(&self, x: usize, y: usize, c: usize) -> usize {
        debug_assert!(x < self.width && y < self.height && c < self.channels);
        c * self.plane_len() + y * self.width + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, c: usize) -> u8 {
        self.data[self.index(x, y, c)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, c: usize, value: u8) {
        let i = self.index(x, y, c);
        self.data[i] = value;
    }

    /// One channel plane in row-major order.
    pub fn plane(&self, c: usize) -> &[u8] {
        let len = self.plane_len();
        &self.data[c * len..(c + 1) * len]
    }

    pub fn plane_mut(&mut self, c: usize) -> &mut [u8] {
        let len = self.plane_len();
        &mut self.data[c * len..(c + 1) * len]
    }

    /// All planar samples.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Bounding rectangle of the whole image.
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// Copy a sub-rectangle into a new image.
    ///
    /// The allocation is fallible: a failed reservation is reported as an
    /// error instead of aborting the process, so a worker can surface it as a
    /// kernel failure.
    pub fn crop(&self, rect: Rect) -> Result<ImageBuffer, EngineError> {
        if rect.is_empty() || !self.bounds().contains_rect(&rect) {
            return Err(EngineError::invalid(format!(
                "crop {:?} outside image {}x{}",
                rect, self.width, self.height
            )));
        }
        let len = rect.width * rect.height * self.channels;
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|e| {
            EngineError::invalid(format!("cannot allocate {} samples for crop: {}", len, e))
        })?;
        for c in 0..self.channels {
            let plane = self.plane(c);
            for y in rect.y..rect.bottom() {
                let start = y * self.width + rect.x;
                data.extend_from_slice(&plane[start..start + rect.width]);
            }
        }
        Ok(ImageBuffer {
            width: rect.width,
            height: rect.height,
            channels: self.channels,
            data,
        })
    }

    /// Copy the channels in `range` into a new image.
    pub fn select_channels(&self, range: Range<usize>) -> Result<ImageBuffer, EngineError> {
        if range.is_empty() || range.end > self.channels {
            return Err(EngineError::invalid(format!(
                "channel range {}-{} outside 0-{}",
                range.start,
                range.end.saturating_sub(1),
                self.channels - 1
            )));
        }
        let len = self.plane_len();
        let data = self.data[range.start * len..range.end * len].to_vec();
        ImageBuffer::from_planar(self.width, self.height, range.len(), data)
    }

    /// Overwrite channels `start..start + source.channels()` with `source`.
    pub fn replace_channels(&mut self, start: usize, source: &ImageBuffer) -> Result<(), EngineError> {
        if (source.width, source.height) != (self.width, self.height)
            || start + source.channels > self.channels
        {
            return Err(EngineError::invalid(format!(
                "cannot place {}x{}x{} at channel {} of {}x{}x{}",
                source.width,
                source.height,
                source.channels,
                start,
                self.width,
                self.height,
                self.channels
            )));
        }
        let len = self.plane_len();
        self.data[start * len..(start + source.channels) * len].copy_from_slice(&source.data);
        Ok(())
    }

    /// Whether two images share width, height and channel count.
    pub fn same_shape(&self, other: &ImageBuffer) -> bool {
        self.width == other.width && self.height == other.height && self.channels == other.channels
    }
}

fn checked_len(width: usize, height: usize, channels: usize) -> Result<usize, EngineError> {
    if width == 0 || height == 0 || channels == 0 {
        return Err(EngineError::invalid(format!(
            "image dimensions must be positive, got {}x{}x{}",
            width, height, channels
        )));
    }
    width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(channels))
        .ok_or_else(|| {
            EngineError::invalid(format!(
                "image {}x{}x{} overflows the address space",
                width, height, channels
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_dimensions() {
        assert!(ImageBuffer::new(0, 4, 1).is_err());
        assert!(ImageBuffer::new(4, 0, 1).is_err());
        assert!(ImageBuffer::new(4, 4, 0).is_err());
    }

    #[test]
    fn test_from_planar_length_mismatch() {
        let err = ImageBuffer::from_planar(2, 2, 1, vec![0; 3]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn test_planar_layout() {
        let mut image = ImageBuffer::new(3, 2, 2).unwrap();
        image.set(2, 1, 1, 99);
        assert_eq!(image.index(2, 1, 1), 6 + 5);
        assert_eq!(image.as_slice()[11], 99);
        assert_eq!(image.plane(1)[5], 99);
    }

    #[test]
    fn test_interleaved_round_trip() {
        let pixels: Vec<u8> = (0..24).collect();
        let image = ImageBuffer::from_interleaved(4, 2, 3, &pixels).unwrap();
        assert_eq!(image.get(0, 0, 1), 1);
        assert_eq!(image.get(1, 0, 0), 3);
        assert_eq!(image.get(0, 1, 2), 14);
        assert_eq!(image.to_interleaved(), pixels);
    }

    #[test]
    fn test_crop_copies_every_channel() {
        let pixels: Vec<u8> = (0..32).collect();
        let image = ImageBuffer::from_planar(4, 4, 2, pixels).unwrap();
        let crop = image.crop(Rect::new(1, 2, 2, 2)).unwrap();
        assert_eq!(crop.plane(0), &[9, 10, 13, 14]);
        assert_eq!(crop.plane(1), &[25, 26, 29, 30]);
    }

    #[test]
    fn test_crop_outside_bounds_fails() {
        let image = ImageBuffer::new(4, 4, 1).unwrap();
        assert!(image.crop(Rect::new(3, 3, 2, 2)).is_err());
        assert!(image.crop(Rect::new(0, 0, 0, 2)).is_err());
    }

    #[test]
    fn test_channel_selection_and_replacement() {
        let pixels: Vec<u8> = (0..12).collect();
        let mut image = ImageBuffer::from_planar(2, 2, 3, pixels).unwrap();
        let mut chroma = image.select_channels(1..3).unwrap();
        assert_eq!(chroma.channels(), 2);
        assert_eq!(chroma.plane(0), &[4, 5, 6, 7]);

        chroma.as_mut_slice().fill(0);
        image.replace_channels(1, &chroma).unwrap();
        assert_eq!(image.plane(0), &[0, 1, 2, 3]);
        assert!(image.as_slice()[4..].iter().all(|&v| v == 0));
    }

    #[test]
    fn test_channel_range_checked() {
        let mut image = ImageBuffer::new(2, 2, 3).unwrap();
        assert!(image.select_channels(2..4).is_err());
        assert!(image.select_channels(1..1).is_err());
        let two = ImageBuffer::new(2, 2, 2).unwrap();
        assert!(image.replace_channels(2, &two).is_err());
        let wide = ImageBuffer::new(3, 2, 1).unwrap();
        assert!(image.replace_channels(0, &wide).is_err());
    }
}
