//! Floating-point scalar fields over a tile.

use super::KernelError;

/// A `width × height` row-major plane of `f32` samples.
#[derive(Debug, Clone)]
pub(crate) struct Field {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl Field {
    /// Zero-filled field; allocation failure is reported instead of aborting.
    pub fn zeros(width: usize, height: usize) -> Result<Self, KernelError> {
        let len = width * height;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| KernelError::Allocation(len))?;
        data.resize(len, 0.0);
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn from_u8(plane: &[u8], width: usize, height: usize) -> Result<Self, KernelError> {
        let mut field = Self::zeros(width, height)?;
        for (dst, &src) in field.data.iter_mut().zip(plane) {
            *dst = f32::from(src);
        }
        Ok(field)
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn at_mut(&mut self, x: usize, y: usize) -> &mut f32 {
        &mut self.data[y * self.width + x]
    }

    /// Sample with coordinates clamped to the field.
    #[inline]
    pub fn clamped(&self, x: isize, y: isize) -> f32 {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        self.at(x, y)
    }

    #[inline]
    pub fn nearest(&self, x: f32, y: f32) -> f32 {
        self.clamped(x.round() as isize, y.round() as isize)
    }

    /// Bilinear sample; positions outside the field use the edge value.
    pub fn linear(&self, x: f32, y: f32) -> f32 {
        let x = x.clamp(0.0, (self.width - 1) as f32);
        let y = y.clamp(0.0, (self.height - 1) as f32);
        let (x0, y0) = (x.floor() as usize, y.floor() as usize);
        let (x1, y1) = ((x0 + 1).min(self.width - 1), (y0 + 1).min(self.height - 1));
        let (fx, fy) = (x - x0 as f32, y - y0 as f32);
        let top = self.at(x0, y0) + (self.at(x1, y0) - self.at(x0, y0)) * fx;
        let bottom = self.at(x0, y1) + (self.at(x1, y1) - self.at(x0, y1)) * fx;
        top + (bottom - top) * fy
    }

    /// Separable Gaussian blur with clamped edges. `sigma <= 0` copies.
    pub fn blurred(&self, sigma: f32) -> Result<Field, KernelError> {
        if sigma <= 0.0 {
            return Ok(self.clone());
        }
        let taps = gaussian_taps(sigma);
        let radius = (taps.len() / 2) as isize;

        let mut rows = Field::zeros(self.width, self.height)?;
        for y in 0..self.height {
            for x in 0..self.width {
                let mut acc = 0.0;
                for (k, w) in taps.iter().enumerate() {
                    acc += w * self.clamped(x as isize + k as isize - radius, y as isize);
                }
                *rows.at_mut(x, y) = acc;
            }
        }

        let mut out = Field::zeros(self.width, self.height)?;
        for y in 0..self.height {
            for x in 0..self.width {
                let mut acc = 0.0;
                for (k, w) in taps.iter().enumerate() {
                    acc += w * rows.clamped(x as isize, y as isize + k as isize - radius);
                }
                *out.at_mut(x, y) = acc;
            }
        }
        Ok(out)
    }
}

/// Normalized Gaussian taps covering three standard deviations.
fn gaussian_taps(sigma: f32) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil().max(1.0) as isize;
    let denom = 2.0 * sigma * sigma;
    let mut taps: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / denom).exp())
        .collect();
    let sum: f32 = taps.iter().sum();
    taps.iter_mut().for_each(|t| *t /= sum);
    taps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taps_are_normalized_and_symmetric() {
        let taps = gaussian_taps(1.1);
        assert_eq!(taps.len(), 9);
        let sum: f32 = taps.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!((taps[0] - taps[8]).abs() < 1e-7);
    }

    #[test]
    fn test_blur_keeps_constant_field() {
        let field = Field::from_u8(&[50; 30], 6, 5).unwrap();
        let blurred = field.blurred(2.0).unwrap();
        assert!(blurred.data.iter().all(|v| (v - 50.0).abs() < 1e-3));
    }

    #[test]
    fn test_linear_sampling() {
        let field = Field::from_u8(&[0, 100, 0, 100], 2, 2).unwrap();
        assert!((field.linear(0.5, 0.0) - 50.0).abs() < 1e-5);
        assert_eq!(field.linear(-3.0, 0.0), 0.0);
        assert_eq!(field.nearest(0.6, 0.2), 100.0);
    }
}
