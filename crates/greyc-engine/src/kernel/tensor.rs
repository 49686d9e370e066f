//! Structure and diffusion tensor fields.

use nalgebra::{Matrix2, SymmetricEigen};

use super::field::Field;
use super::KernelError;

/// Symmetric 2×2 tensor per pixel, stored as `[[a, b], [b, c]]`.
pub(crate) struct TensorField {
    pub a: Field,
    pub b: Field,
    pub c: Field,
}

impl TensorField {
    /// Apply the tensor at `(x, y)` to the direction `(dx, dy)`.
    #[inline]
    pub fn apply_at(&self, x: usize, y: usize, dx: f32, dy: f32) -> (f32, f32) {
        let i = y * self.a.width + x;
        let (a, b, c) = (self.a.data[i], self.b.data[i], self.c.data[i]);
        (a * dx + b * dy, b * dx + c * dy)
    }
}

/// Smoothed structure tensor of a multi-channel tile.
///
/// Channels are pre-blurred by `alpha`, gradients (central differences,
/// scaled by `gfact`) are accumulated over channels, and the resulting
/// tensor components are blurred by `sigma`.
pub(crate) fn structure_tensor(
    channels: &[Field],
    alpha: f32,
    sigma: f32,
    gfact: f32,
) -> Result<TensorField, KernelError> {
    let (width, height) = (channels[0].width, channels[0].height);
    let mut a = Field::zeros(width, height)?;
    let mut b = Field::zeros(width, height)?;
    let mut c = Field::zeros(width, height)?;

    for channel in channels {
        let smooth = channel.blurred(alpha)?;
        for y in 0..height {
            for x in 0..width {
                let (xi, yi) = (x as isize, y as isize);
                let ix = gfact * 0.5 * (smooth.clamped(xi + 1, yi) - smooth.clamped(xi - 1, yi));
                let iy = gfact * 0.5 * (smooth.clamped(xi, yi + 1) - smooth.clamped(xi, yi - 1));
                *a.at_mut(x, y) += ix * ix;
                *b.at_mut(x, y) += ix * iy;
                *c.at_mut(x, y) += iy * iy;
            }
        }
    }

    Ok(TensorField {
        a: a.blurred(sigma)?,
        b: b.blurred(sigma)?,
        c: c.blurred(sigma)?,
    })
}

/// Eigen-decomposition of `[[a, b], [b, c]]`.
///
/// Returns `(lambda_max, lambda_min, (vx, vy))` where `v` is the unit
/// eigenvector of the larger eigenvalue, i.e. the local gradient direction.
/// Its sign is arbitrary. Eigenvalues are clamped at zero. A tensor that does
/// not decompose yields NaN eigenvalues, which the kernel reports as a
/// non-finite result.
pub(crate) fn eigen(a: f32, b: f32, c: f32) -> (f32, f32, (f32, f32)) {
    let Some(eig) = SymmetricEigen::try_new(Matrix2::new(a, b, b, c), f32::EPSILON, MAX_SWEEPS)
    else {
        return (f32::NAN, f32::NAN, (1.0, 0.0));
    };
    let values = eig.eigenvalues;
    let (hi, lo) = if values[0] >= values[1] { (0, 1) } else { (1, 0) };
    let v = eig.eigenvectors.column(hi);
    (values[hi].max(0.0), values[lo].max(0.0), (v[0], v[1]))
}

/// Iteration cap of the symmetric eigen solver.
const MAX_SWEEPS: usize = 64;

/// Turn a structure tensor field into a diffusion tensor field.
///
/// With `u` along the contour and `v` across it, the tensor is
/// `n1·u·uᵀ + n2·v·vᵀ` where `n = (1 + λ1 + λ2)^(-p)`,
/// `p1 = sharpness / 2` and `p2 = p1 / (1 - anisotropy)`.
pub(crate) fn diffusion_tensor(
    structure: &TensorField,
    sharpness: f32,
    anisotropy: f32,
) -> Result<TensorField, KernelError> {
    let (width, height) = (structure.a.width, structure.a.height);
    let p1 = 0.5 * sharpness;
    let p2 = p1 / (1e-7 + 1.0 - anisotropy);

    let mut a = Field::zeros(width, height)?;
    let mut b = Field::zeros(width, height)?;
    let mut c = Field::zeros(width, height)?;
    for i in 0..width * height {
        let (l1, l2, (vx, vy)) = eigen(structure.a.data[i], structure.b.data[i], structure.c.data[i]);
        let (ux, uy) = (-vy, vx);
        let s = 1.0 + l1 + l2;
        let n1 = s.powf(-p1);
        let n2 = s.powf(-p2);
        a.data[i] = n1 * ux * ux + n2 * vx * vx;
        b.data[i] = n1 * ux * uy + n2 * vx * vy;
        c.data[i] = n1 * uy * uy + n2 * vy * vy;
    }
    Ok(TensorField { a, b, c })
}
