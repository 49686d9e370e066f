//! Tensor-directed diffusion by line integral convolution.
//!
//! For each angle of a fan `θ = θ0, θ0 + da, ... < 360°`, the diffusion tensor
//! is applied to the unit vector of direction `θ`, giving a vector field `w`.
//! Every writable pixel is then averaged along the streamline of `w` that
//! starts at it, up to a curve length of `gauss_prec · sqrt(2 · amplitude)`.
//! The fan average of those streamline means is the new pixel value.

use super::field::Field;
use super::tensor::{self, TensorField};
use super::{DiffusionParams, Interpolation, KernelContext, KernelError, TileStatus};
use crate::tile::TileBuffer;

/// Streamline speeds below this are treated as a stagnation point.
const MIN_SPEED: f32 = 1e-6;

pub(super) fn regularize(
    tile: &mut TileBuffer,
    params: &DiffusionParams,
    ctx: &KernelContext<'_>,
) -> Result<TileStatus, KernelError> {
    if params.amplitude <= 0.0 {
        return Ok(TileStatus::Done);
    }
    let (width, height, channels) = {
        let pixels = tile.pixels();
        (pixels.width(), pixels.height(), pixels.channels())
    };
    let source = (0..channels)
        .map(|c| Field::from_u8(tile.pixels().plane(c), width, height))
        .collect::<Result<Vec<_>, _>>()?;

    let structure = tensor::structure_tensor(&source, params.alpha, params.sigma, params.gfact)?;
    let diffusion = tensor::diffusion_tensor(&structure, params.sharpness, params.anisotropy)?;
    drop(structure);
    if ctx.should_stop() {
        return Ok(TileStatus::Cancelled);
    }

    let fan = angles(params.da);
    let tracer = Tracer::new(params, &source);
    let mut sums = (0..channels)
        .map(|_| Field::zeros(width, height))
        .collect::<Result<Vec<_>, _>>()?;
    let mut weights = Field::zeros(width, height)?;
    let mut wx = Field::zeros(width, height)?;
    let mut wy = Field::zeros(width, height)?;
    let mut samples = vec![0.0f32; channels];

    for (step, theta) in fan.iter().enumerate() {
        direct(&diffusion, theta.to_radians(), &mut wx, &mut wy);
        for y in 0..height {
            if ctx.should_stop() {
                return Ok(TileStatus::Cancelled);
            }
            for x in 0..width {
                if !tile.is_writable(x, y) {
                    continue;
                }
                let weight = tracer.trace(&wx, &wy, x, y, &mut samples);
                *weights.at_mut(x, y) += weight;
                for (sum, sample) in sums.iter_mut().zip(&samples) {
                    *sum.at_mut(x, y) += sample;
                }
            }
        }
        ctx.report(100.0 * (step + 1) as f32 / fan.len() as f32);
        if ctx.should_stop() {
            return Ok(TileStatus::Cancelled);
        }
    }

    let writable: Vec<(usize, usize)> = (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .filter(|&(x, y)| tile.is_writable(x, y))
        .collect();
    let pixels = tile.pixels_mut();
    for (channel, sum) in sums.iter().enumerate() {
        for &(x, y) in &writable {
            let value = sum.at(x, y) / weights.at(x, y);
            if !value.is_finite() {
                return Err(KernelError::NonFinite { x, y, channel });
            }
            pixels.set(x, y, channel, value.round().clamp(0.0, 255.0) as u8);
        }
    }
    Ok(TileStatus::Done)
}

/// Angles of the integration fan, in degrees, centred in `[0, 360)`.
///
/// Built by index so the count is exactly `floor(360 / da)` whatever the
/// rounding of repeated `f32` additions would do.
fn angles(da: f32) -> Vec<f32> {
    let count = (360.0 / da).floor() as usize;
    let start = (360.0 % da) / 2.0;
    (0..count).map(|i| start + i as f32 * da).collect()
}

/// Fill `(wx, wy)` with the tensor applied to direction `theta`.
fn direct(tensor: &TensorField, theta: f32, wx: &mut Field, wy: &mut Field) {
    let (sin, cos) = theta.sin_cos();
    for y in 0..wx.height {
        for x in 0..wx.width {
            let (u, v) = tensor.apply_at(x, y, cos, sin);
            *wx.at_mut(x, y) = u;
            *wy.at_mut(x, y) = v;
        }
    }
}

struct Tracer<'a> {
    source: &'a [Field],
    interpolation: Interpolation,
    dl: f32,
    /// Integration steps covering the curve length.
    steps: usize,
    /// `2σ²` of the Gaussian weight along the curve; `None` for box weights.
    gauss_denom: Option<f32>,
}

impl<'a> Tracer<'a> {
    fn new(params: &DiffusionParams, source: &'a [Field]) -> Self {
        let sigma = (2.0 * params.amplitude).sqrt();
        Self {
            source,
            interpolation: params.interpolation,
            dl: params.dl,
            steps: (params.gauss_prec * sigma / params.dl).ceil() as usize,
            gauss_denom: (!params.fast_approx).then(|| 2.0 * sigma * sigma),
        }
    }

    #[inline]
    fn sample(&self, field: &Field, x: f32, y: f32) -> f32 {
        match self.interpolation {
            Interpolation::NearestNeighbor => field.nearest(x, y),
            Interpolation::Linear | Interpolation::RungeKutta => field.linear(x, y),
        }
    }

    #[inline]
    fn weight(&self, l: f32) -> f32 {
        match self.gauss_denom {
            Some(denom) => (-l * l / denom).exp(),
            None => 1.0,
        }
    }

    /// Weighted sums of every channel along the streamline from `(x, y)`.
    ///
    /// Writes the per-channel sums into `acc` and returns the total weight.
    fn trace(&self, wx: &Field, wy: &Field, x: usize, y: usize, acc: &mut [f32]) -> f32 {
        for (a, channel) in acc.iter_mut().zip(self.source) {
            *a = channel.at(x, y);
        }
        let mut total = self.weight(0.0);

        let (max_x, max_y) = ((wx.width - 1) as f32, (wx.height - 1) as f32);
        let (mut px, mut py) = (x as f32, y as f32);
        let (mut pu, mut pv) = (wx.at(x, y), wy.at(x, y));
        for step in 1..=self.steps {
            let (mut u, mut v) = orient(self.sample(wx, px, py), self.sample(wy, px, py), pu, pv);
            if self.interpolation == Interpolation::RungeKutta {
                let (mx, my) = (px + 0.5 * self.dl * u, py + 0.5 * self.dl * v);
                (u, v) = orient(wx.linear(mx, my), wy.linear(mx, my), u, v);
            }
            if u.abs() + v.abs() < MIN_SPEED {
                break;
            }
            px += self.dl * u;
            py += self.dl * v;
            if px < 0.0 || py < 0.0 || px > max_x || py > max_y {
                break;
            }
            let w = self.weight(step as f32 * self.dl);
            for (a, channel) in acc.iter_mut().zip(self.source) {
                *a += w * self.sample(channel, px, py);
            }
            total += w;
            pu = u;
            pv = v;
        }
        total
    }
}

/// Flip `(u, v)` so it does not turn back against `(pu, pv)`.
#[inline]
fn orient(u: f32, v: f32, pu: f32, pv: f32) -> (f32, f32) {
    if u * pu + v * pv < 0.0 {
        (-u, -v)
    } else {
        (u, v)
    }
}
