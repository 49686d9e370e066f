//! Algorithm parameters.
//!
//! [`Parameters`] selects one of the two regularization variants. Both
//! parameter structs follow the builder style: start from the defaults and
//! override what you need.

use crate::api::EngineError;

/// Sampling scheme used when tracing streamlines through the tensor field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Round positions to the nearest pixel.
    #[default]
    NearestNeighbor,
    /// Bilinear sampling of both the image and the vector field.
    Linear,
    /// Second-order Runge-Kutta (midpoint) streamline steps with bilinear sampling.
    RungeKutta,
}

impl Interpolation {
    /// Map the numeric `-interp` codes of the GREYCstoration command line (0, 1, 2).
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Interpolation::NearestNeighbor),
            1 => Some(Interpolation::Linear),
            2 => Some(Interpolation::RungeKutta),
            _ => None,
        }
    }
}

/// Accepted spatial integration steps.
const DL_RANGE: std::ops::RangeInclusive<f32> = 0.1..=1.0;
/// Accepted angular integration steps, in degrees.
const DA_RANGE: std::ops::RangeInclusive<f32> = 1.0..=90.0;

/// Parameters of the tensor-directed diffusion variant.
///
/// # Defaults
///
/// Match the GIMP plug-in: amplitude 60, sharpness 0.7, anisotropy 0.3,
/// alpha 0.6, sigma 1.1, dl 0.8, da 30°, gauss_prec 2, nearest-neighbour
/// interpolation, fast approximation on.
///
/// # Example
///
/// ```
/// use greyc_engine::{DiffusionParams, Interpolation};
///
/// let params = DiffusionParams::new()
///     .amplitude(40.0)
///     .interpolation(Interpolation::RungeKutta);
/// assert!(params.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DiffusionParams {
    /// Regularization strength for one iteration.
    pub amplitude: f32,
    /// Contour preservation.
    pub sharpness: f32,
    /// Smoothing anisotropy, in `[0, 1]`.
    pub anisotropy: f32,
    /// Noise scale: pre-blur applied before computing the structure tensor.
    pub alpha: f32,
    /// Geometry regularity: blur applied to the structure tensor.
    pub sigma: f32,
    /// Intensity factor applied to gradients (1 for 8-bit data).
    pub gfact: f32,
    /// Spatial integration step, in `[0.1, 1]`.
    pub dl: f32,
    /// Angular integration step in degrees, in `[1, 90]`.
    pub da: f32,
    /// Precision of the Gaussian integration kernel.
    pub gauss_prec: f32,
    pub interpolation: Interpolation,
    /// Use box weights along streamlines instead of Gaussian weights.
    pub fast_approx: bool,
}

impl Default for DiffusionParams {
    fn default() -> Self {
        Self {
            amplitude: 60.0,
            sharpness: 0.7,
            anisotropy: 0.3,
            alpha: 0.6,
            sigma: 1.1,
            gfact: 1.0,
            dl: 0.8,
            da: 30.0,
            gauss_prec: 2.0,
            interpolation: Interpolation::NearestNeighbor,
            fast_approx: true,
        }
    }
}

impl DiffusionParams {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset tuned for filling masked holes: strong, fully anisotropic
    /// smoothing along the isophotes.
    pub fn inpainting() -> Self {
        Self {
            amplitude: 20.0,
            sharpness: 0.3,
            anisotropy: 1.0,
            alpha: 0.8,
            sigma: 2.0,
            ..Self::default()
        }
    }

    /// Preset for filling the gaps of an upscaled image around its
    /// original samples.
    pub fn resizing() -> Self {
        Self {
            amplitude: 20.0,
            sharpness: 0.2,
            anisotropy: 0.9,
            alpha: 0.1,
            sigma: 1.5,
            ..Self::default()
        }
    }

    #[inline]
    pub fn amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    #[inline]
    pub fn sharpness(mut self, sharpness: f32) -> Self {
        self.sharpness = sharpness;
        self
    }

    #[inline]
    pub fn anisotropy(mut self, anisotropy: f32) -> Self {
        self.anisotropy = anisotropy;
        self
    }

    #[inline]
    pub fn alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    #[inline]
    pub fn sigma(mut self, sigma: f32) -> Self {
        self.sigma = sigma;
        self
    }

    #[inline]
    pub fn gfact(mut self, gfact: f32) -> Self {
        self.gfact = gfact;
        self
    }

    #[inline]
    pub fn dl(mut self, dl: f32) -> Self {
        self.dl = dl;
        self
    }

    #[inline]
    pub fn da(mut self, da: f32) -> Self {
        self.da = da;
        self
    }

    #[inline]
    pub fn gauss_prec(mut self, gauss_prec: f32) -> Self {
        self.gauss_prec = gauss_prec;
        self
    }

    #[inline]
    pub fn interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    #[inline]
    pub fn fast_approx(mut self, enabled: bool) -> Self {
        self.fast_approx = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let finite = [
            self.amplitude,
            self.sharpness,
            self.anisotropy,
            self.alpha,
            self.sigma,
            self.gfact,
            self.dl,
            self.da,
            self.gauss_prec,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite {
            return Err(EngineError::invalid("diffusion parameters must be finite"));
        }
        if self.amplitude < 0.0 {
            return Err(EngineError::invalid(format!(
                "amplitude must be >= 0, got {}",
                self.amplitude
            )));
        }
        if self.sharpness < 0.0 {
            return Err(EngineError::invalid(format!(
                "sharpness must be >= 0, got {}",
                self.sharpness
            )));
        }
        if !(0.0..=1.0).contains(&self.anisotropy) {
            return Err(EngineError::invalid(format!(
                "anisotropy must be in [0, 1], got {}",
                self.anisotropy
            )));
        }
        if self.alpha < 0.0 || self.sigma < 0.0 {
            return Err(EngineError::invalid("alpha and sigma must be >= 0"));
        }
        if self.gfact <= 0.0 {
            return Err(EngineError::invalid("gfact must be > 0"));
        }
        if !DL_RANGE.contains(&self.dl) {
            return Err(EngineError::invalid(format!(
                "dl must be in [0.1, 1], got {}",
                self.dl
            )));
        }
        if !DA_RANGE.contains(&self.da) {
            return Err(EngineError::invalid(format!(
                "da must be in [1, 90], got {}",
                self.da
            )));
        }
        if self.gauss_prec <= 0.0 {
            return Err(EngineError::invalid("gauss_prec must be > 0"));
        }
        Ok(())
    }
}

/// Parameters of the patch-based (non-local means) variant.
///
/// # Defaults
///
/// patch size 4, sigma_p 10, sigma_s 15, lookup size 7, fast approximation on.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchParams {
    /// Side length of the compared patches.
    pub patch_size: usize,
    /// Patch similarity bandwidth.
    pub sigma_p: f32,
    /// Spatial bandwidth.
    pub sigma_s: f32,
    /// Side length of the search window.
    pub lookup_size: usize,
    /// Skip candidates whose patch distance makes their weight negligible.
    pub fast_approx: bool,
}

impl Default for PatchParams {
    fn default() -> Self {
        Self {
            patch_size: 4,
            sigma_p: 10.0,
            sigma_s: 15.0,
            lookup_size: 7,
            fast_approx: true,
        }
    }
}

impl PatchParams {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn patch_size(mut self, size: usize) -> Self {
        self.patch_size = size;
        self
    }

    #[inline]
    pub fn sigma_p(mut self, sigma: f32) -> Self {
        self.sigma_p = sigma;
        self
    }

    #[inline]
    pub fn sigma_s(mut self, sigma: f32) -> Self {
        self.sigma_s = sigma;
        self
    }

    #[inline]
    pub fn lookup_size(mut self, size: usize) -> Self {
        self.lookup_size = size;
        self
    }

    #[inline]
    pub fn fast_approx(mut self, enabled: bool) -> Self {
        self.fast_approx = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.patch_size == 0 || self.lookup_size == 0 {
            return Err(EngineError::invalid(
                "patch_size and lookup_size must be > 0",
            ));
        }
        if !(self.sigma_p.is_finite() && self.sigma_p > 0.0)
            || !(self.sigma_s.is_finite() && self.sigma_s > 0.0)
        {
            return Err(EngineError::invalid("sigma_p and sigma_s must be > 0"));
        }
        Ok(())
    }
}

/// Algorithm selection for a run. Immutable for the run's duration.
#[derive(Debug, Clone, PartialEq)]
pub enum Parameters {
    /// Tensor-directed anisotropic diffusion (restoration and inpainting).
    Diffusion(DiffusionParams),
    /// Non-local patch averaging (cleaning).
    PatchBased(PatchParams),
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters::Diffusion(DiffusionParams::default())
    }
}

impl Parameters {
    pub fn validate(&self) -> Result<(), EngineError> {
        match self {
            Parameters::Diffusion(p) => p.validate(),
            Parameters::PatchBased(p) => p.validate(),
        }
    }

    /// Short name for logs.
    pub fn method_name(&self) -> &'static str {
        match self {
            Parameters::Diffusion(_) => "diffusion",
            Parameters::PatchBased(_) => "patch",
        }
    }
}

impl From<DiffusionParams> for Parameters {
    fn from(p: DiffusionParams) -> Self {
        Parameters::Diffusion(p)
    }
}

impl From<PatchParams> for Parameters {
    fn from(p: PatchParams) -> Self {
        Parameters::PatchBased(p)
    }
}
