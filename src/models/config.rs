use std::path::Path;
use std::time::Duration;

use clap::ValueEnum;
use greyc_engine::{
    DiffusionParams, InpaintInit, Interpolation, PatchParams, ResizeInit, RunConfig,
};
use serde::{Deserialize, Serialize};

use super::ChannelRange;
use crate::error::AppError;

/// Allowed tile sizes; 0 disables tiling.
pub const TILE_SIZES: [usize; 5] = [0, 256, 512, 1024, 2048];

/// Application configuration loaded from a YAML file
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub tiling: TilingConfig,

    #[serde(default)]
    pub run: RunSection,

    /// Parameters of `restore`
    #[serde(default)]
    pub diffusion: DiffusionConfig,

    /// Parameters of `clean`
    #[serde(default)]
    pub patch: PatchConfig,

    #[serde(default)]
    pub inpaint: InpaintConfig,

    #[serde(default)]
    pub resize: ResizeConfig,

    #[serde(default)]
    pub color: ColorConfig,
}

/// Which command is being served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Restore,
    Clean,
    Inpaint,
    Resize,
}

impl Mode {
    /// Iterations used when neither the config file nor the command line
    /// sets them
    pub fn default_iterations(self) -> usize {
        match self {
            Mode::Restore | Mode::Clean => 1,
            Mode::Inpaint => 1000,
            Mode::Resize => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TilingConfig {
    #[serde(default = "default_tile_size")]
    pub tile_size: usize,

    #[serde(default = "default_tile_border")]
    pub tile_border: usize,

    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_tile_size() -> usize {
    256
}

fn default_tile_border() -> usize {
    4
}

fn default_workers() -> usize {
    1
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            tile_size: default_tile_size(),
            tile_border: default_tile_border(),
            workers: default_workers(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RunSection {
    /// Passes over the image; unset means the per-mode default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<usize>,

    /// Poll cadence of the controller in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Progress is logged every this many polls
    #[serde(default = "default_report_every")]
    pub report_every: u32,

    /// Stop the run after this many seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Seed for noise injection and noise pre-fill
    #[serde(default)]
    pub seed: u64,

    /// Save the image after every this many iterations; 0 disables
    #[serde(default)]
    pub save_every: usize,
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_report_every() -> u32 {
    10
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            iterations: None,
            poll_interval_ms: default_poll_interval_ms(),
            report_every: default_report_every(),
            timeout_secs: None,
            seed: 0,
            save_every: 0,
        }
    }
}

/// Streamline sampling, as named in config files and on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum InterpolationMode {
    #[default]
    Nearest,
    Linear,
    RungeKutta,
}

impl From<InterpolationMode> for Interpolation {
    fn from(mode: InterpolationMode) -> Self {
        match mode {
            InterpolationMode::Nearest => Interpolation::NearestNeighbor,
            InterpolationMode::Linear => Interpolation::Linear,
            InterpolationMode::RungeKutta => Interpolation::RungeKutta,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DiffusionConfig {
    pub amplitude: f32,
    pub sharpness: f32,
    pub anisotropy: f32,
    pub alpha: f32,
    pub sigma: f32,
    pub dl: f32,
    pub da: f32,
    pub gauss_prec: f32,
    pub interpolation: InterpolationMode,
    pub fast_approx: bool,
}

impl Default for DiffusionConfig {
    fn default() -> Self {
        Self::from_params(&DiffusionParams::default())
    }
}

impl DiffusionConfig {
    pub fn from_params(p: &DiffusionParams) -> Self {
        let interpolation = match p.interpolation {
            Interpolation::NearestNeighbor => InterpolationMode::Nearest,
            Interpolation::Linear => InterpolationMode::Linear,
            Interpolation::RungeKutta => InterpolationMode::RungeKutta,
        };
        Self {
            amplitude: p.amplitude,
            sharpness: p.sharpness,
            anisotropy: p.anisotropy,
            alpha: p.alpha,
            sigma: p.sigma,
            dl: p.dl,
            da: p.da,
            gauss_prec: p.gauss_prec,
            interpolation,
            fast_approx: p.fast_approx,
        }
    }

    pub fn to_params(&self) -> DiffusionParams {
        DiffusionParams::new()
            .amplitude(self.amplitude)
            .sharpness(self.sharpness)
            .anisotropy(self.anisotropy)
            .alpha(self.alpha)
            .sigma(self.sigma)
            .dl(self.dl)
            .da(self.da)
            .gauss_prec(self.gauss_prec)
            .interpolation(self.interpolation.into())
            .fast_approx(self.fast_approx)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PatchConfig {
    pub patch_size: usize,
    pub sigma_p: f32,
    pub sigma_s: f32,
    pub lookup_size: usize,
    pub fast_approx: bool,
}

impl Default for PatchConfig {
    fn default() -> Self {
        let p = PatchParams::default();
        Self {
            patch_size: p.patch_size,
            sigma_p: p.sigma_p,
            sigma_s: p.sigma_s,
            lookup_size: p.lookup_size,
            fast_approx: p.fast_approx,
        }
    }
}

impl PatchConfig {
    pub fn to_params(&self) -> PatchParams {
        PatchParams::new()
            .patch_size(self.patch_size)
            .sigma_p(self.sigma_p)
            .sigma_s(self.sigma_s)
            .lookup_size(self.lookup_size)
            .fast_approx(self.fast_approx)
    }
}

/// How the hole is filled before the first iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InitMode {
    Black,
    White,
    Noise,
    Unchanged,
    #[default]
    Smart,
}

impl From<InitMode> for InpaintInit {
    fn from(mode: InitMode) -> Self {
        match mode {
            InitMode::Black => InpaintInit::Black,
            InitMode::White => InpaintInit::White,
            InitMode::Noise => InpaintInit::Noise,
            InitMode::Unchanged => InpaintInit::Unchanged,
            InitMode::Smart => InpaintInit::Smart,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InpaintConfig {
    #[serde(default)]
    pub init: InitMode,

    /// Grow the mask by this many pixels before inpainting
    #[serde(default)]
    pub dilate: usize,

    /// Diffusion parameters used inside the hole
    #[serde(default = "default_inpaint_diffusion")]
    pub diffusion: DiffusionConfig,
}

fn default_inpaint_diffusion() -> DiffusionConfig {
    DiffusionConfig::from_params(&DiffusionParams::inpainting())
}

impl Default for InpaintConfig {
    fn default() -> Self {
        Self {
            init: InitMode::default(),
            dilate: 0,
            diffusion: default_inpaint_diffusion(),
        }
    }
}

/// First estimate of an enlarged image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    Block,
    #[default]
    Linear,
}

impl From<ResizeMode> for ResizeInit {
    fn from(mode: ResizeMode) -> Self {
        match mode {
            ResizeMode::Block => ResizeInit::Block,
            ResizeMode::Linear => ResizeInit::Linear,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ResizeConfig {
    #[serde(default)]
    pub init: ResizeMode,

    /// Keep the original samples unchanged in the enlarged image
    #[serde(default = "default_anchor")]
    pub anchor: bool,

    #[serde(default = "default_resize_diffusion")]
    pub diffusion: DiffusionConfig,
}

fn default_anchor() -> bool {
    true
}

fn default_resize_diffusion() -> DiffusionConfig {
    DiffusionConfig::from_params(&DiffusionParams::resizing())
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            init: ResizeMode::default(),
            anchor: default_anchor(),
            diffusion: default_resize_diffusion(),
        }
    }
}

/// Colour space the run works in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ColorBase {
    #[default]
    Rgb,
    Ycbcr,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ColorConfig {
    #[serde(default)]
    pub base: ColorBase,

    /// Only these channels are processed; unset means all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<ChannelRange>,
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load configuration if a path is given, falling back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(%e, path = %path.display(), "Failed to load config, using defaults");
                Self::default()
            }
        }
    }

    /// Check the tiling limits and every algorithm parameter
    pub fn validate(&self) -> Result<(), AppError> {
        if !TILE_SIZES.contains(&self.tiling.tile_size) {
            return Err(AppError::Config(format!(
                "tile_size must be one of {:?}, got {}",
                TILE_SIZES, self.tiling.tile_size
            )));
        }
        self.run_config(Mode::Restore).validate()?;
        self.diffusion.to_params().validate()?;
        self.patch.to_params().validate()?;
        self.inpaint.diffusion.to_params().validate()?;
        self.resize.diffusion.to_params().validate()?;
        Ok(())
    }

    /// Configured iteration count, or the default of `mode`
    pub fn iterations(&self, mode: Mode) -> usize {
        self.run.iterations.unwrap_or_else(|| mode.default_iterations())
    }

    pub fn run_config(&self, mode: Mode) -> RunConfig {
        RunConfig::new()
            .tile_size(self.tiling.tile_size)
            .tile_border(self.tiling.tile_border)
            .workers(self.tiling.workers)
            .iterations(self.iterations(mode))
            .poll_interval(Duration::from_millis(self.run.poll_interval_ms))
            .report_every(self.run.report_every)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.run.timeout_secs.map(Duration::from_secs)
    }

    pub fn to_yaml(&self) -> Result<String, AppError> {
        Ok(serde_yaml::to_string(self)?)
    }
}
