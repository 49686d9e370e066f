//! Restorer builder, the ergonomic entry point of the crate.
//!
//! [`Restorer`] bundles algorithm parameters, run settings and inpainting
//! options behind a fluent builder and drives a [`RunController`].

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::EngineError;
use crate::image::resize::{self, ResizeInit};
use crate::image::{ImageBuffer, InpaintInit, InpaintMask};
use crate::kernel::{DiffusionParams, Parameters};
use crate::run::{NoProgress, ProgressSink, RunConfig, RunController, RunResult};

/// High-level restoration builder.
///
/// # Design
///
/// - Configuration methods consume and return `self`
/// - [`restore()`](Self::restore) and [`inpaint()`](Self::inpaint) take
///   `&self`, so one builder can process many images
/// - Validation happens when a run starts, not while building
///
/// # Example
///
/// ```
/// use greyc_engine::{ImageBuffer, Restorer, RunResult};
///
/// let mut image = ImageBuffer::filled(40, 30, 1, 90).unwrap();
/// let result = Restorer::new().tile_size(16).workers(2).restore(&mut image).unwrap();
/// assert_eq!(result, RunResult::Completed);
/// ```
#[derive(Debug, Clone)]
pub struct Restorer {
    params: Parameters,
    config: RunConfig,
    init: InpaintInit,
    resize_init: ResizeInit,
    seed: u64,
}

impl Default for Restorer {
    fn default() -> Self {
        Self::new()
    }
}

impl Restorer {
    /// Diffusion denoising with the default parameters.
    pub fn new() -> Self {
        Self::with_params(DiffusionParams::default())
    }

    /// Diffusion tuned for filling masked regions.
    pub fn inpainting() -> Self {
        Self::with_params(DiffusionParams::inpainting())
    }

    /// Diffusion tuned for enlarging, three iterations.
    pub fn resizing() -> Self {
        Self::with_params(DiffusionParams::resizing()).iterations(3)
    }

    pub fn with_params(params: impl Into<Parameters>) -> Self {
        Self {
            params: params.into(),
            config: RunConfig::default(),
            init: InpaintInit::default(),
            resize_init: ResizeInit::default(),
            seed: 0,
        }
    }

    #[inline]
    pub fn params(mut self, params: impl Into<Parameters>) -> Self {
        self.params = params.into();
        self
    }

    /// Replace every run setting at once.
    #[inline]
    pub fn config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    #[inline]
    pub fn tile_size(mut self, size: usize) -> Self {
        self.config = self.config.tile_size(size);
        self
    }

    #[inline]
    pub fn tile_border(mut self, border: usize) -> Self {
        self.config = self.config.tile_border(border);
        self
    }

    #[inline]
    pub fn workers(mut self, workers: usize) -> Self {
        self.config = self.config.workers(workers);
        self
    }

    #[inline]
    pub fn iterations(mut self, iterations: usize) -> Self {
        self.config = self.config.iterations(iterations);
        self
    }

    /// Pre-fill strategy for [`inpaint()`](Self::inpaint). Default: smart.
    #[inline]
    pub fn inpaint_init(mut self, init: InpaintInit) -> Self {
        self.init = init;
        self
    }

    /// First estimate for [`resize()`](Self::resize). Default: linear.
    #[inline]
    pub fn resize_init(mut self, init: ResizeInit) -> Self {
        self.resize_init = init;
        self
    }

    /// Seed for the noise pre-fill, so runs are reproducible.
    #[inline]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn run_config(&self) -> &RunConfig {
        &self.config
    }

    /// A controller for these settings, for callers that need a
    /// [`StopHandle`](crate::StopHandle) while the run is in flight.
    pub fn controller(&self) -> Result<RunController, EngineError> {
        RunController::new(self.config.clone())
    }

    /// Regularize the whole image in place.
    pub fn restore(&self, image: &mut ImageBuffer) -> Result<RunResult, EngineError> {
        self.restore_with_progress(image, NoProgress)
    }

    pub fn restore_with_progress<S: ProgressSink>(
        &self,
        image: &mut ImageBuffer,
        sink: S,
    ) -> Result<RunResult, EngineError> {
        self.controller()?.run(image, &self.params, None, sink)
    }

    /// Reconstruct the masked region of `image`; other pixels are kept.
    pub fn inpaint<S: ProgressSink>(
        &self,
        image: &mut ImageBuffer,
        mask: &InpaintMask,
        sink: S,
    ) -> Result<RunResult, EngineError> {
        let controller = self.controller()?;
        self.params.validate()?;
        mask.prefill(image, self.init, &mut StdRng::seed_from_u64(self.seed))?;
        controller.run(image, &self.params, Some(mask), sink)
    }

    /// Enlarge `image` to `width × height` and let the diffusion fill the
    /// gaps. With `keep_anchors` the original samples come out unchanged.
    pub fn resize<S: ProgressSink>(
        &self,
        image: &ImageBuffer,
        width: usize,
        height: usize,
        keep_anchors: bool,
        sink: S,
    ) -> Result<(ImageBuffer, RunResult), EngineError> {
        let controller = self.controller()?;
        let mut enlarged = resize::upscale(image, width, height, self.resize_init)?;
        let mask = resize::anchor_mask(
            (image.width(), image.height()),
            (width, height),
            keep_anchors,
        )?;
        let result = controller.run(&mut enlarged, &self.params, Some(&mask), sink)?;
        Ok((enlarged, result))
    }
}
