//! Runs the engine for the command-line front end.
//!
//! [`RestorationService`] turns the application configuration into engine
//! parameters, optionally degrades the input with synthetic noise, moves it
//! into the configured colour base and channel range, runs the controller
//! with a logging (and optionally snapshotting) progress sink under an
//! optional timeout, and summarises the outcome in a serializable
//! [`RunReport`].

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use greyc_engine::image::{color, metrics, noise, resize};
use greyc_engine::{
    ImageBuffer, InpaintInit, InpaintMask, Parameters, ProgressSink, RunController, RunResult,
    StopHandle,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use super::image_io;
use crate::error::AppError;
use crate::models::{AppConfig, ColorBase, Geometry, Mode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Completed,
    Cancelled,
    Failed,
}

/// Per-invocation extras on top of the configuration.
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    /// Clean image to compute PSNR against
    pub reference: Option<ImageBuffer>,
    /// Standard deviation of Gaussian noise added before processing
    pub add_noise: Option<f32>,
    /// Amplitude of uniform noise added before processing
    pub add_uniform_noise: Option<f32>,
    /// Percentage of pixels turned black or white before processing
    pub add_salt_pepper: Option<f32>,
    /// Output path that intermediate iterations are saved next to, every
    /// `run.save_every` iterations
    pub snapshots: Option<PathBuf>,
}

/// Target of a resize job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResizeRequest {
    /// Output size; defaults to the input size when only `shrink` is given
    pub geometry: Option<Geometry>,
    /// Shrink the input to this size first and enlarge it back, reporting
    /// PSNR against the unshrunk input
    pub shrink: Option<Geometry>,
}

/// Summary of one run, printed by `--json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub mode: Mode,
    pub method: &'static str,
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub tile_size: usize,
    pub workers: usize,
    pub iterations: usize,
    pub color_base: ColorBase,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masked_pixels: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psnr_before: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psnr_after: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub snapshots: Vec<PathBuf>,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        self.outcome == Outcome::Completed
    }

    pub fn to_json(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub struct RestorationService {
    config: AppConfig,
}

impl RestorationService {
    pub fn new(config: AppConfig) -> Result<Self, AppError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Diffusion denoising of the whole image.
    pub fn restore(
        &self,
        image: &mut ImageBuffer,
        options: &JobOptions,
    ) -> Result<RunReport, AppError> {
        self.degrade(image, options)?;
        let params = Parameters::Diffusion(self.config.diffusion.to_params());
        self.execute(Mode::Restore, image, &params, None, options.reference.as_ref(), options)
    }

    /// Patch-based denoising of the whole image.
    pub fn clean(&self, image: &mut ImageBuffer, options: &JobOptions) -> Result<RunReport, AppError> {
        self.degrade(image, options)?;
        let params = Parameters::PatchBased(self.config.patch.to_params());
        self.execute(Mode::Clean, image, &params, None, options.reference.as_ref(), options)
    }

    /// Reconstruct the masked region. The mask is dilated and the hole
    /// pre-filled as configured.
    pub fn inpaint(
        &self,
        image: &mut ImageBuffer,
        mask: &InpaintMask,
        options: &JobOptions,
    ) -> Result<RunReport, AppError> {
        let mask = mask.dilate(self.config.inpaint.dilate);
        mask.check_matches(image)?;
        self.degrade(image, options)?;
        let init: InpaintInit = self.config.inpaint.init.into();
        mask.prefill(image, init, &mut StdRng::seed_from_u64(self.config.run.seed))?;
        tracing::info!(
            masked = mask.count(),
            init = ?init,
            dilate = self.config.inpaint.dilate,
            "Prepared inpainting mask"
        );
        let params = Parameters::Diffusion(self.config.inpaint.diffusion.to_params());
        self.execute(
            Mode::Inpaint,
            image,
            &params,
            Some(&mask),
            options.reference.as_ref(),
            options,
        )
    }

    /// Enlarge the image and let the diffusion fill in between the original
    /// samples. `image` is replaced by the result.
    pub fn resize(
        &self,
        image: &mut ImageBuffer,
        request: &ResizeRequest,
        options: &JobOptions,
    ) -> Result<RunReport, AppError> {
        if request.geometry.is_none() && request.shrink.is_none() {
            return Err(AppError::Config(
                "resize needs an output geometry or a shrink geometry".to_string(),
            ));
        }
        self.degrade(image, options)?;

        let original = (image.width(), image.height());
        let mut unshrunk = None;
        if let Some(shrink) = request.shrink {
            let (w, h) = shrink.resolve(image.width(), image.height());
            let small = resize::downscale_average(image, w, h)?;
            tracing::info!(width = w, height = h, "Shrunk input");
            unshrunk = Some(std::mem::replace(image, small));
        }
        let (width, height) = match request.geometry {
            Some(geometry) => geometry.resolve(image.width(), image.height()),
            None => original,
        };

        let resize_config = &self.config.resize;
        let mut enlarged = resize::upscale(image, width, height, resize_config.init.into())?;
        let mask = resize::anchor_mask(
            (image.width(), image.height()),
            (width, height),
            resize_config.anchor,
        )?;
        tracing::info!(
            from = %format!("{}x{}", image.width(), image.height()),
            to = %format!("{}x{}", width, height),
            anchor = resize_config.anchor,
            init = ?resize_config.init,
            "Prepared enlarged estimate"
        );

        // A shrunk input is only comparable when it is enlarged back to its size.
        let unshrunk = unshrunk.filter(|input| input.same_shape(&enlarged));
        let reference = options.reference.as_ref().or(unshrunk.as_ref());
        let params = Parameters::Diffusion(resize_config.diffusion.to_params());
        let report = self.execute(
            Mode::Resize,
            &mut enlarged,
            &params,
            Some(&mask),
            reference,
            options,
        )?;
        *image = enlarged;
        Ok(report)
    }

    /// Add the requested synthetic noise, all from one seeded generator.
    fn degrade(&self, image: &mut ImageBuffer, options: &JobOptions) -> Result<(), AppError> {
        let mut rng = StdRng::seed_from_u64(self.config.run.seed);
        if let Some(sigma) = options.add_noise {
            noise::add_gaussian_noise(image, sigma, &mut rng)?;
            tracing::info!(sigma, "Added Gaussian noise");
        }
        if let Some(amplitude) = options.add_uniform_noise {
            noise::add_uniform_noise(image, amplitude, &mut rng);
            tracing::info!(amplitude, "Added uniform noise");
        }
        if let Some(percent) = options.add_salt_pepper {
            noise::add_salt_pepper_noise(image, percent, &mut rng);
            tracing::info!(percent, "Added salt and pepper noise");
        }
        Ok(())
    }

    fn execute(
        &self,
        mode: Mode,
        image: &mut ImageBuffer,
        params: &Parameters,
        mask: Option<&InpaintMask>,
        reference: Option<&ImageBuffer>,
        options: &JobOptions,
    ) -> Result<RunReport, AppError> {
        if let Some(reference) = reference {
            if !reference.same_shape(image) {
                return Err(AppError::SizeMismatch {
                    what: "reference",
                    got: shape(reference),
                    expected: shape(image),
                });
            }
        }
        let psnr_before = match reference {
            Some(reference) => metrics::psnr(reference, image)?,
            None => None,
        };

        let color_base = self.config.color.base;
        if color_base == ColorBase::Ycbcr {
            color::rgb_to_ycbcr(image)?;
        }
        let channels = self
            .config
            .color
            .channels
            .map(|range| range.as_range())
            .unwrap_or(0..image.channels());
        let first_channel = channels.start;
        let mut working = image.select_channels(channels.clone())?;
        tracing::debug!(?color_base, ?channels, "Selected working channels");

        let run_config = self.config.run_config(mode);
        let controller = RunController::new(run_config.clone())?;
        let mut sink = RunSink {
            snapshots: match (&options.snapshots, self.config.run.save_every) {
                (Some(path), every) if every > 0 => Some(Snapshots {
                    base: &*image,
                    first_channel,
                    color_base,
                    path,
                    every,
                }),
                _ => None,
            },
            saved: Vec::new(),
        };
        let started = Instant::now();
        let result = with_timeout(controller.stop_handle(), self.config.timeout(), || {
            controller.run(&mut working, params, mask, &mut sink)
        })?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let saved = sink.saved;

        image.replace_channels(first_channel, &working)?;
        if color_base == ColorBase::Ycbcr {
            color::ycbcr_to_rgb(image)?;
        }

        let (outcome, error) = match result {
            RunResult::Completed => (Outcome::Completed, None),
            RunResult::Cancelled => {
                tracing::warn!(elapsed_ms, "Run cancelled");
                (Outcome::Cancelled, None)
            }
            RunResult::Failed(e) => {
                tracing::warn!(%e, "Run failed");
                (Outcome::Failed, Some(e.to_string()))
            }
        };
        let psnr_after = match (reference, outcome) {
            (Some(reference), Outcome::Completed) => metrics::psnr(reference, image)?,
            _ => None,
        };

        Ok(RunReport {
            mode,
            method: params.method_name(),
            width: image.width(),
            height: image.height(),
            channels: image.channels(),
            tile_size: run_config.tile_size,
            workers: run_config.workers,
            iterations: run_config.iterations,
            color_base,
            outcome,
            error,
            elapsed_ms,
            masked_pixels: mask.map(InpaintMask::count),
            psnr_before,
            psnr_after,
            snapshots: saved,
        })
    }
}

/// Logs progress and writes intermediate images.
struct RunSink<'a> {
    snapshots: Option<Snapshots<'a>>,
    saved: Vec<PathBuf>,
}

/// Where and how often intermediate images are written.
struct Snapshots<'a> {
    /// Full image in the working colour base; the processed channels are
    /// overlaid on a copy of it.
    base: &'a ImageBuffer,
    first_channel: usize,
    color_base: ColorBase,
    path: &'a Path,
    every: usize,
}

impl Snapshots<'_> {
    fn save(&self, iteration: usize, working: &ImageBuffer) -> Result<PathBuf, AppError> {
        let mut full = self.base.clone();
        full.replace_channels(self.first_channel, working)?;
        if self.color_base == ColorBase::Ycbcr {
            color::ycbcr_to_rgb(&mut full)?;
        }
        let path = snapshot_path(self.path, iteration);
        image_io::save_png(&path, &full)?;
        Ok(path)
    }
}

impl ProgressSink for &mut RunSink<'_> {
    fn report(&mut self, percent: u8) {
        tracing::info!(percent, "Progress");
    }

    fn iteration_done(&mut self, iteration: usize, image: &ImageBuffer) {
        let Some(snapshots) = &self.snapshots else {
            return;
        };
        let done = iteration + 1;
        if done % snapshots.every != 0 {
            return;
        }
        match snapshots.save(done, image) {
            Ok(path) => {
                tracing::info!(iteration = done, path = %path.display(), "Saved snapshot");
                self.saved.push(path);
            }
            Err(e) => tracing::warn!(iteration, %e, "Failed to save snapshot"),
        }
    }
}

/// `out.png` becomes `out_000012.png` after the twelfth iteration.
pub fn snapshot_path(output: &Path, iteration: usize) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "greyc".to_string());
    let extension = output
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "png".to_string());
    output.with_file_name(format!("{stem}_{iteration:06}.{extension}"))
}

fn shape(image: &ImageBuffer) -> String {
    format!("{}x{}x{}", image.width(), image.height(), image.channels())
}

/// Run `f`, asking `stop` to end it once `timeout` elapses.
///
/// A watchdog thread waits on a channel that is closed when `f` returns, so
/// it never outlives the call.
pub fn with_timeout<T>(
    stop: StopHandle,
    timeout: Option<Duration>,
    f: impl FnOnce() -> T,
) -> T {
    let Some(timeout) = timeout else {
        return f();
    };
    let (done_tx, done_rx) = mpsc::channel::<()>();
    std::thread::scope(|scope| {
        scope.spawn(move || {
            if let Err(mpsc::RecvTimeoutError::Timeout) = done_rx.recv_timeout(timeout) {
                tracing::warn!(timeout_secs = timeout.as_secs_f64(), "Timeout reached, stopping run");
                stop.stop();
            }
        });
        let result = f();
        drop(done_tx);
        result
    })
}
