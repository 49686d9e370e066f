use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use greyc::models::{AppConfig, ChannelRange, ColorBase, Geometry, InitMode, ResizeMode};
use greyc::services::{self, JobOptions, Outcome, ResizeRequest, RestorationService, RunReport};

#[derive(Parser)]
#[command(name = "greyc")]
#[command(about = "Anisotropic diffusion denoising, inpainting and resizing for PNG images")]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalOpts {
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Tile size (0, 256, 512, 1024 or 2048; 0 disables tiling)
    #[arg(long, global = true)]
    tile_size: Option<usize>,

    /// Context border around each tile (0-16)
    #[arg(long, global = true)]
    tile_border: Option<usize>,

    /// Worker threads (1-16)
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Number of passes over the image (default depends on the command)
    #[arg(long, global = true)]
    iterations: Option<usize>,

    /// Also write the image after every this many iterations, next to the output
    #[arg(long, global = true)]
    save_every: Option<usize>,

    /// Colour base the image is processed in
    #[arg(long, global = true, value_enum)]
    color_base: Option<ColorBase>,

    /// Only process these channels, e.g. `0` or `1-2`
    #[arg(long, global = true)]
    channels: Option<ChannelRange>,

    /// Stop the run after this many seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Clean reference image for PSNR reporting
    #[arg(long, global = true)]
    reference: Option<PathBuf>,

    /// Add Gaussian noise with this standard deviation before processing
    #[arg(long, global = true)]
    add_noise: Option<f32>,

    /// Add uniform noise with this amplitude before processing
    #[arg(long, global = true)]
    add_uniform_noise: Option<f32>,

    /// Turn this percentage of pixels black or white before processing
    #[arg(long, global = true)]
    add_salt_pepper: Option<f32>,

    /// Print the run report as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Denoise with tensor-directed anisotropic diffusion
    Restore {
        /// Input PNG file
        input: PathBuf,

        /// Output PNG file path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Denoise with non-local patch averaging
    Clean {
        /// Input PNG file
        input: PathBuf,

        /// Output PNG file path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Reconstruct the region marked by a mask image
    Inpaint {
        /// Input PNG file
        input: PathBuf,

        /// Mask PNG (non-zero pixels are reconstructed)
        #[arg(short, long)]
        mask: PathBuf,

        /// Output PNG file path
        #[arg(short, long)]
        output: PathBuf,

        /// How to pre-fill the masked region
        #[arg(long, value_enum)]
        init: Option<InitMode>,

        /// Grow the mask by this many pixels
        #[arg(long)]
        dilate: Option<usize>,
    },
    /// Enlarge an image, reconstructing detail between the original samples
    Resize {
        /// Input PNG file
        input: PathBuf,

        /// Output PNG file path
        #[arg(short, long)]
        output: PathBuf,

        /// Output size: `640x480`, `200%` or `200%x150%`
        #[arg(short, long)]
        geometry: Option<Geometry>,

        /// Shrink the input to this size first, then enlarge it back
        #[arg(long)]
        shrink: Option<Geometry>,

        /// Let the run change the original samples too
        #[arg(long)]
        no_anchor: bool,

        /// First estimate of the enlarged image
        #[arg(long, value_enum)]
        init: Option<ResizeMode>,
    },
    /// Print the effective configuration as YAML
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "greyc=info,greyc_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time().with_writer(std::io::stderr))
        .init();

    let mut config = AppConfig::load_or_default(cli.global.config.as_deref());
    apply_overrides(&mut config, &cli.global);

    match cli.command {
        Commands::Config => {
            print!("{}", config.to_yaml()?);
            Ok(())
        }
        Commands::Restore { input, output } => {
            run_command(config, &cli.global, &input, &output, |service, image, options| {
                service.restore(image, options)
            })
        }
        Commands::Clean { input, output } => {
            run_command(config, &cli.global, &input, &output, |service, image, options| {
                service.clean(image, options)
            })
        }
        Commands::Inpaint {
            input,
            mask,
            output,
            init,
            dilate,
        } => {
            if let Some(init) = init {
                config.inpaint.init = init;
            }
            if let Some(dilate) = dilate {
                config.inpaint.dilate = dilate;
            }
            run_command(config, &cli.global, &input, &output, |service, image, options| {
                let mask = services::load_mask(&mask, image.width(), image.height())?;
                service.inpaint(image, &mask, options)
            })
        }
        Commands::Resize {
            input,
            output,
            geometry,
            shrink,
            no_anchor,
            init,
        } => {
            if no_anchor {
                config.resize.anchor = false;
            }
            if let Some(init) = init {
                config.resize.init = init;
            }
            let request = ResizeRequest { geometry, shrink };
            run_command(config, &cli.global, &input, &output, |service, image, options| {
                service.resize(image, &request, options)
            })
        }
    }
}

/// Command-line flags win over the configuration file
fn apply_overrides(config: &mut AppConfig, opts: &GlobalOpts) {
    if let Some(tile_size) = opts.tile_size {
        config.tiling.tile_size = tile_size;
    }
    if let Some(tile_border) = opts.tile_border {
        config.tiling.tile_border = tile_border;
    }
    if let Some(workers) = opts.workers {
        config.tiling.workers = workers;
    }
    if let Some(iterations) = opts.iterations {
        config.run.iterations = Some(iterations);
    }
    if let Some(save_every) = opts.save_every {
        config.run.save_every = save_every;
    }
    if let Some(base) = opts.color_base {
        config.color.base = base;
    }
    if let Some(channels) = opts.channels {
        config.color.channels = Some(channels);
    }
    if let Some(timeout) = opts.timeout_secs {
        config.run.timeout_secs = Some(timeout);
    }
}

/// Load, process and save one image
fn run_command(
    config: AppConfig,
    opts: &GlobalOpts,
    input: &Path,
    output: &Path,
    process: impl FnOnce(
        &RestorationService,
        &mut greyc_engine::ImageBuffer,
        &JobOptions,
    ) -> Result<RunReport, greyc::error::AppError>,
) -> anyhow::Result<()> {
    let service = RestorationService::new(config)?;
    let mut image = services::load_png(input)?;
    let options = JobOptions {
        reference: opts.reference.as_deref().map(services::load_png).transpose()?,
        add_noise: opts.add_noise,
        add_uniform_noise: opts.add_uniform_noise,
        add_salt_pepper: opts.add_salt_pepper,
        snapshots: Some(output.to_path_buf()),
    };

    let report = process(&service, &mut image, &options)?;
    if opts.json {
        println!("{}", report.to_json()?);
    }

    match report.outcome {
        Outcome::Completed => {
            services::save_png(output, &image)?;
            if let Some(psnr) = report.psnr_after {
                tracing::info!(psnr_db = psnr, "Quality against reference");
            }
            tracing::info!(
                output = %output.display(),
                elapsed_ms = report.elapsed_ms,
                "Done"
            );
            Ok(())
        }
        Outcome::Cancelled => {
            tracing::warn!("Run was cancelled, output not written");
            Ok(())
        }
        Outcome::Failed => anyhow::bail!(
            "regularization failed: {}",
            report.error.unwrap_or_default()
        ),
    }
}
