pub mod image_io;
pub mod restoration;

pub use image_io::{decode_png, encode_png, load_mask, load_png, save_png};
pub use restoration::{
    snapshot_path, JobOptions, Outcome, ResizeRequest, RestorationService, RunReport,
};
