//! Image storage and the image-level helpers that surround a run.
//!
//! - [`ImageBuffer`]: planar 8-bit store every run operates on
//! - [`InpaintMask`]: region to reconstruct, with pre-fill strategies
//! - [`color`]: RGB / YCbCr conversion
//! - [`resize`]: anchored enlargement and block-average shrinking
//! - [`metrics`]: MSE / PSNR against a reference
//! - [`noise`]: synthetic degradation for experiments

mod buffer;
pub mod color;
mod mask;
pub mod metrics;
pub mod noise;
pub mod resize;

pub use buffer::ImageBuffer;
pub use mask::{InpaintInit, InpaintMask};
pub use resize::ResizeInit;
