//! Tiling: planning, private tile copies and merging.
//!
//! A pass over the image is decomposed into overlapping tiles so that a pool
//! of workers can process them independently:
//!
//! ```text
//!  source image ──extract──▶ TileBuffer (core + border)
//!                                 │ kernel
//!                                 ▼
//!  output image ◀──commit──── TileBuffer (core only)
//! ```
//!
//! The border gives the kernel context across tile seams; it is read but
//! never written back.

mod buffer;
mod merge;
mod planner;

pub use buffer::TileBuffer;
pub use merge::TileWriter;
pub use planner::{plan, Rect, Tile, TilePlan, Tiles};
