pub mod config;
pub mod geometry;

pub use config::{
    AppConfig, ColorBase, ColorConfig, DiffusionConfig, InitMode, InpaintConfig,
    InterpolationMode, Mode, PatchConfig, ResizeConfig, ResizeMode, RunSection, TilingConfig,
};
pub use geometry::{ChannelRange, Extent, Geometry};
