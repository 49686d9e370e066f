//! Public API for the greyc-engine crate.
//!
//! This module provides the high-level API: the [`Restorer`] builder and the
//! [`EngineError`] unified error type.

mod builder;
mod error;

pub use builder::Restorer;
pub use error::EngineError;
