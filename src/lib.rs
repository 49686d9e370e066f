//! greyc - GREYCstoration-style image restoration
//!
//! Command-line shell around the `greyc-engine` crate.
//! This library exposes modules for integration testing.

pub mod error;
pub mod models;
pub mod services;
