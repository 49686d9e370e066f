//! Assertion helpers for tests.

use greyc::services::{Outcome, RunReport};
use greyc_engine::image::metrics;
use greyc_engine::ImageBuffer;

/// Assert the run finished without cancellation or failure
pub fn assert_completed(report: &RunReport) {
    assert_eq!(
        report.outcome,
        Outcome::Completed,
        "Expected completed run, got {:?} (error: {:?})",
        report.outcome,
        report.error
    );
}

/// Assert `after` is strictly closer to `clean` than `before`
pub fn assert_closer(clean: &ImageBuffer, before: &ImageBuffer, after: &ImageBuffer) {
    let mse_before = metrics::mse(clean, before).unwrap();
    let mse_after = metrics::mse(clean, after).unwrap();
    assert!(
        mse_after < mse_before,
        "Expected error to drop, went from {mse_before:.2} to {mse_after:.2}"
    );
}

/// Assert `data` starts with the PNG signature
pub fn assert_png_bytes(data: &[u8]) {
    assert!(
        data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
        "Expected PNG image, got {} bytes starting with {:?}",
        data.len(),
        &data[..8.min(data.len())]
    );
}
