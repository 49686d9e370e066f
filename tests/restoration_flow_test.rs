//! End-to-end flows through the restoration service with PNG files on disk.

mod common;

use greyc::error::AppError;
use greyc::models::{ColorBase, InitMode, Mode};
use greyc::services::{self, JobOptions, Outcome, ResizeRequest, RestorationService};
use greyc_engine::image::metrics;
use pretty_assertions::assert_eq;

use common::{fixtures, Workspace};

#[test]
fn test_restore_png_file_round_trip() {
    let ws = Workspace::new();
    let clean = fixtures::gradient(40, 32, 3);
    let noisy = fixtures::noisy(&clean, 18.0, 11);
    let input = ws.write_png("noisy.png", &noisy);

    let service = RestorationService::new(fixtures::quick_config()).unwrap();
    let mut image = services::load_png(&input).unwrap();
    assert_eq!(image, noisy);

    let report = service.restore(&mut image, &JobOptions::default()).unwrap();
    common::assert_completed(&report);
    assert_eq!(report.mode, Mode::Restore);
    assert_eq!((report.width, report.height, report.channels), (40, 32, 3));

    let output = ws.path("restored.png");
    services::save_png(&output, &image).unwrap();
    common::assert_png_bytes(&std::fs::read(&output).unwrap());

    let restored = ws.read_png(&output);
    assert_eq!(restored, image);
    common::assert_closer(&clean, &noisy, &restored);
}

#[test]
fn test_clean_greyscale_file() {
    let ws = Workspace::new();
    let clean = fixtures::step_edge(32, 24);
    let noisy = fixtures::noisy(&clean, 15.0, 5);
    let input = ws.write_png("edge.png", &noisy);

    let mut config = fixtures::quick_config();
    config.tiling.tile_size = 256;
    let service = RestorationService::new(config).unwrap();
    let mut image = ws.read_png(&input);
    let report = service.clean(&mut image, &JobOptions::default()).unwrap();

    common::assert_completed(&report);
    assert_eq!(report.method, "patch");
    assert_eq!(report.channels, 1);
    common::assert_closer(&clean, &noisy, &image);
}

#[test]
fn test_reference_and_added_noise_report_psnr() {
    let clean = fixtures::gradient(32, 32, 1);
    let mut image = clean.clone();
    let options = JobOptions {
        reference: Some(clean.clone()),
        add_noise: Some(20.0),
        ..Default::default()
    };

    let service = RestorationService::new(fixtures::quick_config()).unwrap();
    let report = service.restore(&mut image, &options).unwrap();

    common::assert_completed(&report);
    let before = report.psnr_before.expect("noise was added, PSNR is finite");
    let after = report.psnr_after.expect("restored image is not identical");
    assert!(after > before, "PSNR went from {before:.2} to {after:.2}");
}

#[test]
fn test_inpaint_with_mask_file() {
    let ws = Workspace::new();
    let mut damaged = greyc_engine::ImageBuffer::filled(36, 36, 3, 120).unwrap();
    for c in 0..3 {
        for y in 14..22 {
            for x in 14..22 {
                damaged.set(x, y, c, 0);
            }
        }
    }
    let input = ws.write_png("damaged.png", &damaged);
    let mask_path = ws.write_png("mask.png", &fixtures::square_mask(36, 36, 14, 14, 8));

    let mut config = fixtures::quick_config();
    config.inpaint.init = InitMode::Smart;
    let service = RestorationService::new(config).unwrap();
    let mut image = ws.read_png(&input);
    let mask = services::load_mask(&mask_path, image.width(), image.height()).unwrap();
    let report = service.inpaint(&mut image, &mask, &JobOptions::default()).unwrap();

    common::assert_completed(&report);
    assert_eq!(report.masked_pixels, Some(64));
    for c in 0..3 {
        for y in 0..36 {
            for x in 0..36 {
                let v = image.get(x, y, c) as i32;
                assert!((v - 120).abs() <= 2, "pixel ({x}, {y}, {c}) = {v}");
            }
        }
    }
}

#[test]
fn test_inpaint_keeps_pixels_outside_mask() {
    let clean = fixtures::gradient(30, 30, 1);
    let mask_image = fixtures::square_mask(30, 30, 10, 10, 6);
    let mask = greyc_engine::InpaintMask::from_image(&mask_image);

    let mut config = fixtures::quick_config();
    config.inpaint.init = InitMode::Black;
    let service = RestorationService::new(config).unwrap();
    let mut image = clean.clone();
    service.inpaint(&mut image, &mask, &JobOptions::default()).unwrap();

    for y in 0..30 {
        for x in 0..30 {
            if !mask.is_masked(x, y) {
                assert_eq!(image.get(x, y, 0), clean.get(x, y, 0), "({x}, {y})");
            }
        }
    }
}

#[test]
fn test_mask_size_mismatch() {
    let ws = Workspace::new();
    let mask_path = ws.write_png("mask.png", &fixtures::square_mask(10, 10, 0, 0, 4));
    let err = services::load_mask(&mask_path, 12, 10).unwrap_err();
    assert!(matches!(err, AppError::SizeMismatch { what: "mask", .. }));
}

#[test]
fn test_timeout_cancels_long_run() {
    let mut config = fixtures::quick_config();
    config.run.iterations = Some(10_000);
    config.run.timeout_secs = Some(1);
    let service = RestorationService::new(config).unwrap();

    let mut image = fixtures::gradient(48, 48, 3);
    let report = service.restore(&mut image, &JobOptions::default()).unwrap();

    assert_eq!(report.outcome, Outcome::Cancelled);
    assert!(report.psnr_after.is_none());
    assert!(report.elapsed_ms >= 1000);
}

#[test]
fn test_json_report_fields() {
    let service = RestorationService::new(fixtures::quick_config()).unwrap();
    let mut image = fixtures::gradient(16, 16, 1);
    let report = service.restore(&mut image, &JobOptions::default()).unwrap();

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["mode"], "restore");
    assert_eq!(json["method"], "diffusion");
    assert_eq!(json["outcome"], "completed");
    assert_eq!(json["tile_size"], 0);
    assert!(json.get("error").is_none());
    assert!(json.get("masked_pixels").is_none());
}

#[test]
fn test_restoration_is_deterministic_across_workers() {
    let clean = fixtures::gradient(300, 280, 1);
    let noisy = fixtures::noisy(&clean, 12.0, 21);

    let run = |workers: usize| {
        let mut config = fixtures::quick_config();
        config.tiling.tile_size = 256;
        config.tiling.workers = workers;
        config.diffusion.amplitude = 5.0;
        let mut image = noisy.clone();
        let report = RestorationService::new(config)
            .unwrap()
            .restore(&mut image, &JobOptions::default())
            .unwrap();
        common::assert_completed(&report);
        image
    };

    let single = run(1);
    let parallel = run(4);
    assert_eq!(metrics::mse(&single, &parallel).unwrap(), 0.0);
}

#[test]
fn test_resize_png_file_doubles_size() {
    let ws = Workspace::new();
    let small = fixtures::gradient(20, 16, 3);
    let input = ws.write_png("small.png", &small);

    let service = RestorationService::new(fixtures::quick_config()).unwrap();
    let mut image = ws.read_png(&input);
    let request = ResizeRequest {
        geometry: Some("40x32".parse().unwrap()),
        shrink: None,
    };
    let report = service.resize(&mut image, &request, &JobOptions::default()).unwrap();

    common::assert_completed(&report);
    assert_eq!(report.mode, Mode::Resize);
    assert_eq!((image.width(), image.height(), image.channels()), (40, 32, 3));
    for c in 0..3 {
        for y in 0..16 {
            for x in 0..20 {
                assert_eq!(image.get(x * 2, y * 2, c), small.get(x, y, c), "({x}, {y}, {c})");
            }
        }
    }

    let output = ws.path("large.png");
    services::save_png(&output, &image).unwrap();
    assert_eq!(ws.read_png(&output), image);
}

#[test]
fn test_resize_rejects_shrinking_geometry() {
    let service = RestorationService::new(fixtures::quick_config()).unwrap();
    let mut image = fixtures::gradient(20, 20, 1);
    let request = ResizeRequest {
        geometry: Some("50%".parse().unwrap()),
        shrink: None,
    };
    assert!(matches!(
        service.resize(&mut image, &request, &JobOptions::default()),
        Err(AppError::Engine(_))
    ));
}

#[test]
fn test_snapshots_land_next_to_output() {
    let ws = Workspace::new();
    let mut config = fixtures::quick_config();
    config.run.iterations = Some(3);
    config.run.save_every = 1;
    let service = RestorationService::new(config).unwrap();

    let output = ws.path("restored.png");
    let options = JobOptions {
        snapshots: Some(output.clone()),
        ..Default::default()
    };
    let mut image = fixtures::gradient(24, 24, 3);
    let report = service.restore(&mut image, &options).unwrap();

    common::assert_completed(&report);
    assert_eq!(report.snapshots.len(), 3);
    let last = ws.read_png(&services::snapshot_path(&output, 3));
    assert_eq!(last, image);
}

#[test]
fn test_ycbcr_restore_of_colour_file() {
    let clean = fixtures::gradient(32, 24, 3);
    let noisy = fixtures::noisy(&clean, 15.0, 3);

    let mut config = fixtures::quick_config();
    config.color.base = ColorBase::Ycbcr;
    let service = RestorationService::new(config).unwrap();
    let mut image = noisy.clone();
    let report = service.restore(&mut image, &JobOptions::default()).unwrap();

    common::assert_completed(&report);
    assert_eq!(report.color_base, ColorBase::Ycbcr);
    common::assert_closer(&clean, &noisy, &image);
}
