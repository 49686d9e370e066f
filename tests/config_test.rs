//! Configuration file loading and validation.

mod common;

use greyc::error::AppError;
use greyc::models::{AppConfig, InitMode, InterpolationMode, Mode};
use greyc::services::RestorationService;
use greyc_engine::Interpolation;
use pretty_assertions::assert_eq;

use common::Workspace;

#[test]
fn test_load_partial_yaml_keeps_defaults() {
    let ws = Workspace::new();
    let path = ws.write_file(
        "config.yaml",
        r#"
tiling:
  tile_size: 512
  workers: 4
run:
  iterations: 3
  timeout_secs: 30
diffusion:
  amplitude: 40
  interpolation: runge-kutta
inpaint:
  init: noise
  dilate: 2
"#,
    );

    let config = AppConfig::load(&path).unwrap();
    assert_eq!(config.tiling.tile_size, 512);
    assert_eq!(config.tiling.tile_border, 4);
    assert_eq!(config.tiling.workers, 4);
    assert_eq!(config.run.iterations, Some(3));
    assert_eq!(config.timeout(), Some(std::time::Duration::from_secs(30)));
    assert_eq!(config.diffusion.amplitude, 40.0);
    assert_eq!(config.diffusion.interpolation, InterpolationMode::RungeKutta);
    assert_eq!(
        config.diffusion.to_params().interpolation,
        Interpolation::RungeKutta
    );
    assert_eq!(config.diffusion.sharpness, 0.7);
    assert_eq!(config.inpaint.init, InitMode::Noise);
    assert_eq!(config.inpaint.dilate, 2);
    assert!(config.validate().is_ok());

    let run = config.run_config(Mode::Inpaint);
    assert_eq!(run.tile_size, 512);
    assert_eq!(run.workers, 4);
    assert_eq!(run.iterations, 3);
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let ws = Workspace::new();
    let config = AppConfig::load_or_default(Some(&ws.path("absent.yaml")));
    assert_eq!(config, AppConfig::default());
}

#[test]
fn test_malformed_yaml_is_parse_error() {
    let ws = Workspace::new();
    let path = ws.write_file("bad.yaml", "tiling: [1, 2");
    assert!(matches!(
        AppConfig::load(&path),
        Err(AppError::ConfigParse(_))
    ));
}

#[test]
fn test_yaml_output_loads_back() {
    let ws = Workspace::new();
    let mut config = AppConfig::default();
    config.tiling.tile_size = 1024;
    config.patch.lookup_size = 9;
    let path = ws.write_file("dump.yaml", &config.to_yaml().unwrap());
    assert_eq!(AppConfig::load(&path).unwrap(), config);
}

#[test]
fn test_service_rejects_invalid_values() {
    let mut config = AppConfig::default();
    config.tiling.tile_size = 300;
    assert!(matches!(
        RestorationService::new(config),
        Err(AppError::Config(_))
    ));

    let mut config = AppConfig::default();
    config.tiling.workers = 17;
    assert!(matches!(
        RestorationService::new(config),
        Err(AppError::Engine(_))
    ));

    let mut config = AppConfig::default();
    config.tiling.tile_border = 20;
    assert!(RestorationService::new(config).is_err());

    let mut config = AppConfig::default();
    config.diffusion.anisotropy = 1.5;
    assert!(RestorationService::new(config).is_err());
}

#[test]
fn test_iterations_follow_mode_when_unset() {
    let config = AppConfig::default();
    assert_eq!(config.run_config(Mode::Restore).iterations, 1);
    assert_eq!(config.run_config(Mode::Inpaint).iterations, 1000);
    assert_eq!(config.run_config(Mode::Resize).iterations, 3);
}
