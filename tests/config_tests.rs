// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use camera_capture::backends::camera::ImageFormat;
use camera_capture::constants::{FOCUS_HOLD_MILLIS, JPEG_QUALITY, METERING_REGION_EDGE};
use camera_capture::{CaptureConfig, CaptureError};
use std::time::Duration;

#[test]
fn test_config_default() {
    let config = CaptureConfig::default();

    assert_eq!(config.jpeg_quality, JPEG_QUALITY);
    assert_eq!(config.capture_format, ImageFormat::Jpeg);
    assert_eq!(config.focus_hold(), Duration::from_secs(3));
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = CaptureConfig::load(&dir.path().join("absent.json")).unwrap();
    assert_eq!(config, CaptureConfig::default());
}

#[test]
fn test_save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let config = CaptureConfig {
        jpeg_quality: 75,
        focus_hold_ms: 1500,
        capture_format: ImageFormat::Yuv420,
        ..Default::default()
    };
    config.save(&path).unwrap();

    assert_eq!(CaptureConfig::load(&path).unwrap(), config);
}

#[test]
fn test_out_of_range_values_are_sanitized_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{ "jpeg_quality": 250, "metering_region_edge": -1.0, "focus_hold_ms": 0 }"#,
    )
    .unwrap();

    let config = CaptureConfig::load(&path).unwrap();
    assert_eq!(config.jpeg_quality, 100);
    assert_eq!(config.metering_region_edge, METERING_REGION_EDGE);
    assert_eq!(config.focus_hold_ms, FOCUS_HOLD_MILLIS);
}

#[test]
fn test_malformed_file_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(
        CaptureConfig::load(&path),
        Err(CaptureError::Configuration(_))
    ));
}
