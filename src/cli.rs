// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for the simulated camera
//!
//! This module provides command-line functionality for:
//! - Showing device characteristics
//! - Running a scripted capture session and saving the photos

use camera_capture::backends::camera::{
    ImageFormat, PreviewSurface, SimulatedCamera, SimulatedCameraConfig,
};
use camera_capture::constants::APP_DIR_NAME;
use camera_capture::{
    AutoFocusMode, AutoFocusState, CaptureConfig, CaptureResult, CapturedImage, FlashMode,
    OneCamera, PhotoCaptureParameters,
};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::oneshot;

/// How long to wait for any single capture before giving up
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SimulateOptions {
    pub shots: u32,
    pub zoom: Option<f32>,
    pub tap: Option<(f32, f32)>,
    pub unfocused: bool,
    pub flash: FlashMode,
    pub format: Option<ImageFormat>,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

/// Print the simulated camera's characteristics
pub fn show_info() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let camera = OneCamera::open(SimulatedCamera::default(), CaptureConfig::default())?;
        let characteristics = camera.characteristics();

        println!("Simulated camera:");
        println!();
        println!("  Facing:        {:?}", characteristics.lens_facing);
        println!("  Sensor:        {}", characteristics.active_array);
        println!("  Orientation:   {}°", characteristics.sensor_orientation);
        println!("  Aspect ratio:  {:.3}", camera.full_size_aspect_ratio());
        println!("  Max zoom:      {:.1}x", camera.max_zoom());

        for format in [ImageFormat::Jpeg, ImageFormat::Yuv420] {
            let sizes: Vec<String> = characteristics
                .output_sizes(format)
                .iter()
                .map(|size| size.to_string())
                .collect();
            println!("  {:<14} {}", format!("{}:", format), sizes.join(", "));
        }

        Ok::<_, Box<dyn std::error::Error>>(())
    })
}

/// Run a scripted session against the simulated camera
pub fn simulate(options: SimulateOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &options.config {
        Some(path) => CaptureConfig::load(path)?,
        None => CaptureConfig::load_default(),
    };
    if let Some(format) = options.format {
        config.capture_format = format;
    }

    let output_dir = options.output.clone().unwrap_or_else(get_default_photo_dir);
    std::fs::create_dir_all(&output_dir)?;

    let device_config = SimulatedCameraConfig {
        passive_focus: !options.unfocused,
        ..Default::default()
    };
    let frame_interval = device_config.frame_interval;
    let settle = frame_interval * (device_config.scan_frames + 3);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let mut camera = OneCamera::open(SimulatedCamera::new(device_config), config)?;

        camera.set_focus_state_listener(Some(Box::new(
            |mode: AutoFocusMode, state: AutoFocusState| {
                println!("  focus: {:?} / {}", mode, state);
            },
        )))?;

        let preview_size = camera
            .characteristics()
            .output_sizes(ImageFormat::Yuv420)
            .last()
            .copied()
            .ok_or("camera advertises no preview sizes")?;
        let (setup_tx, setup_rx) = oneshot::channel();
        camera.start_preview(
            PreviewSurface {
                id: 0,
                size: preview_size,
            },
            move |result| {
                let _ = setup_tx.send(result);
            },
        )?;
        setup_rx.await??;
        println!("Preview running at {}", preview_size);

        if let Some(zoom) = options.zoom {
            camera.set_zoom(zoom)?;
            println!("Zoom requested: {:.2}x (max {:.1}x)", zoom, camera.max_zoom());
        }
        if let Some((x, y)) = options.tap {
            camera.trigger_focus_and_meter_at_point(x, y)?;
            println!("Tap to focus at ({:.2}, {:.2})", x, y);
        }
        tokio::time::sleep(settle).await;

        let params = PhotoCaptureParameters {
            flash_mode: options.flash,
            ..Default::default()
        };
        for shot in 1..=options.shots {
            let (tx, rx) = oneshot::channel::<CaptureResult<CapturedImage>>();
            camera.take_picture(params, tx)?;

            let image = tokio::time::timeout(CAPTURE_TIMEOUT, rx)
                .await
                .map_err(|_| "timed out waiting for capture")?
                .map_err(|_| "capture was dropped")??;

            let path = save_photo(&output_dir, shot, &image)?;
            println!(
                "Photo {} saved: {} ({}x{}, {} bytes)",
                shot,
                path.display(),
                image.width,
                image.height,
                image.data.len()
            );
        }

        let (closed_tx, closed_rx) = oneshot::channel();
        camera.close(move || {
            let _ = closed_tx.send(());
        })?;
        let _ = closed_rx.await;
        camera.stopped().await;
        println!("Camera closed");

        Ok::<_, Box<dyn std::error::Error>>(())
    })
}

/// Parse `x,y` into a normalized point
pub fn parse_point(value: &str) -> Result<(f32, f32), String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got '{}'", value))?;
    let parse = |part: &str| {
        part.trim()
            .parse::<f32>()
            .map_err(|e| format!("invalid coordinate '{}': {}", part, e))
    };
    Ok((parse(x)?, parse(y)?))
}

/// Parse a still capture format name
pub fn parse_format(value: &str) -> Result<ImageFormat, String> {
    match value.to_ascii_lowercase().as_str() {
        "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
        "yuv" | "yuv420" => Ok(ImageFormat::Yuv420),
        other => Err(format!("unsupported capture format '{}'", other)),
    }
}

fn save_photo(dir: &Path, shot: u32, image: &CapturedImage) -> std::io::Result<PathBuf> {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("photo_{}_{:02}.jpg", timestamp, shot));
    std::fs::write(&path, &image.data)?;
    Ok(path)
}

/// Get default photo directory
fn get_default_photo_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(APP_DIR_NAME)
}
