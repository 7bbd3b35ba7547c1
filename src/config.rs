// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::ImageFormat;
use crate::constants::{
    APP_DIR_NAME, CONFIG_FILE_NAME, FOCUS_HOLD_MILLIS, JPEG_QUALITY, METERING_REGION_EDGE,
    METERING_REGION_WEIGHT,
};
use crate::errors::{CaptureError, CaptureResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Engine settings, stored as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// JPEG quality for hardware and software encoding (1-100)
    pub jpeg_quality: u8,
    /// Tap-to-focus region edge as a fraction of the longest sensor edge
    pub metering_region_edge: f32,
    /// Tap-to-focus region weight between 0 and 1
    pub metering_region_weight: f32,
    /// How long a triggered focus is held before continuous AF resumes
    pub focus_hold_ms: u64,
    /// Format requested for still captures
    pub capture_format: ImageFormat,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: JPEG_QUALITY,
            metering_region_edge: METERING_REGION_EDGE,
            metering_region_weight: METERING_REGION_WEIGHT,
            focus_hold_ms: FOCUS_HOLD_MILLIS,
            capture_format: ImageFormat::Jpeg,
        }
    }
}

impl CaptureConfig {
    /// Default location: `<config dir>/camera-capture/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> CaptureResult<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(CaptureError::Configuration(format!(
                    "could not read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            CaptureError::Configuration(format!("invalid config {}: {}", path.display(), e))
        })?;
        Ok(config.sanitized())
    }

    /// Load from the default location, falling back to defaults on any error
    pub fn load_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Ignoring config file");
                Self::default()
            }
        }
    }

    /// Write as pretty JSON, creating the parent directory
    pub fn save(&self, path: &Path) -> CaptureResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CaptureError::Configuration(format!("could not create {}: {}", parent.display(), e))
            })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CaptureError::Configuration(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| {
            CaptureError::Configuration(format!("could not write {}: {}", path.display(), e))
        })
    }

    /// Clamp out-of-range values into something usable
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();

        if !(1..=100).contains(&self.jpeg_quality) {
            warn!(value = self.jpeg_quality, "JPEG quality out of range, clamping");
            self.jpeg_quality = self.jpeg_quality.clamp(1, 100);
        }
        if !self.metering_region_edge.is_finite()
            || self.metering_region_edge <= 0.0
            || self.metering_region_edge > 1.0
        {
            warn!(
                value = self.metering_region_edge,
                "Metering region edge out of range, using default"
            );
            self.metering_region_edge = defaults.metering_region_edge;
        }
        if !(0.0..=1.0).contains(&self.metering_region_weight) {
            warn!(
                value = self.metering_region_weight,
                "Metering region weight out of range, using default"
            );
            self.metering_region_weight = defaults.metering_region_weight;
        }
        if self.focus_hold_ms == 0 {
            warn!("Focus hold of 0 ms, using default");
            self.focus_hold_ms = defaults.focus_hold_ms;
        }
        self
    }

    pub fn focus_hold(&self) -> Duration {
        Duration::from_millis(self.focus_hold_ms)
    }
}
