// SPDX-License-Identifier: GPL-3.0-only

//! Engine-wide constants

/// Default JPEG quality used for both the hardware and software encoders
pub const JPEG_QUALITY: u8 = 90;

/// Width and height of the touch metering region as a fraction of the longest sensor edge
pub const METERING_REGION_EDGE: f32 = 0.1;

/// Metering region weight between 0 and 1
pub const METERING_REGION_WEIGHT: f32 = 0.25;

/// Smallest weight a metering rectangle may carry
pub const METERING_WEIGHT_MIN: i32 = 0;

/// Largest weight a metering rectangle may carry
pub const METERING_WEIGHT_MAX: i32 = 1000;

/// How long a triggered focus is held before returning to continuous AF
pub const FOCUS_HOLD_MILLIS: u64 = 3000;

/// Directory name used under the user config and pictures directories
pub const APP_DIR_NAME: &str = "camera-capture";

/// Config file name inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.json";
