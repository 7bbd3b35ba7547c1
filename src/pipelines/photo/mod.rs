// SPDX-License-Identifier: GPL-3.0-only

//! Still image extraction
//!
//! ```text
//! ImageReady(RawImage) → ImageExtractor → JPEG bytes → CaptureSession
//!                              ↓
//!                  JpegEncoder (YUV captures only)
//! ```
//!
//! Extraction runs off the engine's serial worker, on the blocking pool, so
//! focus and preview handling never wait on compression.

pub mod encoding;
pub mod extract;

pub use encoding::{ImageCrateJpegEncoder, JpegEncoder};
pub use extract::ImageExtractor;
