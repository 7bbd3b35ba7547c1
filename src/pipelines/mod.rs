// SPDX-License-Identifier: GPL-3.0-only

//! Processing pipelines for delivered still images
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │  Raw Image   │ ──▶ │  Photo Pipeline   │ ──▶ │  JPEG bytes  │
//! │ (JPEG / YUV) │     │  - pass-through   │     │              │
//! │              │     │  - YUV→RGB        │     │              │
//! │              │     │  - JPEG encoding  │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`photo`]: Byte extraction and the software JPEG encoder

pub mod photo;
