// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for capture devices
//!
//! The engine drives hardware exclusively through the
//! [`camera::CaptureDevice`] trait, so the same coordination logic runs
//! against a real camera stack or the bundled simulator:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 Engine Layer                 │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                   │
//! │  ┌──────────────────┐  ┌──────────────────┐ │
//! │  │ CaptureDevice    │  │ SimulatedCamera  │ │
//! │  │    (trait)       │  │  (frame clock)   │ │
//! │  └──────────────────┘  └──────────────────┘ │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: Device trait, request/result types and the simulator

pub mod camera;
