// SPDX-License-Identifier: GPL-3.0-only

//! FIFO correlation between submitted captures and delivered images
//!
//! Devices deliver still images in submission order, so the oldest context
//! always belongs to the next image. Nothing is matched by content.

use super::params::{CaptureSession, PhotoCaptureParameters};
use crate::errors::{CaptureError, CaptureResult};
use std::collections::VecDeque;
use tokio::time::Instant;
use tracing::debug;

/// Everything needed to finish one accepted capture
pub struct CaptureRequestContext {
    pub params: PhotoCaptureParameters,
    pub session: Box<dyn CaptureSession>,
    /// When `take_picture` was accepted by the engine
    pub accepted_at: Instant,
}

impl CaptureRequestContext {
    pub fn new(params: PhotoCaptureParameters, session: Box<dyn CaptureSession>) -> Self {
        Self {
            params,
            session,
            accepted_at: Instant::now(),
        }
    }

    /// Resolve this capture with an error
    pub fn fail(self, error: CaptureError) {
        self.session.on_picture_failed(error);
    }
}

impl std::fmt::Debug for CaptureRequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureRequestContext")
            .field("params", &self.params)
            .field("accepted_at", &self.accepted_at)
            .finish_non_exhaustive()
    }
}

/// Captures submitted to the device and still waiting for their image
#[derive(Debug, Default)]
pub struct CaptureQueue {
    pending: VecDeque<CaptureRequestContext>,
}

impl CaptureQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a context whose request the device has accepted
    pub fn enqueue(&mut self, context: CaptureRequestContext) {
        self.pending.push_back(context);
        debug!(pending = self.pending.len(), "Capture queued");
    }

    /// Take the context belonging to the image that just arrived
    ///
    /// An image with nothing outstanding means the device broke the ordering
    /// contract; the engine cannot recover from that.
    pub fn pop_front(&mut self) -> CaptureResult<CaptureRequestContext> {
        self.pending.pop_front().ok_or_else(|| {
            CaptureError::ProtocolViolation(
                "image delivered with no capture outstanding".to_string(),
            )
        })
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop every outstanding context without resolving it
    ///
    /// Returns how many were abandoned.
    pub fn abandon(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }
}
