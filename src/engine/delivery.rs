// SPDX-License-Identifier: GPL-3.0-only

//! Image delivery stage
//!
//! Extraction can take a while for YUV captures, so it runs on the blocking
//! pool instead of the serial worker. A single consumer task processes jobs
//! one at a time, which keeps completion callbacks in capture order.

use super::capture_queue::CaptureRequestContext;
use super::params::CapturedImage;
use crate::backends::camera::RawImage;
use crate::errors::CaptureError;
use crate::pipelines::photo::ImageExtractor;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

struct DeliveryJob {
    context: CaptureRequestContext,
    image: RawImage,
}

/// Handle to the delivery task
///
/// Dropping it lets the task finish the queued jobs and exit.
#[derive(Debug)]
pub struct DeliveryStage {
    jobs: mpsc::UnboundedSender<DeliveryJob>,
}

impl DeliveryStage {
    /// Spawn the delivery task
    ///
    /// `delivered` runs after each capture's callback has returned.
    pub fn spawn<F>(extractor: ImageExtractor, delivered: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let (jobs, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run(receiver, extractor, delivered));
        Self { jobs }
    }

    /// Queue an image for extraction and delivery to its context
    ///
    /// If the delivery task is gone the context is handed back unresolved;
    /// the image is released.
    pub fn deliver(
        &self,
        context: CaptureRequestContext,
        image: RawImage,
    ) -> Result<(), CaptureRequestContext> {
        self.jobs
            .send(DeliveryJob { context, image })
            .map_err(|rejected| {
                error!("Delivery stage stopped, capture not delivered");
                rejected.0.context
            })
    }

    /// Whether the delivery task has exited
    pub fn is_stopped(&self) -> bool {
        self.jobs.is_closed()
    }
}

impl std::fmt::Debug for DeliveryJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryJob")
            .field("context", &self.context)
            .field("image", &self.image)
            .finish()
    }
}

async fn run<F>(
    mut jobs: mpsc::UnboundedReceiver<DeliveryJob>,
    extractor: ImageExtractor,
    delivered: F,
) where
    F: Fn() + Send + 'static,
{
    while let Some(DeliveryJob { context, image }) = jobs.recv().await {
        let (width, height) = (image.width, image.height);
        let CaptureRequestContext {
            params, session, ..
        } = context;

        let worker = extractor.clone();
        let extracted = match tokio::task::spawn_blocking(move || worker.extract(image)).await {
            Ok(result) => result,
            Err(e) => Err(CaptureError::Encode(format!("extraction task failed: {}", e))),
        };

        match extracted {
            Ok(data) => {
                debug!(size = data.len(), width, height, "Capture delivered");
                session.on_picture_taken(CapturedImage {
                    data,
                    width,
                    height,
                    orientation: params.orientation,
                    heading: params.heading,
                });
            }
            Err(e) => {
                warn!(error = %e, "Capture failed during extraction");
                session.on_picture_failed(e);
            }
        }

        delivered();
    }
    debug!("Delivery stage finished");
}
