// SPDX-License-Identifier: GPL-3.0-only

//! Autofocus and capture state machine
//!
//! [`AutoFocusCoordinator`] is the single state record behind a
//! [`OneCamera`](super::OneCamera). It only ever runs on the serial worker,
//! one [`Message`] at a time, so none of its fields need synchronisation.
//!
//! # Capture policy
//!
//! When a capture is requested, the last autofocus mode and state reported
//! by the device decide what happens:
//!
//! 1. Continuous mode, lens stopped out of focus: trigger a pre-shot scan and
//!    capture once a result tagged for that scan shows the lens stopped.
//! 2. Lens scanning: capture once any result shows the lens stopped.
//! 3. Anything else: capture right away.
//!
//! Only one deferred capture may be outstanding; further requests are
//! ignored until it fires.

use super::capture_queue::{CaptureQueue, CaptureRequestContext};
use super::delivery::DeliveryStage;
use super::focus::{AutoFocusMode, AutoFocusState};
use super::revert_timer::RevertTimer;
use super::session::{CameraSessionManager, RequestControls, SessionLifecycleState};
use super::{Command, FocusStateListener, Message, ReadyStateListener};
use crate::backends::camera::{
    CaptureDevice, DeviceEvent, MeteringRectangle, RawImage, RequestTag, ResultMetadata,
    SessionId,
};
use crate::config::CaptureConfig;
use crate::errors::{CaptureError, CaptureResult, DeviceError, DeviceResult};
use crate::geometry::{self, ZoomState};
use crate::pipelines::photo::ImageExtractor;
use std::time::Duration;
use tokio::sync::mpsc::WeakUnboundedSender;
use tracing::{debug, info, warn};

/// Whether the worker keeps running after a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Capture waiting for the lens to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingTrigger {
    #[default]
    None,
    /// Waiting on the pre-shot scan (results tagged `PreshotTriggeredAf`)
    WhenStoppedInAuto,
    /// Waiting on any result with the lens stopped
    WhenStopped,
}

pub struct AutoFocusCoordinator {
    session: CameraSessionManager,
    queue: CaptureQueue,
    delivery: DeliveryStage,

    zoom: ZoomState,
    region: MeteringRectangle,
    af_mode: AutoFocusMode,
    preview_tag: Option<RequestTag>,

    reported_mode: AutoFocusMode,
    reported_state: AutoFocusState,
    focus_distance: Option<f32>,
    partial_frame: Option<u64>,

    pending: PendingTrigger,
    deferred: Option<CaptureRequestContext>,
    revert: RevertTimer,

    focus_hold: Duration,
    metering_edge: f32,
    metering_weight: f32,

    messages: WeakUnboundedSender<Message>,
    focus_listener: Option<FocusStateListener>,
    ready_listener: Option<ReadyStateListener>,
}

impl AutoFocusCoordinator {
    /// Build the state record; must run inside a tokio runtime
    pub fn new(
        device: Box<dyn CaptureDevice>,
        config: &CaptureConfig,
        extractor: ImageExtractor,
        messages: WeakUnboundedSender<Message>,
    ) -> Self {
        let session = CameraSessionManager::new(device, config.capture_format, config.jpeg_quality);
        let active = session.characteristics().active_array;

        let delivered = messages.clone();
        let delivery = DeliveryStage::spawn(extractor, move || {
            if let Some(messages) = delivered.upgrade() {
                let _ = messages.send(Message::CaptureDelivered);
            }
        });

        Self {
            session,
            queue: CaptureQueue::new(),
            delivery,
            zoom: ZoomState::new(active),
            region: MeteringRectangle::ZERO_WEIGHT,
            af_mode: AutoFocusMode::Continuous,
            preview_tag: None,
            reported_mode: AutoFocusMode::Continuous,
            reported_state: AutoFocusState::Inactive,
            focus_distance: None,
            partial_frame: None,
            pending: PendingTrigger::None,
            deferred: None,
            revert: RevertTimer::new(),
            focus_hold: config.focus_hold(),
            metering_edge: config.metering_region_edge,
            metering_weight: config.metering_region_weight,
            messages,
            focus_listener: None,
            ready_listener: None,
        }
    }

    /// Process one message from the serial queue
    ///
    /// An `Err` is always fatal; the worker shuts down after it.
    pub fn handle(&mut self, message: Message) -> CaptureResult<Flow> {
        match message {
            Message::Command(command) => self.on_command(command),
            Message::Device(event) => return self.on_device_event(event),
            Message::RevertFocusHold(generation) => self.on_focus_hold_elapsed(generation),
            Message::CaptureDelivered => self.broadcast_ready(true),
        }
        Ok(Flow::Continue)
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::StartPreview { surface, callback } => {
                if !self.session.is_closing_or_closed() {
                    self.reset_for_new_session();
                }
                self.session.setup(surface, callback);
            }
            Command::TakePicture { params, session } => {
                self.request_capture(CaptureRequestContext::new(params, session));
            }
            Command::SetZoom(factor) => self.set_zoom(factor),
            Command::TriggerAutoFocus => self.trigger_auto_focus(),
            Command::TriggerFocusAndMeterAt { x, y } => {
                self.trigger_focus_and_meter_at_point(x, y)
            }
            Command::SetFocusStateListener(listener) => self.focus_listener = listener,
            Command::SetReadyStateListener(listener) => self.ready_listener = listener,
            Command::Close(callback) => self.close(callback),
        }
    }

    fn on_device_event(&mut self, event: DeviceEvent) -> CaptureResult<Flow> {
        match event {
            DeviceEvent::ConfigureSucceeded(id) => self.on_configured(id),
            DeviceEvent::ConfigureFailed(id) => self.session.on_configure_failed(id),
            DeviceEvent::PartialResult(metadata) => self.on_result(&metadata, true),
            DeviceEvent::FullResult(metadata) => self.on_result(&metadata, false),
            DeviceEvent::ImageReady(image) => self.on_image_ready(image)?,
            DeviceEvent::Closed => {
                self.on_closed();
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }

    /// Accept a capture and decide when it is submitted
    pub fn request_capture(&mut self, context: CaptureRequestContext) {
        if self.pending != PendingTrigger::None {
            debug!(pending = ?self.pending, "Capture already waiting on focus, ignoring request");
            return;
        }

        self.broadcast_ready(false);

        if self.reported_mode == AutoFocusMode::Continuous
            && self.reported_state == AutoFocusState::StoppedUnfocused
        {
            debug!("Lens stopped out of focus, running pre-shot scan");
            self.pending = PendingTrigger::WhenStoppedInAuto;
            self.deferred = Some(context);
            self.region = MeteringRectangle::ZERO_WEIGHT;
            if let Err(e) = self.trigger_scan(Some(RequestTag::PreshotTriggeredAf)) {
                warn!(error = %e, "Could not start pre-shot scan");
                self.pending = PendingTrigger::None;
                if let Some(context) = self.deferred.take() {
                    context.fail(e.into());
                }
                self.broadcast_ready(true);
            }
        } else if self.reported_state == AutoFocusState::Scanning {
            debug!("Lens scanning, capture deferred until it stops");
            self.pending = PendingTrigger::WhenStopped;
            self.deferred = Some(context);
        } else {
            self.capture_now(context);
        }
    }

    fn capture_now(&mut self, context: CaptureRequestContext) {
        let waited = context.accepted_at.elapsed();
        debug!(
            extra_af_delay_ms = waited.as_millis() as u64,
            zoom = self.zoom.factor(),
            "Taking picture"
        );

        let controls = self.controls();
        match self.session.submit_still_capture(&controls, &context.params) {
            Ok(()) => self.queue.enqueue(context),
            Err(e) => {
                warn!(error = %e, "Could not submit still capture");
                self.broadcast_ready(true);
                context.fail(e.into());
            }
        }
    }

    fn fire_deferred(&mut self) {
        match self.deferred.take() {
            Some(context) => self.capture_now(context),
            None => warn!("Lens stopped with a pending trigger but no deferred capture"),
        }
    }

    /// Start a single focus scan and hold focus for a while afterwards
    pub fn trigger_scan(&mut self, tag: Option<RequestTag>) -> DeviceResult<()> {
        let controls = self.controls();
        self.session.submit_af_trigger(&controls, tag)?;

        // The pre-shot tag no longer reaches the preview; fall back to any stop.
        if tag != Some(RequestTag::PreshotTriggeredAf)
            && self.pending == PendingTrigger::WhenStoppedInAuto
        {
            self.pending = PendingTrigger::WhenStopped;
        }

        self.af_mode = AutoFocusMode::SingleTrigger;
        self.preview_tag = tag;
        self.resubmit_preview();

        let messages = self.messages.clone();
        self.revert.schedule(self.focus_hold, move |generation| {
            if let Some(messages) = messages.upgrade() {
                let _ = messages.send(Message::RevertFocusHold(generation));
            }
        });
        Ok(())
    }

    pub fn trigger_auto_focus(&mut self) {
        self.region = MeteringRectangle::ZERO_WEIGHT;
        if let Err(e) = self.trigger_scan(None) {
            warn!(error = %e, "Could not trigger autofocus");
        }
    }

    /// Focus and meter on a normalized preview point
    pub fn trigger_focus_and_meter_at_point(&mut self, nx: f32, ny: f32) {
        let active = self.session.characteristics().active_array;
        self.region = geometry::metering_region(
            nx,
            ny,
            self.zoom.factor(),
            active,
            self.metering_edge,
            self.metering_weight,
        );
        debug!(x = nx, y = ny, region = ?self.region, "Tap to focus");
        if let Err(e) = self.trigger_scan(Some(RequestTag::TapToFocus)) {
            warn!(error = %e, "Could not trigger tap to focus");
        }
    }

    pub fn set_zoom(&mut self, factor: f32) {
        let characteristics = self.session.characteristics();
        let (max_zoom, active) = (characteristics.max_digital_zoom, characteristics.active_array);
        let applied = self.zoom.set(factor, max_zoom, active);
        debug!(requested = factor, zoom = applied, crop = %self.zoom.crop(), "Zoom changed");
        self.resubmit_preview();
    }

    fn on_focus_hold_elapsed(&mut self, generation: u64) {
        if !self.revert.take_if_current(generation) {
            debug!(generation, "Ignoring stale focus hold");
            return;
        }

        debug!("Focus hold elapsed, resuming continuous autofocus");
        if self.pending == PendingTrigger::WhenStoppedInAuto {
            self.pending = PendingTrigger::WhenStopped;
        }
        self.return_to_continuous();
    }

    fn return_to_continuous(&mut self) {
        self.region = MeteringRectangle::ZERO_WEIGHT;
        self.af_mode = AutoFocusMode::Continuous;
        self.preview_tag = None;
        self.resubmit_preview();
    }

    /// Fold one result into the reported state and fire deferred captures
    ///
    /// A partial result carrying AF state is authoritative for its frame; the
    /// matching full result is then skipped.
    pub fn on_result(&mut self, metadata: &ResultMetadata, partial: bool) {
        if partial {
            if metadata.af_state.is_none() {
                return;
            }
            self.partial_frame = Some(metadata.frame_number);
        } else if self.partial_frame == Some(metadata.frame_number) {
            return;
        }

        let (Some(native_mode), Some(native_state)) = (metadata.af_mode, metadata.af_state) else {
            debug!(frame = metadata.frame_number, "Result without autofocus metadata");
            return;
        };
        let mode = AutoFocusMode::from_native(native_mode);
        let state = AutoFocusState::from_native(native_state);

        let changed = mode != self.reported_mode || state != self.reported_state;
        self.reported_mode = mode;
        self.reported_state = state;
        if metadata.focus_distance.is_some() {
            self.focus_distance = metadata.focus_distance;
        }
        if changed {
            debug!(
                frame = metadata.frame_number,
                mode = ?mode,
                %state,
                focus_distance = ?self.focus_distance,
                "Autofocus changed"
            );
            if let Some(listener) = &self.focus_listener {
                listener(mode, state);
            }
        }

        let stopped = state.is_stopped();
        if metadata.tag == Some(RequestTag::PreshotTriggeredAf)
            && stopped
            && self.pending == PendingTrigger::WhenStoppedInAuto
        {
            self.pending = PendingTrigger::None;
            self.fire_deferred();
            self.revert.cancel();
            self.return_to_continuous();
        }
        if self.pending == PendingTrigger::WhenStopped && stopped {
            self.pending = PendingTrigger::None;
            self.fire_deferred();
        }
    }

    fn on_image_ready(&mut self, image: RawImage) -> CaptureResult<()> {
        if !self.session.is_ready() {
            debug!(state = ?self.session.state(), "Dropping image from a discarded session");
            return Ok(());
        }

        let mut context = self.queue.pop_front()?;
        context.session.start_empty();
        if let Err(context) = self.delivery.deliver(context, image) {
            context.fail(CaptureError::Encode("delivery stage stopped".to_string()));
            self.broadcast_ready(true);
        }
        Ok(())
    }

    fn on_configured(&mut self, id: SessionId) {
        if !self.session.is_configuring(id) {
            debug!(session = %id, "Ignoring configuration of superseded session");
            return;
        }

        self.zoom = ZoomState::new(self.session.characteristics().active_array);
        self.region = MeteringRectangle::ZERO_WEIGHT;
        self.af_mode = AutoFocusMode::Continuous;
        self.preview_tag = None;
        let controls = self.controls();
        self.session.on_configured(id, &controls);
    }

    fn reset_for_new_session(&mut self) {
        self.revert.cancel();
        self.pending = PendingTrigger::None;
        self.partial_frame = None;
        self.focus_distance = None;
        self.reported_mode = AutoFocusMode::Continuous;
        self.reported_state = AutoFocusState::Inactive;
        self.abandon_captures();
    }

    pub fn close(&mut self, callback: Option<super::CloseCallback>) {
        if !self.session.close(callback) {
            return;
        }
        self.revert.cancel();
        self.pending = PendingTrigger::None;
        self.abandon_captures();
    }

    fn on_closed(&mut self) {
        self.revert.cancel();
        self.pending = PendingTrigger::None;
        self.abandon_captures();
        self.session.on_closed();
    }

    /// Tear everything down after a fatal fault or once all handles are gone
    pub fn shutdown(&mut self) {
        self.revert.cancel();
        self.pending = PendingTrigger::None;
        self.abandon_captures();
        self.session.abort();
    }

    fn abandon_captures(&mut self) {
        let abandoned = self.queue.abandon() + usize::from(self.deferred.take().is_some());
        if abandoned > 0 {
            info!(abandoned, "Abandoning unfinished captures");
        }
    }

    fn resubmit_preview(&mut self) {
        let controls = self.controls();
        match self.session.repeating_preview(&controls) {
            Ok(()) => {}
            Err(DeviceError::NoSession) => debug!("No ready session, preview not resubmitted"),
            Err(e) => warn!(error = %e, "Could not resubmit preview"),
        }
    }

    fn broadcast_ready(&self, ready: bool) {
        if let Some(listener) = &self.ready_listener {
            listener(ready);
        }
    }

    fn controls(&self) -> RequestControls {
        RequestControls {
            af_mode: self.af_mode,
            region: self.region,
            crop: self.zoom.crop(),
            tag: self.preview_tag,
        }
    }

    pub fn pending_trigger(&self) -> PendingTrigger {
        self.pending
    }

    pub fn queued_captures(&self) -> usize {
        self.queue.len()
    }

    pub fn af_mode(&self) -> AutoFocusMode {
        self.af_mode
    }

    pub fn region(&self) -> MeteringRectangle {
        self.region
    }

    pub fn zoom(&self) -> f32 {
        self.zoom.factor()
    }

    pub fn session_state(&self) -> SessionLifecycleState {
        self.session.state()
    }

    /// Lens focus distance from the latest result that carried one, in diopters
    pub fn focus_distance(&self) -> Option<f32> {
        self.focus_distance
    }

    pub fn revert_pending(&self) -> bool {
        self.revert.is_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::{
        AfTrigger, ControlAfMode, ControlAfState, ImageFormat, ImagePlane, PreviewSurface, Rect,
        Size,
    };
    use crate::engine::params::{CaptureSession, CapturedImage, PhotoCaptureParameters};
    use crate::engine::session::tests::{DeviceLog, RecordingDevice};
    use crate::errors::CaptureError;
    use std::sync::{Arc, Mutex};
    use tokio::sync::{mpsc, oneshot};

    type Pending = oneshot::Receiver<CaptureResult<CapturedImage>>;

    struct Harness {
        coordinator: AutoFocusCoordinator,
        log: Arc<Mutex<DeviceLog>>,
        messages: mpsc::UnboundedReceiver<Message>,
        _sender: mpsc::UnboundedSender<Message>,
        ready: Arc<Mutex<Vec<bool>>>,
        focus: Arc<Mutex<Vec<(AutoFocusMode, AutoFocusState)>>>,
    }

    impl Harness {
        /// Coordinator with a ready session and both listeners installed
        fn new() -> Self {
            let (device, log) = RecordingDevice::new();
            let (sender, messages) = mpsc::unbounded_channel();
            let mut coordinator = AutoFocusCoordinator::new(
                Box::new(device),
                &CaptureConfig::default(),
                ImageExtractor::default(),
                sender.downgrade(),
            );

            let ready = Arc::new(Mutex::new(Vec::new()));
            let focus = Arc::new(Mutex::new(Vec::new()));
            let ready_log = Arc::clone(&ready);
            let focus_log = Arc::clone(&focus);
            coordinator.on_command(Command::SetReadyStateListener(Some(Box::new(
                move |value| ready_log.lock().unwrap().push(value),
            ))));
            coordinator.on_command(Command::SetFocusStateListener(Some(Box::new(
                move |mode, state| focus_log.lock().unwrap().push((mode, state)),
            ))));

            coordinator.on_command(Command::StartPreview {
                surface: PreviewSurface {
                    id: 1,
                    size: Size::new(320, 240),
                },
                callback: Box::new(|result: CaptureResult<()>| assert!(result.is_ok())),
            });
            coordinator
                .handle(Message::Device(DeviceEvent::ConfigureSucceeded(SessionId(1))))
                .unwrap();

            Self {
                coordinator,
                log,
                messages,
                _sender: sender,
                ready,
                focus,
            }
        }

        fn take_picture(&mut self) -> Pending {
            let (tx, rx) = oneshot::channel();
            let session: Box<dyn CaptureSession> = Box::new(tx);
            self.coordinator
                .handle(Message::Command(Command::TakePicture {
                    params: PhotoCaptureParameters::default(),
                    session,
                }))
                .unwrap();
            rx
        }

        fn result(
            &mut self,
            frame: u64,
            tag: Option<RequestTag>,
            mode: ControlAfMode,
            state: ControlAfState,
            partial: bool,
        ) {
            let metadata = ResultMetadata {
                frame_number: frame,
                tag,
                af_mode: Some(mode),
                af_state: Some(state),
                focus_distance: None,
            };
            let event = if partial {
                DeviceEvent::PartialResult(metadata)
            } else {
                DeviceEvent::FullResult(metadata)
            };
            self.coordinator.handle(Message::Device(event)).unwrap();
        }

        fn once(&self) -> Vec<crate::backends::camera::CaptureRequest> {
            self.log.lock().unwrap().once.clone()
        }

        fn last_preview(&self) -> crate::backends::camera::CaptureRequest {
            self.log.lock().unwrap().repeating.last().cloned().unwrap()
        }
    }

    fn jpeg_image() -> RawImage {
        RawImage::new(
            2,
            2,
            ImageFormat::Jpeg,
            vec![ImagePlane {
                data: vec![0xFF, 0xD8, 0xFF, 0xD9],
                row_stride: 0,
                pixel_stride: 0,
            }],
        )
    }

    #[tokio::test]
    async fn test_focused_lens_captures_immediately() {
        let mut h = Harness::new();
        h.result(1, None, ControlAfMode::ContinuousPicture, ControlAfState::PassiveFocused, false);

        let _pending = h.take_picture();
        let once = h.once();
        assert_eq!(once.len(), 1);
        assert!(once[0].targets_still_capture());
        assert_eq!(once[0].tag, Some(RequestTag::Capture));
        assert_eq!(h.coordinator.queued_captures(), 1);
        assert_eq!(*h.ready.lock().unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn test_unfocused_continuous_runs_preshot_scan() {
        let mut h = Harness::new();
        h.result(1, None, ControlAfMode::ContinuousPicture, ControlAfState::PassiveUnfocused, false);

        let _pending = h.take_picture();
        let once = h.once();
        assert_eq!(once.len(), 1);
        assert_eq!(once[0].af_trigger, AfTrigger::Start);
        assert_eq!(once[0].tag, Some(RequestTag::PreshotTriggeredAf));
        assert_eq!(h.coordinator.pending_trigger(), PendingTrigger::WhenStoppedInAuto);
        assert!(h.coordinator.region().is_zero_weight());
        assert_eq!(h.last_preview().tag, Some(RequestTag::PreshotTriggeredAf));
        assert_eq!(h.last_preview().af_mode, ControlAfMode::Auto);

        // Still scanning: nothing fires yet.
        h.result(2, Some(RequestTag::PreshotTriggeredAf), ControlAfMode::Auto, ControlAfState::ActiveScan, false);
        assert_eq!(h.once().len(), 1);

        h.result(3, Some(RequestTag::PreshotTriggeredAf), ControlAfMode::Auto, ControlAfState::FocusedLocked, false);
        let once = h.once();
        assert_eq!(once.len(), 2);
        assert!(once[1].targets_still_capture());
        assert_eq!(h.coordinator.pending_trigger(), PendingTrigger::None);
        assert_eq!(h.coordinator.af_mode(), AutoFocusMode::Continuous);
        assert!(!h.coordinator.revert_pending());
        assert_eq!(h.last_preview().af_mode, ControlAfMode::ContinuousPicture);
        assert_eq!(h.last_preview().tag, None);
    }

    #[tokio::test]
    async fn test_capture_while_trigger_pending_is_ignored() {
        let mut h = Harness::new();
        h.result(1, None, ControlAfMode::ContinuousPicture, ControlAfState::PassiveUnfocused, false);
        let _first = h.take_picture();

        let requests = h.once().len();
        let second = h.take_picture();
        assert_eq!(h.once().len(), requests);
        assert_eq!(h.coordinator.queued_captures(), 0);
        assert_eq!(h.coordinator.pending_trigger(), PendingTrigger::WhenStoppedInAuto);
        // The ignored request is dropped without an answer.
        assert!(second.await.is_err());
    }

    #[tokio::test]
    async fn test_scanning_defers_exactly_one_capture() {
        let mut h = Harness::new();
        h.result(1, None, ControlAfMode::ContinuousPicture, ControlAfState::PassiveScan, false);

        let _pending = h.take_picture();
        assert!(h.once().is_empty());
        assert_eq!(h.coordinator.pending_trigger(), PendingTrigger::WhenStopped);

        h.result(2, None, ControlAfMode::ContinuousPicture, ControlAfState::PassiveFocused, true);
        h.result(2, None, ControlAfMode::ContinuousPicture, ControlAfState::PassiveFocused, false);
        h.result(3, None, ControlAfMode::ContinuousPicture, ControlAfState::PassiveFocused, false);

        assert_eq!(h.once().len(), 1);
        assert_eq!(h.coordinator.queued_captures(), 1);
        assert_eq!(h.coordinator.pending_trigger(), PendingTrigger::None);
    }

    #[tokio::test]
    async fn test_partial_result_is_authoritative_for_its_frame() {
        let mut h = Harness::new();
        h.result(4, None, ControlAfMode::ContinuousPicture, ControlAfState::PassiveScan, true);
        h.result(4, None, ControlAfMode::ContinuousPicture, ControlAfState::PassiveFocused, false);

        assert_eq!(
            *h.focus.lock().unwrap(),
            vec![(AutoFocusMode::Continuous, AutoFocusState::Scanning)]
        );
    }

    #[tokio::test]
    async fn test_listener_only_hears_changes() {
        let mut h = Harness::new();
        h.result(1, None, ControlAfMode::ContinuousPicture, ControlAfState::Inactive, false);
        h.result(2, None, ControlAfMode::ContinuousPicture, ControlAfState::PassiveScan, false);
        h.result(3, None, ControlAfMode::ContinuousPicture, ControlAfState::ActiveScan, false);
        h.result(4, None, ControlAfMode::Auto, ControlAfState::ActiveScan, false);

        assert_eq!(
            *h.focus.lock().unwrap(),
            vec![
                (AutoFocusMode::Continuous, AutoFocusState::Scanning),
                (AutoFocusMode::SingleTrigger, AutoFocusState::Scanning),
            ]
        );
    }

    #[tokio::test]
    async fn test_submission_failure_restores_ready() {
        let mut h = Harness::new();
        h.log.lock().unwrap().reject_once = true;

        let pending = h.take_picture();
        assert_eq!(h.coordinator.queued_captures(), 0);
        assert_eq!(*h.ready.lock().unwrap(), vec![false, true]);
        assert!(matches!(
            pending.await.unwrap(),
            Err(CaptureError::HardwareAccess(_))
        ));
    }

    #[tokio::test]
    async fn test_preshot_trigger_failure_fails_capture() {
        let mut h = Harness::new();
        h.result(1, None, ControlAfMode::ContinuousPicture, ControlAfState::NotFocusedLocked, false);
        h.log.lock().unwrap().reject_once = true;
        // NotFocusedLocked maps to continuous mode, so a pre-shot scan is attempted.
        let pending = h.take_picture();

        assert_eq!(h.coordinator.pending_trigger(), PendingTrigger::None);
        assert!(!h.coordinator.revert_pending());
        assert!(matches!(
            pending.await.unwrap(),
            Err(CaptureError::HardwareAccess(_))
        ));
    }

    #[tokio::test]
    async fn test_image_with_empty_queue_is_fatal() {
        let mut h = Harness::new();
        let err = h
            .coordinator
            .handle(Message::Device(DeviceEvent::ImageReady(jpeg_image())))
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_image_reaches_capture_session_and_restores_ready() {
        let mut h = Harness::new();
        let pending = h.take_picture();
        h.coordinator
            .handle(Message::Device(DeviceEvent::ImageReady(jpeg_image())))
            .unwrap();
        assert_eq!(h.coordinator.queued_captures(), 0);

        let image = pending.await.unwrap().unwrap();
        assert_eq!(image.data, vec![0xFF, 0xD8, 0xFF, 0xD9]);

        let message = h.messages.recv().await.unwrap();
        assert!(matches!(message, Message::CaptureDelivered));
        h.coordinator.handle(message).unwrap();
        assert_eq!(*h.ready.lock().unwrap(), vec![false, true]);
    }

    #[tokio::test]
    async fn test_zoom_is_clamped_and_cropped() {
        let mut h = Harness::new();
        h.coordinator.handle(Message::Command(Command::SetZoom(10.0))).unwrap();

        assert_eq!(h.coordinator.zoom(), 4.0);
        assert_eq!(h.last_preview().crop_region, Some(Rect::new(375, 375, 625, 625)));

        h.coordinator.handle(Message::Command(Command::SetZoom(0.5))).unwrap();
        assert_eq!(h.coordinator.zoom(), 1.0);
    }

    #[tokio::test]
    async fn test_tap_to_focus_meters_at_point() {
        let mut h = Harness::new();
        h.coordinator
            .handle(Message::Command(Command::TriggerFocusAndMeterAt { x: 0.5, y: 0.5 }))
            .unwrap();

        let trigger = &h.once()[0];
        assert_eq!(trigger.tag, Some(RequestTag::TapToFocus));
        assert_eq!(trigger.af_trigger, AfTrigger::Start);
        assert_eq!(trigger.af_regions[0].center(), (500, 500));
        assert_eq!(trigger.ae_regions, trigger.af_regions);
        assert_eq!(h.last_preview().af_mode, ControlAfMode::Auto);
        assert!(h.coordinator.revert_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_focus_hold_returns_to_continuous() {
        let mut h = Harness::new();
        h.coordinator
            .handle(Message::Command(Command::TriggerFocusAndMeterAt { x: 0.2, y: 0.7 }))
            .unwrap();
        assert!(!h.coordinator.region().is_zero_weight());

        let message = h.messages.recv().await.unwrap();
        assert!(matches!(message, Message::RevertFocusHold(_)));
        h.coordinator.handle(message).unwrap();

        assert_eq!(h.coordinator.af_mode(), AutoFocusMode::Continuous);
        assert!(h.coordinator.region().is_zero_weight());
        assert!(!h.coordinator.revert_pending());
        assert_eq!(h.last_preview().af_mode, ControlAfMode::ContinuousPicture);
    }

    #[tokio::test]
    async fn test_close_twice_touches_device_once() {
        let mut h = Harness::new();
        let calls = Arc::new(Mutex::new(0));
        for _ in 0..2 {
            let counter = Arc::clone(&calls);
            h.coordinator
                .handle(Message::Command(Command::Close(Some(Box::new(move || {
                    *counter.lock().unwrap() += 1
                })))))
                .unwrap();
        }
        assert_eq!(h.log.lock().unwrap().closes, 1);
        assert_eq!(h.log.lock().unwrap().aborts, 1);

        let flow = h
            .coordinator
            .handle(Message::Device(DeviceEvent::Closed))
            .unwrap();
        assert_eq!(flow, Flow::Stop);
        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(h.coordinator.session_state(), SessionLifecycleState::Closed);
    }

    #[tokio::test]
    async fn test_close_abandons_deferred_capture() {
        let mut h = Harness::new();
        h.result(1, None, ControlAfMode::ContinuousPicture, ControlAfState::PassiveScan, false);
        let pending = h.take_picture();

        h.coordinator.handle(Message::Command(Command::Close(None))).unwrap();
        assert_eq!(h.coordinator.pending_trigger(), PendingTrigger::None);
        assert!(pending.await.is_err());
    }

    #[tokio::test]
    async fn test_auto_focus_trigger_scans_whole_frame() {
        let mut h = Harness::new();
        h.coordinator
            .handle(Message::Command(Command::TriggerFocusAndMeterAt { x: 0.3, y: 0.6 }))
            .unwrap();
        assert!(!h.coordinator.region().is_zero_weight());

        h.coordinator
            .handle(Message::Command(Command::TriggerAutoFocus))
            .unwrap();

        assert!(h.coordinator.region().is_zero_weight());
        let once = h.once();
        assert_eq!(once.len(), 2);
        let trigger = once.last().unwrap();
        assert_eq!(trigger.tag, None);
        assert_eq!(trigger.af_trigger, AfTrigger::Start);
        assert!(trigger.af_regions.iter().all(|region| region.is_zero_weight()));
        assert_eq!(h.last_preview().af_mode, ControlAfMode::Auto);
        assert_eq!(h.last_preview().tag, None);
        assert_eq!(h.coordinator.af_mode(), AutoFocusMode::SingleTrigger);
        assert!(h.coordinator.revert_pending());
    }

    #[tokio::test]
    async fn test_auto_focus_trigger_demotes_pending_preshot() {
        let mut h = Harness::new();
        h.result(1, None, ControlAfMode::ContinuousPicture, ControlAfState::PassiveUnfocused, false);
        let _pending = h.take_picture();
        assert_eq!(h.coordinator.pending_trigger(), PendingTrigger::WhenStoppedInAuto);

        h.coordinator
            .handle(Message::Command(Command::TriggerAutoFocus))
            .unwrap();
        assert_eq!(h.coordinator.pending_trigger(), PendingTrigger::WhenStopped);

        h.result(2, None, ControlAfMode::Auto, ControlAfState::FocusedLocked, false);
        assert_eq!(h.coordinator.queued_captures(), 1);
        assert_eq!(h.coordinator.pending_trigger(), PendingTrigger::None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_focus_hold_expiry_releases_preshot_capture() {
        let mut h = Harness::new();
        h.result(1, None, ControlAfMode::ContinuousPicture, ControlAfState::PassiveUnfocused, false);
        let _pending = h.take_picture();
        assert_eq!(h.coordinator.pending_trigger(), PendingTrigger::WhenStoppedInAuto);

        let message = h.messages.recv().await.unwrap();
        assert!(matches!(message, Message::RevertFocusHold(_)));
        h.coordinator.handle(message).unwrap();
        assert_eq!(h.coordinator.pending_trigger(), PendingTrigger::WhenStopped);
        assert_eq!(h.coordinator.af_mode(), AutoFocusMode::Continuous);

        // Untagged results now release the capture.
        h.result(2, None, ControlAfMode::ContinuousPicture, ControlAfState::PassiveFocused, false);
        h.result(3, None, ControlAfMode::ContinuousPicture, ControlAfState::PassiveFocused, false);

        let stills = h.once().iter().filter(|r| r.targets_still_capture()).count();
        assert_eq!(stills, 1);
        assert_eq!(h.coordinator.queued_captures(), 1);
        assert_eq!(h.coordinator.pending_trigger(), PendingTrigger::None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tap_during_preshot_releases_capture_on_next_stop() {
        let mut h = Harness::new();
        h.result(1, None, ControlAfMode::ContinuousPicture, ControlAfState::PassiveUnfocused, false);
        let _pending = h.take_picture();

        h.coordinator
            .handle(Message::Command(Command::TriggerFocusAndMeterAt { x: 0.5, y: 0.5 }))
            .unwrap();
        assert_eq!(h.coordinator.pending_trigger(), PendingTrigger::WhenStopped);
        assert_eq!(h.last_preview().tag, Some(RequestTag::TapToFocus));

        h.result(2, Some(RequestTag::TapToFocus), ControlAfMode::Auto, ControlAfState::ActiveScan, false);
        assert_eq!(h.coordinator.queued_captures(), 0);

        h.result(3, Some(RequestTag::TapToFocus), ControlAfMode::Auto, ControlAfState::FocusedLocked, false);
        h.result(4, Some(RequestTag::TapToFocus), ControlAfMode::Auto, ControlAfState::FocusedLocked, false);

        let stills = h.once().iter().filter(|r| r.targets_still_capture()).count();
        assert_eq!(stills, 1);
        assert_eq!(h.coordinator.queued_captures(), 1);
        assert_eq!(h.coordinator.pending_trigger(), PendingTrigger::None);
    }

    struct Panicking;

    impl CaptureSession for Panicking {
        fn on_picture_taken(self: Box<Self>, _image: CapturedImage) {
            panic!("capture session blew up");
        }

        fn on_picture_failed(self: Box<Self>, _error: CaptureError) {}
    }

    #[tokio::test]
    async fn test_dead_delivery_stage_fails_capture_and_restores_ready() {
        let mut h = Harness::new();
        h.coordinator
            .handle(Message::Command(Command::TakePicture {
                params: PhotoCaptureParameters::default(),
                session: Box::new(Panicking),
            }))
            .unwrap();
        h.coordinator
            .handle(Message::Device(DeviceEvent::ImageReady(jpeg_image())))
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while !h.coordinator.delivery.is_stopped() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        let pending = h.take_picture();
        h.coordinator
            .handle(Message::Device(DeviceEvent::ImageReady(jpeg_image())))
            .unwrap();

        assert!(matches!(
            pending.await.unwrap(),
            Err(CaptureError::Encode(_))
        ));
        assert_eq!(h.coordinator.queued_captures(), 0);
        assert_eq!(*h.ready.lock().unwrap(), vec![false, false, true]);
    }

    #[tokio::test]
    async fn test_focus_distance_tracks_latest_report() {
        let mut h = Harness::new();
        let reported = ResultMetadata {
            frame_number: 1,
            tag: None,
            af_mode: Some(ControlAfMode::ContinuousPicture),
            af_state: Some(ControlAfState::PassiveFocused),
            focus_distance: Some(2.0),
        };
        h.coordinator
            .handle(Message::Device(DeviceEvent::FullResult(reported)))
            .unwrap();
        assert_eq!(h.coordinator.focus_distance(), Some(2.0));

        // Results without a distance keep the last one.
        h.result(2, None, ControlAfMode::ContinuousPicture, ControlAfState::PassiveFocused, false);
        assert_eq!(h.coordinator.focus_distance(), Some(2.0));
    }
}
