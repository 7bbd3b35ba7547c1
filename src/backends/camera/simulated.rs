// SPDX-License-Identifier: GPL-3.0-only

//! Simulated capture device
//!
//! Used by the CLI and the test suite. A sensor task ticks at the configured
//! frame interval; each tick consumes the oldest single-shot request (or the
//! repeating one), advances a small autofocus model and posts partial and
//! full results, followed by a still image when the request targets the
//! still-capture output. Requests are therefore answered strictly in
//! submission order, like real hardware.

use super::types::{
    AfTrigger, CameraCharacteristics, CaptureRequest, ControlAfMode, ControlAfState, ImageFormat,
    ImagePlane, LensFacing, OutputTarget, RawImage, Rect, ResultMetadata, SessionId, Size,
};
use super::{CaptureDevice, DeviceEvent, EventSink};
use crate::constants::JPEG_QUALITY;
use crate::errors::{DeviceError, DeviceResult};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Behaviour of a [`SimulatedCamera`]
#[derive(Debug, Clone)]
pub struct SimulatedCameraConfig {
    pub active_array: Rect,
    pub max_digital_zoom: f32,
    pub lens_facing: LensFacing,
    pub sensor_orientation: u32,
    /// Size of delivered still images
    pub capture_size: Size,
    /// Additional YUV sizes advertised for preview
    pub preview_sizes: Vec<Size>,
    pub frame_interval: Duration,
    /// Frames a scan runs before the lens settles
    pub scan_frames: u32,
    /// Whether passive (continuous) scans end in focus
    pub passive_focus: bool,
    /// Whether triggered scans end in focus
    pub locks_focused: bool,
    /// Post a partial result ahead of every full result
    pub partial_results: bool,
    /// Report every session attempt as failed
    pub fail_configure: bool,
}

impl Default for SimulatedCameraConfig {
    fn default() -> Self {
        Self {
            active_array: Rect::new(0, 0, 4000, 3000),
            max_digital_zoom: 4.0,
            lens_facing: LensFacing::Back,
            sensor_orientation: 90,
            capture_size: Size::new(640, 480),
            preview_sizes: vec![Size::new(1280, 720), Size::new(320, 240)],
            frame_interval: Duration::from_millis(33),
            scan_frames: 3,
            passive_focus: true,
            locks_focused: true,
            partial_results: true,
            fail_configure: false,
        }
    }
}

/// Counters and failure switches shared with a running [`SimulatedCamera`]
///
/// The camera itself moves into the engine; tests keep the probe.
#[derive(Debug, Default)]
pub struct SimulatedProbe {
    sessions: AtomicUsize,
    submitted_once: AtomicUsize,
    submitted_repeating: AtomicUsize,
    aborts: AtomicUsize,
    closes: AtomicUsize,
    images_outstanding: AtomicUsize,
    reject_submissions: AtomicBool,
}

impl SimulatedProbe {
    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub fn submitted_once(&self) -> usize {
        self.submitted_once.load(Ordering::SeqCst)
    }

    pub fn submitted_repeating(&self) -> usize {
        self.submitted_repeating.load(Ordering::SeqCst)
    }

    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Still images delivered but not yet released
    pub fn images_outstanding(&self) -> usize {
        self.images_outstanding.load(Ordering::SeqCst)
    }

    /// Make `submit_once` fail synchronously
    pub fn reject_submissions(&self, reject: bool) {
        self.reject_submissions.store(reject, Ordering::SeqCst);
    }
}

enum SensorCommand {
    Once(CaptureRequest),
    Repeating(CaptureRequest),
    AbortAll,
    Close,
}

struct SensorHandle {
    commands: mpsc::UnboundedSender<SensorCommand>,
    task: JoinHandle<()>,
}

/// Software camera implementing [`CaptureDevice`]
///
/// Must be driven from within a tokio runtime.
pub struct SimulatedCamera {
    config: SimulatedCameraConfig,
    characteristics: CameraCharacteristics,
    probe: Arc<SimulatedProbe>,
    events: Option<EventSink>,
    sensor: Option<SensorHandle>,
    closed: bool,
}

impl SimulatedCamera {
    pub fn new(config: SimulatedCameraConfig) -> Self {
        let mut stream_configurations = vec![
            (ImageFormat::Jpeg, config.capture_size),
            (ImageFormat::Yuv420, config.capture_size),
        ];
        stream_configurations.extend(
            config
                .preview_sizes
                .iter()
                .map(|size| (ImageFormat::Yuv420, *size)),
        );

        let characteristics = CameraCharacteristics {
            active_array: config.active_array,
            max_digital_zoom: config.max_digital_zoom,
            sensor_orientation: config.sensor_orientation,
            lens_facing: config.lens_facing,
            stream_configurations,
        };

        Self {
            config,
            characteristics,
            probe: Arc::new(SimulatedProbe::default()),
            events: None,
            sensor: None,
            closed: false,
        }
    }

    pub fn probe(&self) -> Arc<SimulatedProbe> {
        Arc::clone(&self.probe)
    }

    fn send(&self, command: SensorCommand) -> DeviceResult<()> {
        let sensor = self.sensor.as_ref().ok_or(DeviceError::NoSession)?;
        sensor
            .commands
            .send(command)
            .map_err(|_| DeviceError::Unavailable("sensor task stopped".to_string()))
    }
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new(SimulatedCameraConfig::default())
    }
}

impl CaptureDevice for SimulatedCamera {
    fn characteristics(&self) -> &CameraCharacteristics {
        &self.characteristics
    }

    fn open(&mut self, events: EventSink) -> DeviceResult<()> {
        if self.closed {
            return Err(DeviceError::Unavailable("camera closed".to_string()));
        }
        self.events = Some(events);
        Ok(())
    }

    fn create_session(
        &mut self,
        id: SessionId,
        outputs: &[OutputTarget],
        still_format: ImageFormat,
    ) -> DeviceResult<()> {
        if self.closed {
            return Err(DeviceError::Unavailable("camera closed".to_string()));
        }
        let events = self
            .events
            .clone()
            .ok_or_else(|| DeviceError::Unavailable("camera not opened".to_string()))?;

        if let Some(previous) = self.sensor.take() {
            debug!(session = %id, "Discarding previous simulated session");
            previous.task.abort();
        }
        self.probe.sessions.fetch_add(1, Ordering::SeqCst);

        let still_size = self
            .characteristics
            .output_sizes(still_format)
            .first()
            .copied();
        let still_size = match still_size {
            Some(size) if !self.config.fail_configure => size,
            _ => {
                warn!(session = %id, format = %still_format, "Simulated session configuration failed");
                events.post(DeviceEvent::ConfigureFailed(id));
                return Ok(());
            }
        };

        info!(
            session = %id,
            outputs = outputs.len(),
            format = %still_format,
            size = %still_size,
            "Starting simulated sensor"
        );

        let (commands, receiver) = mpsc::unbounded_channel();
        let sensor = Sensor {
            events,
            probe: Arc::clone(&self.probe),
            frame_interval: self.config.frame_interval,
            partial_results: self.config.partial_results,
            still_format,
            still_size,
            repeating: None,
            once: VecDeque::new(),
            focus: FocusModel::new(&self.config),
            frame_number: 0,
        };
        let task = tokio::spawn(sensor.run(id, receiver));
        self.sensor = Some(SensorHandle { commands, task });
        Ok(())
    }

    fn submit_once(&mut self, request: CaptureRequest) -> DeviceResult<()> {
        if self.probe.reject_submissions.load(Ordering::SeqCst) {
            return Err(DeviceError::Rejected("simulated rejection".to_string()));
        }
        self.send(SensorCommand::Once(request))?;
        self.probe.submitted_once.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn submit_repeating(&mut self, request: CaptureRequest) -> DeviceResult<()> {
        self.send(SensorCommand::Repeating(request))?;
        self.probe.submitted_repeating.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn abort_all(&mut self) -> DeviceResult<()> {
        self.probe.aborts.fetch_add(1, Ordering::SeqCst);
        self.send(SensorCommand::AbortAll)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.probe.closes.fetch_add(1, Ordering::SeqCst);

        let handed_off = self
            .sensor
            .take()
            .map(|sensor| sensor.commands.send(SensorCommand::Close).is_ok())
            .unwrap_or(false);
        if !handed_off && let Some(events) = &self.events {
            events.post(DeviceEvent::Closed);
        }
    }
}

impl Drop for SimulatedCamera {
    fn drop(&mut self) {
        if let Some(sensor) = self.sensor.take() {
            sensor.task.abort();
        }
    }
}

/// Autofocus behaviour: scans run for a fixed number of frames, then settle
struct FocusModel {
    mode: Option<ControlAfMode>,
    state: ControlAfState,
    remaining: u32,
    scan_frames: u32,
    passive_focus: bool,
    locks_focused: bool,
}

impl FocusModel {
    fn new(config: &SimulatedCameraConfig) -> Self {
        Self {
            mode: None,
            state: ControlAfState::Inactive,
            remaining: 0,
            scan_frames: config.scan_frames,
            passive_focus: config.passive_focus,
            locks_focused: config.locks_focused,
        }
    }

    fn advance(&mut self, request: &CaptureRequest) -> ControlAfState {
        if self.mode != Some(request.af_mode) {
            self.mode = Some(request.af_mode);
            self.state = ControlAfState::Inactive;
        }

        match request.af_trigger {
            AfTrigger::Start => {
                self.state = ControlAfState::ActiveScan;
                self.remaining = self.scan_frames;
            }
            AfTrigger::Cancel => self.state = ControlAfState::Inactive,
            AfTrigger::Idle => {
                let continuous = matches!(
                    request.af_mode,
                    ControlAfMode::ContinuousPicture | ControlAfMode::ContinuousVideo
                );
                if continuous && self.state == ControlAfState::Inactive {
                    self.state = ControlAfState::PassiveScan;
                    self.remaining = self.scan_frames;
                }
            }
        }

        match self.state {
            ControlAfState::ActiveScan | ControlAfState::PassiveScan if self.remaining > 0 => {
                self.remaining -= 1;
            }
            ControlAfState::ActiveScan => {
                self.state = if self.locks_focused {
                    ControlAfState::FocusedLocked
                } else {
                    ControlAfState::NotFocusedLocked
                };
            }
            ControlAfState::PassiveScan => {
                self.state = if self.passive_focus {
                    ControlAfState::PassiveFocused
                } else {
                    ControlAfState::PassiveUnfocused
                };
            }
            _ => {}
        }

        self.state
    }
}

struct Sensor {
    events: EventSink,
    probe: Arc<SimulatedProbe>,
    frame_interval: Duration,
    partial_results: bool,
    still_format: ImageFormat,
    still_size: Size,
    repeating: Option<CaptureRequest>,
    once: VecDeque<CaptureRequest>,
    focus: FocusModel,
    frame_number: u64,
}

impl Sensor {
    async fn run(mut self, id: SessionId, mut commands: mpsc::UnboundedReceiver<SensorCommand>) {
        if !self.events.post(DeviceEvent::ConfigureSucceeded(id)) {
            return;
        }

        let mut ticker = tokio::time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SensorCommand::Once(request)) => self.once.push_back(request),
                    Some(SensorCommand::Repeating(request)) => self.repeating = Some(request),
                    Some(SensorCommand::AbortAll) => {
                        debug!(dropped = self.once.len(), "Simulated sensor aborting requests");
                        self.once.clear();
                        self.repeating = None;
                    }
                    Some(SensorCommand::Close) | None => break,
                },
                _ = ticker.tick() => {
                    if !self.capture_frame() {
                        debug!(session = %id, "Event sink gone, stopping simulated sensor");
                        return;
                    }
                }
            }
        }

        debug!(session = %id, frames = self.frame_number, "Simulated sensor closed");
        self.events.post(DeviceEvent::Closed);
    }

    /// Process one frame; returns `false` once nobody is listening
    fn capture_frame(&mut self) -> bool {
        let Some(request) = self.once.pop_front().or_else(|| self.repeating.clone()) else {
            return true;
        };

        self.frame_number += 1;
        let state = self.focus.advance(&request);
        let metadata = ResultMetadata {
            frame_number: self.frame_number,
            tag: request.tag,
            af_mode: Some(request.af_mode),
            af_state: Some(state),
            focus_distance: None,
        };

        if self.partial_results && !self.events.post(DeviceEvent::PartialResult(metadata.clone()))
        {
            return false;
        }
        let full = ResultMetadata {
            focus_distance: Some(focus_distance(state)),
            ..metadata
        };
        if !self.events.post(DeviceEvent::FullResult(full)) {
            return false;
        }

        if request.targets_still_capture() {
            let image = self.still_image(&request);
            return self.events.post(DeviceEvent::ImageReady(image));
        }
        true
    }

    fn still_image(&self, request: &CaptureRequest) -> RawImage {
        let Size { width, height } = self.still_size;
        let planes = match self.still_format {
            ImageFormat::Yuv420 => gradient_yuv(width, height, self.frame_number),
            ImageFormat::Jpeg => {
                let quality = request.jpeg_quality.unwrap_or(JPEG_QUALITY);
                vec![ImagePlane {
                    data: gradient_jpeg(width, height, quality),
                    row_stride: 0,
                    pixel_stride: 0,
                }]
            }
            ImageFormat::Other(_) => Vec::new(),
        };

        self.probe.images_outstanding.fetch_add(1, Ordering::SeqCst);
        let probe = Arc::clone(&self.probe);
        RawImage::new(width, height, self.still_format, planes).with_release(move || {
            probe.images_outstanding.fetch_sub(1, Ordering::SeqCst);
        })
    }
}

fn focus_distance(state: ControlAfState) -> f32 {
    match state {
        ControlAfState::FocusedLocked | ControlAfState::PassiveFocused => 2.0,
        _ => 0.0,
    }
}

fn gradient_yuv(width: u32, height: u32, frame: u64) -> Vec<ImagePlane> {
    let (w, h) = (width as usize, height as usize);
    let shift = (frame % 256) as usize;
    let luma = (0..h)
        .flat_map(|row| (0..w).map(move |col| ((row + col + shift) % 256) as u8))
        .collect();
    let chroma_width = w.div_ceil(2);
    let chroma = |value: u8| ImagePlane {
        data: vec![value; chroma_width * h.div_ceil(2)],
        row_stride: chroma_width,
        pixel_stride: 1,
    };

    vec![
        ImagePlane {
            data: luma,
            row_stride: w,
            pixel_stride: 1,
        },
        chroma(110),
        chroma(140),
    ]
}

fn gradient_jpeg(width: u32, height: u32, quality: u8) -> Vec<u8> {
    let rgb = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut data = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut data, quality);
    if let Err(e) = encoder.encode(
        rgb.as_raw(),
        width,
        height,
        image::ExtendedColorType::Rgb8,
    ) {
        warn!(error = %e, "Simulated JPEG encoding failed");
        data.clear();
    }
    data
}
