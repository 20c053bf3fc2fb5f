//! The detection loop controller.
//!
//! One session owns the detector, the overlay painter, the status board and
//! the alert throttle, and drives the acquire, infer, paint, aggregate,
//! publish cycle for a live camera or a single uploaded image.
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use image::RgbImage;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use common::detection::{filter_pets, CounterState};
use common::status::{Status, StatusLevel};

use crate::{
    as_jpeg_stream_item, frame_channel,
    meter::METER,
    nn::Detector,
    notify::{AlertThrottle, Notifier},
    overlay::OverlayPainter,
    sensors::{self, CameraConfig, CaptureFn},
    status::StatusBoard,
    FrameReceiver, FrameSender,
};

/// Minimum interval between consecutive alerts.
pub const ALERT_COOLDOWN: Duration = Duration::from_millis(2000);

/// How long success statuses stay visible.
const SUCCESS_DISMISS: Duration = Duration::from_secs(2);

/// How long the no-detections warning stays visible.
pub const WARNING_DISMISS: Duration = Duration::from_secs(3);

/// JPEG quality of published annotated frames.
const JPEG_QUALITY: i32 = 95;

/// Session state for one detection loop.
///
/// Live capture and uploaded images are mutually exclusive frame sources;
/// submitting an image stops a running live loop first.
pub struct DetectorSession {
    detector: Arc<dyn Detector>,
    painter: OverlayPainter,
    status: StatusBoard,
    notifier: Arc<dyn Notifier>,
    throttle: AlertThrottle,
    counters_tx: watch::Sender<CounterState>,
    frames_tx: FrameSender,
    live: Mutex<Option<LiveSource>>,
    camera: CameraConfig,
}

struct LiveSource {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Result of one detection pass before publication.
struct PassOutcome {
    annotated: RgbImage,
    counters: CounterState,
}

impl DetectorSession {
    pub fn new(
        detector: Arc<dyn Detector>,
        painter: OverlayPainter,
        notifier: Arc<dyn Notifier>,
        camera: CameraConfig,
    ) -> Arc<Self> {
        let (frames_tx, _rx) = frame_channel();
        let (counters_tx, _rx) = watch::channel(CounterState::default());

        Arc::new(Self {
            detector,
            painter,
            status: StatusBoard::new(),
            notifier,
            throttle: AlertThrottle::new(ALERT_COOLDOWN),
            counters_tx,
            frames_tx,
            live: Mutex::new(None),
            camera,
        })
    }

    /// Acquire the camera and start the live detection loop.
    ///
    /// Fails without starting a loop when the camera cannot be acquired.
    /// A no-op when a live loop is already running.
    pub async fn start_live(self: &Arc<Self>) -> Result<()> {
        let mut live = self.live.lock().await;
        if let Some(existing) = live.as_ref() {
            if !existing.task.is_finished() {
                log::debug!("Live source already active");
                return Ok(());
            }
            // The loop exited on its own, e.g. the camera went away.
            live.take();
        }

        self.status
            .announce(StatusLevel::Info, "Requesting camera access");

        let camera = self.camera.clone();
        let capture = tokio::task::spawn_blocking(move || sensors::get_capture_fn(&camera))
            .await
            .context("camera setup task panicked")?;
        let capture = match capture {
            Ok(capture) => capture,
            Err(err) => {
                self.status.announce(
                    StatusLevel::Error,
                    "Camera permission denied or no camera available",
                );
                return Err(err.context("acquiring camera"));
            }
        };

        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(self).live_loop(capture, cancel.clone()));
        *live = Some(LiveSource { cancel, task });

        self.status
            .announce_transient(StatusLevel::Success, "Camera started", SUCCESS_DISMISS);

        Ok(())
    }

    /// Stop the live loop, release the camera and reset the counters.
    ///
    /// Idempotent; a no-op when no live source is active.
    pub async fn stop_live(&self) {
        let taken = self.live.lock().await.take();
        let Some(live) = taken else { return };

        live.cancel.cancel();
        if let Err(err) = live.task.await {
            log::warn!("Live loop task failed: {err}");
        }

        self.counters_tx.send_replace(CounterState::default());
        self.status
            .announce_transient(StatusLevel::Success, "Camera stopped", SUCCESS_DISMISS);
    }

    /// Run a single detection pass over an uploaded image.
    ///
    /// Stops a running live source first. Announces a warning when no cats
    /// or dogs are found.
    pub async fn submit_image(&self, bytes: &[u8]) -> Result<CounterState> {
        self.stop_live().await;

        let decoded = match image::load_from_memory(bytes) {
            Ok(decoded) => decoded.to_rgb8(),
            Err(err) => {
                self.status
                    .announce(StatusLevel::Error, "Could not decode the uploaded image");
                return Err(anyhow::Error::new(err).context("decoding uploaded image"));
            }
        };

        let outcome = self.run_pass(decoded);
        let counters = outcome.counters.clone();
        self.publish(&outcome);

        if counters.total() == 0 {
            self.status.announce_transient(
                StatusLevel::Warning,
                "No cats or dogs detected in the image",
                WARNING_DISMISS,
            );
        } else {
            self.status.clear();
        }

        Ok(counters)
    }

    /// Fire the alert if this pass retained detections and the cooldown has
    /// elapsed. Returns whether the alert fired.
    pub fn notify_if_due(&self, has_detections: bool) -> bool {
        if !has_detections || !self.throttle.acquire() {
            return false;
        }

        self.notifier.alert();
        METER.tick_alert();
        true
    }

    /// Counters of the most recent pass.
    pub fn counters(&self) -> CounterState {
        self.counters_tx.borrow().clone()
    }

    pub fn subscribe_counters(&self) -> watch::Receiver<CounterState> {
        self.counters_tx.subscribe()
    }

    /// Subscribe to the annotated JPEG frame stream.
    pub fn subscribe_frames(&self) -> FrameReceiver {
        self.frames_tx.subscribe()
    }

    pub fn current_status(&self) -> Option<Status> {
        self.status.current()
    }

    pub async fn is_live(&self) -> bool {
        self.live.lock().await.is_some()
    }

    async fn live_loop(self: Arc<Self>, capture: CaptureFn, cancel: CancellationToken) {
        log::info!("Live detection loop started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let Some(frame) = capture() else {
                log::error!("Camera capture failed, stopping live loop");
                self.status
                    .announce(StatusLevel::Error, "Camera stream ended unexpectedly");
                break;
            };

            let decoded = turbojpeg::decompress_image(&frame[..]);
            drop(frame);
            let image: RgbImage = match decoded {
                Ok(image) => image,
                Err(err) => {
                    log::error!("Failed to decode camera frame: {err}");
                    continue;
                }
            };

            let outcome = self.run_pass(image);

            // A stop may have been requested while the pass ran; its results
            // must not surface in that case.
            if cancel.is_cancelled() {
                break;
            }

            self.publish(&outcome);
            self.notify_if_due(outcome.counters.total() > 0);

            tokio::task::yield_now().await;
        }

        log::info!("Live detection loop stopped");
    }

    /// One infer, filter, aggregate, paint cycle over a frame.
    ///
    /// A failed inference is logged and treated as an empty result; it never
    /// tears down the loop.
    fn run_pass(&self, frame: RgbImage) -> PassOutcome {
        let raw_detections = match self.detector.detect(&frame) {
            Ok(detections) => detections,
            Err(err) => {
                log::error!("Inference failed: {err:#}");
                Vec::new()
            }
        };

        let pets = filter_pets(raw_detections);
        let counters = CounterState::from_pets(&pets);
        let annotated = self.painter.paint(frame, &pets);

        PassOutcome {
            annotated,
            counters,
        }
    }

    fn publish(&self, outcome: &PassOutcome) {
        self.counters_tx.send_replace(outcome.counters.clone());

        match turbojpeg::compress_image(&outcome.annotated, JPEG_QUALITY, turbojpeg::Subsamp::Sub2x2)
        {
            Ok(buf) => {
                self.frames_tx.send(as_jpeg_stream_item(&buf)).ok();
            }
            Err(err) => log::error!("Failed to encode annotated frame: {err}"),
        }

        METER.tick_pass();
    }
}
