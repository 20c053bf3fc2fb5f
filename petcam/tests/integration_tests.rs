//! Controller tests with stub collaborators; no camera or model needed.
use std::io::Cursor;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{bail, Result};
use image::RgbImage;

use common::detection::{BoundingBox, CounterState, Detection};
use common::status::StatusLevel;
use petcam::{
    controller::{DetectorSession, WARNING_DISMISS},
    nn::Detector,
    notify::Notifier,
    overlay::OverlayPainter,
    sensors::CameraConfig,
};

struct FixedDetector {
    detections: Vec<Detection>,
}

impl Detector for FixedDetector {
    fn detect(&self, _frame: &RgbImage) -> Result<Vec<Detection>> {
        Ok(self.detections.clone())
    }
}

struct FailingDetector;

impl Detector for FailingDetector {
    fn detect(&self, _frame: &RgbImage) -> Result<Vec<Detection>> {
        bail!("inference backend unavailable")
    }
}

#[derive(Default)]
struct CountingNotifier {
    alerts: AtomicUsize,
}

impl Notifier for CountingNotifier {
    fn alert(&self) {
        self.alerts.fetch_add(1, Ordering::SeqCst);
    }
}

fn detection(label: &str, confidence: f32) -> Detection {
    Detection {
        label: label.to_owned(),
        confidence,
        bbox: BoundingBox::new(10.0, 10.0, 50.0, 50.0),
    }
}

fn session_with(
    detector: impl Detector + 'static,
) -> (Arc<DetectorSession>, Arc<CountingNotifier>) {
    let notifier = Arc::new(CountingNotifier::default());
    let session = DetectorSession::new(
        Arc::new(detector),
        OverlayPainter::new(None),
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        CameraConfig::default(),
    );

    (session, notifier)
}

fn sample_image_bytes() -> Vec<u8> {
    let image = image::DynamicImage::ImageRgb8(RgbImage::new(64, 64));
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, image::ImageOutputFormat::Png)
        .expect("encoding test image");
    buf.into_inner()
}

#[tokio::test]
async fn test_image_pass_counts_one_cat_one_dog() {
    let (session, notifier) = session_with(FixedDetector {
        detections: vec![
            detection("dog", 0.92),
            detection("cat", 0.81),
            detection("person", 0.99),
        ],
    });

    let counters = session.submit_image(&sample_image_bytes()).await.unwrap();

    assert_eq!(counters.cats, 1);
    assert_eq!(counters.dogs, 1);
    assert!((counters.avg_confidence_percent - 86.5).abs() < 0.01);
    assert_eq!(session.counters(), counters);
    // No cooldown applies to uploads; the alert stays silent.
    assert_eq!(notifier.alerts.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_image_pass_without_pets_warns_then_dismisses() {
    let (session, _notifier) = session_with(FixedDetector {
        detections: vec![detection("person", 0.99)],
    });

    let counters = session.submit_image(&sample_image_bytes()).await.unwrap();

    assert_eq!(counters, CounterState::default());
    let status = session.current_status().expect("warning status");
    assert_eq!(status.level, StatusLevel::Warning);

    tokio::time::sleep(WARNING_DISMISS + Duration::from_millis(100)).await;
    assert_eq!(session.current_status(), None);
}

#[tokio::test]
async fn test_inference_error_yields_empty_pass() {
    let (session, notifier) = session_with(FailingDetector);

    let counters = session.submit_image(&sample_image_bytes()).await.unwrap();

    assert_eq!(counters, CounterState::default());
    assert_eq!(notifier.alerts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_decode_error_is_surfaced() {
    let (session, _notifier) = session_with(FixedDetector {
        detections: vec![detection("cat", 0.9)],
    });

    let result = session.submit_image(b"definitely not an image").await;

    assert!(result.is_err());
    let status = session.current_status().expect("error status");
    assert_eq!(status.level, StatusLevel::Error);
    assert_eq!(session.counters(), CounterState::default());
}

#[tokio::test]
async fn test_stop_resets_counters_and_is_idempotent() {
    let (session, _notifier) = session_with(FixedDetector {
        detections: vec![detection("dog", 0.95)],
    });

    let counters = session.submit_image(&sample_image_bytes()).await.unwrap();
    assert_eq!(counters.dogs, 1);

    session.stop_live().await;
    assert_eq!(session.counters(), CounterState::default());

    // Stopping again without an active source changes nothing.
    session.stop_live().await;
    assert_eq!(session.counters(), CounterState::default());
    assert!(!session.is_live().await);
}

#[tokio::test(start_paused = true)]
async fn test_alert_fires_once_per_cooldown_window() {
    let (session, notifier) = session_with(FixedDetector { detections: vec![] });

    assert!(session.notify_if_due(true));
    assert!(!session.notify_if_due(true));
    assert_eq!(notifier.alerts.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_millis(1000)).await;
    assert!(!session.notify_if_due(true));

    tokio::time::advance(Duration::from_millis(1100)).await;
    assert!(session.notify_if_due(true));
    assert_eq!(notifier.alerts.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_no_alert_without_detections() {
    let (session, notifier) = session_with(FixedDetector { detections: vec![] });

    assert!(!session.notify_if_due(false));
    tokio::time::advance(Duration::from_millis(5000)).await;
    assert!(!session.notify_if_due(false));
    assert_eq!(notifier.alerts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_image_pass_publishes_annotated_frame() {
    let (session, _notifier) = session_with(FixedDetector {
        detections: vec![detection("cat", 0.9)],
    });

    let mut frames = session.subscribe_frames();
    session.submit_image(&sample_image_bytes()).await.unwrap();

    let item = frames.recv().await.expect("published frame");
    assert!(item.starts_with("--frame\r\n".as_bytes()));
}
