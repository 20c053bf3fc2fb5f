//! Object detection through a pretrained SSD-MobileNet COCO model.
//!
use std::cmp::Ordering;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use ndarray::{s, ArrayView1};
use smallvec::SmallVec;
use tract_onnx::prelude::*;

use common::detection::{BoundingBox, Detection};

use crate::utils::download_file;

type NnModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;
type NnOut = SmallVec<[TValue; 4]>;

/// Positive additive constant to avoid divide-by-zero.
const EPS: f32 = 1.0e-7;

/// Side length of the square network input.
const INPUT_SIZE: usize = 300;

const MODEL_FILE: &str = "ssd_mobilenet_v1_10.onnx";
const MODEL_URL: &str = "https://github.com/onnx/models/raw/main/validated/vision/\
                         object_detection_segmentation/ssd-mobilenetv1/model/ssd_mobilenet_v1_10.onnx";

/// COCO labels indexed by the class ids the model emits. Unused ids are "n/a".
const COCO_LABELS: [&str; 91] = [
    "n/a",
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "n/a",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "n/a",
    "backpack",
    "umbrella",
    "n/a",
    "n/a",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "n/a",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "n/a",
    "dining table",
    "n/a",
    "n/a",
    "toilet",
    "n/a",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "n/a",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Opaque detector collaborator.
///
/// Implementations return unordered, labeled, scored boxes in source-frame
/// pixel coordinates. No determinism across calls is assumed.
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>>;
}

pub struct SsdMobilenet {
    model: NnModel,
    min_confidence: f32,
    max_iou: f32,
}

impl SsdMobilenet {
    /// Load the model, downloading the weights to the cache directory on
    /// first use.
    pub async fn new(min_confidence: f32, max_iou: f32) -> Result<Self> {
        let model_path = cached_model_path().await?;
        let input_fact =
            InferenceFact::dt_shape(u8::datum_type(), tvec!(1, INPUT_SIZE, INPUT_SIZE, 3));
        let model = tract_onnx::onnx()
            .model_for_path(&model_path)?
            .with_input_fact(0, input_fact)?
            .into_optimized()?
            .into_runnable()?;

        log::info!("Loaded SSD-MobileNet from {}", model_path.display());

        Ok(Self {
            model,
            min_confidence,
            max_iou,
        })
    }

    fn preproc(&self, input: &RgbImage) -> Tensor {
        let resized: RgbImage = image::imageops::resize(
            input,
            INPUT_SIZE as u32,
            INPUT_SIZE as u32,
            image::imageops::FilterType::Triangle,
        );

        // The network takes raw u8 pixels in NHWC order.
        tract_ndarray::Array4::from_shape_fn((1, INPUT_SIZE, INPUT_SIZE, 3), |(_, y, x, c)| {
            resized[(x as _, y as _)][c]
        })
        .into()
    }

    /// Map the raw network output to labeled detections in pixel coordinates.
    ///
    /// Output tensors are detection_boxes (normalized y1, x1, y2, x2),
    /// detection_classes, detection_scores and num_detections.
    fn postproc(
        &self,
        raw_nn_out: NnOut,
        frame_width: u32,
        frame_height: u32,
    ) -> Result<Vec<Detection>> {
        let boxes = raw_nn_out[0].to_array_view::<f32>()?;
        let classes = raw_nn_out[1].to_array_view::<f32>()?;
        let scores = raw_nn_out[2].to_array_view::<f32>()?;

        let (width, height) = (frame_width as f32, frame_height as f32);
        let num_candidates = scores.shape()[1];

        let mut candidates = Vec::new();
        for i in 0..num_candidates {
            let confidence = scores[[0, i]];
            if confidence < self.min_confidence {
                continue;
            }

            let class_id = classes[[0, i]] as usize;
            let label = COCO_LABELS.get(class_id).copied().unwrap_or("n/a");

            let bbox: ArrayView1<f32> = boxes.slice(s![0, i, ..]);
            let (y_tl, x_tl) = (bbox[[0]] * height, bbox[[1]] * width);
            let (y_br, x_br) = (bbox[[2]] * height, bbox[[3]] * width);

            candidates.push(Detection {
                label: label.to_owned(),
                confidence,
                bbox: BoundingBox::new(x_tl, y_tl, x_br - x_tl, y_br - y_tl),
            });
        }

        candidates.sort_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(Ordering::Equal)
        });

        Ok(non_maximum_suppression(candidates, self.max_iou))
    }
}

impl Detector for SsdMobilenet {
    fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let (width, height) = frame.dimensions();
        let valid_input = tvec!(self.preproc(frame).into());
        let raw_nn_out = self.model.run(valid_input)?;
        self.postproc(raw_nn_out, width, height)
    }
}

/// Path to the cached model weights, downloading them when missing.
async fn cached_model_path() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .ok_or_else(|| anyhow!("no cache directory on this platform"))?
        .join("petcam");
    let model_path = cache_dir.join(MODEL_FILE);

    if !model_path.exists() {
        log::info!("Downloading detection model to {}", model_path.display());
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("creating {}", cache_dir.display()))?;
        download_file(&reqwest::Client::new(), MODEL_URL, &model_path)
            .await
            .context("downloading model weights")?;
    }

    Ok(model_path)
}

/// Run non-maximum-suppression on candidate detections.
///
/// Candidates must be sorted by ascending confidence. Starting with the most
/// confident candidate, a detection is kept only if it does not exceed
/// `max_iou` with any already kept detection.
fn non_maximum_suppression(
    mut candidates_by_confidence: Vec<Detection>,
    max_iou: f32,
) -> Vec<Detection> {
    let mut selected: Vec<Detection> = Vec::new();
    'candidates: while let Some(candidate) = candidates_by_confidence.pop() {
        for kept in selected.iter() {
            if iou(&candidate.bbox, &kept.bbox) > max_iou {
                continue 'candidates;
            }
        }
        selected.push(candidate);
    }

    selected
}

/// Intersection-over-union of two bounding boxes.
fn iou(bbox_a: &BoundingBox, bbox_b: &BoundingBox) -> f32 {
    let overlap_x_tl = f32::max(bbox_a.x, bbox_b.x);
    let overlap_y_tl = f32::max(bbox_a.y, bbox_b.y);
    let overlap_x_br = f32::min(bbox_a.x + bbox_a.width, bbox_b.x + bbox_b.width);
    let overlap_y_br = f32::min(bbox_a.y + bbox_a.height, bbox_b.y + bbox_b.height);

    // Non-overlapping boxes yield negative extents and thereby zero area.
    let overlap_area =
        f32::max(overlap_x_br - overlap_x_tl, 0.0) * f32::max(overlap_y_br - overlap_y_tl, 0.0);
    let area_a = bbox_a.width * bbox_a.height;
    let area_b = bbox_b.width * bbox_b.height;

    overlap_area / (area_a + area_b - overlap_area + EPS)
}
