#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::{Detector, RawDetection};

/// YOLOv8 square input size.
const INPUT_SIZE: u32 = 640;
/// Proposals below this score are dropped before NMS.
const CONF_FLOOR: f32 = 0.25;
const IOU_THRESHOLD: f32 = 0.45;

/// Tract-based backend for YOLOv8 ONNX exports.
///
/// Output layout is `[1, 4 + classes, proposals]` with `(cx, cy, w, h)` in
/// input-pixel units followed by per-class scores.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    labels: Vec<String>,
}

impl TractBackend {
    /// Load an ONNX model and its `<model>.names` label file.
    pub fn load(model_path: &Path) -> Result<Self> {
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        let labels_path = model_path.with_extension("names");
        let labels = if labels_path.is_file() {
            read_labels(&labels_path)?
        } else {
            log::warn!(
                "no label file at {}; classes will be named by index",
                labels_path.display()
            );
            Vec::new()
        };

        Ok(Self { model, labels })
    }

    fn build_input(&self, frame: &RgbImage) -> Tensor {
        let resized = imageops::resize(frame, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        input.into_tensor()
    }

    fn decode(&mut self, outputs: TVec<TValue>, frame: &RgbImage) -> Result<Vec<RawDetection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = scores.shape().to_vec();
        if shape.len() != 3 || shape[1] <= 4 {
            return Err(anyhow!("unexpected YOLO output shape {:?}", shape));
        }
        let scores = scores
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("YOLO output is not three-dimensional")?;
        let num_classes = shape[1] - 4;
        let num_proposals = shape[2];
        if self.labels.is_empty() {
            self.labels = (0..num_classes).map(|c| format!("class{c}")).collect();
        }

        let scale_x = frame.width() as f32 / INPUT_SIZE as f32;
        let scale_y = frame.height() as f32 / INPUT_SIZE as f32;

        let mut candidates = Vec::new();
        for i in 0..num_proposals {
            let (class_index, confidence) = (0..num_classes)
                .map(|c| (c, scores[[0, 4 + c, i]]))
                .fold((0, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            if confidence < CONF_FLOOR {
                continue;
            }
            let cx = scores[[0, 0, i]];
            let cy = scores[[0, 1, i]];
            let w = scores[[0, 2, i]];
            let h = scores[[0, 3, i]];
            candidates.push(RawDetection {
                xyxy: [
                    (cx - w / 2.0) * scale_x,
                    (cy - h / 2.0) * scale_y,
                    (cx + w / 2.0) * scale_x,
                    (cy + h / 2.0) * scale_y,
                ],
                class_index,
                confidence,
            });
        }

        Ok(nms(candidates, IOU_THRESHOLD))
    }
}

impl Detector for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn infer(&mut self, frame: &RgbImage) -> Result<Vec<RawDetection>> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbImage::new(INPUT_SIZE, INPUT_SIZE);
        self.infer(&blank).map(|_| ())
    }
}

fn read_labels(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read label file {}", path.display()))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = ix * iy;
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Greedy per-class NMS: sort by confidence, suppress overlapping boxes.
fn nms(mut boxes: Vec<RawDetection>, iou_thresh: f32) -> Vec<RawDetection> {
    boxes.sort_unstable_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawDetection> = Vec::new();
    let mut suppressed = vec![false; boxes.len()];

    for i in 0..boxes.len() {
        if suppressed[i] {
            continue;
        }
        kept.push(boxes[i]);
        for j in (i + 1)..boxes.len() {
            if boxes[i].class_index == boxes[j].class_index
                && iou(&boxes[i].xyxy, &boxes[j].xyxy) > iou_thresh
            {
                suppressed[j] = true;
            }
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(xyxy: [f32; 4], class_index: usize, confidence: f32) -> RawDetection {
        RawDetection {
            xyxy,
            class_index,
            confidence,
        }
    }

    #[test]
    fn nms_keeps_best_overlapping_box_per_class() {
        let kept = nms(
            vec![
                det([0.0, 0.0, 10.0, 10.0], 0, 0.6),
                det([1.0, 1.0, 10.0, 10.0], 0, 0.9),
                det([1.0, 1.0, 10.0, 10.0], 1, 0.7),
                det([50.0, 50.0, 60.0, 60.0], 0, 0.5),
            ],
            IOU_THRESHOLD,
        );
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].confidence, 0.9);
        assert!(kept.iter().any(|d| d.class_index == 1));
    }

    #[test]
    fn disjoint_boxes_have_zero_iou() {
        assert_eq!(iou(&[0.0, 0.0, 1.0, 1.0], &[2.0, 2.0, 3.0, 3.0]), 0.0);
    }
}
