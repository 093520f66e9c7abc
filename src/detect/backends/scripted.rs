//! Fixture-driven backend.
//!
//! A JSON "model" lists the class labels and the detections to emit for every
//! frame. Boxes are given in normalized 0..1 coordinates and scaled to the
//! size of each frame, so one fixture works at any resolution.
//!
//! ```json
//! {
//!   "labels": ["cat", "dog"],
//!   "detections": [{ "xyxy": [0.1, 0.2, 0.5, 0.6], "class": 1, "confidence": 0.9 }]
//! }
//! ```

use std::path::Path;

use anyhow::{anyhow, Result};
use image::RgbImage;
use serde::Deserialize;

use crate::detect::backend::{Detector, RawDetection};

#[derive(Debug, Deserialize)]
struct ScriptFile {
    labels: Vec<String>,
    #[serde(default)]
    detections: Vec<ScriptedDetection>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ScriptedDetection {
    pub xyxy: [f32; 4],
    #[serde(rename = "class")]
    pub class_index: usize,
    pub confidence: f32,
}

pub struct ScriptedBackend {
    labels: Vec<String>,
    detections: Vec<ScriptedDetection>,
}

impl ScriptedBackend {
    pub fn new(labels: Vec<String>, detections: Vec<ScriptedDetection>) -> Self {
        Self { labels, detections }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read model file {}: {}", path.display(), e))?;
        let script: ScriptFile = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid scripted model {}: {}", path.display(), e))?;
        if script.labels.is_empty() {
            return Err(anyhow!("scripted model {} has no labels", path.display()));
        }
        Ok(Self::new(script.labels, script.detections))
    }
}

impl Detector for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn infer(&mut self, frame: &RgbImage) -> Result<Vec<RawDetection>> {
        let (w, h) = (frame.width() as f32, frame.height() as f32);
        Ok(self
            .detections
            .iter()
            .map(|d| RawDetection {
                xyxy: [d.xyxy[0] * w, d.xyxy[1] * h, d.xyxy[2] * w, d.xyxy[3] * h],
                class_index: d.class_index,
                confidence: d.confidence,
            })
            .collect())
    }
}
