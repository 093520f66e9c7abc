//! Annotation accumulation and Label Studio export.
//!
//! Every detection of every processed frame is converted to a center-based
//! percentage box and buffered. At the end of the run the buffer is grouped by
//! image name into one task per image and written as a JSON array.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::ExportSettings;
use crate::detect::{FrameDetections, PixelBox};

/// Box as percentages (0..100) of the frame, `x`/`y` at the box center.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PercentBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PercentBox {
    pub fn from_pixels(bbox: &PixelBox, frame_width: u32, frame_height: u32) -> Self {
        let fw = f64::from(frame_width.max(1));
        let fh = f64::from(frame_height.max(1));
        let (xmin, ymin) = (f64::from(bbox.xmin), f64::from(bbox.ymin));
        let (xmax, ymax) = (f64::from(bbox.xmax), f64::from(bbox.ymax));
        Self {
            x: (xmin + xmax) / 2.0 / fw * 100.0,
            y: (ymin + ymax) / 2.0 / fh * 100.0,
            width: (xmax - xmin) / fw * 100.0,
            height: (ymax - ymin) / fh * 100.0,
        }
    }

    /// Inverse of `from_pixels`, rounded to the nearest pixel.
    pub fn to_pixels(&self, frame_width: u32, frame_height: u32) -> PixelBox {
        let fw = f64::from(frame_width);
        let fh = f64::from(frame_height);
        let cx = self.x / 100.0 * fw;
        let cy = self.y / 100.0 * fh;
        let w = self.width / 100.0 * fw;
        let h = self.height / 100.0 * fh;
        PixelBox {
            xmin: (cx - w / 2.0).round() as i32,
            ymin: (cy - h / 2.0).round() as i32,
            xmax: (cx + w / 2.0).round() as i32,
            ymax: (cy + h / 2.0).round() as i32,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationRecord {
    pub image_name: String,
    pub bbox: PercentBox,
    pub class_names: Vec<String>,
    pub confidence: f32,
}

/// Run-wide buffer of annotation records. Grows until export.
#[derive(Debug, Default)]
pub struct Accumulator {
    records: Vec<AnnotationRecord>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer one record per detection of a processed frame.
    pub fn record_frame(&mut self, image_name: &str, frame: &FrameDetections) {
        for det in &frame.detections {
            self.records.push(AnnotationRecord {
                image_name: image_name.to_string(),
                bbox: PercentBox::from_pixels(&det.bbox, frame.frame_width, frame.frame_height),
                class_names: vec![det.class_name.clone()],
                confidence: det.confidence,
            });
        }
    }

    pub fn records(&self) -> &[AnnotationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Group records into one task per image, in first-seen order.
    pub fn to_tasks(&self, settings: &ExportSettings) -> Vec<ExportTask> {
        let mut tasks: Vec<ExportTask> = Vec::new();
        let mut by_name: HashMap<&str, usize> = HashMap::new();

        for record in &self.records {
            let slot = *by_name
                .entry(record.image_name.as_str())
                .or_insert_with(|| {
                    tasks.push(ExportTask::new(&record.image_name, settings));
                    tasks.len() - 1
                });
            tasks[slot].predictions[0]
                .result
                .push(BoxResult::from_record(record, settings));
        }

        tasks
    }

    /// Serialize the grouped tasks to `path`. Returns the number of tasks.
    pub fn write_export(&self, path: &Path, settings: &ExportSettings) -> Result<usize> {
        let tasks = self.to_tasks(settings);
        let file = File::create(path)
            .with_context(|| format!("failed to create export file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut writer, formatter);
        tasks
            .serialize(&mut ser)
            .with_context(|| format!("failed to serialize export to {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("failed to write export file {}", path.display()))?;
        log::info!(
            "predictions saved to {} ({} tasks, {} results)",
            path.display(),
            tasks.len(),
            self.records.len()
        );
        Ok(tasks.len())
    }
}

// ----------------------------------------------------------------------------
// Label Studio task schema
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExportTask {
    pub data: TaskData,
    pub predictions: Vec<Prediction>,
}

impl ExportTask {
    fn new(image_name: &str, settings: &ExportSettings) -> Self {
        Self {
            data: TaskData {
                image: format!("{}{}", settings.image_url_prefix, image_name),
            },
            predictions: vec![Prediction {
                model_version: settings.model_version.clone(),
                result: Vec::new(),
            }],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TaskData {
    pub image: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    pub model_version: String,
    pub result: Vec<BoxResult>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BoxResult {
    pub from_name: String,
    pub to_name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: RectangleValue,
    pub score: f32,
}

impl BoxResult {
    fn from_record(record: &AnnotationRecord, settings: &ExportSettings) -> Self {
        Self {
            from_name: settings.from_name.clone(),
            to_name: settings.to_name.clone(),
            kind: "rectanglelabels".to_string(),
            value: RectangleValue {
                x: record.bbox.x,
                y: record.bbox.y,
                width: record.bbox.width,
                height: record.bbox.height,
                rotation: 0,
                rectanglelabels: record.class_names.clone(),
            },
            score: record.confidence,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RectangleValue {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub rotation: i32,
    pub rectanglelabels: Vec<String>,
}
