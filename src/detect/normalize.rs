//! Detection normalization.
//!
//! Raw detector boxes are truncated to integer pixel corners, put in
//! min/max order, clamped to the frame, and paired with the class name from the detector's label map.
//!
//! The render/count gate is `RENDER_THRESHOLD`, a fixed policy value. The
//! user-supplied `--thresh` is parsed and reported but does not move it.

use crate::error::PipelineError;

use super::backend::RawDetection;

/// Confidence at or above which a detection is drawn and counted.
pub const RENDER_THRESHOLD: f32 = 0.5;

/// Box corners in pixels of the (possibly resized) frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelBox {
    pub xmin: i32,
    pub ymin: i32,
    pub xmax: i32,
    pub ymax: i32,
}

impl PixelBox {
    pub fn width(&self) -> i32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> i32 {
        self.ymax - self.ymin
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub class_index: usize,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: PixelBox,
}

impl Detection {
    pub fn is_rendered(&self) -> bool {
        self.confidence >= RENDER_THRESHOLD
    }
}

/// All detections for one frame plus the frame size they refer to.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameDetections {
    pub detections: Vec<Detection>,
    /// Detections at or above `RENDER_THRESHOLD`.
    pub object_count: usize,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl FrameDetections {
    pub fn rendered(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter().filter(|d| d.is_rendered())
    }
}

pub fn normalize_detections(
    raw: &[RawDetection],
    labels: &[String],
    frame_width: u32,
    frame_height: u32,
) -> Result<FrameDetections, PipelineError> {
    let max_x = frame_width as i32;
    let max_y = frame_height as i32;
    let mut detections = Vec::with_capacity(raw.len());

    for det in raw {
        let class_name = labels
            .get(det.class_index)
            .ok_or(PipelineError::UnknownClassIndex {
                index: det.class_index,
                labels: labels.len(),
            })?
            .clone();
        let [x1, y1, x2, y2] = det.xyxy.map(|v| v as i32);
        let bbox = PixelBox {
            xmin: x1.min(x2).clamp(0, max_x),
            ymin: y1.min(y2).clamp(0, max_y),
            xmax: x1.max(x2).clamp(0, max_x),
            ymax: y1.max(y2).clamp(0, max_y),
        };
        detections.push(Detection {
            class_index: det.class_index,
            class_name,
            confidence: det.confidence.clamp(0.0, 1.0),
            bbox,
        });
    }

    let object_count = detections.iter().filter(|d| d.is_rendered()).count();
    Ok(FrameDetections {
        detections,
        object_count,
        frame_width,
        frame_height,
    })
}
