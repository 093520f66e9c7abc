use std::path::Path;

use anyhow::Result;
use image::RgbImage;

use crate::error::PipelineError;

use super::backends::ScriptedBackend;

/// One unprocessed detector output: pixel-space corners, class, score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawDetection {
    /// `[xmin, ymin, xmax, ymax]` in pixels of the frame passed to `infer`.
    pub xyxy: [f32; 4],
    pub class_index: usize,
    pub confidence: f32,
}

/// Object detector capability.
///
/// Implementations receive each frame read-only and return raw boxes in the
/// pixel space of that frame. The label map is fixed once the model is loaded.
pub trait Detector {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Class index to human-readable name.
    fn labels(&self) -> &[String];

    /// Run detection on one frame.
    fn infer(&mut self, frame: &RgbImage) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Load a detector, choosing the backend from the model file extension.
///
/// - `.json`: scripted fixture model
/// - `.onnx`: YOLOv8 export run through tract (feature: backend-tract)
pub fn load_detector(model_path: &Path) -> Result<Box<dyn Detector>> {
    if !model_path.exists() {
        return Err(PipelineError::ModelNotFound(model_path.to_path_buf()).into());
    }
    let extension = model_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    let mut detector: Box<dyn Detector> = match extension {
        "json" => Box::new(ScriptedBackend::load(model_path)?),
        "onnx" => load_onnx(model_path)?,
        other => {
            return Err(PipelineError::UnsupportedFormat {
                path: model_path.to_path_buf(),
                extension: other.to_string(),
            }
            .into())
        }
    };
    detector.warm_up()?;
    log::info!(
        "loaded {} detector from {} ({} classes)",
        detector.name(),
        model_path.display(),
        detector.labels().len()
    );
    Ok(detector)
}

#[cfg(feature = "backend-tract")]
fn load_onnx(model_path: &Path) -> Result<Box<dyn Detector>> {
    Ok(Box::new(super::backends::TractBackend::load(model_path)?))
}

#[cfg(not(feature = "backend-tract"))]
fn load_onnx(model_path: &Path) -> Result<Box<dyn Detector>> {
    Err(anyhow::anyhow!(
        "cannot load {}: ONNX models require the backend-tract feature",
        model_path.display()
    ))
}
