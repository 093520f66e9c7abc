mod backend;
mod backends;
mod normalize;

pub use backend::{load_detector, Detector, RawDetection};
pub use backends::{ScriptedBackend, ScriptedDetection};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use normalize::{normalize_detections, Detection, FrameDetections, PixelBox, RENDER_THRESHOLD};
