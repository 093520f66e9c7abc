//! YOLO detection runner with Label Studio export.
//!
//! This crate drives an object detector over still images, image folders,
//! video files and USB cameras, draws the results, and optionally writes
//! per-image annotation tasks and an annotated recording.
//!
//! # Pipeline
//!
//! 1. `source`: resolve the `--source` argument and validate the run (`StartupPlan`)
//! 2. `ingest`: pull one frame per iteration from the resolved source
//! 3. `detect`: run the detector and normalize its boxes (`FrameDetections`)
//! 4. `annotate`: buffer percentage boxes per image, export at the end of the run
//! 5. `render` / `display`: overlay, show, and wait for a key
//! 6. `record`: append annotated frames to a video file
//! 7. `telemetry`: rolling average of iteration throughput
//!
//! `pipeline::Pipeline` owns the per-run state and ties the stages together.
//!
//! # Module Structure
//!
//! - `error`: `PipelineError` taxonomy
//! - `config`: secondary settings from `YOLO_DETECT_CONFIG` and the environment
//! - `frame`: the per-iteration pixel buffer
//! - `ui`: console stages and progress

pub mod annotate;
pub mod config;
pub mod detect;
pub mod display;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod record;
pub mod render;
pub mod source;
pub mod telemetry;
pub mod ui;

pub use annotate::{Accumulator, AnnotationRecord, ExportTask, PercentBox};
pub use config::{ExportSettings, RecordSettings, RunConfig};
pub use detect::{
    load_detector, normalize_detections, Detection, Detector, FrameDetections, PixelBox,
    RawDetection, ScriptedBackend, RENDER_THRESHOLD,
};
pub use display::{Display, HeadlessDisplay, KeyCommand, KeyWait, StdinDisplay};
pub use error::PipelineError;
pub use frame::Frame;
pub use ingest::{FrameReader, FrameSource, Pull, SourceStats};
pub use pipeline::{LoopEnd, Pipeline, RunSummary};
pub use record::{FrameSink, Recorder};
pub use source::{Resolution, RunRequest, SourceDescriptor, SourceKind, StartupPlan};
pub use telemetry::{FrameRateTracker, FPS_AVG_LEN};
