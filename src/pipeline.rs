//! Run context and the single-threaded detection loop.
//!
//! Each iteration pulls a frame, runs the detector, normalizes the output,
//! buffers annotation records, paints the overlay, shows and records the
//! frame, then waits for a key. The iteration's wall-clock time feeds the
//! frame-rate window. Every exit path (exhaustion, stream failure, quit, or a
//! fatal error) flushes the export and finalizes the recording.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};

use crate::annotate::Accumulator;
use crate::config::RunConfig;
use crate::detect::{normalize_detections, Detector};
use crate::display::{Display, KeyCommand, KeyWait};
use crate::ingest::{FrameSource, Pull};
use crate::record::Recorder;
use crate::render::{paint, plan_overlay};
use crate::source::SourceKind;
use crate::telemetry::FrameRateTracker;
use crate::ui::RunProgress;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopEnd {
    /// The source ran out of frames.
    Exhausted,
    /// A video or camera read failed; the run still cleaned up normally.
    Aborted { reason: String },
    /// The user asked to quit.
    Quit,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub end: LoopEnd,
    pub frames_processed: u64,
    pub detection_passes: u64,
    pub images_skipped: u64,
    pub objects_counted: usize,
    pub average_fps: f64,
    pub export_path: Option<PathBuf>,
    pub export_tasks: Option<usize>,
    pub frames_recorded: u64,
}

/// Mutable state owned by one run.
pub struct RunContext {
    pub accumulator: Option<Accumulator>,
    pub tracker: FrameRateTracker,
    pub recorder: Option<Recorder>,
    frames_processed: u64,
    detection_passes: u64,
    objects_counted: usize,
}

impl RunContext {
    pub fn new(config: &RunConfig, export: bool, recorder: Option<Recorder>) -> Self {
        Self {
            accumulator: export.then(Accumulator::new),
            tracker: FrameRateTracker::new(config.fps_window),
            recorder,
            frames_processed: 0,
            detection_passes: 0,
            objects_counted: 0,
        }
    }
}

pub struct Pipeline {
    config: RunConfig,
    export_path: Option<PathBuf>,
    context: RunContext,
    progress: RunProgress,
}

impl Pipeline {
    pub fn new(config: RunConfig, export_path: Option<PathBuf>, recorder: Option<Recorder>) -> Self {
        let context = RunContext::new(&config, export_path.is_some(), recorder);
        Self {
            config,
            export_path,
            context,
            progress: RunProgress::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: RunProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn run(
        mut self,
        source: &mut FrameSource,
        detector: &mut dyn Detector,
        display: &mut dyn Display,
    ) -> Result<RunSummary> {
        let outcome = self.drive(source, detector, display);
        self.progress.finish();
        let cleanup = self.cleanup();

        let end = match (outcome, cleanup.as_ref()) {
            (Ok(end), _) => end,
            (Err(err), Ok(_)) => return Err(err),
            (Err(err), Err(cleanup_err)) => {
                log::error!("cleanup after failed run also failed: {cleanup_err:#}");
                return Err(err.context(format!("cleanup also failed: {cleanup_err:#}")));
            }
        };
        let (export_tasks, frames_recorded) = cleanup?;
        match &end {
            LoopEnd::Exhausted if !source.kind().is_streaming() => {
                log::info!("all images have been processed");
            }
            LoopEnd::Exhausted => {}
            LoopEnd::Aborted { reason } => log::info!("run ended early: {reason}"),
            LoopEnd::Quit => log::info!("run stopped by user"),
        }

        let average_fps = self.context.tracker.average();
        log::info!("average pipeline FPS: {average_fps:.2}");
        Ok(RunSummary {
            end,
            frames_processed: self.context.frames_processed,
            detection_passes: self.context.detection_passes,
            images_skipped: source.stats().images_skipped,
            objects_counted: self.context.objects_counted,
            average_fps,
            export_path: self.export_path,
            export_tasks,
            frames_recorded,
        })
    }

    fn drive(
        &mut self,
        source: &mut FrameSource,
        detector: &mut dyn Detector,
        display: &mut dyn Display,
    ) -> Result<LoopEnd> {
        let streaming = source.kind().is_streaming();
        let key_wait = match source.kind() {
            SourceKind::Image | SourceKind::Folder => KeyWait::Blocking,
            SourceKind::Video | SourceKind::Camera => KeyWait::Timeout(self.config.stream_key_wait),
        };
        let ctx = &mut self.context;

        loop {
            let started = Instant::now();
            let mut frame = match source.next_frame() {
                Pull::Frame(frame) => frame,
                Pull::Exhausted => return Ok(LoopEnd::Exhausted),
                Pull::Aborted(err) => {
                    return Ok(LoopEnd::Aborted {
                        reason: err.to_string(),
                    })
                }
            };

            let raw = detector
                .infer(frame.pixels())
                .with_context(|| format!("{} inference failed", detector.name()))?;
            ctx.detection_passes += 1;
            let detections =
                normalize_detections(&raw, detector.labels(), frame.width(), frame.height())?;

            if let Some(accumulator) = ctx.accumulator.as_mut() {
                accumulator.record_frame(&frame.export_name(), &detections);
            }

            let fps = streaming.then(|| ctx.tracker.average());
            let plan = plan_overlay(&detections, fps);
            paint(frame.pixels_mut(), &plan);
            display.show(&frame, &plan)?;
            if let Some(recorder) = ctx.recorder.as_mut() {
                recorder.write(frame.pixels())?;
            }

            ctx.frames_processed += 1;
            ctx.objects_counted += detections.object_count;
            self.progress
                .update(ctx.frames_processed, ctx.objects_counted);

            match display.wait_key(key_wait)? {
                Some(KeyCommand::Quit) => return Ok(LoopEnd::Quit),
                Some(KeyCommand::Pause) => {
                    display.wait_key(KeyWait::Blocking)?;
                }
                Some(KeyCommand::Capture) => {
                    let path = &self.config.capture_path;
                    frame
                        .pixels()
                        .save(path)
                        .with_context(|| format!("failed to save capture {}", path.display()))?;
                    log::info!("saved capture to {}", path.display());
                }
                None => {}
            }

            ctx.tracker.record(started.elapsed());
        }
    }

    /// Flush the export and finalize the recording. Both are attempted even
    /// if one fails.
    fn cleanup(&mut self) -> Result<(Option<usize>, u64)> {
        let export = match (&self.export_path, self.context.accumulator.as_ref()) {
            (Some(path), Some(accumulator)) => accumulator
                .write_export(path, &self.config.export)
                .map(Some),
            _ => Ok(None),
        };

        let recorded = match self.context.recorder.as_mut() {
            Some(recorder) => recorder.finish().map(|_| recorder.frames_written()),
            None => Ok(0),
        };

        Ok((export?, recorded?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{ScriptedBackend, ScriptedDetection};
    use crate::display::HeadlessDisplay;
    use crate::frame::Frame;
    use crate::render::OverlayPlan;
    use image::RgbImage;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use tempfile::tempdir;

    struct ScriptedKeys {
        keys: VecDeque<Option<KeyCommand>>,
        waits: Vec<KeyWait>,
    }

    impl Display for ScriptedKeys {
        fn show(&mut self, _frame: &Frame, _plan: &OverlayPlan) -> Result<()> {
            Ok(())
        }

        fn wait_key(&mut self, wait: KeyWait) -> Result<Option<KeyCommand>> {
            self.waits.push(wait);
            Ok(self.keys.pop_front().flatten())
        }
    }

    fn detector() -> ScriptedBackend {
        ScriptedBackend::new(
            vec!["cat".into(), "dog".into()],
            vec![
                ScriptedDetection {
                    xyxy: [0.1, 0.1, 0.5, 0.5],
                    class_index: 0,
                    confidence: 0.9,
                },
                ScriptedDetection {
                    xyxy: [0.5, 0.5, 0.9, 0.9],
                    class_index: 1,
                    confidence: 0.2,
                },
            ],
        )
    }

    fn folder_with(count: usize) -> (tempfile::TempDir, Vec<PathBuf>) {
        let dir = tempdir().expect("tempdir");
        let paths = (0..count)
            .map(|i| {
                let path = dir.path().join(format!("img{i}.png"));
                RgbImage::new(40, 30).save(&path).expect("write png");
                path
            })
            .collect();
        (dir, paths)
    }

    #[test]
    fn quit_stops_before_next_frame() {
        let (_dir, paths) = folder_with(3);
        let mut source = FrameSource::stills(SourceKind::Folder, paths, None, 100);
        let mut display = ScriptedKeys {
            keys: VecDeque::from([None, Some(KeyCommand::Quit)]),
            waits: Vec::new(),
        };
        let summary = Pipeline::new(RunConfig::default(), None, None)
            .run(&mut source, &mut detector(), &mut display)
            .unwrap();
        assert_eq!(summary.end, LoopEnd::Quit);
        assert_eq!(summary.detection_passes, 2);
        assert_eq!(summary.objects_counted, 2);
        assert!(display.waits.iter().all(|w| *w == KeyWait::Blocking));
    }

    #[test]
    fn pause_waits_for_another_key_and_capture_saves_frame() {
        let (dir, paths) = folder_with(2);
        let capture = dir.path().join("capture.png");
        let config = RunConfig {
            capture_path: capture.clone(),
            ..RunConfig::default()
        };
        let mut source = FrameSource::stills(SourceKind::Folder, paths, None, 100);
        let mut display = ScriptedKeys {
            keys: VecDeque::from([Some(KeyCommand::Pause), None, Some(KeyCommand::Capture)]),
            waits: Vec::new(),
        };
        let summary = Pipeline::new(config, None, None)
            .run(&mut source, &mut detector(), &mut display)
            .unwrap();
        assert_eq!(summary.end, LoopEnd::Exhausted);
        assert_eq!(summary.frames_processed, 2);
        assert_eq!(display.waits.len(), 3);
        let saved = image::open(&capture).expect("capture written").to_rgb8();
        assert_eq!(saved.dimensions(), (40, 30));
    }

    #[test]
    fn export_is_flushed_when_user_quits() {
        let (dir, paths) = folder_with(2);
        let export = dir.path().join("preds.json");
        let mut source = FrameSource::stills(SourceKind::Folder, paths, None, 100);
        let mut display = HeadlessDisplay::new(Arc::new(AtomicBool::new(true)));
        let summary = Pipeline::new(RunConfig::default(), Some(export.clone()), None)
            .run(&mut source, &mut detector(), &mut display)
            .unwrap();
        assert_eq!(summary.end, LoopEnd::Quit);
        assert_eq!(summary.export_tasks, Some(1));
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&export).unwrap()).unwrap();
        assert_eq!(json.as_array().map(Vec::len), Some(1));
        assert_eq!(json[0]["predictions"][0]["result"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn loop_error_also_reports_failed_export_write() {
        let (dir, paths) = folder_with(1);
        let mut source = FrameSource::stills(SourceKind::Image, paths, None, 100);
        let mut bad_labels = ScriptedBackend::new(
            vec!["cat".into()],
            vec![ScriptedDetection {
                xyxy: [0.1, 0.1, 0.5, 0.5],
                class_index: 5,
                confidence: 0.9,
            }],
        );
        let mut display = HeadlessDisplay::new(Arc::new(AtomicBool::new(false)));

        // The export target is a directory, so the flush cannot succeed.
        let err = Pipeline::new(RunConfig::default(), Some(dir.path().to_path_buf()), None)
            .run(&mut source, &mut bad_labels, &mut display)
            .unwrap_err();

        let chain = format!("{err:#}");
        assert!(chain.contains("class index 5"), "{chain}");
        assert!(chain.contains("cleanup also failed"), "{chain}");
        assert!(chain.contains("failed to create export file"), "{chain}");
    }
}
