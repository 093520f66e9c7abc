use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Result;
use image::RgbImage;
use tempfile::tempdir;

use yolo_annotate::ingest::FrameReader;
use yolo_annotate::{
    load_detector, FrameSink, FrameSource, HeadlessDisplay, LoopEnd, Pipeline, Recorder,
    Resolution, RunConfig, RunRequest, SourceKind, StartupPlan,
};

fn write_model(dir: &Path) -> PathBuf {
    let model = dir.join("model.json");
    std::fs::write(
        &model,
        br#"{
            "labels": ["person", "bicycle", "car"],
            "detections": [
                { "xyxy": [0.25, 0.25, 0.75, 0.75], "class": 0, "confidence": 0.91 },
                { "xyxy": [0.0, 0.0, 0.5, 0.5], "class": 2, "confidence": 0.35 }
            ]
        }"#,
    )
    .expect("write model");
    model
}

fn headless() -> HeadlessDisplay {
    HeadlessDisplay::new(Arc::new(AtomicBool::new(false)))
}

fn plan_for(model: &Path, source: &Path, export: Option<PathBuf>) -> StartupPlan {
    StartupPlan::validate(&RunRequest {
        model: model.to_path_buf(),
        source: source.to_string_lossy().into_owned(),
        thresh: 0.5,
        save_output: export,
        ..RunRequest::default()
    })
    .expect("valid plan")
}

#[test]
fn single_image_runs_one_detection_pass() {
    let dir = tempdir().expect("tempdir");
    let model = write_model(dir.path());
    let image = dir.path().join("photo.jpg");
    RgbImage::new(64, 48).save(&image).expect("write jpg");

    let plan = plan_for(&model, &image, None);
    let config = RunConfig::default();
    let mut detector = load_detector(&plan.model).expect("load detector");
    let mut source =
        FrameSource::open(&plan.source, plan.resolution, config.progress_every).expect("open");

    let summary = Pipeline::new(config, None, None)
        .run(&mut source, detector.as_mut(), &mut headless())
        .expect("run");

    assert_eq!(summary.end, LoopEnd::Exhausted);
    assert_eq!(summary.detection_passes, 1);
    assert_eq!(summary.frames_processed, 1);
    assert_eq!(summary.objects_counted, 1);
    assert!(summary.average_fps > 0.0, "one rate sample is recorded");
    assert_eq!(summary.export_tasks, None);
}

#[test]
fn folder_skips_unreadable_image_and_exports_grouped_tasks() {
    let dir = tempdir().expect("tempdir");
    let model = write_model(dir.path());
    let images = dir.path().join("images");
    std::fs::create_dir(&images).expect("images dir");
    for name in ["a.png", "b.png", "c.jpg"] {
        RgbImage::new(100, 40).save(images.join(name)).expect("write image");
    }
    std::fs::write(images.join("broken.png"), b"truncated").expect("write junk");
    std::fs::write(images.join("notes.txt"), b"ignored").expect("write txt");
    let export = dir.path().join("predictions.json");

    let plan = plan_for(&model, &images, Some(export.clone()));
    let config = RunConfig::default();
    let mut detector = load_detector(&plan.model).expect("load detector");
    let mut source =
        FrameSource::open(&plan.source, plan.resolution, config.progress_every).expect("open");

    let summary = Pipeline::new(config, plan.export_path.clone(), None)
        .run(&mut source, detector.as_mut(), &mut headless())
        .expect("run");

    assert_eq!(summary.end, LoopEnd::Exhausted);
    assert_eq!(summary.detection_passes, 3);
    assert_eq!(summary.images_skipped, 1);
    assert_eq!(summary.export_tasks, Some(3));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&export).expect("export")).expect("json");
    let tasks = json.as_array().expect("array of tasks");
    assert_eq!(tasks.len(), 3);
    for task in tasks {
        let image = task["data"]["image"].as_str().unwrap();
        assert!(image.starts_with("/data/local-files/?d=inference_images/"));
        assert!(!image.ends_with("broken.png"));
        let results = task["predictions"][0]["result"].as_array().unwrap();
        assert_eq!(results.len(), 2, "every detection is exported");
        let first = &results[0]["value"];
        assert_eq!(first["x"], 50.0);
        assert_eq!(first["y"], 50.0);
        assert_eq!(first["width"], 50.0);
        assert_eq!(first["height"], 50.0);
        assert_eq!(first["rectanglelabels"][0], "person");
        assert_eq!(results[1]["value"]["rectanglelabels"][0], "car");
    }
}

#[test]
fn recording_without_resolution_opens_nothing() {
    let dir = tempdir().expect("tempdir");
    let model = write_model(dir.path());
    let video = dir.path().join("clip.avi");
    std::fs::write(&video, b"not really a video").expect("write video");

    let err = StartupPlan::validate(&RunRequest {
        model,
        source: video.to_string_lossy().into_owned(),
        thresh: 0.5,
        record: true,
        ..RunRequest::default()
    })
    .unwrap_err();

    assert!(err.is_startup());
    assert_eq!(err.to_string(), "recording requires an explicit --resolution");
    assert!(!dir.path().join("demo1.avi").exists());
}

struct FakeCamera {
    frames: VecDeque<RgbImage>,
}

impl FrameReader for FakeCamera {
    fn describe(&self) -> String {
        "fake camera".to_string()
    }

    fn read(&mut self) -> Result<Option<RgbImage>> {
        Ok(self.frames.pop_front())
    }
}

#[derive(Default)]
struct Tape {
    frames: Vec<(u32, u32)>,
    finished: bool,
}

struct TapeSink(Rc<RefCell<Tape>>);

impl FrameSink for TapeSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        self.0.borrow_mut().frames.push(frame.dimensions());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.0.borrow_mut().finished = true;
        Ok(())
    }
}

#[test]
fn camera_disconnect_still_flushes_export_and_recording() {
    let dir = tempdir().expect("tempdir");
    let model = write_model(dir.path());
    let export = dir.path().join("stream.json");
    let resolution = Resolution {
        width: 32,
        height: 24,
    };

    let camera = FakeCamera {
        frames: VecDeque::from(vec![RgbImage::new(64, 48), RgbImage::new(64, 48)]),
    };
    let mut source = FrameSource::stream(SourceKind::Camera, Box::new(camera), Some(resolution));
    let tape = Rc::new(RefCell::new(Tape::default()));
    let recorder = Recorder::new(
        Box::new(TapeSink(Rc::clone(&tape))),
        dir.path().join("demo1.avi"),
        resolution,
    );
    let mut detector = load_detector(&model).expect("load detector");

    let summary = Pipeline::new(RunConfig::default(), Some(export.clone()), Some(recorder))
        .run(&mut source, detector.as_mut(), &mut headless())
        .expect("run");

    assert!(matches!(summary.end, LoopEnd::Aborted { .. }));
    assert_eq!(summary.frames_processed, 2);
    assert_eq!(summary.frames_recorded, 2);
    assert!(tape.borrow().finished);
    assert_eq!(tape.borrow().frames, vec![(32, 24), (32, 24)]);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&export).expect("export")).expect("json");
    let names: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["data"]["image"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        [
            "/data/local-files/?d=inference_images/frame_000001",
            "/data/local-files/?d=inference_images/frame_000002",
        ]
    );
}
