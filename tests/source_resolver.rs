use std::collections::BTreeSet;
use std::path::PathBuf;

use image::RgbImage;
use tempfile::tempdir;

use yolo_annotate::{PipelineError, RunRequest, SourceDescriptor, SourceKind, StartupPlan};

fn touch(path: &std::path::Path) {
    std::fs::write(path, b"x").expect("write file");
}

fn model_file(dir: &std::path::Path) -> PathBuf {
    let model = dir.join("model.json");
    std::fs::write(&model, br#"{"labels":["cat"]}"#).expect("write model");
    model
}

#[test]
fn folder_lists_every_image_extension_and_nothing_else() {
    let dir = tempdir().expect("tempdir");
    let wanted = [
        "a.jpg", "b.JPG", "c.jpeg", "d.JPEG", "e.png", "f.PNG", "g.bmp", "h.BMP",
    ];
    for name in wanted {
        touch(&dir.path().join(name));
    }
    for name in ["notes.txt", "clip.mp4", "img.Jpg", "README", "img.gif"] {
        touch(&dir.path().join(name));
    }
    std::fs::create_dir(dir.path().join("nested.jpg")).expect("nested dir");

    let resolved = SourceDescriptor::resolve(dir.path().to_str().unwrap()).expect("resolve");
    let SourceDescriptor::Folder { images, .. } = resolved else {
        panic!("expected folder, got {resolved:?}");
    };

    let listed: BTreeSet<String> = images
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    let expected: BTreeSet<String> = wanted.iter().map(|s| s.to_string()).collect();
    assert_eq!(images.len(), wanted.len(), "every image exactly once");
    assert_eq!(listed, expected);
}

#[test]
fn files_resolve_by_extension() {
    let dir = tempdir().expect("tempdir");
    let still = dir.path().join("frame.png");
    RgbImage::new(4, 4).save(&still).expect("write png");
    let video = dir.path().join("clip.mkv");
    touch(&video);
    let other = dir.path().join("weights.pt");
    touch(&other);

    assert_eq!(
        SourceDescriptor::resolve(still.to_str().unwrap()).unwrap().kind(),
        SourceKind::Image
    );
    assert_eq!(
        SourceDescriptor::resolve(video.to_str().unwrap()).unwrap().kind(),
        SourceKind::Video
    );
    let err = SourceDescriptor::resolve(other.to_str().unwrap()).unwrap_err();
    assert!(matches!(err, PipelineError::UnsupportedFormat { ref extension, .. } if extension == "pt"));
}

#[test]
fn missing_model_is_checked_before_source() {
    let request = RunRequest {
        model: PathBuf::from("/definitely/not/here.onnx"),
        source: "not-a-source".to_string(),
        thresh: 0.5,
        ..RunRequest::default()
    };
    let err = StartupPlan::validate(&request).unwrap_err();
    assert!(matches!(err, PipelineError::ModelNotFound(_)));
    assert!(err.is_startup());
}

#[test]
fn recording_rules_are_enforced_at_startup() {
    let dir = tempdir().expect("tempdir");
    let model = model_file(dir.path());
    let video = dir.path().join("clip.mp4");
    touch(&video);
    let still = dir.path().join("frame.jpg");
    touch(&still);

    let without_resolution = RunRequest {
        model: model.clone(),
        source: video.to_string_lossy().into_owned(),
        thresh: 0.5,
        record: true,
        ..RunRequest::default()
    };
    assert!(matches!(
        StartupPlan::validate(&without_resolution),
        Err(PipelineError::RecordingResolutionRequired)
    ));

    let on_still = RunRequest {
        source: still.to_string_lossy().into_owned(),
        resolution: Some("640x480".to_string()),
        ..without_resolution.clone()
    };
    assert!(matches!(
        StartupPlan::validate(&on_still),
        Err(PipelineError::RecordingNotSupported)
    ));

    let camera = RunRequest {
        source: "usb0".to_string(),
        resolution: Some("640x480".to_string()),
        ..without_resolution
    };
    let plan = StartupPlan::validate(&camera).expect("camera recording plan");
    assert_eq!(plan.source, SourceDescriptor::Camera(0));
    assert!(plan.record);
    assert_eq!(plan.resolution.map(|r| (r.width, r.height)), Some((640, 480)));
}

#[test]
fn bad_resolution_fails_startup() {
    let dir = tempdir().expect("tempdir");
    let request = RunRequest {
        model: model_file(dir.path()),
        source: "usb1".to_string(),
        thresh: 0.5,
        resolution: Some("640by480".to_string()),
        ..RunRequest::default()
    };
    let err = StartupPlan::validate(&request).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidResolution(_)));
}
