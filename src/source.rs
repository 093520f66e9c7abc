//! Source resolution and startup validation.
//!
//! A user-supplied source string is classified exactly once, before any
//! capture handle or writer is opened:
//! - an existing directory becomes a folder of still images
//! - an existing file becomes a still image or a video, by extension
//! - `usb<N>` becomes a live camera at index `N`
//!
//! Validation order is fixed: model path, source, resolution, recording.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::PipelineError;

/// Still-image extensions (case variants are matched literally).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "JPG", "jpeg", "JPEG", "png", "PNG", "bmp", "BMP"];

/// Video container extensions.
pub const VIDEO_EXTENSIONS: &[&str] = &["avi", "mov", "mp4", "mkv", "wmv"];

const CAMERA_PATTERN: &str = r"^usb(\d+)$";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Image,
    Folder,
    Video,
    Camera,
}

impl SourceKind {
    /// Video and camera sources produce frames until the stream ends.
    pub fn is_streaming(self) -> bool {
        matches!(self, SourceKind::Video | SourceKind::Camera)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Image => "image",
            SourceKind::Folder => "folder",
            SourceKind::Video => "video",
            SourceKind::Camera => "camera",
        };
        f.write_str(name)
    }
}

/// Resolved input. Exactly one kind is active.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceDescriptor {
    Image(PathBuf),
    /// Qualifying images in directory enumeration order.
    Folder { dir: PathBuf, images: Vec<PathBuf> },
    Video(PathBuf),
    Camera(u32),
}

impl SourceDescriptor {
    pub fn resolve(input: &str) -> Result<Self, PipelineError> {
        let path = Path::new(input);
        if path.is_dir() {
            let images = list_images(path)
                .map_err(|_| PipelineError::InvalidSource(input.to_string()))?;
            return Ok(SourceDescriptor::Folder {
                dir: path.to_path_buf(),
                images,
            });
        }
        if path.is_file() {
            let extension = path
                .extension()
                .and_then(|ext| ext.to_str())
                .unwrap_or_default();
            if IMAGE_EXTENSIONS.contains(&extension) {
                return Ok(SourceDescriptor::Image(path.to_path_buf()));
            }
            if VIDEO_EXTENSIONS.contains(&extension) {
                return Ok(SourceDescriptor::Video(path.to_path_buf()));
            }
            return Err(PipelineError::UnsupportedFormat {
                path: path.to_path_buf(),
                extension: extension.to_string(),
            });
        }
        if let Some(index) = parse_camera_index(input) {
            return Ok(SourceDescriptor::Camera(index));
        }
        Err(PipelineError::InvalidSource(input.to_string()))
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            SourceDescriptor::Image(_) => SourceKind::Image,
            SourceDescriptor::Folder { .. } => SourceKind::Folder,
            SourceDescriptor::Video(_) => SourceKind::Video,
            SourceDescriptor::Camera(_) => SourceKind::Camera,
        }
    }
}

/// Parse `usb<N>` into `N`. Anything else (including overflow) is `None`.
pub fn parse_camera_index(input: &str) -> Option<u32> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(CAMERA_PATTERN).expect("camera pattern"));
    pattern
        .captures(input)
        .and_then(|caps| caps.get(1))
        .and_then(|digits| digits.as_str().parse().ok())
}

fn list_images(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let qualifies = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext));
        if qualifies {
            images.push(path);
        }
    }
    Ok(images)
}

/// Requested display/record resolution, parsed from `WxH`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl FromStr for Resolution {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PipelineError::InvalidResolution(s.to_string());
        let (w, h) = s.split_once('x').ok_or_else(invalid)?;
        let width: u32 = w.parse().map_err(|_| invalid())?;
        let height: u32 = h.parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Resolution { width, height })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Raw run arguments as the user supplied them.
#[derive(Clone, Debug, Default)]
pub struct RunRequest {
    pub model: PathBuf,
    pub source: String,
    pub thresh: f32,
    pub resolution: Option<String>,
    pub record: bool,
    pub save_output: Option<PathBuf>,
}

/// Validated run arguments. Constructing one opens nothing.
#[derive(Clone, Debug)]
pub struct StartupPlan {
    pub model: PathBuf,
    pub source: SourceDescriptor,
    pub resolution: Option<Resolution>,
    pub record: bool,
    pub export_path: Option<PathBuf>,
    /// Parsed and reported, but the render gate is `RENDER_THRESHOLD`.
    pub min_thresh: f32,
}

impl StartupPlan {
    pub fn validate(request: &RunRequest) -> Result<Self, PipelineError> {
        if !request.model.exists() {
            return Err(PipelineError::ModelNotFound(request.model.clone()));
        }
        let source = SourceDescriptor::resolve(&request.source)?;
        let resolution = request
            .resolution
            .as_deref()
            .map(str::parse::<Resolution>)
            .transpose()?;
        if request.record {
            if !source.kind().is_streaming() {
                return Err(PipelineError::RecordingNotSupported);
            }
            if resolution.is_none() {
                return Err(PipelineError::RecordingResolutionRequired);
            }
        }
        Ok(Self {
            model: request.model.clone(),
            source,
            resolution,
            record: request.record,
            export_path: request.save_output.clone(),
            min_thresh: request.thresh,
        })
    }
}
