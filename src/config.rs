use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::telemetry::FPS_AVG_LEN;

const DEFAULT_IMAGE_URL_PREFIX: &str = "/data/local-files/?d=inference_images/";
const DEFAULT_MODEL_VERSION: &str = "my_yolo_model";
const DEFAULT_FROM_NAME: &str = "label";
const DEFAULT_TO_NAME: &str = "image";
const DEFAULT_RECORD_PATH: &str = "demo1.avi";
const DEFAULT_RECORD_FPS: u32 = 30;
const DEFAULT_CAPTURE_PATH: &str = "capture.png";
const DEFAULT_STREAM_KEY_WAIT_MS: u64 = 5;
const DEFAULT_PROGRESS_EVERY: usize = 100;

#[derive(Debug, Deserialize, Default)]
struct RunConfigFile {
    export: Option<ExportConfigFile>,
    record: Option<RecordConfigFile>,
    capture_path: Option<PathBuf>,
    stream_key_wait_ms: Option<u64>,
    progress_every: Option<usize>,
    fps_window: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct ExportConfigFile {
    image_url_prefix: Option<String>,
    model_version: Option<String>,
    from_name: Option<String>,
    to_name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RecordConfigFile {
    path: Option<PathBuf>,
    fps: Option<u32>,
}

/// Settings that are not exposed as CLI flags.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub export: ExportSettings,
    pub record: RecordSettings,
    pub capture_path: PathBuf,
    pub stream_key_wait: Duration,
    pub progress_every: usize,
    pub fps_window: usize,
}

/// Label Studio task fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSettings {
    pub image_url_prefix: String,
    pub model_version: String,
    pub from_name: String,
    pub to_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordSettings {
    pub path: PathBuf,
    pub fps: u32,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            image_url_prefix: DEFAULT_IMAGE_URL_PREFIX.to_string(),
            model_version: DEFAULT_MODEL_VERSION.to_string(),
            from_name: DEFAULT_FROM_NAME.to_string(),
            to_name: DEFAULT_TO_NAME.to_string(),
        }
    }
}

impl Default for RecordSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_RECORD_PATH),
            fps: DEFAULT_RECORD_FPS,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            export: ExportSettings::default(),
            record: RecordSettings::default(),
            capture_path: PathBuf::from(DEFAULT_CAPTURE_PATH),
            stream_key_wait: Duration::from_millis(DEFAULT_STREAM_KEY_WAIT_MS),
            progress_every: DEFAULT_PROGRESS_EVERY,
            fps_window: FPS_AVG_LEN,
        }
    }
}

impl RunConfig {
    /// Load from `YOLO_DETECT_CONFIG` (if set), apply env overrides, validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("YOLO_DETECT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RunConfigFile) -> Self {
        let defaults = RunConfig::default();
        let export = match file.export {
            Some(export) => ExportSettings {
                image_url_prefix: export
                    .image_url_prefix
                    .unwrap_or(defaults.export.image_url_prefix),
                model_version: export
                    .model_version
                    .unwrap_or(defaults.export.model_version),
                from_name: export.from_name.unwrap_or(defaults.export.from_name),
                to_name: export.to_name.unwrap_or(defaults.export.to_name),
            },
            None => defaults.export,
        };
        let record = match file.record {
            Some(record) => RecordSettings {
                path: record.path.unwrap_or(defaults.record.path),
                fps: record.fps.unwrap_or(defaults.record.fps),
            },
            None => defaults.record,
        };
        Self {
            export,
            record,
            capture_path: file.capture_path.unwrap_or(defaults.capture_path),
            stream_key_wait: file
                .stream_key_wait_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.stream_key_wait),
            progress_every: file.progress_every.unwrap_or(defaults.progress_every),
            fps_window: file.fps_window.unwrap_or(defaults.fps_window),
        }
    }

    fn apply_env(&mut self) {
        if let Ok(prefix) = std::env::var("YOLO_DETECT_IMAGE_PREFIX") {
            if !prefix.trim().is_empty() {
                self.export.image_url_prefix = prefix;
            }
        }
        if let Ok(version) = std::env::var("YOLO_DETECT_MODEL_VERSION") {
            if !version.trim().is_empty() {
                self.export.model_version = version;
            }
        }
        if let Ok(path) = std::env::var("YOLO_DETECT_RECORD_PATH") {
            if !path.trim().is_empty() {
                self.record.path = PathBuf::from(path);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.record.fps == 0 {
            return Err(anyhow!("record.fps must be greater than zero"));
        }
        if self.progress_every == 0 {
            return Err(anyhow!("progress_every must be greater than zero"));
        }
        if self.fps_window == 0 {
            return Err(anyhow!("fps_window must be greater than zero"));
        }
        if self.export.model_version.trim().is_empty() {
            return Err(anyhow!("export.model_version must not be empty"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<RunConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
