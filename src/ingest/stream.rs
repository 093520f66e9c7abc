//! Streaming frame source (video files and cameras).

use super::{FrameReader, Pull};
use crate::error::PipelineError;
use crate::frame::Frame;
use crate::source::SourceKind;

pub struct StreamSource {
    kind: SourceKind,
    reader: Box<dyn FrameReader>,
}

impl StreamSource {
    pub fn new(kind: SourceKind, reader: Box<dyn FrameReader>) -> Self {
        Self { kind, reader }
    }

    pub(crate) fn next_frame(&mut self, sequence: u64) -> Pull {
        match self.reader.read() {
            Ok(Some(pixels)) => Pull::Frame(Frame::new(pixels, None, sequence)),
            Ok(None) if self.kind == SourceKind::Video => {
                log::info!("reached end of the video file");
                Pull::Exhausted
            }
            Ok(None) => {
                log::warn!(
                    "unable to read frames from {}; the camera is disconnected or not working",
                    self.reader.describe()
                );
                Pull::Aborted(PipelineError::StreamReadFailure {
                    source_name: self.reader.describe(),
                    reason: "no frame returned".to_string(),
                })
            }
            Err(err) => {
                let reason = format!("{err:#}");
                if self.kind == SourceKind::Camera {
                    log::warn!(
                        "unable to read frames from {}; the camera is disconnected or not working: {}",
                        self.reader.describe(),
                        reason
                    );
                } else {
                    log::warn!("video decode failed for {}: {}", self.reader.describe(), reason);
                }
                Pull::Aborted(PipelineError::StreamReadFailure {
                    source_name: self.reader.describe(),
                    reason,
                })
            }
        }
    }
}
