//! Frame acquisition.
//!
//! This module turns a resolved `SourceDescriptor` into a `FrameSource` that
//! yields one frame per loop iteration:
//! - Still images and image folders (decoded with the `image` crate)
//! - Local video files (feature: ingest-file-ffmpeg)
//! - USB/V4L2 cameras (feature: ingest-v4l2)
//!
//! Streaming backends implement `FrameReader`, so tests and other callers can
//! supply their own frame producers.
//!
//! End of input is reported per source kind:
//! - stills and folders: `Pull::Exhausted` once every path was attempted
//! - video: `Pull::Exhausted` when the decoder has no more frames
//! - camera: `Pull::Aborted` when a read fails or returns nothing

#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod still;
pub mod stream;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;
use image::RgbImage;

use crate::error::PipelineError;
use crate::frame::Frame;
use crate::source::{Resolution, SourceDescriptor, SourceKind};

pub use still::StillSource;
pub use stream::StreamSource;

/// Live frame producer (video decoder, camera).
pub trait FrameReader {
    /// Human-readable origin, used in diagnostics.
    fn describe(&self) -> String;

    /// Read the next frame. `Ok(None)` means the producer has no more frames.
    fn read(&mut self) -> Result<Option<RgbImage>>;
}

/// Outcome of one acquisition step.
pub enum Pull {
    Frame(Frame),
    /// Normal end of input.
    Exhausted,
    /// Terminal read failure. Cleanup is the same as for `Exhausted`.
    Aborted(PipelineError),
}

/// Counters kept by a source over the whole run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_delivered: u64,
    pub images_skipped: u64,
    /// Number of still images queued, `None` for streams.
    pub images_total: Option<usize>,
}

enum SourceInput {
    Stills(StillSource),
    Stream(StreamSource),
}

/// One acquisition strategy per source kind, plus the optional resize step.
pub struct FrameSource {
    kind: SourceKind,
    input: SourceInput,
    resize: Option<Resolution>,
    delivered: u64,
}

impl FrameSource {
    /// Open the capture handle for a resolved source.
    pub fn open(
        descriptor: &SourceDescriptor,
        resize: Option<Resolution>,
        progress_every: usize,
    ) -> Result<Self> {
        match descriptor {
            SourceDescriptor::Image(path) => Ok(Self::stills(
                SourceKind::Image,
                vec![path.clone()],
                resize,
                progress_every,
            )),
            SourceDescriptor::Folder { images, .. } => Ok(Self::stills(
                SourceKind::Folder,
                images.clone(),
                resize,
                progress_every,
            )),
            SourceDescriptor::Video(path) => {
                let reader = open_video(path)?;
                Ok(Self::stream(SourceKind::Video, reader, resize))
            }
            SourceDescriptor::Camera(index) => {
                let reader = open_camera(*index, resize)?;
                Ok(Self::stream(SourceKind::Camera, reader, resize))
            }
        }
    }

    pub fn stills(
        kind: SourceKind,
        images: Vec<std::path::PathBuf>,
        resize: Option<Resolution>,
        progress_every: usize,
    ) -> Self {
        Self {
            kind,
            input: SourceInput::Stills(StillSource::new(images, progress_every)),
            resize,
            delivered: 0,
        }
    }

    pub fn stream(kind: SourceKind, reader: Box<dyn FrameReader>, resize: Option<Resolution>) -> Self {
        Self {
            kind,
            input: SourceInput::Stream(StreamSource::new(kind, reader)),
            resize,
            delivered: 0,
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Pull the next frame, resized to the requested resolution if one was set.
    pub fn next_frame(&mut self) -> Pull {
        let sequence = self.delivered + 1;
        let pulled = match &mut self.input {
            SourceInput::Stills(source) => source.next_frame(sequence),
            SourceInput::Stream(source) => source.next_frame(sequence),
        };
        match pulled {
            Pull::Frame(mut frame) => {
                self.delivered = sequence;
                if let Some(resolution) = self.resize {
                    frame.resize_to(resolution);
                }
                Pull::Frame(frame)
            }
            other => other,
        }
    }

    pub fn stats(&self) -> SourceStats {
        match &self.input {
            SourceInput::Stills(source) => SourceStats {
                frames_delivered: self.delivered,
                images_skipped: source.skipped(),
                images_total: Some(source.total()),
            },
            SourceInput::Stream(_) => SourceStats {
                frames_delivered: self.delivered,
                images_skipped: 0,
                images_total: None,
            },
        }
    }
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_video(path: &std::path::Path) -> Result<Box<dyn FrameReader>> {
    let reader = file_ffmpeg::FfmpegFileReader::open(path)?;
    Ok(Box::new(reader))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_video(path: &std::path::Path) -> Result<Box<dyn FrameReader>> {
    Err(anyhow::anyhow!(
        "cannot decode {}: video input requires the ingest-file-ffmpeg feature",
        path.display()
    ))
}

#[cfg(feature = "ingest-v4l2")]
fn open_camera(index: u32, resize: Option<Resolution>) -> Result<Box<dyn FrameReader>> {
    let mut config = v4l2::V4l2Config {
        device: format!("/dev/video{index}"),
        ..v4l2::V4l2Config::default()
    };
    if let Some(resolution) = resize {
        config.width = resolution.width;
        config.height = resolution.height;
    }
    let reader = v4l2::V4l2Reader::connect(config)?;
    Ok(Box::new(reader))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_camera(index: u32, _resize: Option<Resolution>) -> Result<Box<dyn FrameReader>> {
    Err(anyhow::anyhow!(
        "cannot open camera usb{index}: camera input requires the ingest-v4l2 feature"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<Option<RgbImage>>);

    impl FrameReader for Scripted {
        fn describe(&self) -> String {
            "scripted".to_string()
        }

        fn read(&mut self) -> Result<Option<RgbImage>> {
            Ok(self.0.pop_front().flatten())
        }
    }

    #[test]
    fn stream_frames_are_resized_and_numbered() {
        let frames = VecDeque::from(vec![
            Some(RgbImage::new(40, 30)),
            Some(RgbImage::new(40, 30)),
        ]);
        let mut source = FrameSource::stream(
            SourceKind::Video,
            Box::new(Scripted(frames)),
            Some(Resolution {
                width: 20,
                height: 10,
            }),
        );

        for expected in 1..=2 {
            match source.next_frame() {
                Pull::Frame(frame) => {
                    assert_eq!((frame.width(), frame.height()), (20, 10));
                    assert_eq!(frame.sequence(), expected);
                    assert!(frame.name().is_none());
                }
                _ => panic!("expected a frame"),
            }
        }
        assert!(matches!(source.next_frame(), Pull::Exhausted));
        assert_eq!(source.stats().frames_delivered, 2);
    }

    #[test]
    fn missing_backends_fail_after_validation() {
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        assert!(FrameSource::open(
            &SourceDescriptor::Video("clip.mp4".into()),
            None,
            100
        )
        .is_err());
        #[cfg(not(feature = "ingest-v4l2"))]
        assert!(FrameSource::open(&SourceDescriptor::Camera(0), None, 100).is_err());
    }
}
