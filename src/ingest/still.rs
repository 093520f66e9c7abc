//! Still-image frame source.
//!
//! Walks an ordered list of image paths, decoding one per call. Unreadable
//! files are skipped with a warning and never end the run.

use std::path::{Path, PathBuf};

use image::RgbImage;

use super::Pull;
use crate::error::PipelineError;
use crate::frame::Frame;

pub struct StillSource {
    images: Vec<PathBuf>,
    next: usize,
    skipped: u64,
    progress_every: usize,
    notices: u64,
}

impl StillSource {
    pub fn new(images: Vec<PathBuf>, progress_every: usize) -> Self {
        Self {
            images,
            next: 0,
            skipped: 0,
            progress_every: progress_every.max(1),
            notices: 0,
        }
    }

    pub(crate) fn next_frame(&mut self, sequence: u64) -> Pull {
        while let Some(path) = self.images.get(self.next) {
            self.next += 1;
            match load_image(path) {
                Ok(pixels) => {
                    if self.next % self.progress_every == 0 {
                        self.notices += 1;
                        log::info!(
                            "progress: processed {} of {} images",
                            self.next,
                            self.images.len()
                        );
                    }
                    return Pull::Frame(Frame::new(pixels, base_name(path), sequence));
                }
                Err(err) => {
                    log::warn!("{err}; skipping");
                    self.skipped += 1;
                }
            }
        }
        Pull::Exhausted
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Progress lines logged so far, one per `progress_every` images.
    pub fn progress_notices(&self) -> u64 {
        self.notices
    }

    pub fn total(&self) -> usize {
        self.images.len()
    }
}

/// Decode a still image into RGB.
pub fn load_image(path: &Path) -> Result<RgbImage, PipelineError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|err| PipelineError::FrameLoadFailure {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
}

fn base_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn unreadable_images_are_skipped() {
        let dir = tempdir().expect("tempdir");
        let good = dir.path().join("good.png");
        RgbImage::new(8, 8).save(&good).expect("write png");
        let bad = dir.path().join("bad.jpg");
        std::fs::write(&bad, b"not a jpeg").expect("write junk");

        let mut source = StillSource::new(vec![bad, good], 100);
        match source.next_frame(1) {
            Pull::Frame(frame) => assert_eq!(frame.name(), Some("good.png")),
            _ => panic!("expected the readable image"),
        }
        assert_eq!(source.skipped(), 1);
        assert!(matches!(source.next_frame(2), Pull::Exhausted));
    }

    #[test]
    fn progress_notice_every_nth_image() {
        let dir = tempdir().expect("tempdir");
        let images: Vec<PathBuf> = (0..5)
            .map(|i| {
                let path = dir.path().join(format!("img{i}.png"));
                RgbImage::new(4, 4).save(&path).expect("write png");
                path
            })
            .collect();

        let mut source = StillSource::new(images, 2);
        let mut notices = Vec::new();
        let mut sequence = 0;
        while let Pull::Frame(_) = source.next_frame(sequence + 1) {
            sequence += 1;
            notices.push(source.progress_notices());
        }
        assert_eq!(sequence, 5);
        assert_eq!(notices, vec![0, 1, 1, 2, 2]);
    }

    #[test]
    fn load_failure_names_the_path() {
        let err = load_image(Path::new("/definitely/missing.png")).unwrap_err();
        assert!(matches!(err, PipelineError::FrameLoadFailure { .. }));
        assert!(err.to_string().contains("missing.png"));
    }
}
