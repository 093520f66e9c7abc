//! Per-iteration frame container.
//!
//! A `Frame` is produced fresh by a source every loop iteration and consumed
//! within that iteration. Still-image frames carry the base filename of the
//! image they were decoded from; streaming frames carry only a sequence number.

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::source::Resolution;

pub struct Frame {
    pixels: RgbImage,
    /// Base filename of the originating still image.
    name: Option<String>,
    /// 1-based position in the run's stream of delivered frames.
    sequence: u64,
}

impl Frame {
    pub fn new(pixels: RgbImage, name: Option<String>, sequence: u64) -> Self {
        Self {
            pixels,
            name,
            sequence,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut RgbImage {
        &mut self.pixels
    }

    /// Name used for export records: the image filename for still sources,
    /// `frame_<sequence>` for streams.
    pub fn export_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("frame_{:06}", self.sequence),
        }
    }

    /// Resize in place. No-op when already at the requested resolution.
    pub fn resize_to(&mut self, resolution: Resolution) {
        if self.pixels.width() == resolution.width && self.pixels.height() == resolution.height {
            return;
        }
        self.pixels = imageops::resize(
            &self.pixels,
            resolution.width,
            resolution.height,
            FilterType::Triangle,
        );
    }
}
