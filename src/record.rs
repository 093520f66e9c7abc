//! Annotated-frame recording.
//!
//! `Recorder` owns a `FrameSink` for the whole run and guarantees it is
//! finalized exactly once, either explicitly through `finish` or on drop.

use std::path::{Path, PathBuf};

use anyhow::Result;
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::config::RecordSettings;
use crate::source::{Resolution, StartupPlan};

/// Destination for annotated frames.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

pub struct Recorder {
    sink: Box<dyn FrameSink>,
    path: PathBuf,
    resolution: Resolution,
    frames_written: u64,
    finished: bool,
}

impl Recorder {
    pub fn new(sink: Box<dyn FrameSink>, path: PathBuf, resolution: Resolution) -> Self {
        Self {
            sink,
            path,
            resolution,
            frames_written: 0,
            finished: false,
        }
    }

    /// Open the file-backed recorder configured in `settings`.
    pub fn create(settings: &RecordSettings, resolution: Resolution) -> Result<Self> {
        let sink = open_file_sink(&settings.path, resolution, settings.fps)?;
        log::info!(
            "recording to {} at {} fps ({})",
            settings.path.display(),
            settings.fps,
            resolution
        );
        Ok(Self::new(sink, settings.path.clone(), resolution))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Append one frame, resizing it to the recording resolution if needed.
    pub fn write(&mut self, frame: &RgbImage) -> Result<()> {
        let Resolution { width, height } = self.resolution;
        if frame.dimensions() == (width, height) {
            self.sink.write_frame(frame)?;
        } else {
            let resized = imageops::resize(frame, width, height, FilterType::Triangle);
            self.sink.write_frame(&resized)?;
        }
        self.frames_written += 1;
        Ok(())
    }

    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.sink.finish()?;
        log::info!(
            "recording finalized: {} ({} frames)",
            self.path.display(),
            self.frames_written
        );
        Ok(())
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Err(err) = self.finish() {
            log::warn!("failed to finalize recording {}: {err:#}", self.path.display());
        }
    }
}

/// Build the recorder for a validated plan, or `None` when not recording.
pub fn open_recorder(plan: &StartupPlan, settings: &RecordSettings) -> Result<Option<Recorder>> {
    if !plan.record {
        return Ok(None);
    }
    let resolution = plan
        .resolution
        .ok_or(crate::error::PipelineError::RecordingResolutionRequired)?;
    Recorder::create(settings, resolution).map(Some)
}

#[cfg(feature = "record-ffmpeg")]
fn open_file_sink(path: &Path, resolution: Resolution, fps: u32) -> Result<Box<dyn FrameSink>> {
    Ok(Box::new(ffmpeg_sink::FfmpegSink::create(path, resolution, fps)?))
}

#[cfg(not(feature = "record-ffmpeg"))]
fn open_file_sink(path: &Path, _resolution: Resolution, _fps: u32) -> Result<Box<dyn FrameSink>> {
    Err(anyhow::anyhow!(
        "cannot record to {}: built without the record-ffmpeg feature",
        path.display()
    ))
}

#[cfg(feature = "record-ffmpeg")]
mod ffmpeg_sink {
    use std::path::Path;

    use anyhow::{Context, Result};
    use ffmpeg_next as ffmpeg;
    use ffmpeg_next::{codec, encoder, format, frame, software::scaling, util::rational::Rational};
    use image::RgbImage;

    use super::FrameSink;
    use crate::source::Resolution;

    /// Motion-JPEG wants full-range 4:2:0.
    const ENCODE_FORMAT: format::Pixel = format::Pixel::YUVJ420P;

    pub struct FfmpegSink {
        octx: format::context::Output,
        encoder: encoder::Video,
        to_yuv: scaling::Context,
        rgb_frame: frame::Video,
        yuv_frame: frame::Video,
        stream_index: usize,
        time_base: Rational,
        width: u32,
        height: u32,
        pts: i64,
    }

    impl FfmpegSink {
        pub fn create(path: &Path, resolution: Resolution, fps: u32) -> Result<Self> {
            ffmpeg::init().context("failed to initialise FFmpeg")?;
            let Resolution { width, height } = resolution;
            let fps = fps.max(1) as i32;
            let time_base = Rational::new(1, fps);

            let mut octx = format::output(&path)
                .with_context(|| format!("could not create output {}", path.display()))?;
            let global_header = octx
                .format()
                .flags()
                .contains(format::flag::Flags::GLOBAL_HEADER);
            let codec = encoder::find(codec::Id::MJPEG).context("MJPEG encoder not found")?;

            let mut stream = octx.add_stream(codec)?;
            let mut builder = codec::context::Context::new_with_codec(codec)
                .encoder()
                .video()?;
            builder.set_width(width);
            builder.set_height(height);
            builder.set_format(ENCODE_FORMAT);
            builder.set_time_base(time_base);
            builder.set_frame_rate(Some(Rational::new(fps, 1)));
            if global_header {
                builder.set_flags(codec::flag::Flags::GLOBAL_HEADER);
            }
            let encoder = builder
                .open_as(codec)
                .context("failed to open MJPEG encoder")?;
            stream.set_parameters(&encoder);
            let stream_index = stream.index();

            let to_yuv = scaling::Context::get(
                format::Pixel::RGB24,
                width,
                height,
                ENCODE_FORMAT,
                width,
                height,
                scaling::Flags::BILINEAR,
            )
            .context("failed to create to-YUV scaler")?;

            octx.write_header().context("failed to write output header")?;

            Ok(Self {
                octx,
                encoder,
                to_yuv,
                rgb_frame: frame::Video::new(format::Pixel::RGB24, width, height),
                yuv_frame: frame::Video::empty(),
                stream_index,
                time_base,
                width,
                height,
                pts: 0,
            })
        }

        fn drain_packets(&mut self) -> Result<()> {
            let stream_tb = self
                .octx
                .stream(self.stream_index)
                .context("output stream disappeared")?
                .time_base();
            let mut packet = ffmpeg::Packet::empty();
            while self.encoder.receive_packet(&mut packet).is_ok() {
                packet.set_stream(self.stream_index);
                packet.rescale_ts(self.time_base, stream_tb);
                packet
                    .write_interleaved(&mut self.octx)
                    .context("failed to write encoded packet")?;
            }
            Ok(())
        }
    }

    impl FrameSink for FfmpegSink {
        fn write_frame(&mut self, image: &RgbImage) -> Result<()> {
            let row_bytes = self.width as usize * 3;
            let stride = self.rgb_frame.stride(0);
            let src = image.as_raw();
            let dst = self.rgb_frame.data_mut(0);
            for row in 0..self.height as usize {
                dst[row * stride..row * stride + row_bytes]
                    .copy_from_slice(&src[row * row_bytes..(row + 1) * row_bytes]);
            }

            self.to_yuv
                .run(&self.rgb_frame, &mut self.yuv_frame)
                .context("to-YUV scaling failed")?;
            self.yuv_frame.set_pts(Some(self.pts));
            self.pts += 1;

            self.encoder
                .send_frame(&self.yuv_frame)
                .context("encoder send_frame")?;
            self.drain_packets()
        }

        fn finish(&mut self) -> Result<()> {
            self.encoder.send_eof().context("encoder send_eof")?;
            self.drain_packets()?;
            self.octx
                .write_trailer()
                .context("failed to write output trailer")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Captured {
        sizes: Vec<(u32, u32)>,
        finishes: usize,
    }

    struct CaptureSink(Rc<RefCell<Captured>>);

    impl FrameSink for CaptureSink {
        fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
            self.0.borrow_mut().sizes.push(frame.dimensions());
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.0.borrow_mut().finishes += 1;
            Ok(())
        }
    }

    fn recorder(captured: &Rc<RefCell<Captured>>) -> Recorder {
        Recorder::new(
            Box::new(CaptureSink(Rc::clone(captured))),
            PathBuf::from("out.avi"),
            Resolution {
                width: 32,
                height: 24,
            },
        )
    }

    #[test]
    fn frames_are_written_at_recording_resolution() {
        let captured = Rc::new(RefCell::new(Captured::default()));
        let mut rec = recorder(&captured);
        rec.write(&RgbImage::new(32, 24)).unwrap();
        rec.write(&RgbImage::new(64, 48)).unwrap();
        assert_eq!(rec.frames_written(), 2);
        assert_eq!(captured.borrow().sizes, vec![(32, 24), (32, 24)]);
    }

    #[test]
    fn sink_is_finalized_once() {
        let captured = Rc::new(RefCell::new(Captured::default()));
        {
            let mut rec = recorder(&captured);
            rec.finish().unwrap();
            rec.finish().unwrap();
        }
        assert_eq!(captured.borrow().finishes, 1);
    }

    #[test]
    fn drop_finalizes_unfinished_recorder() {
        let captured = Rc::new(RefCell::new(Captured::default()));
        drop(recorder(&captured));
        assert_eq!(captured.borrow().finishes, 1);
    }
}
