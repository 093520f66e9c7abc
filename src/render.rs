//! Overlay planning and painting.
//!
//! `plan_overlay` decides what goes on a frame; `paint` burns the plan into
//! the pixels with `imageproc`: box outlines, filled label banners, label
//! text and the status lines. Text is set in an embedded DejaVu Sans face,
//! so recordings and captures carry the same overlay the display shows.

use std::sync::OnceLock;

use ab_glyph::{Font, FontRef, PxScale, ScaleFont};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::detect::{FrameDetections, PixelBox};

/// Tableau 10, indexed by `class_index % 10`.
pub const BOX_COLORS: [Rgb<u8>; 10] = [
    Rgb([87, 120, 164]),
    Rgb([228, 148, 68]),
    Rgb([209, 97, 93]),
    Rgb([133, 182, 178]),
    Rgb([106, 159, 88]),
    Rgb([231, 202, 96]),
    Rgb([168, 124, 159]),
    Rgb([241, 162, 169]),
    Rgb([150, 118, 98]),
    Rgb([184, 176, 172]),
];

pub const BOX_THICKNESS: u32 = 2;
pub const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
pub const STATUS_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 0]);

const LABEL_SCALE: f32 = 14.0;
const STATUS_SCALE: f32 = 19.0;
const BANNER_PAD: i32 = 10;
const STATUS_X: i32 = 10;
// Baseline of the last status line; earlier lines stack upwards.
const STATUS_LAST_BASELINE: i32 = 40;
const STATUS_LINE_STEP: i32 = 20;

static FONT_DATA: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

fn overlay_font() -> Option<&'static FontRef<'static>> {
    static FONT: OnceLock<Option<FontRef<'static>>> = OnceLock::new();
    FONT.get_or_init(|| match FontRef::try_from_slice(FONT_DATA) {
        Ok(font) => Some(font),
        Err(err) => {
            log::warn!("overlay font unusable, text will not be drawn: {err}");
            None
        }
    })
    .as_ref()
}

/// Vertical metrics of one line at a given scale, in whole pixels.
#[derive(Clone, Copy, Debug, Default)]
struct LineMetrics {
    ascent: i32,
    descent: i32,
}

fn line_metrics(scale: f32) -> LineMetrics {
    overlay_font()
        .map(|font| {
            let scaled = font.as_scaled(PxScale::from(scale));
            LineMetrics {
                ascent: scaled.ascent().ceil() as i32,
                descent: (-scaled.descent()).ceil() as i32,
            }
        })
        .unwrap_or_default()
}

fn text_width(scale: f32, text: &str) -> i32 {
    overlay_font()
        .map(|font| text_size(PxScale::from(scale), font, text).0 as i32)
        .unwrap_or(0)
}

pub fn box_color(class_index: usize) -> Rgb<u8> {
    BOX_COLORS[class_index % BOX_COLORS.len()]
}

/// Filled label background, in frame pixels. The label text starts at its
/// top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Banner {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OverlayBox {
    pub bbox: PixelBox,
    pub color: Rgb<u8>,
    pub label: String,
    pub banner: Banner,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverlayPlan {
    pub boxes: Vec<OverlayBox>,
    /// Top-left status text, one entry per line.
    pub status_lines: Vec<String>,
}

/// Decide the overlay for one frame.
///
/// `fps` is `Some` only for streaming sources.
pub fn plan_overlay(frame: &FrameDetections, fps: Option<f64>) -> OverlayPlan {
    let boxes = frame
        .rendered()
        .map(|det| {
            let label = format!("{}: {}%", det.class_name, (det.confidence * 100.0) as u32);
            let banner = banner_for(&det.bbox, &label, frame.frame_width, frame.frame_height);
            OverlayBox {
                bbox: det.bbox,
                color: box_color(det.class_index),
                label,
                banner,
            }
        })
        .collect();

    let mut status_lines = Vec::with_capacity(2);
    if let Some(fps) = fps {
        status_lines.push(format!("FPS: {fps:.2}"));
    }
    status_lines.push(format!("Number of objects: {}", frame.object_count));

    OverlayPlan {
        boxes,
        status_lines,
    }
}

fn banner_for(bbox: &PixelBox, label: &str, frame_width: u32, frame_height: u32) -> Banner {
    let metrics = line_metrics(LABEL_SCALE);
    let label_ymin = bbox.ymin.max(metrics.ascent + BANNER_PAD);
    let top = label_ymin - metrics.ascent - BANNER_PAD;
    let bottom = label_ymin + metrics.descent - BANNER_PAD;

    let max_x = frame_width as i32;
    let max_y = frame_height as i32;
    let x0 = bbox.xmin.clamp(0, max_x);
    let x1 = (bbox.xmin + text_width(LABEL_SCALE, label)).clamp(0, max_x);
    let y0 = top.clamp(0, max_y);
    let y1 = bottom.clamp(0, max_y);
    Banner {
        x: x0 as u32,
        y: y0 as u32,
        width: (x1 - x0).max(0) as u32,
        height: (y1 - y0).max(0) as u32,
    }
}

/// Burn the plan into `img`: outlines, banners, label text, status lines.
pub fn paint(img: &mut RgbImage, plan: &OverlayPlan) {
    let font = overlay_font();
    for overlay in &plan.boxes {
        draw_box(img, &overlay.bbox, overlay.color, BOX_THICKNESS);
        let banner = overlay.banner;
        if banner.width > 0 && banner.height > 0 {
            let rect = Rect::at(banner.x as i32, banner.y as i32).of_size(banner.width, banner.height);
            draw_filled_rect_mut(img, rect, overlay.color);
        }
        if let Some(font) = font {
            draw_text_mut(
                img,
                LABEL_TEXT_COLOR,
                banner.x as i32,
                banner.y as i32,
                PxScale::from(LABEL_SCALE),
                font,
                &overlay.label,
            );
        }
    }

    let Some(font) = font else {
        return;
    };
    let ascent = line_metrics(STATUS_SCALE).ascent;
    let last = plan.status_lines.len() as i32 - 1;
    for (i, line) in plan.status_lines.iter().enumerate() {
        let baseline = STATUS_LAST_BASELINE - STATUS_LINE_STEP * (last - i as i32);
        draw_text_mut(
            img,
            STATUS_TEXT_COLOR,
            STATUS_X,
            baseline - ascent,
            PxScale::from(STATUS_SCALE),
            font,
            line,
        );
    }
}

/// Draw a box outline `thickness` pixels wide, growing inwards from the
/// corners. Parts outside the frame are clipped.
pub fn draw_box(img: &mut RgbImage, bbox: &PixelBox, color: Rgb<u8>, thickness: u32) {
    for t in 0..thickness as i32 {
        let width = bbox.width() + 1 - 2 * t;
        let height = bbox.height() + 1 - 2 * t;
        if width <= 0 || height <= 0 {
            break;
        }
        let rect = Rect::at(bbox.xmin + t, bbox.ymin + t).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(img, rect, color);
    }
}
