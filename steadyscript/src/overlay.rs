//! C5: overlay renderer. Draws the HUD onto a captured frame and
//! JPEG-encodes the result.
//!
//! Text rendering is adapted from the teacher's `font-drawing` crate
//! (`rusttype` glyph rasterization with alpha-blended coverage), retargeted
//! from `machine_vision_formats::ImageMutStride` onto the plain
//! `image::RgbImage` buffer this crate uses for frames.

use image::{Rgb, RgbImage};
use rusttype::{point, Font, Scale};

use crate::frame::Frame;
use crate::session::{Mode, SessionState, StabilityLevel, TickOutcome};

/// JPEG quality fixed at 80, no alpha channel (spec.md §4.5).
pub const JPEG_QUALITY: u8 = 80;

const COLOR_HOLD: Rgb<u8> = Rgb([80, 160, 255]);
const COLOR_FOLLOW: Rgb<u8> = Rgb([255, 170, 60]);
const COLOR_GREEN: Rgb<u8> = Rgb([60, 220, 90]);
const COLOR_RED: Rgb<u8> = Rgb([220, 60, 60]);
const COLOR_WHITE: Rgb<u8> = Rgb([240, 240, 240]);
const COLOR_TARGET: Rgb<u8> = Rgb([255, 230, 80]);

fn load_font() -> Font<'static> {
    Font::try_from_bytes(ttf_firacode::REGULAR as &[u8]).expect("bundled font must parse")
}

fn frame_to_rgb_image(frame: &Frame) -> RgbImage {
    let mut img = RgbImage::new(frame.width, frame.height);
    for y in 0..frame.height {
        for x in 0..frame.width {
            let (b, g, r) = frame.pixel(x, y);
            img.put_pixel(x, y, Rgb([r, g, b]));
        }
    }
    img
}

fn set_pixel_checked(img: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_filled_circle(img: &mut RgbImage, center: (i32, i32), radius: i32, color: Rgb<u8>) {
    let r2 = radius * radius;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= r2 {
                set_pixel_checked(img, center.0 + dx, center.1 + dy, color);
            }
        }
    }
}

fn draw_ring(img: &mut RgbImage, center: (i32, i32), radius: i32, thickness: i32, color: Rgb<u8>) {
    let outer2 = (radius + thickness) * (radius + thickness);
    let inner2 = (radius - thickness).max(0) * (radius - thickness).max(0);
    for dy in -(radius + thickness)..=(radius + thickness) {
        for dx in -(radius + thickness)..=(radius + thickness) {
            let d2 = dx * dx + dy * dy;
            if d2 <= outer2 && d2 >= inner2 {
                set_pixel_checked(img, center.0 + dx, center.1 + dy, color);
            }
        }
    }
}

fn blend_pixel(img: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>, coverage: f32) {
    if x < 0 || y < 0 || x as u32 >= img.width() || y as u32 >= img.height() {
        return;
    }
    let coverage = coverage.clamp(0.0, 1.0) as f64;
    let old = *img.get_pixel(x as u32, y as u32);
    let mut blended = [0u8; 3];
    for i in 0..3 {
        let o = old.0[i] as f64;
        let n = color.0[i] as f64;
        blended[i] = (o * (1.0 - coverage) + n * coverage).round() as u8;
    }
    img.put_pixel(x as u32, y as u32, Rgb(blended));
}

/// Draws `text` with its top-left baseline anchor at `(x0, y0)`, matching
/// the layout approach of the teacher's `font-drawing::stamp_frame`.
fn draw_text(img: &mut RgbImage, font: &Font, text: &str, x0: f32, y0: f32, color: Rgb<u8>) {
    let scale = Scale::uniform(18.0);
    let v_metrics = font.v_metrics(scale);
    let glyphs: Vec<_> = font
        .layout(text, scale, point(x0, y0 + v_metrics.ascent))
        .collect();
    for glyph in glyphs {
        if let Some(bb) = glyph.pixel_bounding_box() {
            glyph.draw(|gx, gy, coverage| {
                blend_pixel(
                    img,
                    gx as i32 + bb.min.x,
                    gy as i32 + bb.min.y,
                    color,
                    coverage,
                );
            });
        }
    }
}

/// Renders the HUD for one frame and returns JPEG bytes (spec.md §4.5,
/// §6 -- the same bytes serve both `/video_feed` and the duplex `frame`
/// message).
pub fn render_and_encode(
    frame: &Frame,
    outcome: &TickOutcome,
    calibration: Option<(i32, i32, f64)>,
    connected: bool,
    seconds_since_complete: Option<f64>,
) -> Vec<u8> {
    let mut img = frame_to_rgb_image(frame);
    let font = load_font();

    let status_color = if connected { COLOR_GREEN } else { COLOR_RED };
    draw_filled_circle(&mut img, (12, 12), 6, status_color);

    let mode_label = match outcome.mode {
        Mode::Hold => "HOLD",
        Mode::Follow => "FOLLOW",
    };
    draw_text(&mut img, &font, mode_label, 28.0, 2.0, COLOR_WHITE);

    let marker_color = match outcome.mode {
        Mode::Hold => COLOR_HOLD,
        Mode::Follow => COLOR_FOLLOW,
    };
    if let Some((x, y)) = outcome.position {
        draw_filled_circle(&mut img, (x.round() as i32, y.round() as i32), 5, marker_color);
    }

    if outcome.mode == Mode::Hold {
        if let Some((cx, cy, radius)) = calibration {
            let inside = outcome.inside_circle.unwrap_or(false);
            let ring_color = if inside { COLOR_GREEN } else { COLOR_RED };
            draw_ring(&mut img, (cx, cy), radius.round() as i32, 2, ring_color);

            if outcome.state == SessionState::Running {
                let label = format!(
                    "{:.1}s / {:.1}s",
                    outcome.elapsed,
                    outcome.elapsed + outcome.time_remaining
                );
                draw_text(&mut img, &font, &label, 8.0, frame.height as f32 - 28.0, COLOR_WHITE);
            }
        }
    }

    if outcome.mode == Mode::Follow && outcome.state == SessionState::Running {
        if let Some((tx, ty)) = outcome.target_position {
            draw_filled_circle(&mut img, (tx.round() as i32, ty.round() as i32), 8, COLOR_TARGET);
        }
        let label = format!(
            "BPM {} beat {}",
            outcome.bpm.unwrap_or(0),
            outcome.beat_count.unwrap_or(0)
        );
        draw_text(&mut img, &font, &label, 8.0, frame.height as f32 - 28.0, COLOR_WHITE);
    }

    if outcome.state == SessionState::Complete {
        if seconds_since_complete.map(|s| s < 1.0).unwrap_or(true) {
            let stability = outcome
                .stability_level
                .map(|lvl| match lvl {
                    StabilityLevel::Stable => "stable",
                    StabilityLevel::Warning => "warning",
                    StabilityLevel::Unstable => "unstable",
                })
                .unwrap_or("");
            let label = format!("score {:.0} {}", outcome.score, stability);
            draw_text(
                &mut img,
                &font,
                &label,
                frame.width as f32 / 2.0 - 60.0,
                frame.height as f32 / 2.0,
                COLOR_WHITE,
            );
        }
    }

    let mut buf = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    encoder
        .encode_image(&img)
        .expect("encoding a freshly built RgbImage cannot fail");
    buf
}
