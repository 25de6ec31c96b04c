//! C2: marker detector. HSV-threshold + morphology + contour centroiding.
//!
//! Grounded in the teacher's `flydra-feature-detector` crate, which runs a
//! similar threshold -> morphology -> connected-component -> centroid
//! pipeline over machine-vision frames; here the threshold is HSV color
//! rather than background-subtracted intensity, and the search is for a
//! single best blob rather than multiple animal tracks.

use crate::frame::Frame;
use crate::hsv::HsvRange;

/// One detector output for a single frame (spec.md §3 `MarkerObservation`,
/// minus the timestamp which the pipeline attaches).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerObservation {
    pub position: Option<(i32, i32)>,
    pub detected: bool,
}

impl MarkerObservation {
    fn detected_at(x: i32, y: i32) -> Self {
        Self {
            position: Some((x, y)),
            detected: true,
        }
    }

    fn not_detected() -> Self {
        Self {
            position: None,
            detected: false,
        }
    }
}

/// Minimum contour area, in pixels, for a blob to be considered the marker
/// (spec.md §4.2 step 4).
pub const MIN_AREA: u32 = 50;

/// Morphology kernel size (spec.md §4.2 step 3): 5x5, open then close.
const KERNEL: i32 = 5;
const KERNEL_RADIUS: i32 = KERNEL / 2;

fn bgr_to_hsv(b: u8, g: u8, r: u8) -> (u8, u8, u8) {
    let (rf, gf, bf) = (r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let h = if delta.abs() < f32::EPSILON {
        0.0
    } else if max == rf {
        60.0 * (((gf - bf) / delta).rem_euclid(6.0))
    } else if max == gf {
        60.0 * (((bf - rf) / delta) + 2.0)
    } else {
        60.0 * (((rf - gf) / delta) + 4.0)
    };
    // OpenCV convention: H in [0,179].
    let h_cv = ((h / 2.0).round() as i32).clamp(0, 179) as u8;
    let s_cv = if max.abs() < f32::EPSILON {
        0
    } else {
        ((delta / max) * 255.0).round().clamp(0.0, 255.0) as u8
    };
    let v_cv = (max * 255.0).round().clamp(0.0, 255.0) as u8;
    (h_cv, s_cv, v_cv)
}

/// Builds the binary mask (`true` = inside HSV range) for the whole frame.
/// A free function rather than a method on [`HsvRange`] because it
/// operates over an entire image rather than one pixel.
fn build_mask(frame: &Frame, range: &HsvRange) -> Vec<bool> {
    let mut mask = vec![false; (frame.width * frame.height) as usize];
    for y in 0..frame.height {
        for x in 0..frame.width {
            let (b, g, r) = frame.pixel(x, y);
            let (h, s, v) = bgr_to_hsv(b, g, r);
            if range.contains(h, s, v) {
                mask[(y * frame.width + x) as usize] = true;
            }
        }
    }
    mask
}

fn erode(mask: &[bool], w: i32, h: i32) -> Vec<bool> {
    let mut out = vec![false; mask.len()];
    for y in 0..h {
        for x in 0..w {
            let mut all_set = true;
            'k: for ky in -KERNEL_RADIUS..=KERNEL_RADIUS {
                for kx in -KERNEL_RADIUS..=KERNEL_RADIUS {
                    let (nx, ny) = (x + kx, y + ky);
                    if nx < 0 || ny < 0 || nx >= w || ny >= h || !mask[(ny * w + nx) as usize] {
                        all_set = false;
                        break 'k;
                    }
                }
            }
            out[(y * w + x) as usize] = all_set;
        }
    }
    out
}

fn dilate(mask: &[bool], w: i32, h: i32) -> Vec<bool> {
    let mut out = vec![false; mask.len()];
    for y in 0..h {
        for x in 0..w {
            if !mask[(y * w + x) as usize] {
                continue;
            }
            for ky in -KERNEL_RADIUS..=KERNEL_RADIUS {
                for kx in -KERNEL_RADIUS..=KERNEL_RADIUS {
                    let (nx, ny) = (x + kx, y + ky);
                    if nx >= 0 && ny >= 0 && nx < w && ny < h {
                        out[(ny * w + nx) as usize] = true;
                    }
                }
            }
        }
    }
    out
}

/// Morphological open (erode, then dilate) followed by close (dilate,
/// then erode), matching spec.md §4.2 step 3 exactly.
fn open_then_close(mask: &[bool], w: i32, h: i32) -> Vec<bool> {
    let opened = dilate(&erode(mask, w, h), w, h);
    erode(&dilate(&opened, w, h), w, h)
}

/// A connected foreground component, with the raster-scan-order index of
/// its first pixel (used to break area ties deterministically, per
/// spec.md §4.2 "choose the first encountered").
struct Component {
    area: u32,
    sum_x: u64,
    sum_y: u64,
    first_index: usize,
}

/// 4-connected component labeling via BFS flood fill. Standing in for
/// "external contour extraction" (spec.md §4.2 step 4): for filled convex
/// blobs such as a marker disc, the centroid of the connected foreground
/// region equals the centroid computed from image moments over the
/// contour's interior, so this produces identical results with a simpler
/// algorithm.
fn connected_components(mask: &[bool], w: i32, h: i32) -> Vec<Component> {
    let mut visited = vec![false; mask.len()];
    let mut components = Vec::new();
    let mut queue = std::collections::VecDeque::new();

    for start in 0..mask.len() {
        if !mask[start] || visited[start] {
            continue;
        }
        visited[start] = true;
        queue.push_back(start);
        let mut area = 0u64;
        let mut sum_x = 0u64;
        let mut sum_y = 0u64;
        let first_index = start;

        while let Some(idx) = queue.pop_front() {
            area += 1;
            let x = (idx as i32) % w;
            let y = (idx as i32) / w;
            sum_x += x as u64;
            sum_y += y as u64;

            for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w || ny >= h {
                    continue;
                }
                let nidx = (ny * w + nx) as usize;
                if mask[nidx] && !visited[nidx] {
                    visited[nidx] = true;
                    queue.push_back(nidx);
                }
            }
        }

        components.push(Component {
            area: area as u32,
            sum_x,
            sum_y,
            first_index,
        });
    }
    components
}

/// Runs the full detection pipeline (spec.md §4.2) on one frame against
/// the currently active `HsvRange`.
pub fn detect(frame: &Frame, range: &HsvRange) -> MarkerObservation {
    let w = frame.width as i32;
    let h = frame.height as i32;

    let raw_mask = build_mask(frame, range);
    let cleaned = open_then_close(&raw_mask, w, h);
    let components = connected_components(&cleaned, w, h);

    let best = components
        .into_iter()
        .filter(|c| c.area >= MIN_AREA)
        // m00 == 0 is impossible here (area >= MIN_AREA > 0), but the
        // check documents the invariant from spec.md §4.2 edge cases.
        .filter(|c| c.area > 0)
        .max_by(|a, b| {
            a.area
                .cmp(&b.area)
                // Larger area wins; on an exact tie, the component whose
                // first pixel comes first in raster-scan order wins,
                // i.e. smaller `first_index` -- so reverse the
                // comparison on that key.
                .then(b.first_index.cmp(&a.first_index))
        });

    match best {
        Some(c) => {
            let cx = (c.sum_x as f64 / c.area as f64).round() as i32;
            let cy = (c.sum_y as f64 / c.area as f64).round() as i32;
            MarkerObservation::detected_at(cx, cy)
        }
        None => MarkerObservation::not_detected(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::SyntheticFrameSource;
    use crate::hsv::PenColor;

    fn green_bgr() -> (u8, u8, u8) {
        // pure green in BGR order
        (0, 255, 0)
    }

    #[test]
    fn detects_large_centered_blob() {
        let mut src = SyntheticFrameSource::new(640, 480, green_bgr(), 20, vec![Some((320, 240))]);
        let frame = src_read(&mut src);
        let obs = detect(&frame, &PenColor::Green.preset());
        assert!(obs.detected);
        let (x, y) = obs.position.unwrap();
        assert!((x - 320).abs() <= 1);
        assert!((y - 240).abs() <= 1);
    }

    #[test]
    fn small_blob_below_min_area_is_not_detected() {
        let mut src = SyntheticFrameSource::new(640, 480, green_bgr(), 2, vec![Some((100, 100))]);
        let frame = src_read(&mut src);
        let obs = detect(&frame, &PenColor::Green.preset());
        assert!(!obs.detected);
        assert!(obs.position.is_none());
    }

    #[test]
    fn no_marker_present_is_not_detected() {
        let mut src = SyntheticFrameSource::new(640, 480, green_bgr(), 20, vec![None]);
        let frame = src_read(&mut src);
        let obs = detect(&frame, &PenColor::Green.preset());
        assert!(!obs.detected);
    }

    #[test]
    fn hue_wrap_range_detects_red_like_pixels_on_both_slices() {
        // h_lo=170, h_hi=10 should match both near-0 and near-179 hues.
        let range = HsvRange::new((170, 100, 100), (10, 255, 255));
        // Pure red (BGR (0,0,255)) maps to hue 0.
        let mut src = SyntheticFrameSource::new(640, 480, (0, 0, 255), 20, vec![Some((320, 240))]);
        let frame = src_read(&mut src);
        let obs = detect(&frame, &range);
        assert!(obs.detected);
    }

    fn src_read(src: &mut SyntheticFrameSource) -> Frame {
        use crate::frame::FrameSource;
        src.read().unwrap()
    }
}
