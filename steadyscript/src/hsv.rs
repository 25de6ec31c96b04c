//! HSV threshold ranges and the marker-color presets from spec.md §6.

use serde::{Deserialize, Serialize};

/// An inclusive HSV threshold range in OpenCV convention: `h` in `[0,179]`,
/// `s`/`v` in `[0,255]`.
///
/// `lo <= hi` holds componentwise for `s` and `v`. For `h`, `lo > hi` means
/// the range wraps around 0/179 and selects the *union* of `[lo,179]` and
/// `[0,hi]` (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    pub h_lo: u8,
    pub h_hi: u8,
    pub s_lo: u8,
    pub s_hi: u8,
    pub v_lo: u8,
    pub v_hi: u8,
}

impl HsvRange {
    /// Builds a range from two `(h, s, v)` triples, as sent over `/hsv`
    /// and `hsv_update` (spec.md §4.4, §6).
    pub fn new(lower: (u8, u8, u8), upper: (u8, u8, u8)) -> Self {
        Self {
            h_lo: lower.0,
            h_hi: upper.0,
            s_lo: lower.1,
            s_hi: upper.1,
            v_lo: lower.2,
            v_hi: upper.2,
        }
    }

    /// True when the hue component wraps around the 0/179 boundary.
    pub fn hue_wraps(&self) -> bool {
        self.h_lo > self.h_hi
    }

    /// Whether a single HSV pixel is contained in this range, handling hue
    /// wrap per spec.md §3 ("lo > hi means the union of two slices").
    pub fn contains(&self, h: u8, s: u8, v: u8) -> bool {
        if s < self.s_lo || s > self.s_hi || v < self.v_lo || v > self.v_hi {
            return false;
        }
        if self.hue_wraps() {
            h >= self.h_lo || h <= self.h_hi
        } else {
            h >= self.h_lo && h <= self.h_hi
        }
    }
}

/// Marker color presets selectable via `PEN_COLOR` (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PenColor {
    Red,
    Green,
    Blue,
}

impl std::str::FromStr for PenColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "red" => Ok(PenColor::Red),
            "green" => Ok(PenColor::Green),
            "blue" => Ok(PenColor::Blue),
            other => Err(format!("unknown pen color: {other}")),
        }
    }
}

impl PenColor {
    /// The default `HsvRange` preset for this pen color (spec.md §6).
    pub fn preset(self) -> HsvRange {
        match self {
            PenColor::Red => HsvRange::new((0, 100, 100), (10, 255, 255)),
            PenColor::Green => HsvRange::new((35, 50, 50), (85, 255, 255)),
            PenColor::Blue => HsvRange::new((100, 50, 50), (130, 255, 255)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_wrapping_range_contains_inside_and_excludes_outside() {
        let r = PenColor::Green.preset();
        assert!(!r.hue_wraps());
        assert!(r.contains(60, 200, 200));
        assert!(!r.contains(0, 200, 200));
        assert!(!r.contains(60, 10, 200));
    }

    #[test]
    fn wrapping_range_detects_both_slices() {
        let r = HsvRange::new((170, 100, 100), (10, 255, 255));
        assert!(r.hue_wraps());
        assert!(r.contains(175, 200, 200));
        assert!(r.contains(5, 200, 200));
        assert!(!r.contains(90, 200, 200));
    }
}
