//! C3: smoother & jitter window. Rolling buffers over recent marker
//! positions; exposes the smoothed position and jitter statistics.

use std::collections::VecDeque;

/// Capacity of [`PositionBuffer`] and [`JitterBuffer`] (spec.md §3, §6
/// `STABILITY_WINDOW_SIZE`, default 30).
pub const DEFAULT_WINDOW: usize = 30;

/// Percentile computation shared by HOLD and FOLLOW aggregation, and by
/// jitter/lateral-jitter statistics, so every consumer agrees bit-for-bit
/// (spec.md §9 "Numeric parity").
///
/// `p` is in `[0,1]`. Sorts ascending, computes rank `r = p*(n-1)`, and
/// linearly interpolates between `floor(r)` and `ceil(r)`. Returns 0 for
/// an empty slice.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let r = p * (n - 1) as f64;
    let lo = r.floor() as usize;
    let hi = r.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = r - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Output of feeding one raw observation through the smoother.
#[derive(Debug, Clone, Copy)]
pub struct SmoothedSample {
    /// The moving-average smoothed position, if one is currently valid.
    pub smoothed: Option<(f64, f64)>,
    /// The per-frame scalar jitter just computed (0 when no observation
    /// advanced the buffers this tick).
    pub jitter_now: f64,
}

/// Rolling position/jitter window for one marker (spec.md §4.3).
pub struct Smoother {
    capacity: usize,
    positions: VecDeque<(f64, f64)>,
    jitters: VecDeque<f64>,
    last_smoothed: Option<(f64, f64)>,
    /// Frames elapsed since the last `detected=true` observation. The
    /// previous smoothed position stays valid for exactly one additional
    /// frame (spec.md §4.3) before expiring.
    frames_since_detection: u32,
}

impl Smoother {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_WINDOW)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            positions: VecDeque::with_capacity(capacity),
            jitters: VecDeque::with_capacity(capacity),
            last_smoothed: None,
            frames_since_detection: u32::MAX,
        }
    }

    /// Feeds one observation. `position` is `Some` iff the detector
    /// reported `detected=true` this frame (spec.md's `detected ⇔
    /// position.is_some()` invariant is assumed to already hold).
    pub fn observe(&mut self, position: Option<(i32, i32)>) -> SmoothedSample {
        match position {
            Some((x, y)) => {
                let p = (x as f64, y as f64);
                if self.positions.len() == self.capacity {
                    self.positions.pop_front();
                }
                self.positions.push_back(p);

                let smoothed = mean_point(&self.positions);
                let j = ((p.0 - smoothed.0).powi(2) + (p.1 - smoothed.1).powi(2)).sqrt();

                if self.jitters.len() == self.capacity {
                    self.jitters.pop_front();
                }
                self.jitters.push_back(j);

                self.last_smoothed = Some(smoothed);
                self.frames_since_detection = 0;

                SmoothedSample {
                    smoothed: Some(smoothed),
                    jitter_now: j,
                }
            }
            None => {
                self.frames_since_detection = self.frames_since_detection.saturating_add(1);
                // The previous smoothed position remains valid for one
                // frame, then expires.
                let smoothed = if self.frames_since_detection <= 1 {
                    self.last_smoothed
                } else {
                    self.last_smoothed = None;
                    None
                };
                SmoothedSample {
                    smoothed,
                    jitter_now: 0.0,
                }
            }
        }
    }

    /// Most recent jitter value, or 0 if the buffer is empty.
    pub fn jitter_now(&self) -> f64 {
        self.jitters.back().copied().unwrap_or(0.0)
    }

    /// 95th percentile of the jitter buffer.
    pub fn p95_jitter(&self) -> f64 {
        let values: Vec<f64> = self.jitters.iter().copied().collect();
        percentile(&values, 0.95)
    }

    /// Arithmetic mean of the jitter buffer.
    pub fn mean_jitter(&self) -> f64 {
        let values: Vec<f64> = self.jitters.iter().copied().collect();
        mean(&values)
    }
}

impl Default for Smoother {
    fn default() -> Self {
        Self::new()
    }
}

fn mean_point(points: &VecDeque<(f64, f64)>) -> (f64, f64) {
    let n = points.len() as f64;
    let (sx, sy) = points.iter().fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
    (sx / n, sy / n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_matches_spec_interpolation_rule() {
        let values = vec![1.0, 2.0, 3.0, 4.0];
        // r = 0.95 * 3 = 2.85 -> interpolate between idx 2 (3.0) and idx 3 (4.0)
        let p95 = percentile(&values, 0.95);
        assert!((p95 - 3.85).abs() < 1e-9);
        assert_eq!(percentile(&[], 0.95), 0.0);
    }

    #[test]
    fn stationary_marker_has_near_zero_jitter() {
        let mut s = Smoother::new();
        let mut last = SmoothedSample { smoothed: None, jitter_now: 0.0 };
        for _ in 0..50 {
            last = s.observe(Some((320, 240)));
        }
        assert!(last.jitter_now < 1e-9);
        assert!(s.p95_jitter() < 1e-9);
    }

    #[test]
    fn smoothed_position_survives_exactly_one_missed_frame() {
        let mut s = Smoother::new();
        s.observe(Some((100, 100)));
        let after_one_miss = s.observe(None);
        assert!(after_one_miss.smoothed.is_some());
        let after_two_misses = s.observe(None);
        assert!(after_two_misses.smoothed.is_none());
    }
}
