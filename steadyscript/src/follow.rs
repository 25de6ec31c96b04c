//! FOLLOW-mode target generator, beat detection, and lateral jitter
//! projection (spec.md §4.4 FOLLOW subsection).

use std::f64::consts::PI;

/// FOLLOW target path center and radius (spec.md §9 open question:
/// `C_target` defaults to frame center, `R_target` defaults to 120px;
/// neither is configurable through the external API).
#[derive(Debug, Clone, Copy)]
pub struct TargetPath {
    pub center: (f64, f64),
    pub radius: f64,
}

pub const DEFAULT_TARGET_RADIUS: f64 = 120.0;

impl TargetPath {
    pub fn for_frame(width: u32, height: u32) -> Self {
        Self {
            center: (width as f64 / 2.0, height as f64 / 2.0),
            radius: DEFAULT_TARGET_RADIUS,
        }
    }

    /// Angular rate in rad/s for a given BPM (spec.md §4.4).
    pub fn angular_rate(bpm: u32) -> f64 {
        2.0 * PI * bpm as f64 / 60.0
    }

    /// `T(t)`: the target position at elapsed time `t` (seconds).
    pub fn position_at(&self, bpm: u32, t: f64) -> (f64, f64) {
        let omega = Self::angular_rate(bpm);
        (
            self.center.0 + self.radius * (omega * t).cos(),
            self.center.1 + self.radius * (omega * t).sin(),
        )
    }

    /// Unit tangent vector to the path at elapsed time `t`, i.e. the
    /// normalized derivative of `position_at` with respect to `t`.
    pub fn tangent_at(&self, bpm: u32, t: f64) -> (f64, f64) {
        let omega = Self::angular_rate(bpm);
        // d/dt (R cos(wt), R sin(wt)) = R*w*(-sin(wt), cos(wt)); the R*w
        // scalar magnitude drops out once normalized.
        (-(omega * t).sin(), (omega * t).cos())
    }
}

/// Tracks beat count across a FOLLOW session (spec.md §4.4: "increment
/// `beats_elapsed` each time the integer part of `(t * BPM / 60)`
/// advances").
#[derive(Debug, Default)]
pub struct BeatCounter {
    last_beat: i64,
    beats_elapsed: u32,
}

impl BeatCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the counter for elapsed time `t` (seconds) at `bpm`.
    /// Returns the current total beat count.
    pub fn update(&mut self, bpm: u32, t: f64) -> u32 {
        let beat = (t * bpm as f64 / 60.0).floor() as i64;
        if beat > self.last_beat {
            self.beats_elapsed += (beat - self.last_beat) as u32;
            self.last_beat = beat;
        }
        self.beats_elapsed
    }

    pub fn total(&self) -> u32 {
        self.beats_elapsed
    }
}

/// Computes the lateral jitter: the marker position's residual relative
/// to the target, projected perpendicular to the path's instantaneous
/// tangent direction (spec.md §4.4).
pub fn lateral_jitter(marker: (f64, f64), path: &TargetPath, bpm: u32, t: f64) -> f64 {
    let target = path.position_at(bpm, t);
    let tangent = path.tangent_at(bpm, t);

    let d = (marker.0 - target.0, marker.1 - target.1);
    let tangential_mag = d.0 * tangent.0 + d.1 * tangent.1;
    let tangential = (tangential_mag * tangent.0, tangential_mag * tangent.1);
    let perp = (d.0 - tangential.0, d.1 - tangential.1);
    (perp.0 * perp.0 + perp.1 * perp.1).sqrt()
}

/// Feedback status thresholds from `p95_lateral` (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackStatus {
    Good,
    Warning,
    Poor,
}

impl FeedbackStatus {
    pub fn from_p95_lateral(p95_lateral: f64) -> Self {
        if p95_lateral <= 8.0 {
            FeedbackStatus::Good
        } else if p95_lateral <= 15.0 {
            FeedbackStatus::Warning
        } else {
            FeedbackStatus::Poor
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_exactly_on_target_has_zero_lateral_jitter() {
        let path = TargetPath::for_frame(640, 480);
        let t = 1.3;
        let bpm = 60;
        let target = path.position_at(bpm, t);
        assert!(lateral_jitter(target, &path, bpm, t) < 1e-9);
    }

    #[test]
    fn radial_offset_is_pure_lateral_jitter() {
        let path = TargetPath::for_frame(640, 480);
        let t = 0.0;
        let bpm = 60;
        // At t=0, target sits at (center.x + R, center.y); the tangent is
        // (0,1), so a radial offset of +5 in x is purely perpendicular.
        let target = path.position_at(bpm, t);
        let marker = (target.0 + 5.0, target.1);
        let lj = lateral_jitter(marker, &path, bpm, t);
        assert!((lj - 5.0).abs() < 1e-6);
    }

    #[test]
    fn beat_counter_reaches_expected_count_over_twenty_seconds_at_60bpm() {
        let mut counter = BeatCounter::new();
        let mut total = 0;
        // Simulate 30Hz ticks over 20s.
        for i in 0..(20 * 30) {
            let t = i as f64 / 30.0;
            total = counter.update(60, t);
        }
        assert!((19..=21).contains(&total));
    }

    #[test]
    fn feedback_status_thresholds() {
        assert_eq!(FeedbackStatus::from_p95_lateral(4.0), FeedbackStatus::Good);
        assert_eq!(FeedbackStatus::from_p95_lateral(8.0), FeedbackStatus::Good);
        assert_eq!(FeedbackStatus::from_p95_lateral(12.0), FeedbackStatus::Warning);
        assert_eq!(FeedbackStatus::from_p95_lateral(20.0), FeedbackStatus::Poor);
    }
}
