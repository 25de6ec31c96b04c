//! C4: session controller. State machine over {IDLE, RUNNING, COMPLETE},
//! mode-specific aggregation, and the external control-message surface.

use serde::{Deserialize, Serialize};

use crate::detector::MarkerObservation;
use crate::error::{Error, Result};
use crate::follow::{lateral_jitter, BeatCounter, FeedbackStatus, TargetPath};
use crate::hsv::HsvRange;
use crate::smoother::{percentile, Smoother};

/// Exercise mode (spec.md §1, §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    Hold,
    Follow,
}

impl Mode {
    /// Fixed session duration for this mode, in seconds (spec.md §3).
    pub fn duration_s(self) -> f64 {
        match self {
            Mode::Hold => 10.0,
            Mode::Follow => 20.0,
        }
    }
}

/// Session-controller state (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionState {
    Idle,
    Running,
    Complete,
}

/// User-supplied HOLD target circle (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub center: (i32, i32),
    pub radius: f64,
}

/// Two-step calibration click state machine (spec.md §4.4
/// `calibration_click`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CalibrationStep {
    AwaitingCenter,
    AwaitingRadius,
}

/// Inbound control commands from the duplex channel or the equivalent
/// `POST /session/...` / `POST /hsv` endpoints (spec.md §4.4, §9 "Dynamic
/// message shapes" -- a tagged enum so unknown variants fail to parse
/// rather than being silently accepted).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    ModeSwitch { mode: Mode },
    SessionStart,
    SessionStop,
    CalibrationClick { x: i32, y: i32 },
    BpmChange { delta: i32 },
    HsvUpdate { lower: (u8, u8, u8), upper: (u8, u8, u8) },
    Dismiss,
}

const BPM_MIN: u32 = 30;
const BPM_MAX: u32 = 180;
const DEFAULT_BPM: u32 = 60;

#[derive(Debug, Clone, Copy)]
struct Sample {
    t: f64,
    position: Option<(f64, f64)>,
    jitter: f64,
    hold_inside: bool,
    follow_lateral: f64,
}

/// The live, in-progress session (spec.md §3 `Session (live)`).
pub struct LiveSession {
    pub mode: Mode,
    started_at: f64,
    duration_s: f64,
    pub hsv_used: HsvRange,
    samples: Vec<Sample>,
    pub calibration: Option<Calibration>,
    pub bpm: u32,
    target_path: TargetPath,
    beat_counter: BeatCounter,
    frames_total: u64,
    frames_marker_found: u64,
    frames_inside: u64,
}

impl LiveSession {
    pub fn elapsed(&self, now: f64) -> f64 {
        (now - self.started_at).max(0.0)
    }

    pub fn time_remaining(&self, now: f64) -> f64 {
        (self.duration_s - self.elapsed(now)).max(0.0)
    }

    pub fn is_expired(&self, now: f64) -> bool {
        self.elapsed(now) >= self.duration_s
    }
}

/// Finalized, persisted session (spec.md §6 persisted schema; field names
/// and optionality match that schema exactly, including the open question
/// decided in SPEC_FULL.md §9: `tremor_score` stores the published 0-100
/// score for both modes).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub duration_s: f64,
    pub hsv_lower: (u8, u8, u8),
    pub hsv_upper: (u8, u8, u8),
    pub tremor_score: f64,
    pub frames_total: u64,
    pub frames_marker_found: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub circle_center: Option<(i32, i32)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circle_radius: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_jitter: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p95_jitter: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inside_circle_pct: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_lateral_jitter: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p95_lateral_jitter: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_lateral_jitter: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beats_total: Option<u32>,
}

/// Stability level derived from the published score (spec.md §4.4 HOLD
/// metrics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StabilityLevel {
    Stable,
    Warning,
    Unstable,
}

impl StabilityLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            StabilityLevel::Stable
        } else if score >= 50.0 {
            StabilityLevel::Warning
        } else {
            StabilityLevel::Unstable
        }
    }
}

/// Published 0-100 score, shared by both modes (GLOSSARY "Tremor score /
/// movement-quality score").
pub fn published_score(p95: f64) -> f64 {
    (100.0 - 5.0 * p95).max(0.0)
}

/// One tick's worth of externally-visible output, handed to the overlay
/// renderer and the stream server.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub state: SessionState,
    pub mode: Mode,
    pub position: Option<(f64, f64)>,
    pub marker_detected: bool,
    pub jitter: f64,
    pub p95_jitter: f64,
    pub lateral_jitter: Option<f64>,
    pub p95_lateral_jitter: Option<f64>,
    pub stability_level: Option<StabilityLevel>,
    pub feedback_status: Option<FeedbackStatus>,
    pub score: f64,
    pub time_remaining: f64,
    pub elapsed: f64,
    pub bpm: Option<u32>,
    pub beat_count: Option<u32>,
    pub inside_circle: Option<bool>,
    pub target_position: Option<(f64, f64)>,
    /// Present exactly on the tick that transitions RUNNING -> COMPLETE.
    pub completed: Option<SessionRecord>,
}

/// The session controller (C4). Owns the one live `Session`, the active
/// `HsvRange`, and `Calibration` -- the single-owner design from SPEC_FULL
/// §9.
pub struct SessionController {
    mode: Mode,
    state: SessionState,
    calibration: Option<Calibration>,
    calibration_step: CalibrationStep,
    bpm: u32,
    hsv: HsvRange,
    last_observation_detected: bool,
    live: Option<LiveSession>,
    smoother: Smoother,
    frame_width: u32,
    frame_height: u32,
    /// Set by `session_stop`; consumed on the next `tick` to force
    /// finalization as if the deadline had elapsed (spec.md §4.4).
    force_complete_flag: bool,
}

impl SessionController {
    pub fn new(initial_hsv: HsvRange, frame_width: u32, frame_height: u32) -> Self {
        Self {
            mode: Mode::Hold,
            state: SessionState::Idle,
            calibration: None,
            calibration_step: CalibrationStep::AwaitingCenter,
            bpm: DEFAULT_BPM,
            hsv: initial_hsv,
            last_observation_detected: false,
            live: None,
            smoother: Smoother::new(),
            frame_width,
            frame_height,
            force_complete_flag: false,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn hsv(&self) -> HsvRange {
        self.hsv
    }

    pub fn calibration(&self) -> Option<Calibration> {
        self.calibration
    }

    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    /// Applies one control command. Invariant (spec.md §4.4): commands are
    /// applied between frames, never mid-frame -- callers must drain the
    /// command queue before calling [`Self::tick`], never during it.
    pub fn apply_command(&mut self, cmd: ClientCommand) -> Result<()> {
        match cmd {
            ClientCommand::ModeSwitch { mode } => {
                if self.state == SessionState::Running {
                    return Err(Error::InvalidControl(
                        "cannot switch mode while RUNNING".into(),
                    ));
                }
                self.mode = mode;
                self.live = None;
                if mode == Mode::Follow {
                    self.calibration = None;
                    self.calibration_step = CalibrationStep::AwaitingCenter;
                }
                Ok(())
            }
            ClientCommand::SessionStart => self.start_session(),
            ClientCommand::SessionStop => self.stop_session(),
            ClientCommand::CalibrationClick { x, y } => self.calibration_click(x, y),
            ClientCommand::BpmChange { delta } => {
                if self.state == SessionState::Running {
                    return Err(Error::InvalidControl(
                        "cannot change BPM while RUNNING".into(),
                    ));
                }
                let new_bpm = (self.bpm as i32 + delta).clamp(BPM_MIN as i32, BPM_MAX as i32);
                self.bpm = new_bpm as u32;
                Ok(())
            }
            ClientCommand::HsvUpdate { lower, upper } => {
                self.hsv = HsvRange::new(lower, upper);
                Ok(())
            }
            ClientCommand::Dismiss => {
                if self.state != SessionState::Complete {
                    return Err(Error::InvalidControl("dismiss only valid in COMPLETE".into()));
                }
                self.state = SessionState::Idle;
                Ok(())
            }
        }
    }

    fn calibration_click(&mut self, x: i32, y: i32) -> Result<()> {
        if self.mode != Mode::Hold || self.state == SessionState::Running {
            return Err(Error::InvalidControl(
                "calibration click requires HOLD mode and not RUNNING".into(),
            ));
        }
        match self.calibration_step {
            CalibrationStep::AwaitingCenter => {
                self.calibration = Some(Calibration {
                    center: (x, y),
                    radius: 0.0,
                });
                self.calibration_step = CalibrationStep::AwaitingRadius;
            }
            CalibrationStep::AwaitingRadius => {
                let center = self.calibration.map(|c| c.center).unwrap_or((x, y));
                let dx = (x - center.0) as f64;
                let dy = (y - center.1) as f64;
                let radius = (dx * dx + dy * dy).sqrt();
                self.calibration = Some(Calibration { center, radius });
                self.calibration_step = CalibrationStep::AwaitingCenter;
            }
        }
        Ok(())
    }

    fn start_session(&mut self) -> Result<()> {
        if self.state == SessionState::Running {
            // Idempotent no-op (spec.md §8 Idempotence).
            return Ok(());
        }
        if !self.last_observation_detected {
            return Err(Error::InvalidControl(
                "cannot start a session without a currently detected marker".into(),
            ));
        }
        if self.mode == Mode::Hold {
            let cal = self.calibration.ok_or_else(|| {
                Error::InvalidControl("HOLD session requires a completed calibration".into())
            })?;
            if cal.radius <= 0.0 {
                return Err(Error::InvalidControl(
                    "HOLD calibration is incomplete (radius not set)".into(),
                ));
            }
        }
        // Implicit COMPLETE -> IDLE -> RUNNING.
        self.state = SessionState::Running;
        self.smoother = Smoother::new();
        self.live = Some(LiveSession {
            mode: self.mode,
            started_at: f64::NAN, // set by caller via `begin_clock` below
            duration_s: self.mode.duration_s(),
            hsv_used: self.hsv,
            samples: Vec::new(),
            calibration: self.calibration,
            bpm: self.bpm,
            target_path: TargetPath::for_frame(self.frame_width, self.frame_height),
            beat_counter: BeatCounter::new(),
            frames_total: 0,
            frames_marker_found: 0,
            frames_inside: 0,
        });
        Ok(())
    }

    fn stop_session(&mut self) -> Result<()> {
        if self.state != SessionState::Running {
            // Idempotent: stopping twice (or stopping when not running) is
            // silently ignored (spec.md §8).
            return Ok(());
        }
        self.force_complete_flag = true;
        Ok(())
    }

    /// Drives the pipeline forward by one frame. `now` is seconds on a
    /// monotonic clock shared with `started_at_monotonic`. Returns the
    /// externally-visible outcome for this tick, including a completed
    /// [`SessionRecord`] on the RUNNING -> COMPLETE transition.
    pub fn tick(&mut self, now: f64, observation: MarkerObservation) -> TickOutcome {
        self.last_observation_detected = observation.detected;

        let sample = self.smoother.observe(observation.position);
        let jitter_now = sample.jitter_now;
        let p95_rolling = self.smoother.p95_jitter();

        let force_stop = std::mem::take(&mut self.force_complete_flag);

        if self.state != SessionState::Running {
            return TickOutcome {
                state: self.state,
                mode: self.mode,
                position: sample.smoothed,
                marker_detected: observation.detected,
                jitter: jitter_now,
                p95_jitter: p95_rolling,
                lateral_jitter: None,
                p95_lateral_jitter: None,
                stability_level: None,
                feedback_status: None,
                score: 0.0,
                time_remaining: 0.0,
                elapsed: 0.0,
                bpm: Some(self.bpm),
                beat_count: None,
                inside_circle: None,
                target_position: None,
                completed: None,
            };
        }

        let live = self.live.as_mut().expect("RUNNING implies a live session");
        if live.started_at.is_nan() {
            live.started_at = now;
        }
        let elapsed = live.elapsed(now);
        let expired = live.is_expired(now) || force_stop;

        live.frames_total += 1;
        if observation.detected {
            live.frames_marker_found += 1;
        }

        let mut inside_circle = None;
        let mut lateral = None;
        let mut target_position = None;
        let mut beat_count = None;

        match self.mode {
            Mode::Hold => {
                let cal = live.calibration.expect("HOLD session always has a calibration");
                let inside = match sample.smoothed {
                    Some((x, y)) => {
                        let dx = x - cal.center.0 as f64;
                        let dy = y - cal.center.1 as f64;
                        (dx * dx + dy * dy).sqrt() <= cal.radius
                    }
                    None => false,
                };
                if inside {
                    live.frames_inside += 1;
                }
                inside_circle = Some(inside);
                live.samples.push(Sample {
                    t: elapsed,
                    position: sample.smoothed,
                    jitter: jitter_now,
                    hold_inside: inside,
                    follow_lateral: 0.0,
                });
            }
            Mode::Follow => {
                let t_pos = live.target_path.position_at(live.bpm, elapsed);
                target_position = Some(t_pos);
                let count = live.beat_counter.update(live.bpm, elapsed);
                beat_count = Some(count);
                let lj = match sample.smoothed {
                    Some(p) => lateral_jitter(p, &live.target_path, live.bpm, elapsed),
                    None => 0.0,
                };
                lateral = Some(lj);
                live.samples.push(Sample {
                    t: elapsed,
                    position: sample.smoothed,
                    jitter: jitter_now,
                    hold_inside: false,
                    follow_lateral: lj,
                });
            }
        }

        let p95_lateral_live = match self.mode {
            Mode::Follow => {
                let values: Vec<f64> = live
                    .samples
                    .iter()
                    .rev()
                    .take(30)
                    .map(|s| s.follow_lateral)
                    .collect();
                Some(percentile(&values, 0.95))
            }
            Mode::Hold => None,
        };

        let live_score = match self.mode {
            Mode::Hold => published_score(p95_rolling),
            Mode::Follow => published_score(p95_lateral_live.unwrap_or(0.0)),
        };

        let completed = if expired {
            Some(self.finalize())
        } else {
            None
        };

        let state_after = if completed.is_some() {
            SessionState::Complete
        } else {
            SessionState::Running
        };

        TickOutcome {
            state: state_after,
            mode: self.mode,
            position: sample.smoothed,
            marker_detected: observation.detected,
            jitter: jitter_now,
            p95_jitter: p95_rolling,
            lateral_jitter: lateral,
            p95_lateral_jitter: p95_lateral_live,
            stability_level: (self.mode == Mode::Hold).then(|| StabilityLevel::from_score(live_score)),
            feedback_status: p95_lateral_live.map(FeedbackStatus::from_p95_lateral),
            score: live_score,
            time_remaining: if state_after == SessionState::Running {
                (self.live.as_ref().unwrap().duration_s - elapsed).max(0.0)
            } else {
                0.0
            },
            elapsed,
            bpm: (self.mode == Mode::Follow).then_some(self.bpm),
            beat_count,
            inside_circle,
            target_position,
            completed,
        }
    }

    /// Finalizes the live session into a [`SessionRecord`] (spec.md §4.4
    /// "On COMPLETE -- aggregate and score") and transitions to COMPLETE.
    fn finalize(&mut self) -> SessionRecord {
        let live = self.live.take().expect("finalize called without a live session");
        self.state = SessionState::Complete;

        let timestamp = chrono::Utc::now().to_rfc3339();
        let hsv_lower = (live.hsv_used.h_lo, live.hsv_used.s_lo, live.hsv_used.v_lo);
        let hsv_upper = (live.hsv_used.h_hi, live.hsv_used.s_hi, live.hsv_used.v_hi);

        match live.mode {
            Mode::Hold => {
                let jitters: Vec<f64> = live.samples.iter().map(|s| s.jitter).collect();
                let avg_jitter = if jitters.is_empty() {
                    0.0
                } else {
                    jitters.iter().sum::<f64>() / jitters.len() as f64
                };
                let p95 = percentile(&jitters, 0.95);
                let score = if live.frames_marker_found == 0 {
                    // Degenerate case (spec.md §8): an entirely missing
                    // marker pins the score to 0, the documented
                    // convention, rather than the vacuous 100 a naive
                    // `max(0, 100 - 5*0)` would produce.
                    0.0
                } else {
                    published_score(p95)
                };
                let inside_pct = if live.frames_total == 0 {
                    0.0
                } else {
                    100.0 * live.frames_inside as f64 / live.frames_total as f64
                };
                let cal = live.calibration;

                SessionRecord {
                    timestamp,
                    kind: "HOLD".to_string(),
                    duration_s: live.duration_s,
                    hsv_lower,
                    hsv_upper,
                    tremor_score: score,
                    frames_total: live.frames_total,
                    frames_marker_found: live.frames_marker_found,
                    circle_center: cal.map(|c| c.center),
                    circle_radius: cal.map(|c| c.radius),
                    avg_jitter: Some(avg_jitter),
                    p95_jitter: Some(p95),
                    inside_circle_pct: Some(inside_pct),
                    avg_lateral_jitter: None,
                    p95_lateral_jitter: None,
                    max_lateral_jitter: None,
                    beats_total: None,
                }
            }
            Mode::Follow => {
                let laterals: Vec<f64> = live.samples.iter().map(|s| s.follow_lateral).collect();
                let avg = if laterals.is_empty() {
                    0.0
                } else {
                    laterals.iter().sum::<f64>() / laterals.len() as f64
                };
                let p95 = percentile(&laterals, 0.95);
                let max = laterals.iter().cloned().fold(0.0_f64, f64::max);
                let score = if live.frames_marker_found == 0 {
                    0.0
                } else {
                    published_score(p95)
                };

                SessionRecord {
                    timestamp,
                    kind: "FOLLOW".to_string(),
                    duration_s: live.duration_s,
                    hsv_lower,
                    hsv_upper,
                    tremor_score: score,
                    frames_total: live.frames_total,
                    frames_marker_found: live.frames_marker_found,
                    circle_center: None,
                    circle_radius: None,
                    avg_jitter: None,
                    p95_jitter: None,
                    inside_circle_pct: None,
                    avg_lateral_jitter: Some(avg),
                    p95_lateral_jitter: Some(p95),
                    max_lateral_jitter: Some(max),
                    beats_total: Some(live.beat_counter.total()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn green() -> HsvRange {
        crate::hsv::PenColor::Green.preset()
    }

    fn detected(x: i32, y: i32) -> MarkerObservation {
        MarkerObservation {
            position: Some((x, y)),
            detected: true,
        }
    }

    fn not_detected() -> MarkerObservation {
        MarkerObservation {
            position: None,
            detected: false,
        }
    }

    #[test]
    fn hold_requires_calibration_to_start() {
        let mut c = SessionController::new(green(), 640, 480);
        c.tick(0.0, detected(320, 240));
        let err = c.apply_command(ClientCommand::SessionStart).unwrap_err();
        assert!(matches!(err, Error::InvalidControl(_)));
        assert_eq!(c.state(), SessionState::Idle);
    }

    #[test]
    fn perfect_hold_scores_high() {
        let mut c = SessionController::new(green(), 640, 480);
        c.tick(0.0, detected(320, 240));
        c.apply_command(ClientCommand::CalibrationClick { x: 320, y: 240 }).unwrap();
        c.apply_command(ClientCommand::CalibrationClick { x: 340, y: 240 }).unwrap();
        c.apply_command(ClientCommand::SessionStart).unwrap();
        assert_eq!(c.state(), SessionState::Running);

        let mut last = None;
        for i in 0..300 {
            let t = i as f64 / 30.0;
            last = Some(c.tick(t, detected(320, 240)));
        }
        // Drive past the 10s deadline to force completion.
        let outcome = c.tick(11.0, detected(320, 240));
        let record = outcome.completed.expect("session should have completed");
        assert_eq!(record.frames_total, 301);
        assert_eq!(record.frames_marker_found, 301);
        assert!(record.p95_jitter.unwrap() < 1.0);
        assert_eq!(record.inside_circle_pct.unwrap(), 100.0);
        assert!(record.tremor_score >= 95.0);
        let _ = last;
    }

    #[test]
    fn session_stop_is_idempotent() {
        let mut c = SessionController::new(green(), 640, 480);
        c.tick(0.0, detected(320, 240));
        c.apply_command(ClientCommand::CalibrationClick { x: 320, y: 240 }).unwrap();
        c.apply_command(ClientCommand::CalibrationClick { x: 340, y: 240 }).unwrap();
        c.apply_command(ClientCommand::SessionStart).unwrap();
        c.apply_command(ClientCommand::SessionStop).unwrap();
        let outcome = c.tick(0.1, detected(320, 240));
        assert!(outcome.completed.is_some());
        // Second stop after completion is a silent no-op.
        c.apply_command(ClientCommand::SessionStop).unwrap();
        assert_eq!(c.state(), SessionState::Complete);
    }

    #[test]
    fn session_start_while_running_is_a_no_op() {
        let mut c = SessionController::new(green(), 640, 480);
        c.tick(0.0, detected(320, 240));
        c.apply_command(ClientCommand::CalibrationClick { x: 320, y: 240 }).unwrap();
        c.apply_command(ClientCommand::CalibrationClick { x: 340, y: 240 }).unwrap();
        c.apply_command(ClientCommand::SessionStart).unwrap();
        c.apply_command(ClientCommand::SessionStart).unwrap();
        assert_eq!(c.state(), SessionState::Running);
    }

    #[test]
    fn hold_missing_marker_pins_score_to_zero() {
        let mut c = SessionController::new(green(), 640, 480);
        c.tick(0.0, detected(320, 240));
        c.apply_command(ClientCommand::CalibrationClick { x: 320, y: 240 }).unwrap();
        c.apply_command(ClientCommand::CalibrationClick { x: 340, y: 240 }).unwrap();
        c.apply_command(ClientCommand::SessionStart).unwrap();
        let outcome = c.tick(11.0, not_detected());
        let record = outcome.completed.unwrap();
        assert_eq!(record.frames_marker_found, 0);
        assert_eq!(record.avg_jitter.unwrap(), 0.0);
        assert_eq!(record.p95_jitter.unwrap(), 0.0);
        assert_eq!(record.inside_circle_pct.unwrap(), 0.0);
        assert_eq!(record.tremor_score, 0.0);
    }

    #[test]
    fn follow_beat_count_in_expected_range() {
        let mut c = SessionController::new(green(), 640, 480);
        c.apply_command(ClientCommand::ModeSwitch { mode: Mode::Follow }).unwrap();
        c.tick(0.0, detected(320, 240));
        c.apply_command(ClientCommand::SessionStart).unwrap();
        let mut last_outcome = None;
        for i in 0..(20 * 30) {
            let t = i as f64 / 30.0;
            last_outcome = Some(c.tick(t, detected(320, 240)));
        }
        let outcome = c.tick(21.0, detected(320, 240));
        let record = outcome.completed.unwrap();
        assert!((19..=21).contains(&record.beats_total.unwrap()));
        let _ = last_outcome;
    }

    #[test]
    fn session_record_round_trips_through_json() {
        let record = SessionRecord {
            timestamp: "2026-01-01T00:00:00Z".into(),
            kind: "HOLD".into(),
            duration_s: 10.0,
            hsv_lower: (0, 100, 100),
            hsv_upper: (10, 255, 255),
            tremor_score: 87.5,
            frames_total: 300,
            frames_marker_found: 300,
            circle_center: Some((320, 240)),
            circle_radius: Some(20.0),
            avg_jitter: Some(1.2),
            p95_jitter: Some(2.5),
            inside_circle_pct: Some(100.0),
            avg_lateral_jitter: None,
            p95_lateral_jitter: None,
            max_lateral_jitter: None,
            beats_total: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }
}
