//! C7: session store. Append-only JSON persistence plus trend analytics
//! over the most recent `SessionRecord`s (spec.md §4.7).
//!
//! Grounded on the teacher's `flydra2::write_data` durability idiom
//! (`create_dir_all` the parent, open/write, then keep the handle to force
//! data to disk) adapted to a single whole-file JSON array instead of CSV,
//! since spec.md's persisted schema is one JSON object per session.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::session::SessionRecord;

/// Trend label derived by comparing the 5 most recent sessions against the
/// 5 before them (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

/// Response body for `GET /api/sessions?limit=N` (spec.md §6).
#[derive(Debug, Clone, Serialize)]
pub struct SessionQuery {
    pub sessions: Vec<SessionRecord>,
    pub trend: Option<Trend>,
    #[serde(rename = "trendPercent")]
    pub trend_percent: Option<f64>,
}

/// Append-only store backing `SESSIONS_FILE` (spec.md §6, §4.7). The whole
/// file is a single JSON array; every append re-reads, pushes, and
/// rewrites it, which is adequate for the session volumes this tool
/// produces (a handful of sessions per sitting) and keeps the on-disk
/// format identical to the one read back by `load_all`.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_raw(&self) -> Result<Vec<SessionRecord>> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| Error::PersistenceFailure(format!("corrupt sessions file: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::PersistenceFailure(e.to_string())),
        }
    }

    /// Appends one record and fsyncs before returning, so a successful
    /// return implies the record survives a crash (spec.md §4.7, §8
    /// scenario 5). Blocking; callers run this on a dedicated persistence
    /// task/thread, never the pipeline tick.
    pub fn append(&self, record: &SessionRecord) -> Result<()> {
        let mut records = self.read_raw()?;
        records.push(record.clone());
        self.write_all(&records)
    }

    fn write_all(&self, records: &[SessionRecord]) -> Result<()> {
        if let Some(parent) = Path::new(&self.path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| Error::PersistenceFailure(e.to_string()))?;
            }
        }
        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp_path)
            .map_err(|e| Error::PersistenceFailure(e.to_string()))?;
        let bytes = serde_json::to_vec(records)?;
        file.write_all(&bytes)
            .map_err(|e| Error::PersistenceFailure(e.to_string()))?;
        file.sync_all()
            .map_err(|e| Error::PersistenceFailure(e.to_string()))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| Error::PersistenceFailure(e.to_string()))?;
        Ok(())
    }

    /// Returns the most recent `limit` records (newest first) plus a trend
    /// summary over `tremor_score` (spec.md §4.7, §8 scenario 6).
    pub fn query(&self, limit: usize) -> Result<SessionQuery> {
        let mut all = self.read_raw()?;
        all.reverse(); // newest first
        let (trend, trend_percent) = trend_over(&all);
        all.truncate(limit);
        Ok(SessionQuery {
            sessions: all,
            trend,
            trend_percent,
        })
    }
}

/// Computes the trend label/percent from a newest-first slice of records
/// (spec.md §4.7: recent 5 vs. the 5 before that).
fn trend_over(newest_first: &[SessionRecord]) -> (Option<Trend>, Option<f64>) {
    if newest_first.len() < 10 {
        return (None, None);
    }
    let recent = &newest_first[0..5];
    let previous = &newest_first[5..10];
    let avg = |rs: &[SessionRecord]| rs.iter().map(|r| r.tremor_score).sum::<f64>() / rs.len() as f64;
    let avg_recent = avg(recent);
    let avg_previous = avg(previous);
    if avg_previous == 0.0 {
        return (Some(Trend::Stable), Some(0.0));
    }
    let percent = (avg_recent - avg_previous) / avg_previous * 100.0;
    let trend = if percent > 5.0 {
        Trend::Improving
    } else if percent < -5.0 {
        Trend::Declining
    } else {
        Trend::Stable
    };
    (Some(trend), Some(percent))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_score(score: f64) -> SessionRecord {
        SessionRecord {
            timestamp: "2026-01-01T00:00:00Z".into(),
            kind: "HOLD".into(),
            duration_s: 10.0,
            hsv_lower: (0, 100, 100),
            hsv_upper: (10, 255, 255),
            tremor_score: score,
            frames_total: 300,
            frames_marker_found: 300,
            circle_center: Some((320, 240)),
            circle_radius: Some(20.0),
            avg_jitter: Some(1.0),
            p95_jitter: Some(2.0),
            inside_circle_pct: Some(100.0),
            avg_lateral_jitter: None,
            p95_lateral_jitter: None,
            max_lateral_jitter: None,
            beats_total: None,
        }
    }

    #[test]
    fn append_then_query_round_trips_through_a_real_file() {
        let dir = std::env::temp_dir().join("steadyscript-store-test-append-then-query");
        let path = dir.join("sessions.json");
        let _ = fs::remove_dir_all(&dir);
        let store = SessionStore::new(&path);
        let record = record_with_score(87.5);
        store.append(&record).unwrap();
        let queried = store.query(10).unwrap();
        assert_eq!(queried.sessions.len(), 1);
        assert_eq!(queried.sessions[0], record);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn trend_matches_the_documented_example() {
        // 11 sessions, oldest-first: [30]*5 + [60]*5 + [90].
        let mut oldest_first = Vec::new();
        oldest_first.extend((0..5).map(|_| record_with_score(30.0)));
        oldest_first.extend((0..5).map(|_| record_with_score(60.0)));
        oldest_first.push(record_with_score(90.0));
        let mut newest_first = oldest_first.clone();
        newest_first.reverse();

        let (trend, percent) = trend_over(&newest_first);
        assert_eq!(trend, Some(Trend::Improving));
        assert!((percent.unwrap() - 120.0).abs() < 1e-9);
    }

    #[test]
    fn fewer_than_ten_records_has_no_trend() {
        let records: Vec<SessionRecord> = (0..9).map(|_| record_with_score(50.0)).collect();
        let (trend, percent) = trend_over(&records);
        assert_eq!(trend, None);
        assert_eq!(percent, None);
    }
}
