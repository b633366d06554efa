use anyhow::{bail, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::AnalysisRecord;

fn delta_ms(later: DateTime<Utc>, earlier: DateTime<Utc>) -> u64 {
    (later - earlier).num_milliseconds().max(0) as u64
}

/// One focus attempt: a goal, a planned length, and the pause/analysis
/// bookkeeping accumulated while it runs.
///
/// All time arithmetic takes an explicit `now` so callers (and tests) control
/// the clock. The struct does not enforce the single-active-session rule;
/// the `FocusMonitor` does.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusSession {
    pub id: String,
    pub goal: String,
    pub planned_ms: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub paused: bool,
    pub pause_started_at: Option<DateTime<Utc>>,
    /// Closed pause intervals only; an in-progress pause is accounted for
    /// separately so this field never decreases.
    pub total_pause_ms: u64,
    pub total_focused_ms: u64,
    pub total_distracted_ms: u64,
    pub results: Vec<AnalysisRecord>,
}

impl FocusSession {
    pub fn new(goal: &str, planned: Duration, now: DateTime<Utc>) -> Result<Self> {
        let goal = goal.trim();
        if goal.is_empty() {
            bail!("focus goal must not be empty");
        }
        if planned.is_zero() {
            bail!("planned duration must be greater than zero");
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            goal: goal.to_string(),
            planned_ms: planned.as_millis() as u64,
            started_at: now,
            ended_at: None,
            active: true,
            paused: false,
            pause_started_at: None,
            total_pause_ms: 0,
            total_focused_ms: 0,
            total_distracted_ms: 0,
            results: Vec::new(),
        })
    }

    /// Terminal sessions accept no further mutation.
    pub fn is_terminal(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Closed pauses plus the currently open one, if any.
    fn effective_pause_ms(&self, now: DateTime<Utc>) -> u64 {
        let open = match (self.paused, self.pause_started_at) {
            (true, Some(since)) => delta_ms(now, since),
            _ => 0,
        };
        self.total_pause_ms.saturating_add(open)
    }

    /// Working time so far: wall time minus pauses, frozen at `ended_at`
    /// once terminal. Never negative.
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        let reference = self.ended_at.unwrap_or(now);
        delta_ms(reference, self.started_at).saturating_sub(self.effective_pause_ms(reference))
    }

    pub fn remaining_ms(&self, now: DateTime<Utc>) -> u64 {
        self.planned_ms.saturating_sub(self.elapsed_ms(now))
    }

    /// True exactly once the planned duration has been worked off; stays
    /// true on later queries because elapsed time never shrinks.
    pub fn is_completed(&self, now: DateTime<Utc>) -> bool {
        self.remaining_ms(now) == 0
    }

    /// Begin a pause. No-op when already paused or terminal, so repeated
    /// pause calls cannot double-count.
    pub fn pause(&mut self, now: DateTime<Utc>) {
        if self.is_terminal() || self.paused {
            return;
        }
        self.paused = true;
        self.pause_started_at = Some(now);
    }

    /// Close the open pause, folding it into `total_pause_ms`. No-op when
    /// not paused or terminal.
    pub fn resume(&mut self, now: DateTime<Utc>) {
        if self.is_terminal() || !self.paused {
            return;
        }
        if let Some(since) = self.pause_started_at.take() {
            self.total_pause_ms = self.total_pause_ms.saturating_add(delta_ms(now, since));
        }
        self.paused = false;
    }

    /// Mark the session terminal. An open pause is closed first so the
    /// elapsed arithmetic stays consistent after the fact.
    pub fn complete(&mut self, now: DateTime<Utc>) {
        if self.is_terminal() {
            return;
        }
        if self.paused {
            self.resume(now);
        }
        self.active = false;
        self.ended_at = Some(now);
    }

    /// Append a verdict and refresh the focused/distracted time proxies
    /// (`verdict count × analysis interval`). Returns false without mutating
    /// when the session is already terminal.
    pub fn push_result(&mut self, record: AnalysisRecord, analysis_interval: Duration) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.results.push(record);

        let interval_ms = analysis_interval.as_millis() as u64;
        let focused = self.results.iter().filter(|r| r.is_focused).count() as u64;
        let distracted = self.results.len() as u64 - focused;
        self.total_focused_ms = focused * interval_ms;
        self.total_distracted_ms = distracted * interval_ms;
        true
    }

    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> f64 {
        self.elapsed_ms(now) as f64 / 60_000.0
    }
}

/// Convenience for building `now + offset` instants in tests and timers.
pub fn instant_after(start: DateTime<Utc>, offset: Duration) -> DateTime<Utc> {
    start + ChronoDuration::milliseconds(offset.as_millis() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Expression;

    const MIN: Duration = Duration::from_secs(60);

    fn record(is_focused: bool) -> AnalysisRecord {
        AnalysisRecord {
            id: Uuid::new_v4().to_string(),
            captured_at: Utc::now(),
            snapshot_ref: "shot.jpg".into(),
            description: "editor open".into(),
            is_focused,
            feedback: "keep going".into(),
            expression: Expression::Fire,
            latency_ms: 1200,
        }
    }

    #[test]
    fn rejects_empty_goal_and_zero_duration() {
        let now = Utc::now();
        assert!(FocusSession::new("  ", 25 * MIN, now).is_err());
        assert!(FocusSession::new("Write report", Duration::ZERO, now).is_err());
    }

    #[test]
    fn elapsed_is_zero_at_construction_and_never_negative() {
        let now = Utc::now();
        let session = FocusSession::new("Write report", 25 * MIN, now).expect("session");
        assert_eq!(session.elapsed_ms(now), 0);
        // Clock skew: a query slightly before start must not underflow.
        assert_eq!(session.elapsed_ms(now - ChronoDuration::seconds(5)), 0);
        assert_eq!(session.remaining_ms(now), 25 * 60 * 1000);
    }

    #[test]
    fn pause_freezes_elapsed_and_resume_accounts_the_gap() {
        let t0 = Utc::now();
        let mut session = FocusSession::new("Write report", 25 * MIN, t0).expect("session");

        let t1 = instant_after(t0, Duration::from_secs(600));
        session.pause(t1);
        assert_eq!(session.elapsed_ms(t1), 600_000);

        // Ten minutes of pause pass; elapsed must not move.
        let t2 = instant_after(t1, Duration::from_secs(600));
        assert_eq!(session.elapsed_ms(t2), 600_000);

        session.resume(t2);
        assert_eq!(session.total_pause_ms, 600_000);

        let t3 = instant_after(t2, Duration::from_secs(300));
        assert_eq!(session.elapsed_ms(t3), 900_000);
    }

    #[test]
    fn double_pause_does_not_double_count_and_bare_resume_is_noop() {
        let t0 = Utc::now();
        let mut session = FocusSession::new("Write report", 25 * MIN, t0).expect("session");

        session.resume(t0); // no prior pause
        assert!(!session.paused);
        assert_eq!(session.total_pause_ms, 0);

        let t1 = instant_after(t0, Duration::from_secs(60));
        session.pause(t1);
        let t2 = instant_after(t1, Duration::from_secs(60));
        session.pause(t2); // second pause keeps the original anchor
        assert_eq!(session.pause_started_at, Some(t1));

        let t3 = instant_after(t1, Duration::from_secs(120));
        session.resume(t3);
        assert_eq!(session.total_pause_ms, 120_000);
    }

    #[test]
    fn completed_becomes_true_at_planned_duration_and_stays_true() {
        let t0 = Utc::now();
        let session = FocusSession::new("Write report", 25 * MIN, t0).expect("session");

        let almost = instant_after(t0, Duration::from_secs(25 * 60 - 1));
        assert!(!session.is_completed(almost));

        let done = instant_after(t0, 25 * MIN);
        assert!(session.is_completed(done));
        assert!(session.is_completed(instant_after(done, Duration::from_secs(3600))));
    }

    #[test]
    fn complete_closes_open_pause_and_freezes_arithmetic() {
        let t0 = Utc::now();
        let mut session = FocusSession::new("Write report", 25 * MIN, t0).expect("session");

        let t1 = instant_after(t0, Duration::from_secs(300));
        session.pause(t1);
        let t2 = instant_after(t1, Duration::from_secs(100));
        session.complete(t2);

        assert!(session.is_terminal());
        assert!(!session.active);
        assert!(!session.paused);
        assert_eq!(session.total_pause_ms, 100_000);
        // Frozen at ended_at regardless of how late the query is.
        let much_later = instant_after(t2, Duration::from_secs(9999));
        assert_eq!(session.elapsed_ms(much_later), 300_000);
    }

    #[test]
    fn terminal_session_rejects_further_mutation() {
        let t0 = Utc::now();
        let mut session = FocusSession::new("Write report", 25 * MIN, t0).expect("session");
        let t1 = instant_after(t0, 25 * MIN);
        session.complete(t1);

        let snapshot = session.clone();
        session.pause(t1);
        session.resume(t1);
        assert!(!session.push_result(record(true), Duration::from_secs(10)));
        assert_eq!(session.results.len(), snapshot.results.len());
        assert_eq!(session.total_pause_ms, snapshot.total_pause_ms);
        assert_eq!(session.paused, snapshot.paused);
    }

    #[test]
    fn push_result_updates_time_proxies() {
        let t0 = Utc::now();
        let mut session = FocusSession::new("Write report", 25 * MIN, t0).expect("session");
        let interval = Duration::from_secs(10);

        assert!(session.push_result(record(true), interval));
        assert!(session.push_result(record(true), interval));
        assert!(session.push_result(record(false), interval));

        assert_eq!(session.total_focused_ms, 20_000);
        assert_eq!(session.total_distracted_ms, 10_000);
    }
}
