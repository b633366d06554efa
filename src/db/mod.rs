//! Durable session store.
//!
//! All SQLite access happens on one dedicated worker thread fed through an
//! mpsc command channel; callers await a oneshot reply. The single thread is
//! also what serializes writes, so no further per-session locking is needed.

use std::{
    convert::TryFrom,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc, Mutex,
    },
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::oneshot;

mod migrations;

use crate::models::{AnalysisRecord, Expression, FocusSession};
use migrations::run_migrations;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct StoreInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if !self.closed.load(Ordering::SeqCst) {
                if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                    error!("failed to send shutdown to store thread: {err}");
                }
            }
            if let Err(join_err) = handle.join() {
                error!("failed to join store thread: {join_err:?}");
            }
        }
    }
}

fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

fn to_u64(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("value {value} is negative"))
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("invalid datetime '{value}': {err}"))
}

/// One row of the session history listing.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: String,
    pub goal: String,
    pub planned_ms: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub total_focused_ms: u64,
    pub total_distracted_ms: u64,
    pub analysis_count: u32,
}

#[derive(Debug, Clone)]
pub struct SessionDetail {
    pub session: SessionSummary,
    pub results: Vec<AnalysisRecord>,
}

/// Aggregates over a trailing window of days.
#[derive(Debug, Clone)]
pub struct FocusStatistics {
    pub period_days: u32,
    pub total_sessions: u32,
    pub completed_sessions: u32,
    /// Percentage in [0, 100].
    pub completion_rate: f64,
    pub total_focused_minutes: f64,
    pub total_distracted_minutes: f64,
    pub avg_session_minutes: f64,
    pub top_goals: Vec<(String, u32)>,
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

impl SessionStore {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("deskmate-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(
                            Err(anyhow::Error::new(err).context("failed to open SQLite database")),
                        );
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("failed to enable WAL mode: {err}");
                }
                if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
                    error!("failed to enable foreign keys: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("store initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => task(&mut conn),
                        DbCommand::Shutdown => break,
                    }
                }

                info!("session store thread shutting down");
            })
            .context("failed to spawn session store worker thread")?;

        ready_rx
            .recv()
            .context("session store worker exited before signaling readiness")??;

        info!("session store initialized at {}", db_path.display());

        Ok(Self {
            inner: Arc::new(StoreInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Stop the worker thread. Commands already queued are still processed;
    /// every operation issued afterwards fails.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        if self.inner.sender.send(DbCommand::Shutdown).is_err() {
            error!("store thread already gone on close");
        }
    }

    async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("store caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to store thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("session store thread terminated unexpectedly"))?
    }

    pub async fn insert_session(&self, session: &FocusSession) -> Result<()> {
        let record = session.clone();
        let now = Utc::now();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, goal, planned_ms, started_at, ended_at, active, paused,
                                       total_pause_ms, total_focused_ms, total_distracted_ms,
                                       created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    record.id,
                    record.goal,
                    to_i64(record.planned_ms)?,
                    record.started_at.to_rfc3339(),
                    record.ended_at.as_ref().map(|dt| dt.to_rfc3339()),
                    record.active,
                    record.paused,
                    to_i64(record.total_pause_ms)?,
                    to_i64(record.total_focused_ms)?,
                    to_i64(record.total_distracted_ms)?,
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            )
            .context("failed to insert session")?;
            Ok(())
        })
        .await
    }

    /// Refresh the mutable columns of a session's own row.
    pub async fn update_session(&self, session: &FocusSession) -> Result<()> {
        let record = session.clone();
        let now = Utc::now();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET ended_at = ?1,
                     active = ?2,
                     paused = ?3,
                     total_pause_ms = ?4,
                     total_focused_ms = ?5,
                     total_distracted_ms = ?6,
                     updated_at = ?7
                 WHERE id = ?8",
                params![
                    record.ended_at.as_ref().map(|dt| dt.to_rfc3339()),
                    record.active,
                    record.paused,
                    to_i64(record.total_pause_ms)?,
                    to_i64(record.total_focused_ms)?,
                    to_i64(record.total_distracted_ms)?,
                    now.to_rfc3339(),
                    record.id,
                ],
            )
            .context("failed to update session")?;
            Ok(())
        })
        .await
    }

    pub async fn insert_result(&self, session_id: &str, result: &AnalysisRecord) -> Result<()> {
        let session_id = session_id.to_string();
        let record = result.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO analysis_results (id, session_id, captured_at, snapshot_ref,
                                               description, is_focused, feedback, expression,
                                               latency_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id,
                    session_id,
                    record.captured_at.to_rfc3339(),
                    record.snapshot_ref,
                    record.description,
                    record.is_focused,
                    record.feedback,
                    record.expression.as_str(),
                    to_i64(record.latency_ms)?,
                ],
            )
            .context("failed to insert analysis result")?;
            Ok(())
        })
        .await
    }

    /// Recent history, newest first.
    pub async fn list_history(&self, limit: u32, offset: u32) -> Result<Vec<SessionSummary>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, goal, planned_ms, started_at, ended_at, active,
                        total_focused_ms, total_distracted_ms,
                        (SELECT COUNT(*) FROM analysis_results
                         WHERE session_id = sessions.id) AS analysis_count
                 FROM sessions
                 ORDER BY started_at DESC
                 LIMIT ?1 OFFSET ?2",
            )?;

            let mut rows = stmt.query(params![limit, offset])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(summary_from_row(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    pub async fn session_detail(&self, session_id: &str) -> Result<Option<SessionDetail>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let summary = conn
                .query_row(
                    "SELECT id, goal, planned_ms, started_at, ended_at, active,
                            total_focused_ms, total_distracted_ms,
                            (SELECT COUNT(*) FROM analysis_results
                             WHERE session_id = sessions.id) AS analysis_count
                     FROM sessions
                     WHERE id = ?1",
                    params![session_id],
                    |row| {
                        Ok(summary_from_row(row))
                    },
                )
                .optional()?
                .transpose()?;

            let Some(summary) = summary else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT id, captured_at, snapshot_ref, description, is_focused, feedback,
                        expression, latency_ms
                 FROM analysis_results
                 WHERE session_id = ?1
                 ORDER BY captured_at ASC",
            )?;

            let mut rows = stmt.query(params![summary.id])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(AnalysisRecord {
                    id: row.get(0)?,
                    captured_at: parse_datetime(&row.get::<_, String>(1)?)?,
                    snapshot_ref: row.get(2)?,
                    description: row.get(3)?,
                    is_focused: row.get(4)?,
                    feedback: row.get(5)?,
                    expression: Expression::from_tag(&row.get::<_, String>(6)?),
                    latency_ms: to_u64(row.get::<_, i64>(7)?)?,
                });
            }

            Ok(Some(SessionDetail {
                session: summary,
                results,
            }))
        })
        .await
    }

    /// Aggregate statistics over the trailing `days`-day window. Sessions
    /// count as completed once their `ended_at` is set.
    pub async fn statistics(&self, days: u32) -> Result<FocusStatistics> {
        let since = (Utc::now() - ChronoDuration::days(i64::from(days))).to_rfc3339();
        self.execute(move |conn| {
            let total_sessions: u32 = conn.query_row(
                "SELECT COUNT(*) FROM sessions WHERE started_at >= ?1",
                params![since],
                |row| row.get(0),
            )?;

            let completed_sessions: u32 = conn.query_row(
                "SELECT COUNT(*) FROM sessions
                 WHERE started_at >= ?1 AND ended_at IS NOT NULL",
                params![since],
                |row| row.get(0),
            )?;

            let (focused_ms, distracted_ms): (i64, i64) = conn.query_row(
                "SELECT COALESCE(SUM(total_focused_ms), 0),
                        COALESCE(SUM(total_distracted_ms), 0)
                 FROM sessions WHERE started_at >= ?1",
                params![since],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let avg_session_minutes: f64 = conn.query_row(
                "SELECT COALESCE(AVG((julianday(ended_at) - julianday(started_at)) * 1440.0), 0)
                 FROM sessions
                 WHERE started_at >= ?1 AND ended_at IS NOT NULL",
                params![since],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(
                "SELECT goal, COUNT(*) AS uses FROM sessions
                 WHERE started_at >= ?1
                 GROUP BY goal
                 ORDER BY uses DESC
                 LIMIT 5",
            )?;
            let mut rows = stmt.query(params![since])?;
            let mut top_goals = Vec::new();
            while let Some(row) = rows.next()? {
                top_goals.push((row.get::<_, String>(0)?, row.get::<_, u32>(1)?));
            }

            let completion_rate = if total_sessions > 0 {
                f64::from(completed_sessions) / f64::from(total_sessions) * 100.0
            } else {
                0.0
            };

            Ok(FocusStatistics {
                period_days: days,
                total_sessions,
                completed_sessions,
                completion_rate,
                total_focused_minutes: focused_ms as f64 / 60_000.0,
                total_distracted_minutes: distracted_ms as f64 / 60_000.0,
                avg_session_minutes,
                top_goals,
            })
        })
        .await
    }

    /// Remove one session; its analysis results go with it via the cascade.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])
                .context("failed to delete session")?;
            Ok(())
        })
        .await
    }

    /// Retention cleanup: drop sessions started before the horizon. Returns
    /// the number of sessions removed.
    pub async fn delete_older_than(&self, days: u32) -> Result<usize> {
        let cutoff = (Utc::now() - ChronoDuration::days(i64::from(days))).to_rfc3339();
        self.execute(move |conn| {
            let removed = conn
                .execute("DELETE FROM sessions WHERE started_at < ?1", params![cutoff])
                .context("failed to delete expired sessions")?;
            Ok(removed)
        })
        .await
    }
}

fn summary_from_row(row: &rusqlite::Row<'_>) -> Result<SessionSummary> {
    Ok(SessionSummary {
        id: row.get(0)?,
        goal: row.get(1)?,
        planned_ms: to_u64(row.get::<_, i64>(2)?)?,
        started_at: parse_datetime(&row.get::<_, String>(3)?)?,
        ended_at: row
            .get::<_, Option<String>>(4)?
            .map(|value| parse_datetime(&value))
            .transpose()?,
        active: row.get(5)?,
        total_focused_ms: to_u64(row.get::<_, i64>(6)?)?,
        total_distracted_ms: to_u64(row.get::<_, i64>(7)?)?,
        analysis_count: row.get(8)?,
    })
}
