//! Focus session monitoring.
//!
//! While a session runs, two tickers are live: a one-second UI ticker that
//! reports remaining time and detects completion, and an analysis ticker on
//! the configured interval that captures the screen and dispatches it to the
//! analyzer. Pausing stops only the analysis ticker; the UI ticker keeps
//! reporting the frozen countdown.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::ai::FocusAnalyzer;
use crate::capture::ScreenshotSource;
use crate::config::SettingsStore;
use crate::db::SessionStore;
use crate::models::{AnalysisRecord, FocusSession};
use crate::speech::SpeechSink;

const ENABLE_LOGS: bool = true;
use crate::{log_info, log_warn};

const UI_TICK_PERIOD: Duration = Duration::from_secs(1);
const ANALYSIS_BUBBLE_MS: u64 = 5_000;

/// Events published while a session runs. Consumed by the mode machine and
/// forwarded to whatever shell hosts the assistant.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// One-second countdown update.
    Tick { remaining_ms: u64 },
    /// A verdict was recorded against the running session.
    Analysis(AnalysisRecord),
    /// The planned duration has been worked off; the session is terminal
    /// and already persisted.
    Completed(FocusSession),
}

struct Tickers {
    root: CancellationToken,
    analysis: CancellationToken,
}

/// Everything an analysis dispatch needs, cloned into the spawned task.
#[derive(Clone)]
struct MonitorContext {
    analyzer: Arc<FocusAnalyzer>,
    capture: Arc<dyn ScreenshotSource>,
    speech: Arc<dyn SpeechSink>,
    store: SessionStore,
    settings: Arc<SettingsStore>,
    session: Arc<Mutex<Option<FocusSession>>>,
    in_flight: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<MonitorEvent>,
}

struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct FocusMonitor {
    ctx: MonitorContext,
    tickers: Mutex<Option<Tickers>>,
}

impl FocusMonitor {
    pub fn new(
        analyzer: Arc<FocusAnalyzer>,
        capture: Arc<dyn ScreenshotSource>,
        speech: Arc<dyn SpeechSink>,
        store: SessionStore,
        settings: Arc<SettingsStore>,
    ) -> (Self, mpsc::UnboundedReceiver<MonitorEvent>) {
        // Unbounded so the tickers never block behind a slow consumer.
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let monitor = Self {
            ctx: MonitorContext {
                analyzer,
                capture,
                speech,
                store,
                settings,
                session: Arc::new(Mutex::new(None)),
                in_flight: Arc::new(AtomicBool::new(false)),
                events: events_tx,
            },
            tickers: Mutex::new(None),
        };
        (monitor, events_rx)
    }

    /// Start monitoring a fresh session. Fails on a terminal session and
    /// when a live one is still held; callers must stop or reactivate first.
    pub async fn begin(&self, session: FocusSession) -> Result<()> {
        if session.is_terminal() {
            bail!("cannot start a session that has already ended");
        }
        if session.is_completed(Utc::now()) {
            bail!("cannot start a session whose planned time is already spent");
        }

        {
            let mut guard = self.ctx.session.lock().await;
            if guard.is_some() {
                bail!("a focus session is already running");
            }
            self.ctx.store.insert_session(&session).await?;
            log_info!(
                "focus session started: '{}' for {} min",
                session.goal,
                session.planned_ms / 60_000
            );
            *guard = Some(session);
        }

        self.start_tickers().await;
        Ok(())
    }

    /// Resume a session left paused by `stop(false)` and restart both
    /// tickers. Returns false when there is nothing to pick back up.
    pub async fn reactivate(&self) -> Result<bool> {
        let resumed = {
            let mut guard = self.ctx.session.lock().await;
            let Some(session) = guard.as_mut() else {
                return Ok(false);
            };
            session.resume(Utc::now());
            session.clone()
        };

        self.ctx.store.update_session(&resumed).await?;
        self.start_tickers().await;
        log_info!("focus session reactivated: '{}'", resumed.goal);
        Ok(true)
    }

    /// Pause the running session. Analysis stops; the countdown freezes but
    /// keeps being reported.
    pub async fn pause(&self) -> Result<()> {
        let updated = {
            let mut guard = self.ctx.session.lock().await;
            let Some(session) = guard.as_mut() else {
                bail!("no focus session to pause");
            };
            session.pause(Utc::now());
            session.clone()
        };

        self.ctx.store.update_session(&updated).await?;

        if let Some(tickers) = self.tickers.lock().await.as_ref() {
            tickers.analysis.cancel();
        }
        log_info!("focus session paused");
        Ok(())
    }

    /// Undo a pause without tearing down the UI ticker. Like the session
    /// arithmetic, a resume without a matching pause is a no-op.
    pub async fn resume(&self) -> Result<()> {
        let updated = {
            let mut guard = self.ctx.session.lock().await;
            let Some(session) = guard.as_mut() else {
                bail!("no focus session to resume");
            };
            if !session.paused {
                return Ok(());
            }
            session.resume(Utc::now());
            session.clone()
        };

        self.ctx.store.update_session(&updated).await?;

        let mut guard = self.tickers.lock().await;
        if let Some(tickers) = guard.as_mut() {
            // At most one analysis ticker, ever.
            tickers.analysis.cancel();
            let child = tickers.root.child_token();
            tickers.analysis = child.clone();
            self.spawn_analysis_ticker(child);
        }
        log_info!("focus session resumed");
        Ok(())
    }

    /// Stop monitoring. With `force_complete` the session ends now and is
    /// handed back; otherwise it is paused in place so `reactivate` can
    /// continue it later. In-flight analysis results are dropped either way.
    pub async fn stop(&self, force_complete: bool) -> Result<Option<FocusSession>> {
        if let Some(tickers) = self.tickers.lock().await.take() {
            tickers.root.cancel();
        }

        let now = Utc::now();
        let mut guard = self.ctx.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return Ok(None);
        };

        if force_complete {
            session.complete(now);
            let finished = session.clone();
            *guard = None;
            drop(guard);
            self.ctx.store.update_session(&finished).await?;
            log_info!("focus session ended early: '{}'", finished.goal);
            Ok(Some(finished))
        } else {
            session.pause(now);
            let paused = session.clone();
            drop(guard);
            self.ctx.store.update_session(&paused).await?;
            log_info!("focus session suspended: '{}'", paused.goal);
            Ok(None)
        }
    }

    pub async fn has_session(&self) -> bool {
        self.ctx.session.lock().await.is_some()
    }

    /// Snapshot of the held session, live or suspended.
    pub async fn current(&self) -> Option<FocusSession> {
        self.ctx.session.lock().await.clone()
    }

    async fn start_tickers(&self) {
        let mut guard = self.tickers.lock().await;
        if let Some(old) = guard.take() {
            old.root.cancel();
        }

        let root = CancellationToken::new();
        let analysis = root.child_token();
        self.spawn_analysis_ticker(analysis.clone());
        self.spawn_ui_ticker(root.clone());
        *guard = Some(Tickers { root, analysis });
    }

    fn spawn_analysis_ticker(&self, token: CancellationToken) {
        let ctx = self.ctx.clone();
        let period = ctx.settings.analysis_interval();

        tokio::spawn(async move {
            // First capture happens one full interval in, not immediately.
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        // A completed or released session ends this ticker;
                        // the UI ticker owns the completion bookkeeping.
                        let done = match ctx.session.lock().await.as_ref() {
                            Some(session) => session.is_completed(Utc::now()),
                            None => true,
                        };
                        if done {
                            break;
                        }
                        dispatch_analysis(ctx.clone(), token.clone());
                    }
                }
            }
        });
    }

    fn spawn_ui_ticker(&self, token: CancellationToken) {
        let ctx = self.ctx.clone();

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + UI_TICK_PERIOD, UI_TICK_PERIOD);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let now = Utc::now();
                        let mut guard = ctx.session.lock().await;
                        let Some(session) = guard.as_mut() else { break };

                        if session.is_completed(now) {
                            session.complete(now);
                            let finished = session.clone();
                            *guard = None;
                            drop(guard);

                            if let Err(err) = ctx.store.update_session(&finished).await {
                                log_warn!("failed to persist completed session: {err}");
                            }
                            // Stops the analysis ticker with us.
                            token.cancel();
                            log_info!("focus session completed: '{}'", finished.goal);
                            let _ = ctx.events.send(MonitorEvent::Completed(finished));
                            break;
                        }

                        let remaining_ms = session.remaining_ms(now);
                        drop(guard);
                        let _ = ctx.events.send(MonitorEvent::Tick { remaining_ms });
                    }
                }
            }
        });
    }
}

/// Run one capture-and-analyze round in its own task. A round still in
/// flight when the next tick lands makes that tick a no-op.
fn dispatch_analysis(ctx: MonitorContext, token: CancellationToken) {
    if ctx
        .in_flight
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        log_info!("previous analysis still running, skipping this tick");
        return;
    }

    tokio::spawn(async move {
        let _guard = InFlightGuard(ctx.in_flight.clone());

        let goal = match ctx.session.lock().await.as_ref() {
            Some(session) if !session.paused => session.goal.clone(),
            _ => return,
        };

        let snapshot = match ctx.capture.capture().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                log_warn!("screen capture failed, skipping this round: {err}");
                return;
            }
        };

        let record = match ctx.analyzer.analyze(&snapshot, &goal).await {
            Ok(record) => record,
            Err(err) => {
                log_warn!("analysis round failed: {err}");
                return;
            }
        };

        // The session may have ended while the models were thinking.
        if token.is_cancelled() {
            log_info!("discarding analysis result that arrived after the session ended");
            return;
        }

        let interval = ctx.settings.analysis_interval();
        let updated = {
            let mut guard = ctx.session.lock().await;
            let Some(session) = guard.as_mut() else { return };
            if !session.push_result(record.clone(), interval) {
                return;
            }
            session.clone()
        };

        if let Err(err) = ctx.store.insert_result(&updated.id, &record).await {
            log_warn!("failed to persist analysis result: {err}");
        }
        if let Err(err) = ctx.store.update_session(&updated).await {
            log_warn!("failed to persist session totals: {err}");
        }

        ctx.speech
            .show(&record.feedback, record.expression, ANALYSIS_BUBBLE_MS);
        let _ = ctx.events.send(MonitorEvent::Analysis(record));
    });
}
