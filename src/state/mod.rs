//! Mode state machine.
//!
//! A single-task actor owns the current mode and everything per-mode: the
//! Awakening probe epoch, the Normal small-talk task, the Standby reminder
//! task and the Focus monitor handle. The shell feeds it `Input`s over a
//! channel and watches `StateEvent`s; the machine never calls back into the
//! shell except through the `SpeechSink`.

mod awakening;
mod focus;
mod normal;
mod standby;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::mpsc;

use crate::ai::{ProbeReport, RemoteModel};
use crate::config::SettingsStore;
use crate::models::{Expression, FocusSession};
use crate::monitor::{FocusMonitor, MonitorEvent};
use crate::speech::{random_interaction_phrase, random_standby_phrase, SpeechSink};
use normal::Chatter;
use standby::Reminder;

const ENABLE_LOGS: bool = true;
use crate::{log_info, log_warn};

pub use focus::COMPLETION_GRACE;

const GREETING_BUBBLE_MS: u64 = 4_000;
const PROBE_BUBBLE_MS: u64 = 4_000;
const ERROR_BUBBLE_MS: u64 = 5_000;
const COMPLETION_BUBBLE_MS: u64 = 6_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Awakening,
    Normal,
    Standby,
    Focus,
}

/// Everything the shell (or a timer task) can tell the machine.
#[derive(Debug, Clone)]
pub enum Input {
    Click,
    RightClick,
    FocusRequested,
    FocusConfirmed { goal: String, minutes: u32 },
    FocusCancelled,
    PauseFocus,
    ResumeFocus,
    StopFocus,
    /// The shell rewrote the settings store; model configs may have changed.
    SettingsChanged,
    ProbeFinished { epoch: u64, report: ProbeReport },
    ProbeSettled { epoch: u64, available: bool },
    GraceElapsed,
}

/// What the shell observes. `Entering` fires before the old mode is torn
/// down, `Changed` only once the new mode's enter succeeded.
#[derive(Debug, Clone)]
pub enum StateEvent {
    Entering(Mode),
    Exited(Mode),
    Changed { from: Option<Mode>, to: Mode },
    ProbeProgress(String),
    GoalPromptRequested,
    SettingsRequested,
    Monitor(MonitorEvent),
}

pub struct ModeMachine {
    model: Arc<dyn RemoteModel>,
    settings: Arc<SettingsStore>,
    speech: Arc<dyn SpeechSink>,
    monitor: Arc<FocusMonitor>,
    inputs: mpsc::Receiver<Input>,
    input_tx: mpsc::Sender<Input>,
    monitor_events: mpsc::UnboundedReceiver<MonitorEvent>,
    events: mpsc::UnboundedSender<StateEvent>,
    current: Option<Mode>,
    probe_epoch: u64,
    chatter: Option<Chatter>,
    reminder: Option<Reminder>,
}

impl ModeMachine {
    pub fn new(
        model: Arc<dyn RemoteModel>,
        settings: Arc<SettingsStore>,
        speech: Arc<dyn SpeechSink>,
        monitor: Arc<FocusMonitor>,
        monitor_events: mpsc::UnboundedReceiver<MonitorEvent>,
    ) -> (
        Self,
        mpsc::Sender<Input>,
        mpsc::UnboundedReceiver<StateEvent>,
    ) {
        let (input_tx, input_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let machine = Self {
            model,
            settings,
            speech,
            monitor,
            inputs: input_rx,
            input_tx: input_tx.clone(),
            monitor_events,
            events: event_tx,
            current: None,
            probe_epoch: 0,
            chatter: None,
            reminder: None,
        };
        (machine, input_tx, event_rx)
    }

    pub fn mode(&self) -> Option<Mode> {
        self.current
    }

    /// Actor loop. Starts in Awakening and runs until the input channel
    /// closes.
    pub async fn run(mut self) {
        if let Err(err) = self.transition_to(Mode::Awakening).await {
            log_warn!("failed to enter the awakening mode: {err}");
        }

        loop {
            tokio::select! {
                input = self.inputs.recv() => match input {
                    Some(input) => self.handle_input(input).await,
                    None => break,
                },
                Some(event) = self.monitor_events.recv() => {
                    self.handle_monitor_event(event).await;
                }
            }
        }

        log_info!("mode machine loop ended");
    }

    async fn handle_input(&mut self, input: Input) {
        match input {
            Input::Click => self.on_click(),
            Input::RightClick => self.emit(StateEvent::SettingsRequested),
            Input::FocusRequested => self.on_focus_requested().await,
            Input::FocusConfirmed { goal, minutes } => {
                self.on_focus_confirmed(goal, minutes).await;
            }
            Input::FocusCancelled => {
                if self.current == Some(Mode::Focus) && !self.monitor.has_session().await {
                    self.change_mode(Mode::Normal).await;
                }
            }
            Input::PauseFocus => {
                if self.current == Some(Mode::Focus) {
                    if let Err(err) = self.monitor.pause().await {
                        log_warn!("pause request failed: {err}");
                    }
                }
            }
            Input::ResumeFocus => {
                if self.current == Some(Mode::Focus) {
                    if let Err(err) = self.monitor.resume().await {
                        log_warn!("resume request failed: {err}");
                    }
                }
            }
            Input::StopFocus => self.on_stop_focus().await,
            Input::SettingsChanged => self.on_settings_changed().await,
            Input::ProbeFinished { epoch, report } => self.on_probe_finished(epoch, report),
            Input::ProbeSettled { epoch, available } => {
                self.on_probe_settled(epoch, available).await;
            }
            Input::GraceElapsed => {
                if self.current == Some(Mode::Focus) && !self.monitor.has_session().await {
                    self.change_mode(Mode::Normal).await;
                }
            }
        }
    }

    async fn handle_monitor_event(&mut self, event: MonitorEvent) {
        if let MonitorEvent::Completed(finished) = &event {
            self.speech.show(
                &focus::completion_message(finished),
                Expression::Party,
                COMPLETION_BUBBLE_MS,
            );
            focus::spawn_completion_grace(self.input_tx.clone());
        }
        self.emit(StateEvent::Monitor(event));
    }

    fn on_click(&self) {
        match self.current {
            Some(Mode::Normal) => {
                let (text, expression) = random_interaction_phrase();
                self.speech.show(text, expression, GREETING_BUBBLE_MS);
            }
            // A sleeping assistant answers a click by pointing at settings.
            Some(Mode::Standby) => self.emit(StateEvent::SettingsRequested),
            _ => {}
        }
    }

    async fn on_focus_requested(&mut self) {
        match self.current {
            Some(Mode::Normal) => self.change_mode(Mode::Focus).await,
            Some(Mode::Standby) => self.speech.show(
                "I need a working AI model before we can focus. Check the settings first.",
                Expression::Confused,
                ERROR_BUBBLE_MS,
            ),
            _ => {}
        }
    }

    async fn on_focus_confirmed(&mut self, goal: String, minutes: u32) {
        if self.current != Some(Mode::Focus) {
            return;
        }

        let planned = Duration::from_secs(u64::from(minutes) * 60);
        let session = match FocusSession::new(&goal, planned, Utc::now()) {
            Ok(session) => session,
            Err(err) => {
                self.speech.show(
                    &format!("I can't start that: {err}"),
                    Expression::Confused,
                    ERROR_BUBBLE_MS,
                );
                return;
            }
        };

        let goal_line = session.goal.clone();
        if let Err(err) = self.monitor.begin(session).await {
            log_warn!("failed to start a focus session: {err}");
            self.speech.show(
                "Something went wrong starting the session.",
                Expression::Confused,
                ERROR_BUBBLE_MS,
            );
            return;
        }

        self.speech.show(
            &format!("Let's focus on '{goal_line}'!"),
            Expression::Fire,
            GREETING_BUBBLE_MS,
        );
    }

    async fn on_stop_focus(&mut self) {
        if self.current != Some(Mode::Focus) {
            return;
        }

        match self.monitor.stop(true).await {
            Ok(Some(finished)) => self.speech.show(
                &focus::completion_message(&finished),
                Expression::ThumbsUp,
                COMPLETION_BUBBLE_MS,
            ),
            Ok(None) => {}
            Err(err) => log_warn!("failed to stop the focus session: {err}"),
        }

        self.change_mode(Mode::Normal).await;
    }

    async fn on_settings_changed(&mut self) {
        // Re-probe from every mode. Leaving Focus suspends the session, so
        // it survives the validation round and resumes on re-entry.
        if self.current == Some(Mode::Awakening) {
            self.begin_probe();
        } else {
            self.change_mode(Mode::Awakening).await;
        }
    }

    fn on_probe_finished(&mut self, epoch: u64, report: ProbeReport) {
        if self.current != Some(Mode::Awakening) || epoch != self.probe_epoch {
            log_info!("discarding probe result from a superseded probe");
            return;
        }

        self.emit(StateEvent::ProbeProgress(report.detail.clone()));
        if report.available {
            self.speech
                .show("Models look good. Let's go!", Expression::Rocket, PROBE_BUBBLE_MS);
        } else {
            self.speech.show(
                "No usable AI model found. I'll doze off for now.",
                Expression::Sleeping,
                PROBE_BUBBLE_MS,
            );
        }

        awakening::spawn_settle_delay(self.input_tx.clone(), epoch, report.available);
    }

    async fn on_probe_settled(&mut self, epoch: u64, available: bool) {
        if self.current != Some(Mode::Awakening) || epoch != self.probe_epoch {
            return;
        }
        let target = if available { Mode::Normal } else { Mode::Standby };
        self.change_mode(target).await;
    }

    /// `transition_to` with the error downgraded to a log line, for input
    /// handlers that have nobody to report it to.
    async fn change_mode(&mut self, target: Mode) {
        if let Err(err) = self.transition_to(target).await {
            log_warn!("failed to enter {target:?}: {err}");
        }
    }

    /// Mode switch. Idempotent when already in `target`. The old mode's exit
    /// failure is logged but never blocks the switch; an enter failure leaves
    /// the machine with no definite mode until a later transition succeeds.
    async fn transition_to(&mut self, target: Mode) -> Result<bool> {
        if self.current == Some(target) {
            return Ok(false);
        }

        let from = self.current;
        self.emit(StateEvent::Entering(target));

        if let Some(old) = self.current.take() {
            if let Err(err) = self.exit_mode(old).await {
                log_warn!("error while leaving {old:?}: {err}");
            }
            self.emit(StateEvent::Exited(old));
        }

        self.enter_mode(target).await?;
        self.current = Some(target);
        self.emit(StateEvent::Changed { from, to: target });
        log_info!("mode changed: {from:?} -> {target:?}");
        Ok(true)
    }

    async fn enter_mode(&mut self, mode: Mode) -> Result<()> {
        match mode {
            Mode::Awakening => {
                self.begin_probe();
                Ok(())
            }
            Mode::Normal => {
                let (text, expression) = random_interaction_phrase();
                self.speech.show(text, expression, GREETING_BUBBLE_MS);
                if self.settings.chat().enable_ai_random_chat {
                    self.chatter = Some(Chatter::start(
                        self.model.clone(),
                        self.settings.clone(),
                        self.speech.clone(),
                    ));
                }
                Ok(())
            }
            Mode::Standby => {
                let (text, expression) = random_standby_phrase();
                self.speech.show(text, expression, GREETING_BUBBLE_MS);
                if self.settings.chat().enable_standby_encourage {
                    self.reminder =
                        Some(Reminder::start(self.settings.clone(), self.speech.clone()));
                }
                Ok(())
            }
            Mode::Focus => {
                if self.monitor.has_session().await {
                    self.monitor.reactivate().await?;
                    self.speech.show(
                        "Back to it. Picking up where we left off.",
                        Expression::Fire,
                        GREETING_BUBBLE_MS,
                    );
                } else {
                    self.emit(StateEvent::GoalPromptRequested);
                }
                Ok(())
            }
        }
    }

    async fn exit_mode(&mut self, mode: Mode) -> Result<()> {
        match mode {
            // Stale probe results are epoch-filtered, nothing to tear down.
            Mode::Awakening => Ok(()),
            Mode::Normal => {
                if let Some(chatter) = self.chatter.take() {
                    chatter.stop();
                }
                Ok(())
            }
            Mode::Standby => {
                if let Some(reminder) = self.reminder.take() {
                    reminder.stop();
                }
                Ok(())
            }
            Mode::Focus => {
                // Leave the session resumable; only StopFocus completes it.
                if let Some(session) = self.monitor.current().await {
                    if !session.is_terminal() {
                        self.monitor.stop(false).await?;
                    }
                }
                Ok(())
            }
        }
    }

    fn begin_probe(&mut self) {
        self.probe_epoch += 1;
        self.emit(StateEvent::ProbeProgress(
            "Checking AI model availability".to_string(),
        ));
        self.speech.show(
            "Waking up, checking my models...",
            Expression::Thinking,
            PROBE_BUBBLE_MS,
        );
        awakening::spawn_probe(
            self.model.clone(),
            self.settings.clone(),
            self.input_tx.clone(),
            self.probe_epoch,
        );
    }

    fn emit(&self, event: StateEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{ChatMessage, FocusAnalyzer};
    use crate::capture::{ScreenshotSource, Snapshot};
    use crate::config::{AppSettings, ModelConfig};
    use crate::db::SessionStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeModel {
        listed: Vec<String>,
    }

    #[async_trait]
    impl RemoteModel for FakeModel {
        async fn chat_completion(
            &self,
            config: &ModelConfig,
            _messages: &[ChatMessage],
        ) -> Result<String> {
            if config.model_name == "vision" {
                Ok("a code editor".to_string())
            } else {
                Ok(r#"{"is_focused": true, "feedback": "nice", "suggested_expression": "fire"}"#
                    .to_string())
            }
        }

        async fn list_models(&self, _config: &ModelConfig) -> Result<Vec<String>> {
            Ok(self.listed.clone())
        }
    }

    struct FixedCapture;

    #[async_trait]
    impl ScreenshotSource for FixedCapture {
        async fn capture(&self) -> Result<Snapshot> {
            Ok(Snapshot {
                reference: "shot.jpg".into(),
                data: vec![0xFF, 0xD8, 0xFF],
            })
        }
    }

    struct RecordingSink {
        lines: Mutex<Vec<String>>,
    }

    impl SpeechSink for RecordingSink {
        fn show(&self, text: &str, _expression: Expression, _duration_ms: u64) {
            self.lines.lock().expect("sink lock").push(text.to_string());
        }
    }

    impl RecordingSink {
        fn contains(&self, needle: &str) -> bool {
            self.lines
                .lock()
                .expect("sink lock")
                .iter()
                .any(|line| line.contains(needle))
        }
    }

    struct Fixture {
        machine: ModeMachine,
        events: mpsc::UnboundedReceiver<StateEvent>,
        sink: Arc<RecordingSink>,
        monitor: Arc<FocusMonitor>,
        store: SessionStore,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let mut app = AppSettings::default();
        app.vision_model = ModelConfig {
            base_url: "http://localhost/v1".into(),
            api_key: String::new(),
            model_name: "vision".into(),
        };
        app.language_model = ModelConfig {
            base_url: "http://localhost/v1".into(),
            api_key: String::new(),
            model_name: "language".into(),
        };
        let settings = Arc::new(SettingsStore::in_memory(app));

        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(dir.path().join("focus.db")).expect("store");

        let model: Arc<dyn RemoteModel> = Arc::new(FakeModel {
            listed: vec!["vision".into(), "language".into()],
        });
        let sink = Arc::new(RecordingSink {
            lines: Mutex::new(Vec::new()),
        });
        let analyzer = Arc::new(FocusAnalyzer::new(model.clone(), settings.clone()));

        let (monitor, monitor_events) = FocusMonitor::new(
            analyzer,
            Arc::new(FixedCapture),
            sink.clone(),
            store.clone(),
            settings.clone(),
        );
        let monitor = Arc::new(monitor);

        let (machine, _inputs, events) = ModeMachine::new(
            model,
            settings,
            sink.clone(),
            monitor.clone(),
            monitor_events,
        );

        Fixture {
            machine,
            events,
            sink,
            monitor,
            store,
            _dir: dir,
        }
    }

    fn drain(events: &mut mpsc::UnboundedReceiver<StateEvent>) -> Vec<StateEvent> {
        let mut collected = Vec::new();
        while let Ok(event) = events.try_recv() {
            collected.push(event);
        }
        collected
    }

    async fn settle_into(fx: &mut Fixture, available: bool) {
        fx.machine
            .transition_to(Mode::Awakening)
            .await
            .expect("enter awakening");
        let epoch = fx.machine.probe_epoch;
        fx.machine
            .handle_input(Input::ProbeSettled { epoch, available })
            .await;
    }

    #[tokio::test]
    async fn probe_success_settles_into_normal() {
        let mut fx = fixture();
        settle_into(&mut fx, true).await;
        assert_eq!(fx.machine.mode(), Some(Mode::Normal));

        let events = drain(&mut fx.events);
        assert!(events.iter().any(|event| matches!(
            event,
            StateEvent::Changed { from: Some(Mode::Awakening), to: Mode::Normal }
        )));
    }

    #[tokio::test]
    async fn probe_failure_settles_into_standby() {
        let mut fx = fixture();
        settle_into(&mut fx, false).await;
        assert_eq!(fx.machine.mode(), Some(Mode::Standby));
    }

    #[tokio::test]
    async fn stale_probe_results_are_discarded() {
        let mut fx = fixture();
        fx.machine
            .transition_to(Mode::Awakening)
            .await
            .expect("enter awakening");

        // A settings change supersedes the running probe.
        fx.machine.handle_input(Input::SettingsChanged).await;
        let old_epoch = fx.machine.probe_epoch - 1;

        fx.machine
            .handle_input(Input::ProbeSettled {
                epoch: old_epoch,
                available: false,
            })
            .await;
        assert_eq!(fx.machine.mode(), Some(Mode::Awakening));

        fx.machine
            .handle_input(Input::ProbeSettled {
                epoch: fx.machine.probe_epoch,
                available: true,
            })
            .await;
        assert_eq!(fx.machine.mode(), Some(Mode::Normal));
    }

    #[tokio::test]
    async fn repeated_transition_is_a_silent_no_op() {
        let mut fx = fixture();
        fx.machine
            .transition_to(Mode::Awakening)
            .await
            .expect("enter awakening");
        drain(&mut fx.events);

        let changed = fx
            .machine
            .transition_to(Mode::Awakening)
            .await
            .expect("idempotent");
        assert!(!changed);
        assert!(drain(&mut fx.events).is_empty());
    }

    #[tokio::test]
    async fn standby_rejects_focus_requests() {
        let mut fx = fixture();
        settle_into(&mut fx, false).await;

        fx.machine.handle_input(Input::FocusRequested).await;
        assert_eq!(fx.machine.mode(), Some(Mode::Standby));
        assert!(fx.sink.contains("I need a working AI model"));
    }

    #[tokio::test]
    async fn focus_entry_without_a_session_prompts_for_a_goal() {
        let mut fx = fixture();
        settle_into(&mut fx, true).await;
        drain(&mut fx.events);

        fx.machine.handle_input(Input::FocusRequested).await;
        assert_eq!(fx.machine.mode(), Some(Mode::Focus));

        let events = drain(&mut fx.events);
        assert!(events
            .iter()
            .any(|event| matches!(event, StateEvent::GoalPromptRequested)));

        fx.machine
            .handle_input(Input::FocusConfirmed {
                goal: "Write report".into(),
                minutes: 25,
            })
            .await;
        assert!(fx.monitor.has_session().await);
    }

    #[tokio::test]
    async fn empty_goal_is_rejected_with_a_message() {
        let mut fx = fixture();
        settle_into(&mut fx, true).await;
        fx.machine.handle_input(Input::FocusRequested).await;

        fx.machine
            .handle_input(Input::FocusConfirmed {
                goal: "   ".into(),
                minutes: 25,
            })
            .await;
        assert!(!fx.monitor.has_session().await);
        assert!(fx.sink.contains("I can't start that"));
    }

    #[tokio::test]
    async fn stop_focus_completes_the_session_and_returns_to_normal() {
        let mut fx = fixture();
        settle_into(&mut fx, true).await;
        fx.machine.handle_input(Input::FocusRequested).await;
        fx.machine
            .handle_input(Input::FocusConfirmed {
                goal: "Write report".into(),
                minutes: 25,
            })
            .await;

        fx.machine.handle_input(Input::StopFocus).await;
        assert_eq!(fx.machine.mode(), Some(Mode::Normal));
        assert!(!fx.monitor.has_session().await);
        assert!(fx.sink.contains("Great work"));
    }

    #[tokio::test]
    async fn leaving_focus_suspends_and_reentering_resumes() {
        let mut fx = fixture();
        settle_into(&mut fx, true).await;
        fx.machine.handle_input(Input::FocusRequested).await;
        fx.machine
            .handle_input(Input::FocusConfirmed {
                goal: "Write report".into(),
                minutes: 25,
            })
            .await;

        fx.machine
            .transition_to(Mode::Normal)
            .await
            .expect("leave focus");
        let suspended = fx.monitor.current().await.expect("session kept");
        assert!(suspended.paused);

        drain(&mut fx.events);
        fx.machine.handle_input(Input::FocusRequested).await;
        assert_eq!(fx.machine.mode(), Some(Mode::Focus));
        let resumed = fx.monitor.current().await.expect("session live");
        assert!(!resumed.paused);

        // Reactivation must not re-prompt for a goal.
        let events = drain(&mut fx.events);
        assert!(!events
            .iter()
            .any(|event| matches!(event, StateEvent::GoalPromptRequested)));
    }

    #[tokio::test]
    async fn completion_grace_returns_the_machine_to_normal() {
        let mut fx = fixture();
        settle_into(&mut fx, true).await;
        fx.machine.handle_input(Input::FocusRequested).await;
        fx.machine
            .handle_input(Input::FocusConfirmed {
                goal: "Write report".into(),
                minutes: 25,
            })
            .await;

        let finished = fx
            .monitor
            .stop(true)
            .await
            .expect("stop")
            .expect("completed session");
        fx.machine
            .handle_monitor_event(MonitorEvent::Completed(finished))
            .await;
        assert_eq!(fx.machine.mode(), Some(Mode::Focus));

        fx.machine.handle_input(Input::GraceElapsed).await;
        assert_eq!(fx.machine.mode(), Some(Mode::Normal));
    }

    #[tokio::test]
    async fn failed_focus_entry_leaves_no_definite_mode() {
        let mut fx = fixture();
        settle_into(&mut fx, true).await;
        fx.machine.handle_input(Input::FocusRequested).await;
        fx.machine
            .handle_input(Input::FocusConfirmed {
                goal: "Write report".into(),
                minutes: 25,
            })
            .await;

        // Suspend the session, then make persistence unavailable so the
        // next Focus entry fails while reactivating.
        fx.machine
            .transition_to(Mode::Normal)
            .await
            .expect("leave focus");
        fx.store.close();

        assert!(fx.machine.transition_to(Mode::Focus).await.is_err());
        assert_eq!(fx.machine.mode(), None);

        // The machine stays usable: a later transition succeeds normally.
        fx.machine
            .transition_to(Mode::Normal)
            .await
            .expect("retry into normal");
        assert_eq!(fx.machine.mode(), Some(Mode::Normal));
    }

    #[tokio::test]
    async fn settings_change_outside_focus_restarts_the_probe() {
        let mut fx = fixture();
        settle_into(&mut fx, true).await;
        let first_epoch = fx.machine.probe_epoch;

        fx.machine.handle_input(Input::SettingsChanged).await;
        assert_eq!(fx.machine.mode(), Some(Mode::Awakening));
        assert!(fx.machine.probe_epoch > first_epoch);
    }

    #[tokio::test]
    async fn settings_change_during_focus_reprobes_but_keeps_the_session() {
        let mut fx = fixture();
        settle_into(&mut fx, true).await;
        fx.machine.handle_input(Input::FocusRequested).await;
        fx.machine
            .handle_input(Input::FocusConfirmed {
                goal: "Write report".into(),
                minutes: 25,
            })
            .await;

        fx.machine.handle_input(Input::SettingsChanged).await;
        assert_eq!(fx.machine.mode(), Some(Mode::Awakening));
        let suspended = fx.monitor.current().await.expect("session kept");
        assert!(suspended.paused);
    }

    #[tokio::test]
    async fn standby_click_points_at_settings() {
        let mut fx = fixture();
        settle_into(&mut fx, false).await;
        drain(&mut fx.events);

        fx.machine.handle_input(Input::Click).await;
        let events = drain(&mut fx.events);
        assert!(events
            .iter()
            .any(|event| matches!(event, StateEvent::SettingsRequested)));
    }

    #[tokio::test]
    async fn probe_report_triggers_the_settle_delay_only_for_current_epoch() {
        let mut fx = fixture();
        fx.machine
            .transition_to(Mode::Awakening)
            .await
            .expect("enter awakening");
        drain(&mut fx.events);

        let report = ProbeReport {
            available: true,
            vision_ok: true,
            language_ok: true,
            detail: "vision model 'vision' is available".into(),
        };
        fx.machine.handle_input(Input::ProbeFinished {
            epoch: fx.machine.probe_epoch,
            report: report.clone(),
        })
        .await;
        assert!(drain(&mut fx.events)
            .iter()
            .any(|event| matches!(event, StateEvent::ProbeProgress(_))));

        // Stale report: no progress event, no speech.
        let before = fx.sink.lines.lock().expect("sink lock").len();
        fx.machine
            .handle_input(Input::ProbeFinished { epoch: 0, report })
            .await;
        assert!(drain(&mut fx.events).is_empty());
        assert_eq!(fx.sink.lines.lock().expect("sink lock").len(), before);
    }
}
