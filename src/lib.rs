//! deskmate-core: the behavioral core of an on-screen desktop companion.
//!
//! The crate owns the mode state machine, the focus-session monitor, the
//! AI analysis pipeline and the SQLite session store. A UI shell embeds it
//! by implementing the collaborator traits (`ScreenshotSource`,
//! `SpeechSink`, optionally a custom `RemoteModel`), spawning
//! `ModeMachine::run` and feeding user gestures in as `Input`s.

pub mod ai;
pub mod capture;
pub mod config;
pub mod db;
pub mod models;
pub mod monitor;
pub mod speech;
pub mod state;
pub mod utils;

pub use ai::{CapabilityProbe, FocusAnalyzer, OpenAiModelClient, ProbeReport, RemoteModel};
pub use capture::{ScreenshotSource, Snapshot};
pub use config::{AppSettings, ModelConfig, SettingsStore};
pub use db::{FocusStatistics, SessionDetail, SessionStore, SessionSummary};
pub use models::{AnalysisRecord, Expression, FocusSession};
pub use monitor::{FocusMonitor, MonitorEvent};
pub use speech::SpeechSink;
pub use state::{Input, Mode, ModeMachine, StateEvent};
pub use utils::logging::init_logging;
