use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

/// Connection settings for one OpenAI-compatible model endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub base_url: String,
    pub api_key: String,
    pub model_name: String,
}

impl ModelConfig {
    /// A config is usable once it names both an endpoint and a model.
    /// The API key is optional: some compatible servers accept any key.
    pub fn is_configured(&self) -> bool {
        !self.base_url.trim().is_empty() && !self.model_name.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FocusSettings {
    /// Default session length offered by the goal prompt, in minutes.
    pub default_duration_min: u32,
    pub analysis_interval_secs: u32,
    pub screenshot_quality: f32,
    pub save_screenshots: bool,
    pub max_session_history: u32,
}

impl Default for FocusSettings {
    fn default() -> Self {
        Self {
            default_duration_min: 25,
            analysis_interval_secs: 10,
            screenshot_quality: 0.7,
            save_screenshots: false,
            max_session_history: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatSettings {
    pub enable_ai_random_chat: bool,
    pub random_chat_min_secs: u32,
    pub random_chat_max_secs: u32,
    pub enable_standby_encourage: bool,
    pub standby_min_secs: u32,
    pub standby_max_secs: u32,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            enable_ai_random_chat: true,
            random_chat_min_secs: 120,
            random_chat_max_secs: 600,
            enable_standby_encourage: true,
            standby_min_secs: 300,
            standby_max_secs: 900,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub vision_model: ModelConfig,
    pub language_model: ModelConfig,
    pub focus: FocusSettings,
    pub chat: ChatSettings,
}

/// JSON-file backed settings, shared read-mostly across components.
///
/// Unknown or out-of-range values saved by older builds (or edited by hand)
/// are tolerated on load and clamped by the typed getters.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<AppSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            AppSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// In-memory store for tests and embedders that manage persistence
    /// themselves.
    pub fn in_memory(settings: AppSettings) -> Self {
        Self {
            path: PathBuf::new(),
            data: RwLock::new(settings),
        }
    }

    pub fn snapshot(&self) -> AppSettings {
        self.data.read().expect("settings lock poisoned").clone()
    }

    pub fn vision_model(&self) -> ModelConfig {
        self.data
            .read()
            .expect("settings lock poisoned")
            .vision_model
            .clone()
    }

    pub fn language_model(&self) -> ModelConfig {
        self.data
            .read()
            .expect("settings lock poisoned")
            .language_model
            .clone()
    }

    pub fn chat(&self) -> ChatSettings {
        self.data.read().expect("settings lock poisoned").chat.clone()
    }

    /// Analysis cadence, clamped to the supported 5–60 s range.
    pub fn analysis_interval(&self) -> Duration {
        let secs = self
            .data
            .read()
            .expect("settings lock poisoned")
            .focus
            .analysis_interval_secs
            .clamp(5, 60);
        Duration::from_secs(u64::from(secs))
    }

    pub fn screenshot_quality(&self) -> f32 {
        self.data
            .read()
            .expect("settings lock poisoned")
            .focus
            .screenshot_quality
            .clamp(0.1, 1.0)
    }

    pub fn max_session_history(&self) -> u32 {
        self.data
            .read()
            .expect("settings lock poisoned")
            .focus
            .max_session_history
            .clamp(1, 100)
    }

    pub fn default_duration_min(&self) -> u32 {
        self.data
            .read()
            .expect("settings lock poisoned")
            .focus
            .default_duration_min
            .max(1)
    }

    pub fn update(&self, settings: AppSettings) -> Result<()> {
        {
            let mut guard = self.data.write().expect("settings lock poisoned");
            *guard = settings;
            if !self.path.as_os_str().is_empty() {
                self.persist(&guard)?;
            }
        }
        Ok(())
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read settings from {}", self.path.display()))?;
        let data: AppSettings = serde_json::from_str(&contents)?;
        let mut guard = self.data.write().expect("settings lock poisoned");
        *guard = data;
        Ok(())
    }

    fn persist(&self, data: &AppSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn getters_clamp_out_of_range_values() {
        let mut settings = AppSettings::default();
        settings.focus.analysis_interval_secs = 2;
        settings.focus.screenshot_quality = 1.8;
        settings.focus.max_session_history = 0;
        let store = SettingsStore::in_memory(settings);

        assert_eq!(store.analysis_interval(), Duration::from_secs(5));
        assert!((store.screenshot_quality() - 1.0).abs() < f32::EPSILON);
        assert_eq!(store.max_session_history(), 1);

        let mut settings = AppSettings::default();
        settings.focus.analysis_interval_secs = 300;
        let store = SettingsStore::in_memory(settings);
        assert_eq!(store.analysis_interval(), Duration::from_secs(60));
    }

    #[test]
    fn defaults_match_documented_values() {
        let store = SettingsStore::in_memory(AppSettings::default());
        assert_eq!(store.analysis_interval(), Duration::from_secs(10));
        assert!((store.screenshot_quality() - 0.7).abs() < f32::EPSILON);
        assert_eq!(store.max_session_history(), 10);
        assert!(!store.vision_model().is_configured());
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");

        let store = SettingsStore::new(path.clone()).expect("create store");
        let mut settings = store.snapshot();
        settings.language_model = ModelConfig {
            base_url: "http://localhost:11434/v1".into(),
            api_key: String::new(),
            model_name: "qwen2.5".into(),
        };
        store.update(settings).expect("update");

        let reopened = SettingsStore::new(path).expect("reopen store");
        assert_eq!(reopened.language_model().model_name, "qwen2.5");
        assert!(reopened.language_model().is_configured());
    }
}
