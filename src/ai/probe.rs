use std::sync::Arc;

use super::client::RemoteModel;
use crate::config::{ModelConfig, SettingsStore};

const ENABLE_LOGS: bool = true;
use crate::{log_info, log_warn};

/// Outcome of one capability probe. `available` requires both models.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub available: bool,
    pub vision_ok: bool,
    pub language_ok: bool,
    /// Human-readable status lines, one per model, suitable for a tooltip
    /// or speech bubble.
    pub detail: String,
}

/// Lightweight availability check used by the Awakening mode: verifies each
/// configured endpoint is reachable and lists the configured model name.
/// Never errors; failures become report lines.
pub struct CapabilityProbe {
    model: Arc<dyn RemoteModel>,
    settings: Arc<SettingsStore>,
}

impl CapabilityProbe {
    pub fn new(model: Arc<dyn RemoteModel>, settings: Arc<SettingsStore>) -> Self {
        Self { model, settings }
    }

    pub async fn validate(&self) -> ProbeReport {
        let (vision_ok, vision_detail) =
            self.check_one("vision", &self.settings.vision_model()).await;
        let (language_ok, language_detail) = self
            .check_one("language", &self.settings.language_model())
            .await;

        let available = vision_ok && language_ok;
        let detail = format!("{vision_detail}\n{language_detail}");

        if available {
            log_info!("capability probe passed: {detail}");
        } else {
            log_warn!("capability probe failed: {detail}");
        }

        ProbeReport {
            available,
            vision_ok,
            language_ok,
            detail,
        }
    }

    async fn check_one(&self, label: &str, config: &ModelConfig) -> (bool, String) {
        if !config.is_configured() {
            return (false, format!("{label} model is not configured"));
        }

        match self.model.list_models(config).await {
            Ok(names) if names.iter().any(|name| name == &config.model_name) => (
                true,
                format!("{label} model '{}' is available", config.model_name),
            ),
            Ok(names) => {
                let preview = preview_names(&names);
                (
                    false,
                    format!(
                        "{label} model '{}' is not listed by the endpoint ({preview})",
                        config.model_name
                    ),
                )
            }
            Err(err) => (false, format!("{label} model: {err}")),
        }
    }
}

fn preview_names(names: &[String]) -> String {
    if names.is_empty() {
        return "no models listed".to_string();
    }
    let shown = names.iter().take(5).cloned().collect::<Vec<_>>().join(", ");
    if names.len() > 5 {
        format!("available: {shown}, and {} more", names.len() - 5)
    } else {
        format!("available: {shown}")
    }
}
