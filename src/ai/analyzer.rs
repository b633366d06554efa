use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::client::{ChatMessage, RemoteModel};
use crate::capture::Snapshot;
use crate::config::SettingsStore;
use crate::models::{AnalysisRecord, Expression};

const ENABLE_LOGS: bool = true;
use crate::log_warn;

const DESCRIBE_PROMPT: &str = "Describe in detail what this screenshot shows: \
the applications, windows and visible text content.";

/// Shape the verdict step must return. Extra fields are tolerated; missing
/// or mistyped ones fail the analysis.
#[derive(Debug, Deserialize)]
struct Verdict {
    is_focused: bool,
    feedback: String,
    suggested_expression: Expression,
}

/// Two-step screen analysis: a vision model describes the snapshot, then a
/// language model judges the description against the session goal.
///
/// No retries happen here; a failed analysis is simply reported and the
/// monitor's next tick is the retry.
pub struct FocusAnalyzer {
    model: Arc<dyn RemoteModel>,
    settings: Arc<SettingsStore>,
}

impl FocusAnalyzer {
    pub fn new(model: Arc<dyn RemoteModel>, settings: Arc<SettingsStore>) -> Self {
        Self { model, settings }
    }

    /// Run both steps against `snapshot` for `goal`. A vision-step failure
    /// aborts before the language model is ever called.
    pub async fn analyze(&self, snapshot: &Snapshot, goal: &str) -> Result<AnalysisRecord> {
        let captured_at = Utc::now();
        let started = Instant::now();

        let description = self.describe(snapshot).await?;
        let verdict = self.judge(&description, goal).await?;

        Ok(AnalysisRecord {
            id: Uuid::new_v4().to_string(),
            captured_at,
            snapshot_ref: snapshot.reference.clone(),
            description,
            is_focused: verdict.is_focused,
            feedback: verdict.feedback,
            expression: verdict.suggested_expression,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn describe(&self, snapshot: &Snapshot) -> Result<String> {
        let config = self.settings.vision_model();
        let encoded = general_purpose::STANDARD.encode(&snapshot.data);
        let data_url = format!("data:image/jpeg;base64,{encoded}");

        self.model
            .chat_completion(&config, &[ChatMessage::user_image(DESCRIBE_PROMPT, data_url)])
            .await
            .context("vision description step failed")
    }

    async fn judge(&self, description: &str, goal: &str) -> Result<Verdict> {
        let config = self.settings.language_model();
        let prompt = build_verdict_prompt(description, goal);

        let raw = self
            .model
            .chat_completion(&config, &[ChatMessage::user_text(prompt)])
            .await
            .context("focus verdict step failed")?;

        parse_verdict(&raw).map_err(|err| {
            log_warn!("verdict response did not parse; raw response: {raw}");
            anyhow!("malformed verdict response: {err}")
        })
    }
}

fn build_verdict_prompt(description: &str, goal: &str) -> String {
    let expressions = Expression::ALL_TAGS.join(", ");
    format!(
        "You are a supportive desk companion judging whether the user is focused \
on their stated goal.\n\
\n\
Focus goal: {goal}\n\
Screen content: {description}\n\
\n\
Consider whether the screen relates to the goal, whether obviously distracting \
content (social media, entertainment, games) is visible, and how the work is \
going. Reply with exactly this JSON object and nothing else:\n\
\n\
{{\n\
    \"is_focused\": true or false,\n\
    \"feedback\": \"one short, casual sentence for the user, referencing what they are doing\",\n\
    \"suggested_expression\": \"one of: {expressions}\"\n\
}}"
    )
}

/// Strict-shape parse of the verdict JSON. Markdown code fences around the
/// object are stripped first since many models wrap their output; anything
/// that still fails to parse is an analysis failure.
fn parse_verdict(raw: &str) -> Result<Verdict, serde_json::Error> {
    serde_json::from_str(strip_code_fences(raw))
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the fence's language tag line and the closing fence.
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_start_matches(['\r', '\n'])
        .trim_end_matches('`')
        .trim()
}
