use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::ai::{ChatMessage, RemoteModel};
use crate::config::SettingsStore;
use crate::models::Expression;
use crate::speech::{random_interaction_phrase, SpeechSink};

const ENABLE_LOGS: bool = true;
use crate::log_warn;

const CHAT_BUBBLE_MS: u64 = 6_000;

const SMALL_TALK_PROMPT: &str = "You are a friendly companion sitting on the user's \
desktop. Say one short, casual line to them, like a coworker passing by. \
No quotes, no emoji, at most 15 words.";

const SMALL_TALK_EXPRESSIONS: &[Expression] = &[
    Expression::Smile,
    Expression::Grin,
    Expression::Cool,
    Expression::Thinking,
    Expression::Wave,
];

/// Background small-talk loop for the Normal mode. Waits a random interval
/// in the configured range, asks the language model for a remark and falls
/// back to a canned phrase when the model cannot deliver one.
pub struct Chatter {
    token: CancellationToken,
}

impl Chatter {
    pub fn start(
        model: Arc<dyn RemoteModel>,
        settings: Arc<SettingsStore>,
        speech: Arc<dyn SpeechSink>,
    ) -> Self {
        let token = CancellationToken::new();
        let loop_token = token.clone();

        tokio::spawn(async move {
            loop {
                let chat = settings.chat();
                if !chat.enable_ai_random_chat {
                    break;
                }

                let wait = random_wait(chat.random_chat_min_secs, chat.random_chat_max_secs);
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }

                match small_talk(model.as_ref(), &settings).await {
                    Some((text, expression)) => speech.show(&text, expression, CHAT_BUBBLE_MS),
                    None => {
                        let (text, expression) = random_interaction_phrase();
                        speech.show(text, expression, CHAT_BUBBLE_MS);
                    }
                }
            }
        });

        Self { token }
    }

    pub fn stop(self) {
        self.token.cancel();
    }
}

pub(super) fn random_wait(min_secs: u32, max_secs: u32) -> Duration {
    let (low, high) = if min_secs <= max_secs {
        (min_secs, max_secs)
    } else {
        (max_secs, min_secs)
    };
    let secs = rand::thread_rng().gen_range(low.max(1)..=high.max(1));
    Duration::from_secs(u64::from(secs))
}

async fn small_talk(
    model: &dyn RemoteModel,
    settings: &SettingsStore,
) -> Option<(String, Expression)> {
    let config = settings.language_model();
    if !config.is_configured() {
        return None;
    }

    match model
        .chat_completion(&config, &[ChatMessage::user_text(SMALL_TALK_PROMPT)])
        .await
    {
        Ok(raw) => {
            let text = raw.trim().trim_matches('"').to_string();
            if text.is_empty() {
                return None;
            }
            Some((text, random_expression()))
        }
        Err(err) => {
            log_warn!("small talk generation failed, using a canned line: {err}");
            None
        }
    }
}

fn random_expression() -> Expression {
    *SMALL_TALK_EXPRESSIONS
        .choose(&mut rand::thread_rng())
        .unwrap_or(&Expression::Smile)
}
