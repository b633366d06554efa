use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::normal::random_wait;
use crate::config::SettingsStore;
use crate::speech::{random_standby_phrase, SpeechSink};

const REMINDER_BUBBLE_MS: u64 = 6_000;

/// Periodic nudge while the assistant sleeps without a usable model.
pub struct Reminder {
    token: CancellationToken,
}

impl Reminder {
    pub fn start(settings: Arc<SettingsStore>, speech: Arc<dyn SpeechSink>) -> Self {
        let token = CancellationToken::new();
        let loop_token = token.clone();

        tokio::spawn(async move {
            loop {
                let chat = settings.chat();
                if !chat.enable_standby_encourage {
                    break;
                }

                let wait = random_wait(chat.standby_min_secs, chat.standby_max_secs);
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }

                let (text, expression) = random_standby_phrase();
                speech.show(text, expression, REMINDER_BUBBLE_MS);
            }
        });

        Self { token }
    }

    pub fn stop(self) {
        self.token.cancel();
    }
}
