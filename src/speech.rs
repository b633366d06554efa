use rand::seq::SliceRandom;

use crate::models::Expression;

/// Fire-and-forget speech-bubble presentation. The core never waits on the
/// sink and never learns whether anything was shown.
pub trait SpeechSink: Send + Sync {
    fn show(&self, text: &str, expression: Expression, duration_ms: u64);
}

/// Canned interaction lines for the Normal mode click handler and as the
/// fallback when AI small talk is unavailable.
pub const INTERACTION_PHRASES: &[(&str, Expression)] = &[
    ("Hey there!", Expression::Wave),
    ("How is your day going?", Expression::Smile),
    ("I'm right here with you.", Expression::Grin),
    ("Anything I can help with?", Expression::Thinking),
    ("Let's make it a good one!", Expression::Party),
    ("Feels like a good day to me.", Expression::Cool),
    ("Thinking about something fun?", Expression::Thinking),
    ("You're doing great!", Expression::ThumbsUp),
    ("Anything new going on?", Expression::HeartEyes),
    ("Ready for the next challenge?", Expression::Rocket),
];

/// Periodic reminders shown while the assistant sleeps in Standby.
pub const STANDBY_PHRASES: &[(&str, Expression)] = &[
    (
        "No usable AI model found. Configure one to wake me up.",
        Expression::Sleeping,
    ),
    (
        "Still asleep here. Settings > AI models will wake me.",
        Expression::Sleeping,
    ),
    (
        "I could be helping you focus, but I need a model first.",
        Expression::Confused,
    ),
];

pub fn random_interaction_phrase() -> (&'static str, Expression) {
    *INTERACTION_PHRASES
        .choose(&mut rand::thread_rng())
        .expect("non-empty phrase table")
}

pub fn random_standby_phrase() -> (&'static str, Expression) {
    *STANDBY_PHRASES
        .choose(&mut rand::thread_rng())
        .expect("non-empty phrase table")
}
