use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of assistant expressions the verdict step may suggest.
///
/// The shell maps these onto whatever visual assets it ships; the core only
/// guarantees the tag set is closed. A tag outside this set coming back from
/// the language model is coerced to `Thinking` rather than failing an
/// otherwise well-formed verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    Fire,
    Rocket,
    HeartEyes,
    ThumbsUp,
    Smile,
    OkHand,
    Confused,
    Sleeping,
    Cool,
    Grin,
    Party,
    Clap,
    Wave,
    Surprised,
    #[serde(other)]
    Thinking,
}

impl Expression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Expression::Fire => "fire",
            Expression::Rocket => "rocket",
            Expression::HeartEyes => "heart_eyes",
            Expression::ThumbsUp => "thumbs_up",
            Expression::Smile => "smile",
            Expression::OkHand => "ok_hand",
            Expression::Confused => "confused",
            Expression::Sleeping => "sleeping",
            Expression::Cool => "cool",
            Expression::Grin => "grin",
            Expression::Party => "party",
            Expression::Clap => "clap",
            Expression::Wave => "wave",
            Expression::Surprised => "surprised",
            Expression::Thinking => "thinking",
        }
    }

    /// Lenient string mapping used when reading persisted rows; unknown
    /// tags fall back to `Thinking`.
    pub fn from_tag(value: &str) -> Self {
        match value {
            "fire" => Expression::Fire,
            "rocket" => Expression::Rocket,
            "heart_eyes" => Expression::HeartEyes,
            "thumbs_up" => Expression::ThumbsUp,
            "smile" => Expression::Smile,
            "ok_hand" => Expression::OkHand,
            "confused" => Expression::Confused,
            "sleeping" => Expression::Sleeping,
            "cool" => Expression::Cool,
            "grin" => Expression::Grin,
            "party" => Expression::Party,
            "clap" => Expression::Clap,
            "wave" => Expression::Wave,
            "surprised" => Expression::Surprised,
            _ => Expression::Thinking,
        }
    }

    /// Tag list injected into the verdict prompt.
    pub const ALL_TAGS: [&'static str; 15] = [
        "fire",
        "rocket",
        "heart_eyes",
        "thumbs_up",
        "smile",
        "ok_hand",
        "thinking",
        "confused",
        "sleeping",
        "cool",
        "grin",
        "party",
        "clap",
        "wave",
        "surprised",
    ];
}

/// One sampled verdict: what the screen showed, whether it matched the goal,
/// and what the assistant should say about it. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub id: String,
    pub captured_at: DateTime<Utc>,
    /// Opaque reference to the analyzed snapshot (path or handle).
    pub snapshot_ref: String,
    /// Text produced by the vision description step.
    pub description: String,
    pub is_focused: bool,
    pub feedback: String,
    pub expression: Expression,
    /// Combined wall-clock latency of both AI calls.
    pub latency_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::Expression;

    #[test]
    fn tags_round_trip() {
        for tag in Expression::ALL_TAGS {
            assert_eq!(Expression::from_tag(tag).as_str(), tag);
        }
    }

    #[test]
    fn unknown_tag_falls_back_to_thinking() {
        assert_eq!(Expression::from_tag("dab.gif"), Expression::Thinking);
        let parsed: Expression = serde_json::from_str("\"no_such_face\"").expect("lenient parse");
        assert_eq!(parsed, Expression::Thinking);
    }
}
