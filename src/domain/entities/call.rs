//! Call lifecycle types.
//!
//! Call sessions themselves are ephemeral and live in the signaling relay;
//! only the summary outlives them, as a history message.

use serde::{Deserialize, Serialize};

/// Lifecycle of a call session.
///
/// 1:1 calls walk `Idle -> Ringing -> Active -> Ended`. Group calls are
/// `Active` from the moment the first participant creates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    Idle,
    Ringing,
    Active,
    Ended,
}

impl CallState {
    /// Check whether moving to `next` is a legal transition.
    pub fn can_transition_to(self, next: CallState) -> bool {
        use CallState::*;
        matches!(
            (self, next),
            (Idle, Ringing) | (Idle, Active) | (Idle, Ended) | (Ringing, Active) | (Ringing, Ended) | (Active, Ended)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Idle => "idle",
            CallState::Ringing => "ringing",
            CallState::Active => "active",
            CallState::Ended => "ended",
        }
    }
}

/// How a call ended up, recorded in the conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallOutcome {
    Started,
    Missed,
    Declined,
    Ended,
}

impl CallOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Started => "started",
            CallOutcome::Missed => "missed",
            CallOutcome::Declined => "declined",
            CallOutcome::Ended => "ended",
        }
    }
}

impl std::fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Call metadata attached to a history message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSummary {
    pub outcome: CallOutcome,
    pub is_video: bool,
    pub is_group: bool,
    pub duration_secs: i64,
}

impl CallSummary {
    /// Human-readable line shown in the conversation.
    pub fn describe(&self) -> String {
        let kind = if self.is_video { "video" } else { "voice" };
        match self.outcome {
            CallOutcome::Started => format!("Started a {} call", kind),
            CallOutcome::Missed => format!("Missed {} call", kind),
            CallOutcome::Declined => format!("Declined {} call", kind),
            CallOutcome::Ended => format!(
                "{} call ended ({})",
                capitalize(kind),
                format_duration(self.duration_secs)
            ),
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {}m {}s", h, m, s)
    } else if m > 0 {
        format!("{}m {}s", m, s)
    } else {
        format!("{}s", s)
    }
}
