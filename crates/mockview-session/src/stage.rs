//! Interview stages and their fixed durations.

use crate::config::StageDurations;
use serde::{Deserialize, Serialize};

/// A named phase of the interview.
/// Progression is `Intro -> Experience -> Completed`, never backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Intro,
    Experience,
    /// Terminal; carries no duration.
    Completed,
}

impl Default for Stage {
    fn default() -> Self {
        Self::Intro
    }
}

impl Stage {
    /// Countdown length for this stage, `None` for the terminal stage.
    pub fn duration_secs(&self, durations: &StageDurations) -> Option<u32> {
        match self {
            Stage::Intro => Some(durations.intro_secs),
            Stage::Experience => Some(durations.experience_secs),
            Stage::Completed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed)
    }

    /// Wire name used in `stage_changed` data messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Intro => "intro",
            Stage::Experience => "experience",
            Stage::Completed => "completed",
        }
    }

    /// Parse a timed stage from its wire name.
    /// `completed` is reached only via `interview_complete`.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "intro" => Some(Stage::Intro),
            "experience" => Some(Stage::Experience),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stage::Intro => "Stage 1: Intro",
            Stage::Experience => "Stage 2: Experience",
            Stage::Completed => "Complete",
        }
    }

    pub fn hint(&self) -> &'static str {
        match self {
            Stage::Intro => "Answer both intro questions naturally. The agent will guide you.",
            Stage::Experience => {
                "Answer both experience questions naturally. The agent will guide you."
            }
            Stage::Completed => "Thank you for completing the mock interview.",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
