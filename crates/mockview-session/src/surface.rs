//! User-facing view model: stage label, `mm:ss` countdown, status indicator.

use crate::clock::TimerState;
use crate::session::{SessionId, SessionStatus};
use crate::stage::Stage;
use serde::Serialize;

/// Observable state, republished by the orchestration loop after every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Option<SessionId>,
    pub status: SessionStatus,
    pub stage: Stage,
    pub remaining_secs: u32,
    pub stage_duration_secs: u32,
    pub room: Option<String>,
}

impl SessionSnapshot {
    /// Pre-call state: idle, intro, full intro countdown.
    pub fn idle(intro_secs: u32) -> Self {
        let timer = TimerState::idle(intro_secs);
        Self {
            session_id: None,
            status: SessionStatus::Idle,
            stage: Stage::Intro,
            remaining_secs: timer.remaining_secs(),
            stage_duration_secs: timer.duration_secs(),
            room: None,
        }
    }

    pub fn countdown(&self) -> String {
        format_countdown(self.remaining_secs)
    }

    pub fn stage_label(&self) -> &'static str {
        self.stage.label()
    }

    pub fn urgency(&self) -> Urgency {
        Urgency::for_countdown(self.remaining_secs, self.stage_duration_secs)
    }

    /// Start is offered only when no attempt is in flight.
    pub fn can_start(&self) -> bool {
        !self.status.is_active()
    }

    /// One status line for consoles and logs.
    pub fn render_line(&self) -> String {
        match self.status {
            SessionStatus::Live => format!(
                "[{}] {} | {} ({})",
                self.status,
                self.stage_label(),
                self.countdown(),
                self.urgency().as_str()
            ),
            _ => match &self.room {
                Some(room) => format!("[{}] {} | room {}", self.status, self.stage_label(), room),
                None => format!("[{}] {}", self.status, self.stage_label()),
            },
        }
    }
}

/// Countdown colour band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    /// More than half the stage left.
    Calm,
    /// More than a fifth left.
    Warning,
    Critical,
}

impl Urgency {
    pub fn for_countdown(remaining_secs: u32, duration_secs: u32) -> Self {
        // remaining > duration * 0.5, remaining > duration * 0.2, in integer form
        let remaining = u64::from(remaining_secs);
        let duration = u64::from(duration_secs);
        if remaining * 2 > duration {
            Urgency::Calm
        } else if remaining * 5 > duration {
            Urgency::Warning
        } else {
            Urgency::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Calm => "calm",
            Urgency::Warning => "warning",
            Urgency::Critical => "critical",
        }
    }
}

/// Seconds as zero-padded `mm:ss`. Minutes are not wrapped at 60.
pub fn format_countdown(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_format() {
        assert_eq!(format_countdown(0), "00:00");
        assert_eq!(format_countdown(59), "00:59");
        assert_eq!(format_countdown(60), "01:00");
        assert_eq!(format_countdown(180), "03:00");
        assert_eq!(format_countdown(6000), "100:00");
    }

    #[test]
    fn urgency_bands() {
        assert_eq!(Urgency::for_countdown(180, 180), Urgency::Calm);
        assert_eq!(Urgency::for_countdown(91, 180), Urgency::Calm);
        assert_eq!(Urgency::for_countdown(90, 180), Urgency::Warning);
        assert_eq!(Urgency::for_countdown(37, 180), Urgency::Warning);
        assert_eq!(Urgency::for_countdown(36, 180), Urgency::Critical);
        assert_eq!(Urgency::for_countdown(0, 60), Urgency::Critical);
    }

    #[test]
    fn idle_snapshot_shows_full_intro() {
        let s = SessionSnapshot::idle(60);
        assert_eq!(s.countdown(), "01:00");
        assert_eq!(s.stage_label(), "Stage 1: Intro");
        assert!(s.can_start());
        assert_eq!(s.render_line(), "[idle] Stage 1: Intro");
    }
}
