//! The session aggregate: one interview attempt and the handles it owns.

use crate::clock::{ClockTick, StageClock, TimerState};
use crate::config::{InterviewConfig, StageDurations};
use crate::connector::RoomAssignment;
use crate::coordinator::StageCoordinator;
use crate::stage::Stage;
use crate::transport::{LocalAudioTrack, RemoteTrack, RoomConnection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub type SessionId = Uuid;

/// Status of the current (or last) attempt. `Ended` and `Error` are terminal for that attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Connecting,
    Live,
    Ended,
    Error,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl SessionStatus {
    /// Connecting or Live.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Connecting | SessionStatus::Live)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Live => "live",
            SessionStatus::Ended => "ended",
            SessionStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    UserEnded,
    InterviewComplete,
    ConnectionLost,
    Shutdown,
}

/// Notifications published by the orchestrator, in processing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// Setup finished; the session is live in `Intro`.
    SessionStarted {
        session_id: SessionId,
        room: String,
        participant_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A stage countdown was (re)armed.
    ClockArmed {
        session_id: SessionId,
        stage: Stage,
        duration_secs: u32,
    },
    StageEntered {
        session_id: SessionId,
        stage: Stage,
        remaining_secs: u32,
    },
    /// Incoming agent audio to attach to a playback sink.
    RemoteAudioAvailable {
        session_id: SessionId,
        track: RemoteTrack,
        participant_id: String,
    },
    SetupFailed {
        session_id: SessionId,
        error: String,
    },
    /// The completion notification. Fires once per torn-down session.
    Completed {
        session_id: SessionId,
        reason: EndReason,
        timestamp: DateTime<Utc>,
    },
}

/// One interview attempt. Owns its clock, connection, and microphone exclusively;
/// mutated only by the orchestration loop.
pub struct Session {
    pub(crate) id: SessionId,
    pub(crate) identity: String,
    pub(crate) assignment: RoomAssignment,
    pub(crate) status: SessionStatus,
    pub(crate) coordinator: StageCoordinator,
    pub(crate) clock: StageClock,
    pub(crate) connection: Option<Box<dyn RoomConnection>>,
    pub(crate) microphone: Option<Box<dyn LocalAudioTrack>>,
    pub(crate) forwarder: Option<JoinHandle<()>>,
    pub(crate) started_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(
        identity: String,
        assignment: RoomAssignment,
        config: &InterviewConfig,
        tick_tx: mpsc::UnboundedSender<ClockTick>,
    ) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            identity,
            assignment,
            status: SessionStatus::Connecting,
            coordinator: StageCoordinator::new(),
            clock: StageClock::new(id, config.clock.tick_interval(), tick_tx),
            connection: None,
            microphone: None,
            forwarder: None,
            started_at: Utc::now(),
        }
    }

    /// The one place a stage countdown is armed. Returns the armed duration,
    /// `None` for the terminal stage.
    pub(crate) fn arm_stage_clock(
        &mut self,
        stage: Stage,
        durations: &StageDurations,
    ) -> Option<u32> {
        let secs = stage.duration_secs(durations)?;
        self.clock.start(stage, secs);
        Some(secs)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn room(&self) -> &str {
        &self.assignment.room
    }

    pub fn participant_id(&self) -> &str {
        &self.assignment.participant_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn stage(&self) -> Stage {
        self.coordinator.stage()
    }

    pub fn timer(&self) -> TimerState {
        self.clock.state()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("room", &self.assignment.room)
            .field("status", &self.status)
            .field("stage", &self.coordinator.stage())
            .field("timer", &self.clock.state())
            .field("connected", &self.connection.is_some())
            .field("microphone", &self.microphone.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connecting_and_live_are_active() {
        assert!(SessionStatus::Connecting.is_active());
        assert!(SessionStatus::Live.is_active());
        assert!(!SessionStatus::Idle.is_active());
        assert!(!SessionStatus::Ended.is_active());
        assert!(!SessionStatus::Error.is_active());
    }

    #[test]
    fn status_indicator_strings() {
        let all = [
            SessionStatus::Idle,
            SessionStatus::Connecting,
            SessionStatus::Live,
            SessionStatus::Ended,
            SessionStatus::Error,
        ];
        let names: Vec<_> = all.iter().map(|s| s.to_string()).collect();
        assert_eq!(names, ["idle", "connecting", "live", "ended", "error"]);
    }
}
