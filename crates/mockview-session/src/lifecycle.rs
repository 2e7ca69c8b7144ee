//! Session lifecycle - start lock and the unified teardown.
//!
//! The start lock is taken the moment a start request is accepted and cleared
//! on every exit path: setup failure or teardown. Teardown is safe to call from
//! any trigger (user stop, interview completion, dropped connection, shutdown)
//! and any number of times; only the first call for a session does work and
//! fires the completion notice.

use crate::clock::ClockTick;
use crate::config::InterviewConfig;
use crate::connector::{release_handles, Established, RoomAssignment};
use crate::error::SessionResult;
use crate::session::{EndReason, Session, SessionId, SessionNotice, SessionStatus};
use crate::stage::Stage;
use crate::surface::SessionSnapshot;
use crate::transport::TransportEvent;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// What a resolved setup meant for the session.
#[derive(Debug)]
pub enum SetupOutcome {
    /// The session went live; the caller forwards these transport events.
    Live {
        events: mpsc::UnboundedReceiver<TransportEvent>,
    },
    Failed,
    /// Result belonged to a session that is gone; its handles were released.
    Discarded,
}

pub struct SessionLifecycle {
    config: InterviewConfig,
    start_lock: bool,
    session: Option<Session>,
    last: SessionSnapshot,
    notices: mpsc::UnboundedSender<SessionNotice>,
}

impl SessionLifecycle {
    pub fn new(config: InterviewConfig, notices: mpsc::UnboundedSender<SessionNotice>) -> Self {
        let last = SessionSnapshot::idle(config.stages.intro_secs);
        Self {
            config,
            start_lock: false,
            session: None,
            last,
            notices,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.start_lock
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// The session with this id, if it is still the current one.
    pub(crate) fn current_mut(&mut self, session_id: SessionId) -> Option<&mut Session> {
        self.session.as_mut().filter(|s| s.id == session_id)
    }

    pub fn config(&self) -> &InterviewConfig {
        &self.config
    }

    /// Accept a start request unless an attempt is already in flight.
    pub fn try_begin(
        &mut self,
        identity: String,
        assignment: RoomAssignment,
        tick_tx: mpsc::UnboundedSender<ClockTick>,
    ) -> Option<SessionId> {
        if self.start_lock {
            warn!(identity = %identity, "start rejected: a session is already active");
            return None;
        }
        self.start_lock = true;
        let session = Session::new(identity, assignment, &self.config, tick_tx);
        let id = session.id;
        info!(session_id = %id, room = %session.room(), "session connecting");
        self.session = Some(session);
        Some(id)
    }

    /// Apply a setup result that re-entered the loop.
    pub async fn complete_setup(
        &mut self,
        session_id: SessionId,
        result: SessionResult<Established>,
    ) -> SetupOutcome {
        let pending = self
            .session
            .as_ref()
            .is_some_and(|s| s.id == session_id && s.status == SessionStatus::Connecting);

        if !pending {
            match result {
                Ok(established) => {
                    info!(session_id = %session_id, "setup resolved after teardown, releasing");
                    established.release().await;
                }
                Err(e) => debug!(session_id = %session_id, "late setup failure ignored: {}", e),
            }
            return SetupOutcome::Discarded;
        }

        match result {
            Ok(established) => {
                let durations = self.config.stages;
                let Established {
                    connection,
                    microphone,
                    events,
                } = established;
                let Some(session) = self.session.as_mut() else {
                    release_handles(Some(microphone), Some(connection)).await;
                    return SetupOutcome::Discarded;
                };
                session.connection = Some(connection);
                session.microphone = Some(microphone);
                session.status = SessionStatus::Live;
                let armed = session.arm_stage_clock(Stage::Intro, &durations);
                let room = session.assignment.room.clone();
                let participant_id = session.assignment.participant_id.clone();

                info!(session_id = %session_id, room = %room, "🎙️ session live");
                self.notify(SessionNotice::SessionStarted {
                    session_id,
                    room,
                    participant_id,
                    timestamp: Utc::now(),
                });
                if let Some(duration_secs) = armed {
                    self.notify(SessionNotice::ClockArmed {
                        session_id,
                        stage: Stage::Intro,
                        duration_secs,
                    });
                }
                SetupOutcome::Live { events }
            }
            Err(e) => {
                error!(session_id = %session_id, "session setup failed: {}", e);
                let room = self.session.take().map(|s| s.assignment.room);
                self.last = SessionSnapshot {
                    session_id: Some(session_id),
                    status: SessionStatus::Error,
                    room,
                    ..SessionSnapshot::idle(self.config.stages.intro_secs)
                };
                self.start_lock = false;
                self.notify(SessionNotice::SetupFailed {
                    session_id,
                    error: e.to_string(),
                });
                SetupOutcome::Failed
            }
        }
    }

    /// Release everything the current session owns and fire the completion notice.
    /// Returns false when there was nothing to tear down.
    pub async fn teardown(&mut self, reason: EndReason) -> bool {
        let Some(mut session) = self.session.take() else {
            debug!(?reason, "teardown: no active session");
            self.start_lock = false;
            return false;
        };

        session.clock.cancel();
        if let Some(forwarder) = session.forwarder.take() {
            forwarder.abort();
        }
        release_handles(session.microphone.take(), session.connection.take()).await;
        session.status = SessionStatus::Ended;

        self.last = snapshot_of(&session);
        self.start_lock = false;
        info!(session_id = %session.id, ?reason, "session ended");
        self.notify(SessionNotice::Completed {
            session_id: session.id,
            reason,
            timestamp: Utc::now(),
        });
        true
    }

    /// Current observable state.
    pub fn snapshot(&self) -> SessionSnapshot {
        match &self.session {
            Some(session) => snapshot_of(session),
            None => self.last.clone(),
        }
    }

    pub(crate) fn notify(&self, notice: SessionNotice) {
        // A dropped notice receiver is not an error for the session.
        let _ = self.notices.send(notice);
    }
}

fn snapshot_of(session: &Session) -> SessionSnapshot {
    let timer = session.timer();
    SessionSnapshot {
        session_id: Some(session.id),
        status: session.status,
        stage: session.stage(),
        remaining_secs: timer.remaining_secs(),
        stage_duration_secs: timer.duration_secs(),
        room: Some(session.assignment.room.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::loopback;
    use crate::transport::{MediaCapture, RealtimeTransport};

    fn lifecycle() -> (
        SessionLifecycle,
        mpsc::UnboundedReceiver<SessionNotice>,
        mpsc::UnboundedSender<ClockTick>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (tick_tx, _tick_rx) = mpsc::unbounded_channel();
        (SessionLifecycle::new(InterviewConfig::default(), tx), rx, tick_tx)
    }

    fn assignment() -> RoomAssignment {
        RoomAssignment {
            room: "interview-0000abcd".into(),
            participant_id: "user-0000abcd".into(),
        }
    }

    #[test]
    fn second_start_is_rejected_while_locked() {
        let (mut lc, _rx, tick_tx) = lifecycle();
        assert!(lc.try_begin("ada".into(), assignment(), tick_tx.clone()).is_some());
        assert!(lc.is_locked());
        assert!(lc.try_begin("ada".into(), assignment(), tick_tx).is_none());
        assert_eq!(lc.snapshot().status, SessionStatus::Connecting);
    }

    #[tokio::test]
    async fn teardown_is_idempotent_and_notifies_once() {
        let (mut lc, mut rx, tick_tx) = lifecycle();
        let id = lc.try_begin("ada".into(), assignment(), tick_tx).unwrap();

        assert!(lc.teardown(EndReason::UserEnded).await);
        assert!(!lc.teardown(EndReason::UserEnded).await);
        assert!(!lc.teardown(EndReason::Shutdown).await);

        assert!(!lc.is_locked());
        assert_eq!(lc.snapshot().status, SessionStatus::Ended);
        assert!(matches!(
            rx.try_recv(),
            Ok(SessionNotice::Completed {
                session_id,
                reason: EndReason::UserEnded,
                ..
            }) if session_id == id
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn late_setup_result_is_released() {
        let (mut lc, _rx, tick_tx) = lifecycle();
        let id = lc.try_begin("ada".into(), assignment(), tick_tx).unwrap();
        lc.teardown(EndReason::UserEnded).await;

        let (transport, media, ctl) = loopback();
        let room = transport.connect("ws://loopback", "tok").await.unwrap();
        let mic = media.open_microphone().await.unwrap();
        let established = Established {
            connection: room.connection,
            microphone: mic,
            events: room.events,
        };

        let outcome = lc.complete_setup(id, Ok(established)).await;
        assert!(matches!(outcome, SetupOutcome::Discarded));
        assert_eq!(ctl.disconnect_count(), 1);
        assert_eq!(ctl.microphones_stopped(), 1);
        assert_eq!(lc.snapshot().status, SessionStatus::Ended);
    }

    #[tokio::test]
    async fn failed_setup_clears_lock_with_error_status() {
        let (mut lc, mut rx, tick_tx) = lifecycle();
        let id = lc.try_begin("ada".into(), assignment(), tick_tx).unwrap();
        let outcome = lc
            .complete_setup(id, Err(crate::error::SessionError::Credential("503".into())))
            .await;
        assert!(matches!(outcome, SetupOutcome::Failed));
        assert!(!lc.is_locked());
        assert!(lc.session().is_none());
        let snapshot = lc.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Error);
        assert_eq!(snapshot.stage, Stage::Intro);
        assert_eq!(snapshot.remaining_secs, 60);
        assert_eq!(snapshot.stage_duration_secs, 60);
        assert_eq!(snapshot.countdown(), "01:00");
        assert!(matches!(rx.try_recv(), Ok(SessionNotice::SetupFailed { .. })));
    }
}
