//! Interview Orchestrator - the single orchestration loop
//!
//! Every input is serialized through one task: user commands, setup results,
//! forwarded transport events, and clock ticks. The loop owns the active
//! [`Session`](crate::session::Session) through [`SessionLifecycle`]; nothing
//! else mutates it. Slow work (credential request, connect, microphone) runs in
//! spawned tasks whose results come back as events, so the loop keeps serving
//! `end_call` and rejecting duplicate starts while a session is connecting.

use crate::clock::{ClockOutcome, ClockTick};
use crate::config::InterviewConfig;
use crate::connector::{Established, InboundEvent, SessionConnector};
use crate::coordinator::{CoordinatorEvent, Effect};
use crate::error::{SessionError, SessionResult};
use crate::lifecycle::{SessionLifecycle, SetupOutcome};
use crate::session::{EndReason, SessionId, SessionNotice, SessionStatus};
use crate::surface::SessionSnapshot;
use crate::transport::TransportEvent;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

enum Command {
    Start { identity: String },
    EndCall,
    Shutdown { done: oneshot::Sender<()> },
}

enum LoopEvent {
    SetupResolved {
        session_id: SessionId,
        result: SessionResult<Established>,
    },
    Inbound {
        session_id: SessionId,
        event: InboundEvent,
    },
}

/// Control surface for a running orchestrator.
///
/// Dropping the handle shuts the orchestrator down (the active session is torn down).
pub struct InterviewHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    task: JoinHandle<()>,
}

impl InterviewHandle {
    /// Request a new session for `identity`. Ignored while another session is active.
    pub fn start(&self, identity: impl Into<String>) -> SessionResult<()> {
        self.send(Command::Start {
            identity: identity.into(),
        })
    }

    /// End the current call. Safe to call at any time.
    pub fn end_call(&self) -> SessionResult<()> {
        self.send(Command::EndCall)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that is notified after every processed event.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Tear down the active session and stop the loop.
    pub async fn shutdown(self) -> SessionResult<()> {
        let (done, done_rx) = oneshot::channel();
        self.send(Command::Shutdown { done })?;
        done_rx
            .await
            .map_err(|_| {
                SessionError::Channel("orchestrator stopped before shutdown completed".to_string())
            })?;
        self.task
            .await
            .map_err(|e| SessionError::Channel(e.to_string()))
    }

    fn send(&self, command: Command) -> SessionResult<()> {
        self.commands
            .send(command)
            .map_err(|_| SessionError::Channel("orchestrator is not running".to_string()))
    }
}

/// The orchestration loop state.
pub struct InterviewOrchestrator {
    connector: SessionConnector,
    lifecycle: SessionLifecycle,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    events_tx: mpsc::UnboundedSender<LoopEvent>,
    events_rx: mpsc::UnboundedReceiver<LoopEvent>,
    tick_tx: mpsc::UnboundedSender<ClockTick>,
    tick_rx: mpsc::UnboundedReceiver<ClockTick>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl InterviewOrchestrator {
    /// Spawn the loop on the current tokio runtime.
    pub fn spawn(
        config: InterviewConfig,
        connector: SessionConnector,
    ) -> (InterviewHandle, mpsc::UnboundedReceiver<SessionNotice>) {
        info!("🎭 Initializing Interview Orchestrator");
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();

        let lifecycle = SessionLifecycle::new(config, notices_tx);
        let (snapshot_tx, snapshot_rx) = watch::channel(lifecycle.snapshot());

        let orchestrator = Self {
            connector,
            lifecycle,
            commands_rx,
            events_tx,
            events_rx,
            tick_tx,
            tick_rx,
            snapshot_tx,
        };
        let task = tokio::spawn(orchestrator.run());

        (
            InterviewHandle {
                commands: commands_tx,
                snapshot: snapshot_rx,
                task,
            },
            notices_rx,
        )
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands_rx.recv() => match command {
                    Some(Command::Start { identity }) => self.handle_start(identity),
                    Some(Command::EndCall) => {
                        self.lifecycle.teardown(EndReason::UserEnded).await;
                    }
                    Some(Command::Shutdown { done }) => {
                        self.lifecycle.teardown(EndReason::Shutdown).await;
                        self.publish();
                        let _ = done.send(());
                        break;
                    }
                    None => {
                        self.lifecycle.teardown(EndReason::Shutdown).await;
                        self.publish();
                        break;
                    }
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event).await,
                Some(tick) = self.tick_rx.recv() => self.handle_tick(tick).await,
            }
            self.publish();
        }
        self.release_pending().await;
        info!("🛑 Interview Orchestrator stopped");
    }

    /// Release setups that reached the queue but were never processed.
    /// After `close`, setup tasks still running see a failed send and release on their own.
    async fn release_pending(&mut self) {
        self.events_rx.close();
        while let Ok(event) = self.events_rx.try_recv() {
            if let LoopEvent::SetupResolved {
                session_id,
                result: Ok(established),
            } = event
            {
                info!(session_id = %session_id, "releasing setup resolved during shutdown");
                established.release().await;
            }
        }
    }

    fn handle_start(&mut self, identity: String) {
        let assignment = self.connector.assign();
        let Some(session_id) =
            self.lifecycle
                .try_begin(identity, assignment.clone(), self.tick_tx.clone())
        else {
            return;
        };

        let connector = self.connector.clone();
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = connector.establish(&assignment).await;
            if let Err(mpsc::error::SendError(LoopEvent::SetupResolved {
                result: Ok(orphan),
                ..
            })) = events_tx.send(LoopEvent::SetupResolved { session_id, result })
            {
                // Loop is gone; nobody will ever own these handles.
                orphan.release().await;
            }
        });
    }

    async fn handle_event(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::SetupResolved { session_id, result } => {
                if let SetupOutcome::Live { events } =
                    self.lifecycle.complete_setup(session_id, result).await
                {
                    let forwarder = spawn_forwarder(session_id, events, self.events_tx.clone());
                    if let Some(session) = self.lifecycle.current_mut(session_id) {
                        session.forwarder = Some(forwarder);
                    } else {
                        forwarder.abort();
                    }
                }
            }
            LoopEvent::Inbound { session_id, event } => {
                self.handle_inbound(session_id, event).await
            }
        }
    }

    async fn handle_inbound(&mut self, session_id: SessionId, event: InboundEvent) {
        let live = self
            .lifecycle
            .current_mut(session_id)
            .is_some_and(|s| s.status == SessionStatus::Live);
        if !live {
            debug!(session_id = %session_id, ?event, "dropping event for inactive session");
            return;
        }

        match event {
            InboundEvent::RemoteAudioAvailable {
                track,
                participant_id,
            } => {
                info!(
                    session_id = %session_id,
                    participant = %participant_id,
                    sid = %track.sid,
                    "agent audio available"
                );
                self.lifecycle.notify(SessionNotice::RemoteAudioAvailable {
                    session_id,
                    track,
                    participant_id,
                });
            }
            InboundEvent::Signal(signal) => {
                self.drive(session_id, CoordinatorEvent::Remote(signal)).await;
            }
            InboundEvent::ConnectionLost { reason } => {
                warn!(session_id = %session_id, reason = %reason, "connection lost");
                self.lifecycle.teardown(EndReason::ConnectionLost).await;
            }
        }
    }

    async fn handle_tick(&mut self, tick: ClockTick) {
        let Some(session) = self.lifecycle.current_mut(tick.session_id) else {
            return;
        };
        if let ClockOutcome::Expired { stage } = session.clock.on_tick(tick) {
            info!(session_id = %tick.session_id, stage = %stage, "⏱️ stage clock expired");
            self.drive(tick.session_id, CoordinatorEvent::ClockExpired { stage })
                .await;
        }
    }

    /// Fold one event through the coordinator and execute its effects.
    async fn drive(&mut self, session_id: SessionId, event: CoordinatorEvent) {
        let durations = self.lifecycle.config().stages;
        let Some(session) = self.lifecycle.current_mut(session_id) else {
            return;
        };
        let before = session.stage();
        let effects = session.coordinator.apply(&event);
        let after = session.stage();

        for effect in effects {
            match effect {
                Effect::RestartClock(stage) => {
                    let Some(session) = self.lifecycle.current_mut(session_id) else {
                        return;
                    };
                    if let Some(duration_secs) = session.arm_stage_clock(stage, &durations) {
                        self.lifecycle.notify(SessionNotice::ClockArmed {
                            session_id,
                            stage,
                            duration_secs,
                        });
                    }
                }
                Effect::CancelClock => {
                    if let Some(session) = self.lifecycle.current_mut(session_id) {
                        session.clock.cancel();
                    }
                }
                Effect::Teardown => {
                    self.lifecycle.teardown(EndReason::InterviewComplete).await;
                }
            }
        }

        if after != before && !after.is_terminal() {
            if let Some(session) = self.lifecycle.current_mut(session_id) {
                let remaining_secs = session.timer().remaining_secs();
                info!(session_id = %session_id, stage = %after, remaining_secs, "entered stage");
                self.lifecycle.notify(SessionNotice::StageEntered {
                    session_id,
                    stage: after,
                    remaining_secs,
                });
            }
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.lifecycle.snapshot());
    }
}

/// Pump transport events for one session into the loop, decoded and tagged.
fn spawn_forwarder(
    session_id: SessionId,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    events_tx: mpsc::UnboundedSender<LoopEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(raw) = events.recv().await {
            let Some(event) = InboundEvent::from_transport(raw) else {
                continue;
            };
            if events_tx
                .send(LoopEvent::Inbound { session_id, event })
                .is_err()
            {
                break;
            }
        }
        debug!(session_id = %session_id, "transport event stream closed");
    })
}
