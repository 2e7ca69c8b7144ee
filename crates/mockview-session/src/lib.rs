//! # Mockview Session - Interview Session Orchestration
//!
//! Runs a timed, two-stage voice interview (Intro, then Experience) between a
//! local participant and a remote agent. Stage changes come from two racing
//! sources, the local stage clock and the agent's data-channel signals, and are
//! reconciled by one transition table.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   Interview Orchestrator                      │
//! │  ┌──────────────┐   ticks    ┌──────────────────┐            │
//! │  │  StageClock  │──────────→ │ StageCoordinator │            │
//! │  └──────────────┘            │ (stage, event) → │            │
//! │         ↑ restart/cancel     │  (next, effects) │            │
//! │         └────────────────────└──────────────────┘            │
//! │  ┌──────────────────┐ signals       ↑       │ teardown       │
//! │  │ SessionConnector │───────────────┘       ↓                │
//! │  │ token → connect  │            ┌──────────────────┐        │
//! │  │ → mic → publish  │←───────────│ SessionLifecycle │        │
//! │  └──────────────────┘  release   │ lock + teardown  │        │
//! │                                  └──────────────────┘        │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod clock;
pub mod config;
pub mod connector;
pub mod coordinator;
pub mod error;
pub mod lifecycle;
pub mod loopback;
pub mod orchestrator;
pub mod session;
pub mod signal;
pub mod stage;
pub mod surface;
pub mod transport;

pub use clock::{ClockOutcome, ClockTick, StageClock, TimerState};
pub use config::{ClockConfig, InterviewConfig, StageDurations};
pub use connector::{
    CredentialRequest, Established, HttpTokenIssuer, InboundEvent, RoomAssignment,
    SessionConnector, TokenIssuer,
};
pub use coordinator::{transition, CoordinatorEvent, Effect, StageCoordinator, Transition};
pub use error::{SessionError, SessionResult};
pub use lifecycle::{SessionLifecycle, SetupOutcome};
pub use loopback::{
    loopback, LoopbackController, LoopbackMedia, LoopbackTransport, StaticTokenIssuer,
};
pub use orchestrator::{InterviewHandle, InterviewOrchestrator};
pub use session::{EndReason, Session, SessionId, SessionNotice, SessionStatus};
pub use signal::RemoteSignal;
pub use stage::Stage;
pub use surface::{format_countdown, SessionSnapshot, Urgency};
pub use transport::{
    ConnectedRoom, LocalAudioTrack, MediaCapture, RealtimeTransport, RemoteTrack, RoomConnection,
    TrackKind, TransportEvent,
};
