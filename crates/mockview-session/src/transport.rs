//! Real-time transport and media capture seams.
//!
//! The audio/data transport is a black box: it connects with a credential,
//! accepts a published microphone track, can be disconnected, and delivers
//! [`TransportEvent`]s. Implement these traits for a concrete SFU client; the
//! in-process [`crate::loopback`] implementation backs rehearsals and tests.

use crate::error::SessionResult;
use async_trait::async_trait;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A track published by a remote participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub sid: String,
    pub kind: TrackKind,
}

/// Raw events delivered by a live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    TrackSubscribed {
        track: RemoteTrack,
        participant_id: String,
    },
    DataReceived(Vec<u8>),
    /// The connection dropped without us asking for it.
    Disconnected { reason: String },
}

/// Local microphone capture. Stopping twice must be harmless.
pub trait LocalAudioTrack: Send + Sync {
    fn id(&self) -> &str;
    fn stop(&mut self) -> SessionResult<()>;
}

#[async_trait]
pub trait MediaCapture: Send + Sync {
    /// Acquire the default microphone.
    async fn open_microphone(&self) -> SessionResult<Box<dyn LocalAudioTrack>>;
}

/// Handle to an established room connection.
#[async_trait]
pub trait RoomConnection: Send + Sync {
    async fn publish_audio(&mut self, track: &dyn LocalAudioTrack) -> SessionResult<()>;
    async fn disconnect(&mut self) -> SessionResult<()>;
}

/// A fresh connection and the receiver of its inbound events.
pub struct ConnectedRoom {
    pub connection: Box<dyn RoomConnection>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn connect(&self, url: &str, token: &str) -> SessionResult<ConnectedRoom>;
}
