//! Session connector - credential exchange, connect, publish, inbound events.
//!
//! Setup order: credential request -> connect -> open microphone -> publish.
//! Any failure is terminal for the attempt and reported as a setup failure;
//! handles created earlier in the same attempt are released before returning.

use crate::config::InterviewConfig;
use crate::error::{SessionError, SessionResult};
use crate::signal::{decode_object, RemoteSignal};
use crate::transport::{
    ConnectedRoom, LocalAudioTrack, MediaCapture, RealtimeTransport, RemoteTrack, RoomConnection,
    TrackKind, TransportEvent,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Body of the credential request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRequest {
    pub room: String,
    pub identity: String,
}

#[derive(Debug, Deserialize)]
struct CredentialResponse {
    token: String,
}

/// Exchanges a room/participant pair for an access token.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue(&self, request: &CredentialRequest) -> SessionResult<String>;
}

/// Token issuer backed by an HTTP endpoint (`POST { room, identity }` -> `{ token }`).
#[derive(Debug, Clone)]
pub struct HttpTokenIssuer {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpTokenIssuer {
    pub fn new(endpoint: impl Into<String>, timeout: std::time::Duration) -> SessionResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SessionError::Config(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn from_config(config: &InterviewConfig) -> SessionResult<Self> {
        Self::new(config.token_endpoint.clone(), config.request_timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TokenIssuer for HttpTokenIssuer {
    async fn issue(&self, request: &CredentialRequest) -> SessionResult<String> {
        let response = self.client.post(&self.endpoint).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Credential(format!(
                "token endpoint returned {}",
                status
            )));
        }
        let body: CredentialResponse = response.json().await?;
        if body.token.is_empty() {
            return Err(SessionError::Credential(
                "token endpoint returned an empty token".to_string(),
            ));
        }
        Ok(body.token)
    }
}

/// Room and participant ids generated for one start attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomAssignment {
    pub room: String,
    pub participant_id: String,
}

/// Everything a successful setup hands to the session.
pub struct Established {
    pub connection: Box<dyn RoomConnection>,
    pub microphone: Box<dyn LocalAudioTrack>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl std::fmt::Debug for Established {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Established")
            .field("microphone", &self.microphone.id())
            .finish_non_exhaustive()
    }
}

impl Established {
    /// Best-effort release of both handles; used when a result arrives too late.
    pub async fn release(self) {
        release_handles(Some(self.microphone), Some(self.connection)).await;
    }
}

/// Inbound events after filtering and decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    RemoteAudioAvailable {
        track: RemoteTrack,
        participant_id: String,
    },
    Signal(RemoteSignal),
    ConnectionLost { reason: String },
}

impl InboundEvent {
    /// Non-audio tracks and undecodable data messages yield `None`.
    pub fn from_transport(event: TransportEvent) -> Option<Self> {
        match event {
            TransportEvent::TrackSubscribed {
                track,
                participant_id,
            } => {
                if track.kind != TrackKind::Audio {
                    debug!(sid = %track.sid, "ignoring non-audio track");
                    return None;
                }
                Some(InboundEvent::RemoteAudioAvailable {
                    track,
                    participant_id,
                })
            }
            TransportEvent::DataReceived(bytes) => {
                decode_object(&bytes)
                    .map(|object| InboundEvent::Signal(RemoteSignal::from_object(&object)))
            }
            TransportEvent::Disconnected { reason } => {
                Some(InboundEvent::ConnectionLost { reason })
            }
        }
    }
}

/// Connects a session to the real-time room.
#[derive(Clone)]
pub struct SessionConnector {
    livekit_url: String,
    room_prefix: String,
    identity_prefix: String,
    issuer: Arc<dyn TokenIssuer>,
    transport: Arc<dyn RealtimeTransport>,
    media: Arc<dyn MediaCapture>,
}

impl SessionConnector {
    pub fn new(
        config: &InterviewConfig,
        issuer: Arc<dyn TokenIssuer>,
        transport: Arc<dyn RealtimeTransport>,
        media: Arc<dyn MediaCapture>,
    ) -> Self {
        Self {
            livekit_url: config.livekit_url.clone(),
            room_prefix: config.room_prefix.clone(),
            identity_prefix: config.identity_prefix.clone(),
            issuer,
            transport,
            media,
        }
    }

    /// Fresh room and participant ids for one attempt.
    pub fn assign(&self) -> RoomAssignment {
        RoomAssignment {
            room: short_id(&self.room_prefix),
            participant_id: short_id(&self.identity_prefix),
        }
    }

    /// Run the full setup. No retry; the caller issues a fresh start on failure.
    pub async fn establish(&self, assignment: &RoomAssignment) -> SessionResult<Established> {
        let request = CredentialRequest {
            room: assignment.room.clone(),
            identity: assignment.participant_id.clone(),
        };
        let token = self
            .issuer
            .issue(&request)
            .await
            .map_err(|e| as_setup_error(e, SessionError::Credential))?;
        debug!(room = %assignment.room, "credential issued");

        let ConnectedRoom {
            mut connection,
            events,
        } = self
            .transport
            .connect(&self.livekit_url, &token)
            .await
            .map_err(|e| as_setup_error(e, SessionError::Connect))?;

        let mut microphone = match self.media.open_microphone().await {
            Ok(mic) => mic,
            Err(e) => {
                release_handles(None, Some(connection)).await;
                return Err(as_setup_error(e, SessionError::Microphone));
            }
        };

        if let Err(e) = connection.publish_audio(microphone.as_ref()).await {
            if let Err(stop_err) = microphone.stop() {
                warn!("microphone stop after failed publish: {}", stop_err);
            }
            release_handles(None, Some(connection)).await;
            return Err(as_setup_error(e, SessionError::Publish));
        }

        info!(
            room = %assignment.room,
            participant = %assignment.participant_id,
            "connected and publishing"
        );
        Ok(Established {
            connection,
            microphone,
            events,
        })
    }
}

/// Stop the microphone and disconnect, swallowing failures.
pub async fn release_handles(
    microphone: Option<Box<dyn LocalAudioTrack>>,
    connection: Option<Box<dyn RoomConnection>>,
) {
    if let Some(mut mic) = microphone {
        if let Err(e) = mic.stop() {
            warn!("microphone stop failed (ignored): {}", e);
        }
    }
    if let Some(mut conn) = connection {
        if let Err(e) = conn.disconnect().await {
            warn!("disconnect failed (ignored): {}", e);
        }
    }
}

fn short_id(prefix: &str) -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &simple[..8])
}

fn as_setup_error(err: SessionError, wrap: fn(String) -> SessionError) -> SessionError {
    if err.is_setup_failure() {
        err
    } else {
        wrap(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_ids_have_prefix_and_eight_hex() {
        let id = short_id("interview");
        let (prefix, suffix) = id.split_once('-').unwrap();
        assert_eq!(prefix, "interview");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(short_id("user"), short_id("user"));
    }

    #[test]
    fn only_audio_tracks_surface() {
        let video = TransportEvent::TrackSubscribed {
            track: RemoteTrack {
                sid: "TR_v".into(),
                kind: TrackKind::Video,
            },
            participant_id: "agent".into(),
        };
        assert_eq!(InboundEvent::from_transport(video), None);

        let audio = TransportEvent::TrackSubscribed {
            track: RemoteTrack {
                sid: "TR_a".into(),
                kind: TrackKind::Audio,
            },
            participant_id: "agent".into(),
        };
        assert!(matches!(
            InboundEvent::from_transport(audio),
            Some(InboundEvent::RemoteAudioAvailable { .. })
        ));
    }

    #[test]
    fn undecodable_data_is_dropped() {
        assert_eq!(
            InboundEvent::from_transport(TransportEvent::DataReceived(b"{oops".to_vec())),
            None
        );
        assert_eq!(
            InboundEvent::from_transport(TransportEvent::DataReceived(
                br#"{"event":"interview_complete"}"#.to_vec()
            )),
            Some(InboundEvent::Signal(RemoteSignal::InterviewComplete))
        );
    }

    #[test]
    fn wraps_foreign_errors_as_setup_failures() {
        let e = as_setup_error(SessionError::Transport("socket".into()), SessionError::Connect);
        assert!(matches!(e, SessionError::Connect(_)));
        let e = as_setup_error(SessionError::Publish("denied".into()), SessionError::Connect);
        assert!(matches!(e, SessionError::Publish(_)));
    }
}
