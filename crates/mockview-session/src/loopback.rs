//! In-process transport, microphone, and token issuer.
//!
//! Nothing leaves the process: `connect` hands back a connection whose inbound
//! events are injected through a [`LoopbackController`], playing the part of the
//! remote agent. Used by the `mockview` console for rehearsal runs and by tests.

use crate::connector::{CredentialRequest, TokenIssuer};
use crate::error::{SessionError, SessionResult};
use crate::transport::{
    ConnectedRoom, LocalAudioTrack, MediaCapture, RealtimeTransport, RemoteTrack, RoomConnection,
    TrackKind, TransportEvent,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

#[derive(Debug)]
struct Shared {
    inbound: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    tokens: Mutex<Vec<String>>,
    published: Mutex<Vec<String>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    microphones_opened: AtomicUsize,
    microphones_stopped: AtomicUsize,
    fail_connect: AtomicBool,
    fail_publish: AtomicBool,
    fail_microphone: AtomicBool,
    fail_release: AtomicBool,
    hold: watch::Sender<bool>,
}

impl Default for Shared {
    fn default() -> Self {
        let (hold, _) = watch::channel(false);
        Self {
            inbound: Mutex::new(None),
            tokens: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            microphones_opened: AtomicUsize::new(0),
            microphones_stopped: AtomicUsize::new(0),
            fail_connect: AtomicBool::new(false),
            fail_publish: AtomicBool::new(false),
            fail_microphone: AtomicBool::new(false),
            fail_release: AtomicBool::new(false),
            hold,
        }
    }
}

impl Shared {
    fn current_inbound(&self) -> Option<mpsc::UnboundedSender<TransportEvent>> {
        self.inbound.lock().ok().and_then(|g| g.clone())
    }
}

/// Creates a linked transport, microphone source, and controller.
pub fn loopback() -> (LoopbackTransport, LoopbackMedia, LoopbackController) {
    let shared = Arc::new(Shared::default());
    (
        LoopbackTransport {
            shared: Arc::clone(&shared),
        },
        LoopbackMedia {
            shared: Arc::clone(&shared),
        },
        LoopbackController { shared },
    )
}

pub struct LoopbackTransport {
    shared: Arc<Shared>,
}

#[async_trait]
impl RealtimeTransport for LoopbackTransport {
    async fn connect(&self, url: &str, token: &str) -> SessionResult<ConnectedRoom> {
        let mut held = self.shared.hold.subscribe();
        while *held.borrow_and_update() {
            if held.changed().await.is_err() {
                break;
            }
        }

        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut tokens) = self.shared.tokens.lock() {
            tokens.push(token.to_string());
        }
        if self.shared.fail_connect.load(Ordering::SeqCst) {
            return Err(SessionError::Connect(format!("loopback refused {}", url)));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut inbound) = self.shared.inbound.lock() {
            *inbound = Some(tx);
        }
        info!(url, "loopback connected");
        Ok(ConnectedRoom {
            connection: Box::new(LoopbackConnection {
                shared: Arc::clone(&self.shared),
                connected: true,
            }),
            events: rx,
        })
    }
}

struct LoopbackConnection {
    shared: Arc<Shared>,
    connected: bool,
}

#[async_trait]
impl RoomConnection for LoopbackConnection {
    async fn publish_audio(&mut self, track: &dyn LocalAudioTrack) -> SessionResult<()> {
        if self.shared.fail_publish.load(Ordering::SeqCst) {
            return Err(SessionError::Publish(format!(
                "loopback rejected track {}",
                track.id()
            )));
        }
        if let Ok(mut published) = self.shared.published.lock() {
            published.push(track.id().to_string());
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> SessionResult<()> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        self.shared.disconnects.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut inbound) = self.shared.inbound.lock() {
            *inbound = None;
        }
        if self.shared.fail_release.load(Ordering::SeqCst) {
            return Err(SessionError::Transport("loopback disconnect error".to_string()));
        }
        debug!("loopback disconnected");
        Ok(())
    }
}

pub struct LoopbackMedia {
    shared: Arc<Shared>,
}

#[async_trait]
impl MediaCapture for LoopbackMedia {
    async fn open_microphone(&self) -> SessionResult<Box<dyn LocalAudioTrack>> {
        if self.shared.fail_microphone.load(Ordering::SeqCst) {
            return Err(SessionError::Microphone("permission denied".to_string()));
        }
        let n = self.shared.microphones_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(LoopbackMicrophone {
            id: format!("mic-{}", n + 1),
            shared: Arc::clone(&self.shared),
            stopped: false,
        }))
    }
}

struct LoopbackMicrophone {
    id: String,
    shared: Arc<Shared>,
    stopped: bool,
}

impl LocalAudioTrack for LoopbackMicrophone {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&mut self) -> SessionResult<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        self.shared.microphones_stopped.fetch_add(1, Ordering::SeqCst);
        if self.shared.fail_release.load(Ordering::SeqCst) {
            return Err(SessionError::Transport("loopback microphone stop error".to_string()));
        }
        Ok(())
    }
}

/// Plays the remote agent and inspects what the session did to the transport.
#[derive(Clone)]
pub struct LoopbackController {
    shared: Arc<Shared>,
}

impl LoopbackController {
    /// Deliver raw bytes on the data channel. False when nothing is connected.
    pub fn send_data(&self, payload: impl Into<Vec<u8>>) -> bool {
        self.deliver(TransportEvent::DataReceived(payload.into()))
    }

    pub fn send_stage_changed(&self, stage: &str) -> bool {
        let msg = serde_json::json!({ "event": "stage_changed", "stage": stage });
        self.send_data(msg.to_string())
    }

    pub fn send_interview_complete(&self) -> bool {
        self.send_data(r#"{"event":"interview_complete"}"#)
    }

    pub fn subscribe_track(&self, sid: &str, kind: TrackKind, participant_id: &str) -> bool {
        self.deliver(TransportEvent::TrackSubscribed {
            track: RemoteTrack {
                sid: sid.to_string(),
                kind,
            },
            participant_id: participant_id.to_string(),
        })
    }

    /// Simulate the server dropping the connection.
    pub fn drop_connection(&self, reason: &str) -> bool {
        self.deliver(TransportEvent::Disconnected {
            reason: reason.to_string(),
        })
    }

    fn deliver(&self, event: TransportEvent) -> bool {
        match self.shared.current_inbound() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Park every `connect` until [`LoopbackController::release_connects`].
    pub fn hold_connects(&self) {
        self.shared.hold.send_replace(true);
    }

    pub fn release_connects(&self) {
        self.shared.hold.send_replace(false);
    }

    pub fn fail_connect(&self, fail: bool) {
        self.shared.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_publish(&self, fail: bool) {
        self.shared.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn fail_microphone(&self, fail: bool) {
        self.shared.fail_microphone.store(fail, Ordering::SeqCst);
    }

    /// Make microphone stop and disconnect report errors (they still take effect).
    pub fn fail_release(&self, fail: bool) {
        self.shared.fail_release.store(fail, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.shared.disconnects.load(Ordering::SeqCst)
    }

    pub fn microphones_opened(&self) -> usize {
        self.shared.microphones_opened.load(Ordering::SeqCst)
    }

    pub fn microphones_stopped(&self) -> usize {
        self.shared.microphones_stopped.load(Ordering::SeqCst)
    }

    pub fn published_tracks(&self) -> Vec<String> {
        self.shared
            .published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn tokens_seen(&self) -> Vec<String> {
        self.shared
            .tokens
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.current_inbound().is_some()
    }
}

/// Issues a fixed token, or rejects every request when built with [`StaticTokenIssuer::rejecting`].
#[derive(Debug, Clone)]
pub struct StaticTokenIssuer {
    token: Option<String>,
    requests: Arc<Mutex<Vec<CredentialRequest>>>,
}

impl StaticTokenIssuer {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            token: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<CredentialRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TokenIssuer for StaticTokenIssuer {
    async fn issue(&self, request: &CredentialRequest) -> SessionResult<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        self.token.clone().ok_or_else(|| {
            SessionError::Credential("token endpoint returned 401 Unauthorized".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_publish_and_deliver() {
        let (transport, media, ctl) = loopback();
        let mut room = transport.connect("ws://loopback", "tok").await.unwrap();
        let mut mic = media.open_microphone().await.unwrap();
        room.connection.publish_audio(mic.as_ref()).await.unwrap();

        assert!(ctl.send_interview_complete());
        assert_eq!(
            room.events.recv().await,
            Some(TransportEvent::DataReceived(
                br#"{"event":"interview_complete"}"#.to_vec()
            ))
        );
        assert_eq!(ctl.published_tracks(), vec!["mic-1".to_string()]);
        assert_eq!(ctl.tokens_seen(), vec!["tok".to_string()]);

        mic.stop().unwrap();
        mic.stop().unwrap();
        room.connection.disconnect().await.unwrap();
        room.connection.disconnect().await.unwrap();
        assert_eq!(ctl.microphones_stopped(), 1);
        assert_eq!(ctl.disconnect_count(), 1);
        assert!(!ctl.send_interview_complete());
    }

    #[tokio::test]
    async fn rejecting_issuer_records_request() {
        let issuer = StaticTokenIssuer::rejecting();
        let req = CredentialRequest {
            room: "interview-1".into(),
            identity: "user-1".into(),
        };
        assert!(matches!(
            issuer.issue(&req).await,
            Err(SessionError::Credential(_))
        ));
        assert_eq!(issuer.requests(), vec![req]);
    }
}
