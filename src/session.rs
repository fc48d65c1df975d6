//! Lifecycle of the single real-time session with the avatar service.
//!
//! ```text
//! Idle ──connect──> Negotiating ──ready──> Connected ──destroy / ICE failure──> Closed
//!                        └──────────error──────────────────────────────────────> Closed
//! ```
//!
//! The peer link's events are consumed by a pump task owned by the session. It
//! forwards local ICE candidates to the service, tears the session down when ICE
//! fails or closes, and republishes remote tracks as [`SessionEvent`]s.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use avatar_chat_types::{SessionDescription, StreamIds, TalkResponse};

use crate::avatar::StreamsApi;
use crate::error::{Error, Result};
use crate::transport::{PeerConnector, PeerLink, RemoteTrack, TransportEvent, TransportSnapshot};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Negotiating,
    Connected,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A remote media track arrived.
    Stream(RemoteTrack),
    TrackMuted(RemoteTrack),
    TrackUnmuted(RemoteTrack),
    /// The session ended, either destroyed or lost.
    Closed,
}

struct ActiveSession {
    epoch: u64,
    ids: StreamIds,
    answer: SessionDescription,
    link: Arc<dyn PeerLink>,
    pump: JoinHandle<()>,
}

struct Shared {
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    active: Mutex<Option<ActiveSession>>,
    epoch: AtomicU64,
}

impl Shared {
    fn publish(&self, event: SessionEvent) {
        // No subscriber is not an error.
        let _ = self.events.send(event);
    }

    /// Local teardown after the transport failed. Only the session that owns `epoch` is affected.
    async fn teardown(&self, epoch: u64, link: &Arc<dyn PeerLink>) {
        let owned = {
            let mut active = self.active.lock().await;
            if active.as_ref().map(|a| a.epoch) == Some(epoch) {
                active.take()
            } else {
                None
            }
        };
        close_link(link).await;
        if owned.is_some() {
            self.state.send_replace(SessionState::Closed);
            self.publish(SessionEvent::Closed);
        }
    }
}

async fn close_link(link: &Arc<dyn PeerLink>) {
    if let Err(e) = link.close().await {
        tracing::warn!("failed to close peer connection: {}", e);
    }
}

pub struct AvatarSession<S, P> {
    streams: Arc<S>,
    connector: P,
    shared: Arc<Shared>,
    negotiation: Mutex<()>,
}

impl<S, P> AvatarSession<S, P>
where
    S: StreamsApi + 'static,
    P: PeerConnector,
{
    pub fn new(streams: S, connector: P) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            streams: Arc::new(streams),
            connector,
            shared: Arc::new(Shared {
                state,
                events,
                active: Mutex::new(None),
                epoch: AtomicU64::new(0),
            }),
            negotiation: Mutex::new(()),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Session events. Subscribe before [`Self::connect`] to see the remote tracks.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub async fn ids(&self) -> Option<StreamIds> {
        self.shared.active.lock().await.as_ref().map(|a| a.ids.clone())
    }

    /// The local SDP answer negotiated for the current session.
    pub async fn answer(&self) -> Option<SessionDescription> {
        self.shared.active.lock().await.as_ref().map(|a| a.answer.clone())
    }

    /// Negotiates a new session unless one is already connected.
    pub async fn connect(&self) -> Result<()> {
        let _negotiating = self.negotiation.lock().await;
        if self.state() == SessionState::Connected {
            tracing::debug!("already connected, skipping negotiation");
            return Ok(());
        }

        self.shared.state.send_replace(SessionState::Negotiating);
        let negotiated = match self.negotiate().await {
            Ok(negotiated) => negotiated,
            Err(e) => {
                tracing::error!("error during streaming setup: {}", e);
                self.shared.state.send_replace(SessionState::Closed);
                return Err(e);
            }
        };

        let mut active = self.shared.active.lock().await;
        if TransportSnapshot::of(negotiated.link.as_ref()).is_terminal() {
            drop(active);
            negotiated.pump.abort();
            close_link(&negotiated.link).await;
            self.shared.state.send_replace(SessionState::Closed);
            return Err(Error::TransportClosed);
        }
        tracing::info!(
            "connected to stream {} (session {})",
            negotiated.ids.stream_id,
            negotiated.ids.session_id
        );
        *active = Some(negotiated);
        self.shared.state.send_replace(SessionState::Connected);
        Ok(())
    }

    async fn negotiate(&self) -> Result<ActiveSession> {
        let created = self.streams.create_stream().await?;
        let ids = created.ids();
        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        let (link, events) = self.connector.open(&created.ice_servers).await?;
        let (transport_tx, transport_rx) = watch::channel(TransportSnapshot::of(link.as_ref()));
        let pump = tokio::spawn(pump(
            epoch,
            ids.clone(),
            link.clone(),
            events,
            self.streams.clone(),
            self.shared.clone(),
            transport_tx,
        ));

        match self.handshake(&ids, &link, created.offer, transport_rx).await {
            Ok(answer) => Ok(ActiveSession {
                epoch,
                ids,
                answer,
                link,
                pump,
            }),
            Err(e) => {
                pump.abort();
                close_link(&link).await;
                Err(e)
            }
        }
    }

    async fn handshake(
        &self,
        ids: &StreamIds,
        link: &Arc<dyn PeerLink>,
        offer: SessionDescription,
        mut transport: watch::Receiver<TransportSnapshot>,
    ) -> Result<SessionDescription> {
        link.set_remote_description(offer).await?;
        let answer = link.create_answer().await?;
        link.set_local_description(answer.clone()).await?;
        self.streams.submit_answer(ids, &answer).await?;

        // The link is the source of truth, the channel only signals that it changed.
        transport
            .wait_for(|_| {
                let now = TransportSnapshot::of(link.as_ref());
                now.is_terminal() || now.is_ready()
            })
            .await
            .map_err(|_| Error::TransportClosed)?;
        if TransportSnapshot::of(link.as_ref()).is_terminal() {
            return Err(Error::TransportClosed);
        }
        Ok(answer)
    }

    /// Asks the avatar to speak. Returns `None` without a request when there is no
    /// session or its transport cannot carry speech yet.
    pub async fn talk(&self, text: &str) -> Result<Option<TalkResponse>> {
        let (ids, link) = {
            let active = self.shared.active.lock().await;
            match active.as_ref() {
                Some(active) => (active.ids.clone(), active.link.clone()),
                None => {
                    tracing::debug!("talk without a session");
                    return Ok(None);
                }
            }
        };
        if !TransportSnapshot::of(link.as_ref()).can_talk() {
            tracing::debug!("transport not stable, talk skipped");
            return Ok(None);
        }
        let response = self.streams.talk(&ids, text).await?;
        Ok(Some(response))
    }

    /// Ends the remote session and releases the local transport.
    pub async fn destroy(&self) -> Result<()> {
        let Some(active) = self.shared.active.lock().await.take() else {
            return Ok(());
        };
        let deleted = self.streams.delete_stream(&active.ids).await;
        if let Err(e) = &deleted {
            tracing::warn!("failed to delete stream {}: {}", active.ids.stream_id, e);
        }
        active.pump.abort();
        close_link(&active.link).await;
        self.shared.state.send_replace(SessionState::Closed);
        self.shared.publish(SessionEvent::Closed);
        deleted
    }
}

async fn pump<S: StreamsApi + 'static>(
    epoch: u64,
    ids: StreamIds,
    link: Arc<dyn PeerLink>,
    mut events: mpsc::Receiver<TransportEvent>,
    streams: Arc<S>,
    shared: Arc<Shared>,
    transport: watch::Sender<TransportSnapshot>,
) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::IceCandidate(candidate) => {
                tracing::debug!("local ice candidate: {}", candidate.candidate);
                let streams = streams.clone();
                let ids = ids.clone();
                tokio::spawn(async move {
                    if let Err(e) = streams.add_ice_candidate(&ids, &candidate).await {
                        tracing::warn!("failed to forward ice candidate: {}", e);
                    }
                });
            }
            TransportEvent::IceGatheringState(state) => {
                tracing::debug!("ice gathering state: {:?}", state);
            }
            TransportEvent::IceConnectionState(state) => {
                transport.send_replace(TransportSnapshot::of(link.as_ref()));
                if state.is_terminal() {
                    tracing::warn!("ice connection {:?}, stopping peer connection", state);
                    shared.teardown(epoch, &link).await;
                    transport.send_replace(TransportSnapshot::of(link.as_ref()));
                    break;
                }
            }
            TransportEvent::ConnectionState(state) => {
                tracing::debug!("peer connection state: {:?}", state);
                transport.send_replace(TransportSnapshot::of(link.as_ref()));
            }
            TransportEvent::SignalingState(state) => {
                tracing::debug!("signaling state: {:?}", state);
                transport.send_replace(TransportSnapshot::of(link.as_ref()));
            }
            TransportEvent::Track(track) => shared.publish(SessionEvent::Stream(track)),
            TransportEvent::TrackMuted(track) => shared.publish(SessionEvent::TrackMuted(track)),
            TransportEvent::TrackUnmuted(track) => shared.publish(SessionEvent::TrackUnmuted(track)),
        }
    }
    tracing::debug!("transport events ended for session epoch {}", epoch);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avatar::MockStreamsApi;
    use crate::transport::testing::{FakeConnector, FAKE_ANSWER_SDP};
    use crate::transport::{IceConnectionState, SignalingState, TrackKind};
    use avatar_chat_types::streams::CreateStreamResponse;
    use avatar_chat_types::IceCandidate;
    use std::time::Duration;

    const OFFER_SDP: &str = "v=0\r\no=- 1 1 IN IP4 10.0.0.1\r\ns=remote-offer\r\n";

    fn created_stream() -> CreateStreamResponse {
        serde_json::from_value(serde_json::json!({
            "id": "strm_1",
            "offer": {"type": "offer", "sdp": OFFER_SDP},
            "ice_servers": [{"urls": ["stun:stun.example.com:3478"]}],
            "session_id": "sess_1"
        }))
        .unwrap()
    }

    fn streams() -> MockStreamsApi {
        let mut streams = MockStreamsApi::new();
        streams.expect_create_stream().returning(|| Ok(created_stream()));
        streams.expect_submit_answer().returning(|_, _| Ok(()));
        streams
    }

    fn video() -> RemoteTrack {
        RemoteTrack {
            id: "video-0".to_string(),
            stream_id: "stream-0".to_string(),
            kind: TrackKind::Video,
        }
    }

    async fn next_event(events: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn connect_negotiates_and_submits_answer() {
        let mut streams = MockStreamsApi::new();
        streams
            .expect_create_stream()
            .times(1)
            .returning(|| Ok(created_stream()));
        streams
            .expect_submit_answer()
            .withf(|ids, answer| ids.stream_id == "strm_1" && ids.session_id == "sess_1" && answer.sdp == FAKE_ANSWER_SDP)
            .times(1)
            .returning(|_, _| Ok(()));

        let connector = FakeConnector::new();
        let session = AvatarSession::new(streams, connector.clone());
        assert_eq!(session.state(), SessionState::Idle);

        session.connect().await.unwrap();

        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(connector.opened(), 1);
        let remote = connector.last_link().remote_description().unwrap();
        assert_eq!(remote.sdp, OFFER_SDP);
        assert_eq!(session.ids().await.unwrap().stream_id, "strm_1");
        assert_eq!(session.answer().await.unwrap().sdp, FAKE_ANSWER_SDP);
    }

    #[tokio::test]
    async fn connect_when_connected_is_a_no_op() {
        let mut streams = MockStreamsApi::new();
        streams
            .expect_create_stream()
            .times(1)
            .returning(|| Ok(created_stream()));
        streams.expect_submit_answer().times(1).returning(|_, _| Ok(()));

        let connector = FakeConnector::new();
        let session = AvatarSession::new(streams, connector.clone());
        session.connect().await.unwrap();
        session.connect().await.unwrap();

        assert_eq!(connector.opened(), 1);
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn negotiation_error_tears_down_and_reraises() {
        let mut streams = MockStreamsApi::new();
        streams.expect_create_stream().returning(|| Ok(created_stream()));
        streams.expect_submit_answer().never();

        let connector = FakeConnector::failing();
        let session = AvatarSession::new(streams, connector.clone());
        let err = session.connect().await.unwrap_err();

        assert!(matches!(err, Error::Negotiation(_)));
        assert_eq!(session.state(), SessionState::Closed);
        assert!(connector.last_link().is_closed());
        assert!(session.ids().await.is_none());
    }

    #[tokio::test]
    async fn create_stream_failure_closes_without_opening_a_link() {
        let mut streams = MockStreamsApi::new();
        streams.expect_create_stream().returning(|| {
            Err(Error::Status {
                service: "avatar service",
                status: 401,
            })
        });

        let connector = FakeConnector::new();
        let session = AvatarSession::new(streams, connector.clone());
        let err = session.connect().await.unwrap_err();

        assert!(matches!(err, Error::Status { status: 401, .. }));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(connector.opened(), 0);
    }

    #[tokio::test]
    async fn transport_failure_while_waiting_is_reported() {
        let streams = streams();
        let connector = FakeConnector::unsettled();
        let session = Arc::new(AvatarSession::new(streams, connector.clone()));

        let connecting = tokio::spawn({
            let session = session.clone();
            async move { session.connect().await }
        });
        tokio::time::timeout(Duration::from_secs(2), async {
            while connector.opened() == 0 || connector.last_link().remote_description().is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        connector
            .last_link()
            .emit(TransportEvent::IceConnectionState(IceConnectionState::Failed));
        let err = connecting.await.unwrap().unwrap_err();

        assert!(matches!(err, Error::TransportClosed));
        assert_eq!(session.state(), SessionState::Closed);
        assert!(connector.last_link().is_closed());
    }

    #[tokio::test]
    async fn talk_without_session_sends_nothing() {
        let mut streams = MockStreamsApi::new();
        streams.expect_talk().never();
        let session = AvatarSession::new(streams, FakeConnector::new());

        assert!(session.talk("Hello").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn talk_requires_stable_or_connected_transport() {
        let mut streams = streams();
        streams.expect_talk().never();
        let connector = FakeConnector::new();
        let session = AvatarSession::new(streams, connector.clone());
        session.connect().await.unwrap();

        connector.last_link().set_signaling(SignalingState::HaveRemoteOffer);
        assert!(session.talk("Hello").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn talk_returns_raw_response() {
        let mut streams = streams();
        streams
            .expect_talk()
            .withf(|ids, text| ids.session_id == "sess_1" && text == "Hi there")
            .times(1)
            .returning(|_, _| Ok(TalkResponse::new(200, r#"{"duration": 3, "status": "started"}"#)));
        let session = AvatarSession::new(streams, FakeConnector::new());
        session.connect().await.unwrap();

        let response = session.talk("Hi there").await.unwrap().unwrap();
        assert!(response.is_success());
        assert_eq!(response.duration(), Some(3.0));
    }

    #[tokio::test]
    async fn local_candidates_are_forwarded() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut streams = streams();
        streams.expect_add_ice_candidate().returning(move |ids, candidate| {
            tx.send((ids.stream_id.clone(), candidate.clone())).unwrap();
            Ok(())
        });
        let connector = FakeConnector::new();
        let session = AvatarSession::new(streams, connector.clone());
        session.connect().await.unwrap();

        let candidate = IceCandidate {
            candidate: "candidate:1 1 udp 2122260223 192.168.1.2 54321 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        };
        connector
            .last_link()
            .emit(TransportEvent::IceCandidate(candidate.clone()));

        let (stream_id, forwarded) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stream_id, "strm_1");
        assert_eq!(forwarded, candidate);
    }

    #[tokio::test]
    async fn ice_failure_tears_down_without_error() {
        let mut streams = streams();
        streams.expect_talk().never();
        streams.expect_delete_stream().never();
        let connector = FakeConnector::new();
        let session = AvatarSession::new(streams, connector.clone());
        let mut events = session.subscribe();
        session.connect().await.unwrap();

        connector
            .last_link()
            .emit(TransportEvent::IceConnectionState(IceConnectionState::Failed));

        assert_eq!(next_event(&mut events).await, SessionEvent::Closed);
        assert_eq!(session.state(), SessionState::Closed);
        assert!(connector.last_link().is_closed());
        assert!(session.talk("Hello").await.unwrap().is_none());
        session.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn tracks_and_mute_changes_are_republished() {
        let connector = FakeConnector::new();
        let session = AvatarSession::new(streams(), connector.clone());
        let mut events = session.subscribe();
        session.connect().await.unwrap();

        let link = connector.last_link();
        link.emit(TransportEvent::Track(video()));
        link.emit(TransportEvent::TrackUnmuted(video()));
        link.emit(TransportEvent::TrackMuted(video()));

        assert_eq!(next_event(&mut events).await, SessionEvent::Stream(video()));
        assert_eq!(next_event(&mut events).await, SessionEvent::TrackUnmuted(video()));
        assert_eq!(next_event(&mut events).await, SessionEvent::TrackMuted(video()));
    }

    #[tokio::test]
    async fn destroy_deletes_stream_and_closes_link() {
        let mut streams = streams();
        streams
            .expect_delete_stream()
            .withf(|ids| ids.session_id == "sess_1")
            .times(1)
            .returning(|_| Ok(()));
        let connector = FakeConnector::new();
        let session = AvatarSession::new(streams, connector.clone());
        session.connect().await.unwrap();

        session.destroy().await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(connector.last_link().is_closed());

        // Nothing left to destroy.
        session.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn destroy_closes_locally_even_if_delete_fails() {
        let mut streams = streams();
        streams.expect_delete_stream().returning(|_| {
            Err(Error::Status {
                service: "avatar service",
                status: 404,
            })
        });
        let connector = FakeConnector::new();
        let session = AvatarSession::new(streams, connector.clone());
        session.connect().await.unwrap();

        assert!(session.destroy().await.is_err());
        assert!(connector.last_link().is_closed());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn reconnect_after_close_negotiates_again() {
        let mut streams = streams();
        streams.expect_delete_stream().returning(|_| Ok(()));
        let connector = FakeConnector::new();
        let session = AvatarSession::new(streams, connector.clone());

        session.connect().await.unwrap();
        session.destroy().await.unwrap();
        session.connect().await.unwrap();

        assert_eq!(connector.opened(), 2);
        assert_eq!(session.state(), SessionState::Connected);
    }
}
