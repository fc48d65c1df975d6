//! Peer links backed by the `webrtc` crate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

use avatar_chat_types::{IceCandidate, IceServer, SdpType, SessionDescription};

use super::{
    watch_activity, ConnectionState, IceConnectionState, IceGatheringState, PeerConnector, PeerLink, RemoteTrack,
    SignalingState, TrackKind, TransportEvent,
};
use crate::error::{Error, Result};

/// A track that delivers no RTP for this long is reported muted.
pub const MUTE_AFTER: Duration = Duration::from_millis(500);

const EVENT_CAPACITY: usize = 256;

fn negotiation(e: webrtc::Error) -> Error {
    Error::Negotiation(e.to_string())
}

pub struct NativeConnector {
    api: API,
}

impl NativeConnector {
    pub fn new() -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().map_err(negotiation)?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine).map_err(negotiation)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();
        Ok(Self { api })
    }
}

#[async_trait]
impl PeerConnector for NativeConnector {
    async fn open(&self, ice_servers: &[IceServer]) -> Result<(Arc<dyn PeerLink>, mpsc::Receiver<TransportEvent>)> {
        let config = RTCConfiguration {
            ice_servers: ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        let pc = Arc::new(self.api.new_peer_connection(config).await.map_err(negotiation)?);
        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        register_handlers(&pc, tx);
        tracing::debug!("peer connection created with {} ice servers", ice_servers.len());
        Ok((Arc::new(NativeLink { pc }), rx))
    }
}

fn register_handlers(pc: &RTCPeerConnection, tx: mpsc::Sender<TransportEvent>) {
    let events = tx.clone();
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let events = events.clone();
        Box::pin(async move {
            // `None` marks the end of gathering.
            let Some(candidate) = candidate else { return };
            match candidate.to_json() {
                Ok(init) => {
                    let candidate = IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                    };
                    let _ = events.send(TransportEvent::IceCandidate(candidate)).await;
                }
                Err(e) => tracing::warn!("failed to serialize local candidate: {}", e),
            }
        })
    }));

    let events = tx.clone();
    pc.on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
        let events = events.clone();
        Box::pin(async move {
            let state = match state {
                RTCIceGathererState::Gathering => IceGatheringState::Gathering,
                RTCIceGathererState::Complete => IceGatheringState::Complete,
                _ => IceGatheringState::New,
            };
            let _ = events.send(TransportEvent::IceGatheringState(state)).await;
        })
    }));

    let events = tx.clone();
    pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
        let events = events.clone();
        Box::pin(async move {
            tracing::debug!("ice connection state: {}", state);
            let _ = events
                .send(TransportEvent::IceConnectionState(ice_connection_state(state)))
                .await;
        })
    }));

    let events = tx.clone();
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let events = events.clone();
        Box::pin(async move {
            tracing::debug!("peer connection state: {}", state);
            let _ = events.send(TransportEvent::ConnectionState(connection_state(state))).await;
        })
    }));

    let events = tx.clone();
    pc.on_signaling_state_change(Box::new(move |state: RTCSignalingState| {
        let events = events.clone();
        Box::pin(async move {
            let _ = events.send(TransportEvent::SignalingState(signaling_state(state))).await;
        })
    }));

    let events = tx;
    pc.on_track(Box::new(
        move |track: Arc<TrackRemote>, _receiver: Arc<RTCRtpReceiver>, _transceiver: Arc<RTCRtpTransceiver>| {
            let events = events.clone();
            Box::pin(async move {
                let remote = RemoteTrack {
                    id: track.id(),
                    stream_id: track.stream_id(),
                    kind: match track.kind() {
                        RTPCodecType::Video => TrackKind::Video,
                        _ => TrackKind::Audio,
                    },
                };
                tracing::info!("remote {:?} track {} arrived", remote.kind, remote.id);
                if events.send(TransportEvent::Track(remote.clone())).await.is_ok() {
                    let read = move || {
                        let track = track.clone();
                        async move { track.read_rtp().await }
                    };
                    tokio::spawn(watch_activity(read, remote, events, MUTE_AFTER));
                }
            })
        },
    ));
}

fn ice_connection_state(state: RTCIceConnectionState) -> IceConnectionState {
    match state {
        RTCIceConnectionState::Checking => IceConnectionState::Checking,
        RTCIceConnectionState::Connected => IceConnectionState::Connected,
        RTCIceConnectionState::Completed => IceConnectionState::Completed,
        RTCIceConnectionState::Disconnected => IceConnectionState::Disconnected,
        RTCIceConnectionState::Failed => IceConnectionState::Failed,
        RTCIceConnectionState::Closed => IceConnectionState::Closed,
        _ => IceConnectionState::New,
    }
}

fn connection_state(state: RTCPeerConnectionState) -> ConnectionState {
    match state {
        RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
        RTCPeerConnectionState::Connected => ConnectionState::Connected,
        RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
        RTCPeerConnectionState::Failed => ConnectionState::Failed,
        RTCPeerConnectionState::Closed => ConnectionState::Closed,
        _ => ConnectionState::New,
    }
}

fn signaling_state(state: RTCSignalingState) -> SignalingState {
    match state {
        RTCSignalingState::HaveLocalOffer => SignalingState::HaveLocalOffer,
        RTCSignalingState::HaveRemoteOffer => SignalingState::HaveRemoteOffer,
        RTCSignalingState::HaveLocalPranswer => SignalingState::HaveLocalPranswer,
        RTCSignalingState::HaveRemotePranswer => SignalingState::HaveRemotePranswer,
        RTCSignalingState::Closed => SignalingState::Closed,
        _ => SignalingState::Stable,
    }
}

fn to_native(description: SessionDescription) -> Result<RTCSessionDescription> {
    match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp).map_err(negotiation),
        SdpType::Answer => RTCSessionDescription::answer(description.sdp).map_err(negotiation),
        SdpType::Pranswer => RTCSessionDescription::pranswer(description.sdp).map_err(negotiation),
        SdpType::Rollback => Err(Error::Negotiation("rollback descriptions are not supported".to_string())),
    }
}

fn from_native(description: &RTCSessionDescription) -> Result<SessionDescription> {
    let sdp_type = match description.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        other => return Err(Error::Negotiation(format!("unexpected sdp type {}", other))),
    };
    Ok(SessionDescription {
        sdp_type,
        sdp: description.sdp.clone(),
    })
}

pub struct NativeLink {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl PeerLink for NativeLink {
    async fn set_remote_description(&self, offer: SessionDescription) -> Result<()> {
        self.pc
            .set_remote_description(to_native(offer)?)
            .await
            .map_err(negotiation)?;
        tracing::debug!("set remote sdp OK");
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.pc.create_answer(None).await.map_err(negotiation)?;
        tracing::debug!("create local sdp OK");
        from_native(&answer)
    }

    async fn set_local_description(&self, answer: SessionDescription) -> Result<()> {
        self.pc
            .set_local_description(to_native(answer)?)
            .await
            .map_err(negotiation)?;
        tracing::debug!("set local sdp OK");
        Ok(())
    }

    fn signaling_state(&self) -> SignalingState {
        signaling_state(self.pc.signaling_state())
    }

    fn ice_connection_state(&self) -> IceConnectionState {
        ice_connection_state(self.pc.ice_connection_state())
    }

    fn connection_state(&self) -> ConnectionState {
        connection_state(self.pc.connection_state())
    }

    async fn close(&self) -> Result<()> {
        tracing::debug!("stopping peer connection");
        self.pc.close().await.map_err(negotiation)?;
        tracing::debug!("stopped peer connection");
        Ok(())
    }
}
