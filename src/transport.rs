//! The peer connection that carries the avatar's media.
//!
//! A [`PeerConnector`] opens a [`PeerLink`] together with the receiving end of its
//! event channel. Everything the connection reports (local ICE candidates, state
//! changes, remote tracks and their mute state) arrives as a [`TransportEvent`].

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use avatar_chat_types::{IceCandidate, IceServer, SessionDescription};

use crate::error::Result;

#[cfg(feature = "native-rtc")]
pub mod native;
#[cfg(test)]
pub(crate) mod testing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl IceConnectionState {
    /// Failed and closed connections never recover.
    pub fn is_terminal(self) -> bool {
        matches!(self, IceConnectionState::Failed | IceConnectionState::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceGatheringState {
    New,
    Gathering,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}

/// Latest states reported by a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSnapshot {
    pub signaling: SignalingState,
    pub ice: IceConnectionState,
    pub connection: ConnectionState,
}

impl TransportSnapshot {
    pub fn of(link: &dyn PeerLink) -> Self {
        Self {
            signaling: link.signaling_state(),
            ice: link.ice_connection_state(),
            connection: link.connection_state(),
        }
    }

    /// The link can carry a session once it is connected or its signaling settled.
    pub fn is_ready(&self) -> bool {
        self.connection == ConnectionState::Connected || self.signaling == SignalingState::Stable
    }

    /// Speech requests need either a settled signaling state or a connected ICE transport.
    pub fn can_talk(&self) -> bool {
        self.signaling == SignalingState::Stable || self.ice == IceConnectionState::Connected
    }

    pub fn is_terminal(&self) -> bool {
        self.ice.is_terminal() || self.connection.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A media track received from the avatar service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: TrackKind,
}

impl RemoteTrack {
    pub fn is_video(&self) -> bool {
        self.kind == TrackKind::Video
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    IceCandidate(IceCandidate),
    IceGatheringState(IceGatheringState),
    IceConnectionState(IceConnectionState),
    ConnectionState(ConnectionState),
    SignalingState(SignalingState),
    Track(RemoteTrack),
    TrackMuted(RemoteTrack),
    TrackUnmuted(RemoteTrack),
}

/// Turns the packet flow of a remote track into mute state changes, the way a
/// browser flags a silent track. The track starts muted, the first packet reports
/// it unmuted and `mute_after` without packets reports it muted again. Returns once
/// `read` fails or nobody listens to `events` anymore.
#[cfg_attr(not(feature = "native-rtc"), allow(dead_code))]
pub(crate) async fn watch_activity<F, Fut, T, E>(
    mut read: F,
    track: RemoteTrack,
    events: mpsc::Sender<TransportEvent>,
    mute_after: Duration,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    let mut muted = true;
    loop {
        let event = match tokio::time::timeout(mute_after, read()).await {
            Ok(Ok(_)) if muted => {
                muted = false;
                TransportEvent::TrackUnmuted(track.clone())
            }
            Ok(Ok(_)) => continue,
            Ok(Err(e)) => {
                tracing::debug!("remote track {} ended: {}", track.id, e);
                break;
            }
            Err(_) if !muted => {
                muted = true;
                TransportEvent::TrackMuted(track.clone())
            }
            Err(_) => continue,
        };
        if events.send(event).await.is_err() {
            break;
        }
    }
}

/// Creates peer links.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn open(&self, ice_servers: &[IceServer]) -> Result<(Arc<dyn PeerLink>, mpsc::Receiver<TransportEvent>)>;
}

/// One peer connection. Events that arrive after `close` are ignored by the session.
#[async_trait]
pub trait PeerLink: Send + Sync {
    async fn set_remote_description(&self, offer: SessionDescription) -> Result<()>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, answer: SessionDescription) -> Result<()>;

    fn signaling_state(&self) -> SignalingState;

    fn ice_connection_state(&self) -> IceConnectionState;

    fn connection_state(&self) -> ConnectionState;

    async fn close(&self) -> Result<()>;
}
