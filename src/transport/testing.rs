//! In-memory peer transport driven by tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use avatar_chat_types::{IceServer, SessionDescription};

use super::{
    ConnectionState, IceConnectionState, PeerConnector, PeerLink, SignalingState, TransportEvent, TransportSnapshot,
};
use crate::error::{Error, Result};

pub(crate) const FAKE_ANSWER_SDP: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=fake-answer\r\n";

pub(crate) struct FakeLink {
    snapshot: Mutex<TransportSnapshot>,
    events: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    closed: AtomicBool,
    fail_negotiation: bool,
    settle_on_answer: bool,
    remote: Mutex<Option<SessionDescription>>,
}

impl FakeLink {
    /// Applies the event's state to the link and delivers it.
    pub(crate) fn emit(&self, event: TransportEvent) {
        {
            let mut snapshot = self.snapshot.lock().unwrap();
            match &event {
                TransportEvent::SignalingState(state) => snapshot.signaling = *state,
                TransportEvent::IceConnectionState(state) => snapshot.ice = *state,
                TransportEvent::ConnectionState(state) => snapshot.connection = *state,
                _ => {}
            }
        }
        if let Some(events) = self.events.lock().unwrap().as_ref() {
            events.try_send(event).expect("fake transport channel full");
        }
    }

    pub(crate) fn set_signaling(&self, state: SignalingState) {
        self.snapshot.lock().unwrap().signaling = state;
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn remote_description(&self) -> Option<SessionDescription> {
        self.remote.lock().unwrap().clone()
    }
}

#[async_trait]
impl PeerLink for FakeLink {
    async fn set_remote_description(&self, offer: SessionDescription) -> Result<()> {
        if self.fail_negotiation {
            return Err(Error::Negotiation("malformed remote offer".to_string()));
        }
        *self.remote.lock().unwrap() = Some(offer);
        self.emit(TransportEvent::SignalingState(SignalingState::HaveRemoteOffer));
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription::answer(FAKE_ANSWER_SDP))
    }

    async fn set_local_description(&self, _answer: SessionDescription) -> Result<()> {
        if self.settle_on_answer {
            self.emit(TransportEvent::SignalingState(SignalingState::Stable));
        }
        Ok(())
    }

    fn signaling_state(&self) -> SignalingState {
        self.snapshot.lock().unwrap().signaling
    }

    fn ice_connection_state(&self) -> IceConnectionState {
        self.snapshot.lock().unwrap().ice
    }

    fn connection_state(&self) -> ConnectionState {
        self.snapshot.lock().unwrap().connection
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        {
            let mut snapshot = self.snapshot.lock().unwrap();
            snapshot.signaling = SignalingState::Closed;
            snapshot.ice = IceConnectionState::Closed;
            snapshot.connection = ConnectionState::Closed;
        }
        self.events.lock().unwrap().take();
        Ok(())
    }
}

#[derive(Clone)]
pub(crate) struct FakeConnector {
    links: Arc<Mutex<Vec<Arc<FakeLink>>>>,
    fail_negotiation: bool,
    settle_on_answer: bool,
}

impl FakeConnector {
    pub(crate) fn new() -> Self {
        Self {
            links: Arc::new(Mutex::new(Vec::new())),
            fail_negotiation: false,
            settle_on_answer: true,
        }
    }

    /// Links reject the remote offer.
    pub(crate) fn failing() -> Self {
        Self {
            fail_negotiation: true,
            ..Self::new()
        }
    }

    /// Links never settle on their own; tests drive their states.
    pub(crate) fn unsettled() -> Self {
        Self {
            settle_on_answer: false,
            ..Self::new()
        }
    }

    pub(crate) fn opened(&self) -> usize {
        self.links.lock().unwrap().len()
    }

    pub(crate) fn last_link(&self) -> Arc<FakeLink> {
        self.links.lock().unwrap().last().cloned().expect("no link opened")
    }
}

#[async_trait]
impl PeerConnector for FakeConnector {
    async fn open(&self, _ice_servers: &[IceServer]) -> Result<(Arc<dyn PeerLink>, mpsc::Receiver<TransportEvent>)> {
        let (tx, rx) = mpsc::channel(64);
        let link = Arc::new(FakeLink {
            snapshot: Mutex::new(TransportSnapshot {
                signaling: SignalingState::Stable,
                ice: IceConnectionState::New,
                connection: ConnectionState::New,
            }),
            events: Mutex::new(Some(tx)),
            closed: AtomicBool::new(false),
            fail_negotiation: self.fail_negotiation,
            settle_on_answer: self.settle_on_answer,
            remote: Mutex::new(None),
        });
        self.links.lock().unwrap().push(link.clone());
        Ok((link, rx))
    }
}
