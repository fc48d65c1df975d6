//! Wires user input, the chat model and the avatar into one conversation.
//!
//! A turn appends the user's message right away, asks the chat model for a reply
//! over the persona and the whole transcript, and asks the avatar to speak it. A
//! spoken reply is staged and only enters the transcript once the avatar starts
//! speaking, so the text shows up together with the voice.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use avatar_chat_types::{ChatMessage, Message, PendingMessage};

use crate::action::{Action, ActionState};
use crate::avatar::StreamsApi;
use crate::chat::ChatApi;
use crate::config::ConversationConfig;
use crate::error::{Error, Result};
use crate::playback::Playback;
use crate::session::{AvatarSession, SessionEvent, SessionState};
use crate::transcript::Transcript;
use crate::transport::{PeerConnector, RemoteTrack};

/// Everything a front-end renders.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    pub transcript: Transcript,
    /// Text being composed.
    pub input: String,
    pub playback: Playback,
    /// The avatar's video track, once it arrived.
    pub stream: Option<RemoteTrack>,
    pub connected: bool,
    /// A turn is waiting on the chat model or the avatar.
    pub replying: bool,
}

impl ConversationState {
    /// Input is closed while a turn runs, while its reply waits to be spoken, and
    /// while the avatar speaks.
    pub fn input_enabled(&self) -> bool {
        !self.replying && self.transcript.pending().is_none() && self.playback.input_enabled()
    }

    fn can_send(&self) -> bool {
        self.connected && self.input_enabled() && !self.input.trim().is_empty()
    }

    /// Forgets everything tied to the ended session.
    fn reset_session(&mut self) {
        self.connected = false;
        self.stream = None;
        self.playback = Playback::default();
        if let Some(pending) = self.transcript.discard() {
            tracing::debug!("dropping unspoken reply staged at {}", pending.message.timestamp());
        }
    }
}

/// Clears [`ConversationState::replying`] when the turn ends, including when its future is dropped.
struct ReplyingGuard<'a>(&'a watch::Sender<ConversationState>);

impl Drop for ReplyingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|state| state.replying = false);
    }
}

struct Inner<S, P, L> {
    session: AvatarSession<S, P>,
    chat: L,
    persona: String,
    idle_delay: Duration,
    state: watch::Sender<ConversationState>,
}

impl<S, P, L> Inner<S, P, L>
where
    S: StreamsApi + 'static,
    P: PeerConnector + 'static,
    L: ChatApi + 'static,
{
    async fn connect(&self) -> Result<()> {
        self.session.connect().await?;
        // The session may already be lost again; its state is authoritative.
        self.state
            .send_modify(|state| state.connected = self.session.state() == SessionState::Connected);
        Ok(())
    }

    async fn turn(&self, text: String) -> Result<Option<Message>> {
        let mut prompt = vec![ChatMessage::system(&self.persona)];
        self.state.send_modify(|state| {
            state.transcript.push(Message::user(&text));
            prompt.extend(state.transcript.messages().iter().map(ChatMessage::from));
        });

        let Some(reply) = self.chat.complete(&prompt).await? else {
            tracing::warn!("chat model gave no reply");
            return Ok(None);
        };
        if reply.content.trim().is_empty() {
            tracing::warn!("chat model replied with empty content");
            return Ok(None);
        }

        let Some(response) = self.session.talk(&reply.content).await? else {
            return Ok(None);
        };
        if !response.is_success() {
            tracing::warn!("talk request failed with status {}: {}", response.status, response.body);
            return Ok(None);
        }
        let Some(duration) = response.duration() else {
            tracing::warn!("talk response carried no duration");
            return Ok(None);
        };

        let message = Message::assistant(&reply.content);
        tracing::debug!("staging reply, duration={}s", duration);
        self.state.send_modify(|state| {
            state.transcript.stage(PendingMessage::new(duration, message.clone()));
            if state.playback.playing() {
                state.transcript.reveal();
            }
        });
        Ok(Some(message))
    }
}

/// Outcome of an action-backed operation, shared with the action's observable state.
pub type Outcome<T> = std::result::Result<T, Arc<Error>>;

pub struct Conversation<S, P, L> {
    inner: Arc<Inner<S, P, L>>,
    connect: Action<(), (), Error>,
    send: Action<String, Option<Message>, Error>,
    events: JoinHandle<()>,
}

impl<S, P, L> Conversation<S, P, L>
where
    S: StreamsApi + 'static,
    P: PeerConnector + 'static,
    L: ChatApi + 'static,
{
    /// Must be called within a tokio runtime; the session's events are consumed by a
    /// task spawned here.
    pub fn new(session: AvatarSession<S, P>, chat: L, config: ConversationConfig) -> Self {
        let events = session.subscribe();
        let (state, _) = watch::channel(ConversationState::default());
        let inner = Arc::new(Inner {
            session,
            chat,
            persona: config.persona,
            idle_delay: config.idle_delay,
            state,
        });

        let connect = Action::new({
            let inner = inner.clone();
            move |()| {
                let inner = inner.clone();
                async move { inner.connect().await }.boxed()
            }
        });
        let send = Action::new({
            let inner = inner.clone();
            move |text: String| {
                let inner = inner.clone();
                async move { inner.turn(text).await }.boxed()
            }
        });

        Self {
            events: tokio::spawn(run_events(inner.clone(), events)),
            inner,
            connect,
            send,
        }
    }

    pub fn state(&self) -> ConversationState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationState> {
        self.inner.state.subscribe()
    }

    pub fn session(&self) -> &AvatarSession<S, P> {
        &self.inner.session
    }

    pub fn chat(&self) -> &L {
        &self.inner.chat
    }

    pub async fn connect(&self) -> Outcome<()> {
        self.connect.trigger(()).await
    }

    pub fn connect_status(&self) -> ActionState<(), Error> {
        self.connect.state()
    }

    pub fn set_input(&self, text: &str) {
        self.inner.state.send_modify(|state| state.input = text.to_string());
    }

    /// Sends the composed input as the next turn.
    ///
    /// Does nothing unless connected, input is enabled and not blank. Only one turn runs
    /// at a time. Returns the
    /// assistant reply once it is staged or revealed, `None` if any leg came back empty.
    pub async fn send(&self) -> Outcome<Option<Message>> {
        let mut text = None;
        self.inner.state.send_if_modified(|state| {
            if !state.can_send() {
                return false;
            }
            text = Some(std::mem::take(&mut state.input));
            state.replying = true;
            if state.playback.start() {
                state.transcript.reveal();
            }
            true
        });
        let Some(text) = text else {
            tracing::debug!("send ignored, not connected, input disabled or blank");
            return Ok(None);
        };
        let _replying = ReplyingGuard(&self.inner.state);
        self.send.trigger(text).await
    }

    pub fn send_status(&self) -> ActionState<Option<Message>, Error> {
        self.send.state()
    }

    pub async fn disconnect(&self) -> Result<()> {
        let destroyed = self.inner.session.destroy().await;
        self.inner.state.send_modify(ConversationState::reset_session);
        destroyed
    }
}

impl<S, P, L> Drop for Conversation<S, P, L> {
    fn drop(&mut self) {
        self.events.abort();
    }
}

async fn run_events<S, P, L>(inner: Arc<Inner<S, P, L>>, mut events: broadcast::Receiver<SessionEvent>)
where
    S: StreamsApi + 'static,
    P: PeerConnector + 'static,
    L: ChatApi + 'static,
{
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("missed {} session events", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match event {
            SessionEvent::Stream(track) if track.is_video() => {
                tracing::debug!("attaching video track {}", track.id);
                inner.state.send_modify(|state| state.stream = Some(track));
            }
            SessionEvent::TrackUnmuted(track) if track.is_video() => {
                inner.state.send_modify(|state| {
                    if state.playback.unmute() {
                        if let Some(message) = state.transcript.reveal() {
                            tracing::debug!("revealing reply from {}", message.timestamp());
                        }
                    }
                });
            }
            SessionEvent::TrackMuted(track) if track.is_video() => {
                let mut epoch = 0;
                inner.state.send_modify(|state| epoch = state.playback.mute());
                let inner = inner.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(inner.idle_delay).await;
                    inner
                        .state
                        .send_if_modified(|state| state.playback.idle_elapsed(epoch));
                });
            }
            SessionEvent::Closed => {
                // A close of an earlier session can arrive after a reconnect.
                if inner.session.state() == SessionState::Connected {
                    tracing::debug!("ignoring close of a replaced session");
                    continue;
                }
                tracing::info!("avatar session closed");
                inner.state.send_modify(ConversationState::reset_session);
            }
            other => tracing::debug!("ignoring session event {:?}", other),
        }
    }
}
