pub mod action;
pub mod avatar;
pub mod chat;
pub mod config;
mod consts;
pub mod conversation;
mod error;
pub mod playback;
pub mod session;
pub mod transcript;
pub mod transport;

pub use avatar_chat_types as types;
pub use action::{Action, ActionState};
pub use avatar::{StreamsApi, StreamsClient};
pub use chat::{ChatApi, ChatClient, Stats};
pub use config::{AvatarConfig, ChatConfig, Config, ConfigBuilder, ConfigError, ConversationConfig};
pub use conversation::{Conversation, ConversationState, Outcome};
pub use error::{Error, Result};
pub use session::{AvatarSession, SessionEvent, SessionState};
pub use playback::Playback;
pub use transcript::Transcript;
pub use transport::{PeerConnector, PeerLink, RemoteTrack, TrackKind, TransportEvent, TransportSnapshot};

#[cfg(feature = "native-rtc")]
pub use transport::native::NativeConnector;
