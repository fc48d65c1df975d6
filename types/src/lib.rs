pub mod chat;
pub mod rtc;
pub mod streams;
mod message;

pub use chat::ChatMessage;
pub use message::{Message, PendingMessage, Role};
pub use rtc::{IceCandidate, IceServer, SdpType, SessionDescription};
pub use streams::{StreamIds, TalkResponse};
