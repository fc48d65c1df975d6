use avatar_chat_types::{Message, PendingMessage};

/// Ordered conversation history plus at most one reply waiting for the avatar to
/// start speaking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    messages: Vec<Message>,
    pending: Option<PendingMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Stages a reply. A reply that was still staged is replaced.
    pub fn stage(&mut self, pending: PendingMessage) {
        if let Some(previous) = self.pending.replace(pending) {
            tracing::debug!("replacing unrevealed reply staged at {}", previous.message.timestamp());
        }
    }

    /// Moves the staged reply to the end of the history.
    pub fn reveal(&mut self) -> Option<&Message> {
        let pending = self.pending.take()?;
        self.messages.push(pending.message);
        self.messages.last()
    }

    /// Drops the staged reply without showing it.
    pub fn discard(&mut self) -> Option<PendingMessage> {
        self.pending.take()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn pending(&self) -> Option<&PendingMessage> {
        self.pending.as_ref()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avatar_chat_types::Role;

    #[test]
    fn reveal_appends_staged_reply_once() {
        let mut transcript = Transcript::new();
        transcript.push(Message::user("Hello"));
        transcript.stage(PendingMessage::new(3.0, Message::assistant("Hi there")));
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.pending().unwrap().duration, 3.0);

        let revealed = transcript.reveal().unwrap();
        assert_eq!(revealed.role(), Role::Assistant);
        assert_eq!(revealed.content(), "Hi there");
        assert!(transcript.pending().is_none());
        assert!(transcript.reveal().is_none());

        let contents: Vec<_> = transcript.messages().iter().map(|m| m.content()).collect();
        assert_eq!(contents, ["Hello", "Hi there"]);
    }

    #[test]
    fn staging_replaces_unrevealed_reply() {
        let mut transcript = Transcript::new();
        transcript.stage(PendingMessage::new(1.0, Message::assistant("first")));
        transcript.stage(PendingMessage::new(2.0, Message::assistant("second")));

        assert_eq!(transcript.reveal().unwrap().content(), "second");
        assert_eq!(transcript.len(), 1);
    }

    #[test]
    fn discard_drops_staged_reply() {
        let mut transcript = Transcript::new();
        transcript.push(Message::user("Hello"));
        transcript.stage(PendingMessage::new(1.5, Message::assistant("never spoken")));

        assert_eq!(transcript.discard().unwrap().duration, 1.5);
        assert!(transcript.reveal().is_none());
        assert_eq!(transcript.len(), 1);
    }

    #[test]
    fn reveal_without_staged_reply_changes_nothing() {
        let mut transcript = Transcript::new();
        transcript.push(Message::user("Hello"));
        assert!(transcript.reveal().is_none());
        assert_eq!(transcript.len(), 1);
        assert!(!transcript.is_empty());
    }
}
