/// Who authored a message: "system", "user" or "assistant".
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant")]
    Assistant,
}

/// One transcript entry. Fields are only readable so an appended entry cannot be edited.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct Message {
    /// Creation time in epoch milliseconds, as a decimal string.
    timestamp: String,
    role: Role,
    content: String,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp_millis().to_string(),
            role,
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: &str) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// A reply whose playback duration is known but which is not shown yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
    /// Playback length reported by the avatar service, in seconds.
    pub duration: f64,
    pub message: Message,
}

impl PendingMessage {
    pub fn new(duration: f64, message: Message) -> Self {
        Self { duration, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_uses_lowercase_wire_names() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        let role: Role = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(role, Role::System);
    }

    #[test]
    fn timestamp_is_epoch_millis() {
        let message = Message::user("Hello");
        let millis: i64 = message.timestamp().parse().expect("numeric timestamp");
        assert!(millis > 1_600_000_000_000);
        assert_eq!(message.role(), Role::User);
        assert_eq!(message.content(), "Hello");
    }
}
