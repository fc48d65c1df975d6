use crate::message::{Message, Role};

/// A message as the chat-completion API sees it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
        }
    }

    pub fn system(content: &str) -> Self {
        Self::new(Role::System, content)
    }
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self::new(message.role(), message.content())
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub temperature: f32,
    pub messages: Vec<ChatMessage>,
}

impl ChatCompletionRequest {
    pub fn new(model: &str, temperature: f32, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.to_string(),
            temperature,
            messages,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

impl ChatCompletionResponse {
    /// The first choice's message, which is the reply.
    pub fn into_reply(self) -> Option<ChatMessage> {
        self.choices.into_iter().next().map(|choice| choice.message)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Choice {
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_is_first_choice() {
        let body = r#"{
            "id": "chatcmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "Hi there"}, "finish_reason": "stop"},
                {"index": 1, "message": {"role": "assistant", "content": "Ignored"}, "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12}
        }"#;
        let response: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.usage.map(|u| u.total_tokens), Some(12));
        let reply = response.into_reply().unwrap();
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, "Hi there");
    }

    #[test]
    fn missing_choices_yield_no_reply() {
        let response: ChatCompletionResponse = serde_json::from_str("{}").unwrap();
        assert!(response.into_reply().is_none());
    }
}
