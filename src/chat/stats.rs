use avatar_chat_types::chat::Usage;

/// Token usage accumulated over all completions of one client.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    requests: u64,
    total_tokens: u64,
    prompt_tokens: u64,
    completion_tokens: u64,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_request(&mut self) {
        self.requests += 1;
    }

    pub(crate) fn update_usage(&mut self, usage: &Usage) {
        self.total_tokens += u64::from(usage.total_tokens);
        self.prompt_tokens += u64::from(usage.prompt_tokens);
        self.completion_tokens += u64::from(usage.completion_tokens);
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn prompt_tokens(&self) -> u64 {
        self.prompt_tokens
    }

    pub fn completion_tokens(&self) -> u64 {
        self.completion_tokens
    }
}
