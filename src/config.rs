use std::env;
use std::time::Duration;

use avatar_chat_types::streams::VoiceProvider;
use secrecy::SecretString;

use crate::consts;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Settings of the avatar streaming service.
#[derive(Debug)]
pub struct AvatarConfig {
    base_url: String,
    api_key: SecretString,
    source_url: String,
    size: u32,
    voice: VoiceProvider,
    driver_url: String,
    stitch: bool,
}

impl AvatarConfig {
    /// `api_key` is sent verbatim as the Basic credential.
    pub fn new(api_key: &str) -> Self {
        Self {
            base_url: consts::DEFAULT_AVATAR_BASE_URL.to_string(),
            api_key: SecretString::from(api_key.to_string()),
            source_url: consts::DEFAULT_SOURCE_URL.to_string(),
            size: consts::DEFAULT_AVATAR_SIZE,
            voice: VoiceProvider {
                kind: consts::DEFAULT_VOICE_PROVIDER.to_string(),
                voice_id: consts::DEFAULT_VOICE_ID.to_string(),
            },
            driver_url: consts::DEFAULT_DRIVER_URL.to_string(),
            stitch: true,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_source_url(mut self, source_url: &str) -> Self {
        self.source_url = source_url.to_string();
        self
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    pub fn with_voice(mut self, provider: &str, voice_id: &str) -> Self {
        self.voice = VoiceProvider {
            kind: provider.to_string(),
            voice_id: voice_id.to_string(),
        };
        self
    }

    pub fn with_driver_url(mut self, driver_url: &str) -> Self {
        self.driver_url = driver_url.to_string();
        self
    }

    pub fn with_stitch(mut self, stitch: bool) -> Self {
        self.stitch = stitch;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn voice(&self) -> &VoiceProvider {
        &self.voice
    }

    pub fn driver_url(&self) -> &str {
        &self.driver_url
    }

    pub fn stitch(&self) -> bool {
        self.stitch
    }
}

/// Settings of the chat-completion service.
#[derive(Debug)]
pub struct ChatConfig {
    base_url: String,
    api_key: SecretString,
    model: String,
    temperature: f32,
}

impl ChatConfig {
    pub fn new(api_key: &str) -> Self {
        Self {
            base_url: consts::DEFAULT_CHAT_BASE_URL.to_string(),
            api_key: SecretString::from(api_key.to_string()),
            model: consts::DEFAULT_MODEL.to_string(),
            temperature: consts::DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }
}

/// Settings of the conversation itself.
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// Sent as the system message in front of every transcript.
    pub persona: String,
    /// Delay between the avatar track muting and the idle video coming back.
    pub idle_delay: Duration,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            persona: consts::DEFAULT_PERSONA.to_string(),
            idle_delay: Duration::from_millis(consts::IDLE_DELAY_MS),
        }
    }
}

/// Holds all configuration loaded at startup.
#[derive(Debug)]
pub struct Config {
    avatar: AvatarConfig,
    chat: ChatConfig,
    conversation: ConversationConfig,
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new(avatar_api_key: &str, chat_api_key: &str) -> Self {
        Self {
            config: Config {
                avatar: AvatarConfig::new(avatar_api_key),
                chat: ChatConfig::new(chat_api_key),
                conversation: ConversationConfig::default(),
            },
        }
    }

    pub fn with_avatar(mut self, avatar: AvatarConfig) -> Self {
        self.config.avatar = avatar;
        self
    }

    pub fn with_chat(mut self, chat: ChatConfig) -> Self {
        self.config.chat = chat;
        self
    }

    pub fn with_persona(mut self, persona: &str) -> Self {
        self.config.conversation.persona = persona.to_string();
        self
    }

    pub fn with_idle_delay(mut self, idle_delay: Duration) -> Self {
        self.config.conversation.idle_delay = idle_delay;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Config {
    pub fn builder(avatar_api_key: &str, chat_api_key: &str) -> ConfigBuilder {
        ConfigBuilder::new(avatar_api_key, chat_api_key)
    }

    /// Loads configuration from environment variables.
    ///
    /// A `.env` file in the current directory is loaded first if present.
    ///
    /// *   `DID_API_KEY`: Basic credential of the avatar service. Required.
    /// *   `OPENAI_API_KEY`: Bearer credential of the chat service. Required.
    /// *   `DID_BASE_URL`, `OPENAI_BASE_URL`: (Optional) service roots.
    /// *   `CHAT_MODEL`: (Optional) Defaults to "gpt-3.5-turbo".
    /// *   `CHAT_TEMPERATURE`: (Optional) Defaults to 1.2.
    /// *   `AVATAR_SOURCE_URL`, `AVATAR_SIZE`, `AVATAR_VOICE_PROVIDER`, `AVATAR_VOICE_ID`,
    ///     `AVATAR_DRIVER_URL`: (Optional) how the avatar looks and sounds.
    /// *   `AVATAR_PERSONA`: (Optional) system prompt put in front of the transcript.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
        };

        let mut avatar = AvatarConfig::new(&required(consts::DID_API_KEY)?);
        let mut chat = ChatConfig::new(&required(consts::OPENAI_API_KEY)?);
        let mut conversation = ConversationConfig::default();

        if let Some(base_url) = lookup(consts::DID_BASE_URL) {
            avatar = avatar.with_base_url(&base_url);
        }
        if let Some(source_url) = lookup(consts::AVATAR_SOURCE_URL) {
            avatar = avatar.with_source_url(&source_url);
        }
        if let Some(size) = lookup(consts::AVATAR_SIZE) {
            let size = size
                .parse::<u32>()
                .map_err(|e| ConfigError::InvalidValue(consts::AVATAR_SIZE.to_string(), e.to_string()))?;
            avatar = avatar.with_size(size);
        }
        let provider =
            lookup(consts::AVATAR_VOICE_PROVIDER).unwrap_or_else(|| consts::DEFAULT_VOICE_PROVIDER.to_string());
        let voice_id = lookup(consts::AVATAR_VOICE_ID).unwrap_or_else(|| consts::DEFAULT_VOICE_ID.to_string());
        avatar = avatar.with_voice(&provider, &voice_id);
        if let Some(driver_url) = lookup(consts::AVATAR_DRIVER_URL) {
            avatar = avatar.with_driver_url(&driver_url);
        }

        if let Some(base_url) = lookup(consts::OPENAI_BASE_URL) {
            chat = chat.with_base_url(&base_url);
        }
        if let Some(model) = lookup(consts::CHAT_MODEL) {
            chat = chat.with_model(&model);
        }
        if let Some(temperature) = lookup(consts::CHAT_TEMPERATURE) {
            let temperature = temperature.parse::<f32>().map_err(|e| {
                ConfigError::InvalidValue(consts::CHAT_TEMPERATURE.to_string(), e.to_string())
            })?;
            chat = chat.with_temperature(temperature);
        }

        if let Some(persona) = lookup(consts::AVATAR_PERSONA) {
            conversation.persona = persona;
        }

        Ok(Self {
            avatar,
            chat,
            conversation,
        })
    }

    pub fn avatar(&self) -> &AvatarConfig {
        &self.avatar
    }

    pub fn chat(&self) -> &ChatConfig {
        &self.chat
    }

    pub fn conversation(&self) -> &ConversationConfig {
        &self.conversation
    }

    pub fn into_parts(self) -> (AvatarConfig, ChatConfig, ConversationConfig) {
        (self.avatar, self.chat, self.conversation)
    }
}
