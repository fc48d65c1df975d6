pub const DID_API_KEY: &str = "DID_API_KEY";
pub const DID_BASE_URL: &str = "DID_BASE_URL";
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
pub const CHAT_MODEL: &str = "CHAT_MODEL";
pub const CHAT_TEMPERATURE: &str = "CHAT_TEMPERATURE";
pub const AVATAR_SOURCE_URL: &str = "AVATAR_SOURCE_URL";
pub const AVATAR_SIZE: &str = "AVATAR_SIZE";
pub const AVATAR_VOICE_PROVIDER: &str = "AVATAR_VOICE_PROVIDER";
pub const AVATAR_VOICE_ID: &str = "AVATAR_VOICE_ID";
pub const AVATAR_DRIVER_URL: &str = "AVATAR_DRIVER_URL";
pub const AVATAR_PERSONA: &str = "AVATAR_PERSONA";

pub const DEFAULT_AVATAR_BASE_URL: &str = "https://api.d-id.com";
pub const DEFAULT_CHAT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TEMPERATURE: f32 = 1.2;
pub const DEFAULT_SOURCE_URL: &str =
    "https://i.ibb.co/L0KMV1Y/Leonardo-Diffusion-an-cyberpunk-hacker-cartoon-style-looking-i-0.jpg";
pub const DEFAULT_AVATAR_SIZE: u32 = 400;
pub const DEFAULT_VOICE_PROVIDER: &str = "microsoft";
pub const DEFAULT_VOICE_ID: &str = "en-US-TonyNeural";
pub const DEFAULT_DRIVER_URL: &str = "bank://lively/";
pub const DEFAULT_PERSONA: &str = "You are not an AI. You are Johnny, a friendly front-end developer who has \
worked on web applications for nine years. Stay in this role and chat with me casually, in short replies.";

/// How long a muted avatar track must stay muted before the idle video is shown again.
pub const IDLE_DELAY_MS: u64 = 1000;

pub const STREAMS_PATH: &str = "/talks/streams";
pub const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";
