//! Request and response bodies of the avatar `/talks/streams` API.

use crate::rtc::{IceCandidate, IceServer, SessionDescription};

/// Identifiers of one remote stream session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamIds {
    pub stream_id: String,
    pub session_id: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CreateStreamRequest {
    pub size: u32,
    pub source_url: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CreateStreamResponse {
    pub id: String,
    pub offer: SessionDescription,
    #[serde(default)]
    pub ice_servers: Vec<IceServer>,
    pub session_id: String,
}

impl CreateStreamResponse {
    pub fn ids(&self) -> StreamIds {
        StreamIds {
            stream_id: self.id.clone(),
            session_id: self.session_id.clone(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SdpAnswerRequest {
    pub answer: SessionDescription,
    pub session_id: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IceCandidateRequest {
    #[serde(flatten)]
    pub candidate: IceCandidate,
    pub session_id: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DeleteStreamRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct VoiceProvider {
    /// Speech synthesis vendor, ex: "microsoft"
    #[serde(rename = "type")]
    pub kind: String,
    pub voice_id: String,
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ScriptType {
    Text,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Script {
    #[serde(rename = "type")]
    pub kind: ScriptType,
    pub input: String,
    pub provider: VoiceProvider,
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct TalkConfig {
    pub stitch: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TalkRequest {
    pub script: Script,
    pub driver_url: String,
    pub config: TalkConfig,
    pub session_id: String,
}

impl TalkRequest {
    pub fn text(input: &str, provider: VoiceProvider, driver_url: &str, stitch: bool, session_id: &str) -> Self {
        Self {
            script: Script {
                kind: ScriptType::Text,
                input: input.to_string(),
                provider,
            },
            driver_url: driver_url.to_string(),
            config: TalkConfig { stitch },
            session_id: session_id.to_string(),
        }
    }
}

/// The raw answer to a speak request. Callers look at the status and parse the body.
#[derive(Debug, Clone, PartialEq)]
pub struct TalkResponse {
    pub status: u16,
    pub body: String,
}

impl TalkResponse {
    pub fn new(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Playback length in seconds. Missing, zero or non-numeric values count as absent.
    pub fn duration(&self) -> Option<f64> {
        let json: serde_json::Value = serde_json::from_str(&self.body).ok()?;
        json.get("duration")
            .and_then(|v| v.as_f64())
            .filter(|d| *d > 0.0)
    }
}
