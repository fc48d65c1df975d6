use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A non-2xx answer from one of the remote services.
    #[error("{service} responded with status {status}")]
    Status { service: &'static str, status: u16 },

    /// Setting up the peer connection failed.
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error("transport closed before the session became ready")]
    TransportClosed,

    #[error("invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;
