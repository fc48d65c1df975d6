//! Client of the avatar `/talks/streams` API: session signaling and speech requests.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder, Response};

use avatar_chat_types::streams::{
    CreateStreamRequest, CreateStreamResponse, DeleteStreamRequest, IceCandidateRequest, SdpAnswerRequest,
    TalkRequest,
};
use avatar_chat_types::{IceCandidate, SessionDescription, StreamIds, TalkResponse};

use crate::config::AvatarConfig;
use crate::error::{Error, Result};

mod utils;

const SERVICE: &str = "avatar service";

/// The remote side of an avatar session. [`crate::AvatarSession`] only talks to the
/// service through this trait so it can be exercised without network access.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StreamsApi: Send + Sync {
    /// Opens a new stream. The answer carries the SDP offer and ICE servers.
    async fn create_stream(&self) -> Result<CreateStreamResponse>;

    async fn submit_answer(&self, ids: &StreamIds, answer: &SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, ids: &StreamIds, candidate: &IceCandidate) -> Result<()>;

    /// Asks the avatar to speak `text`. Any HTTP status is returned as is.
    async fn talk(&self, ids: &StreamIds, text: &str) -> Result<TalkResponse>;

    async fn delete_stream(&self, ids: &StreamIds) -> Result<()>;
}

pub struct StreamsClient {
    http: reqwest::Client,
    config: AvatarConfig,
}

impl StreamsClient {
    pub fn new(config: AvatarConfig) -> Self {
        Self::with_http_client(reqwest::Client::new(), config)
    }

    pub fn with_http_client(http: reqwest::Client, config: AvatarConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &AvatarConfig {
        &self.config
    }

    fn request(&self, method: Method, stream_id: Option<&str>, suffix: Option<&str>) -> Result<RequestBuilder> {
        let url = utils::stream_url(self.config.base_url(), stream_id, suffix);
        let authorization = utils::basic_authorization(self.config.api_key())?;
        Ok(self.http.request(method, url).header(AUTHORIZATION, authorization))
    }
}

fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(Error::Status {
            service: SERVICE,
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl StreamsApi for StreamsClient {
    async fn create_stream(&self) -> Result<CreateStreamResponse> {
        let body = CreateStreamRequest {
            size: self.config.size(),
            source_url: self.config.source_url().to_string(),
        };
        let response = self.request(Method::POST, None, None)?.json(&body).send().await?;
        let created = ensure_success(response)?.json::<CreateStreamResponse>().await?;
        tracing::info!("created stream id={}, ice_servers={}", created.id, created.ice_servers.len());
        Ok(created)
    }

    async fn submit_answer(&self, ids: &StreamIds, answer: &SessionDescription) -> Result<()> {
        let body = SdpAnswerRequest {
            answer: answer.clone(),
            session_id: ids.session_id.clone(),
        };
        let response = self
            .request(Method::POST, Some(&ids.stream_id), Some("sdp"))?
            .json(&body)
            .send()
            .await?;
        ensure_success(response)?;
        tracing::debug!("submitted sdp answer for stream {}", ids.stream_id);
        Ok(())
    }

    async fn add_ice_candidate(&self, ids: &StreamIds, candidate: &IceCandidate) -> Result<()> {
        let body = IceCandidateRequest {
            candidate: candidate.clone(),
            session_id: ids.session_id.clone(),
        };
        let response = self
            .request(Method::POST, Some(&ids.stream_id), Some("ice"))?
            .json(&body)
            .send()
            .await?;
        ensure_success(response)?;
        Ok(())
    }

    async fn talk(&self, ids: &StreamIds, text: &str) -> Result<TalkResponse> {
        let body = TalkRequest::text(
            text,
            self.config.voice().clone(),
            self.config.driver_url(),
            self.config.stitch(),
            &ids.session_id,
        );
        let response = self
            .request(Method::POST, Some(&ids.stream_id), None)?
            .json(&body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        tracing::debug!("talk request answered with status {}", status);
        Ok(TalkResponse { status, body })
    }

    async fn delete_stream(&self, ids: &StreamIds) -> Result<()> {
        let body = DeleteStreamRequest {
            session_id: ids.session_id.clone(),
        };
        let response = self
            .request(Method::DELETE, Some(&ids.stream_id), None)?
            .json(&body)
            .send()
            .await?;
        ensure_success(response)?;
        tracing::info!("deleted stream {}", ids.stream_id);
        Ok(())
    }
}
