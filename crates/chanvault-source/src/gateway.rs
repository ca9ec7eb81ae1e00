//! HTTP gateway client.
//!
//! Talks to a source-side bridge that owns the actual messaging-protocol
//! session. The bridge signals rate limiting with HTTP 429 + `Retry-After`
//! and a missing/expired session with 401; both are mapped to the
//! distinguished [`SourceError`] variants the pipeline reacts to.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::types::{ChannelInfo, SourceMessage};
use crate::{AuthOutcome, ByteStream, MessageSource, SourceError};

const DEFAULT_COOLDOWN_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 10;
const READ_TIMEOUT_SECS: u64 = 120;

pub struct GatewaySource {
    http_client: Client,
    base_url: String,
    token: Option<String>,
}

impl GatewaySource {
    pub fn new(base_url: String, token: Option<String>) -> Result<Self, SourceError> {
        // No overall request timeout: attachment downloads can legitimately
        // run for a long time. Stalls are caught by the read timeout.
        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .read_timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .build()
            .map_err(|e| SourceError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Map a non-success response to the source error taxonomy.
    fn error_for(response: &Response) -> SourceError {
        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                let cooldown = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(DEFAULT_COOLDOWN_SECS);
                SourceError::RateLimited {
                    cooldown: Duration::from_secs(cooldown),
                }
            }
            StatusCode::UNAUTHORIZED => SourceError::AuthRequired,
            StatusCode::FORBIDDEN => {
                SourceError::ChannelUnavailable("access forbidden".to_string())
            }
            StatusCode::NOT_FOUND => SourceError::NotFound("resource not found".to_string()),
            status => SourceError::Transport(format!("gateway returned {}", status)),
        }
    }

    async fn check(response: Response) -> Result<Response, SourceError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let error = Self::error_for(&response);
            tracing::warn!(
                status = %response.status(),
                url = %response.url(),
                error = %error,
                "Gateway request failed"
            );
            Err(error)
        }
    }
}

#[derive(Deserialize)]
struct AuthResponse {
    status: String,
    session: Option<String>,
}

impl AuthResponse {
    fn into_outcome(self) -> Result<AuthOutcome, SourceError> {
        match self.status.as_str() {
            "ok" => {
                let encoded = self
                    .session
                    .ok_or_else(|| SourceError::Transport("missing session blob".to_string()))?;
                let payload = BASE64
                    .decode(encoded)
                    .map_err(|e| SourceError::Transport(format!("bad session blob: {}", e)))?;
                Ok(AuthOutcome::Session(payload))
            }
            "password_required" => Ok(AuthOutcome::PasswordNeeded),
            "invalid_code" => Err(SourceError::InvalidCode),
            other => Err(SourceError::Transport(format!(
                "unexpected auth status: {}",
                other
            ))),
        }
    }
}

#[async_trait]
impl MessageSource for GatewaySource {
    async fn restore_session(&self, payload: &[u8]) -> Result<(), SourceError> {
        let response = self
            .request(self.http_client.post(self.url("/auth/restore")))
            .json(&json!({ "session": BASE64.encode(payload) }))
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        Self::check(response).await.map(|_| ())
    }

    async fn request_login_code(&self, phone: &str) -> Result<(), SourceError> {
        let response = self
            .request(self.http_client.post(self.url("/auth/code/request")))
            .json(&json!({ "phone": phone }))
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        Self::check(response).await.map(|_| ())
    }

    async fn submit_code(&self, code: &str) -> Result<AuthOutcome, SourceError> {
        let response = self
            .request(self.http_client.post(self.url("/auth/code/verify")))
            .json(&json!({ "code": code }))
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let body: AuthResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        body.into_outcome()
    }

    async fn submit_password(&self, password: &str) -> Result<Vec<u8>, SourceError> {
        let response = self
            .request(self.http_client.post(self.url("/auth/password")))
            .json(&json!({ "password": password }))
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let body: AuthResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        match body.into_outcome()? {
            AuthOutcome::Session(payload) => Ok(payload),
            AuthOutcome::PasswordNeeded => {
                Err(SourceError::Transport("password rejected".to_string()))
            }
        }
    }

    async fn resolve_channel(&self, identifier: &str) -> Result<ChannelInfo, SourceError> {
        let response = self
            .request(self.http_client.get(self.url("/channels/resolve")))
            .query(&[("identifier", identifier)])
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))
    }

    async fn list_messages(
        &self,
        channel_id: i64,
        after_position: i64,
        limit: usize,
    ) -> Result<Vec<SourceMessage>, SourceError> {
        let response = self
            .request(
                self.http_client
                    .get(self.url(&format!("/channels/{}/messages", channel_id))),
            )
            .query(&[
                ("after_id", after_position.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))
    }

    async fn download(&self, channel_id: i64, message_id: i64) -> Result<ByteStream, SourceError> {
        let response = self
            .request(self.http_client.get(self.url(&format!(
                "/channels/{}/messages/{}/attachment",
                channel_id, message_id
            ))))
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let response = Self::check(response).await?;

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| SourceError::Transport(e.to_string())));

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_loses_its_trailing_slash() {
        let gateway = GatewaySource::new("http://bridge:8080/".to_string(), None).unwrap();
        assert_eq!(gateway.url("/auth/restore"), "http://bridge:8080/auth/restore");
    }
}
