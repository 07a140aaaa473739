//! HTTP client for the provider's transactional send API.

use std::time::Duration;

use reqwest::Client;
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use secrecy::Secret;
use serde::Deserialize;
use serde::Serialize;

/// Provider faults, classified by status code. Only `RateLimited` is ever
/// retried by the dispatcher; 5xx is deliberately terminal (see the pinned
/// test in `tests/dispatch/individual.rs`).
#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("provider rejected credentials")]
    Auth,

    #[error("provider rejected request: {0}")]
    BadRequest(String),

    #[error("provider rate limit reached")]
    RateLimited,

    #[error("provider server error: status {0}")]
    Server(u16),

    #[error("unexpected provider response: status {0}")]
    UnexpectedStatus(u16),

    /// Network failure, or a success status with an unreadable body.
    #[error("provider request failed")]
    Unexpected(#[from] reqwest::Error),
}

impl ProviderError {
    pub fn is_rate_limited(&self) -> bool { matches!(self, Self::RateLimited) }
}

/// One outbound message in the provider's wire shape; used both for single
/// sends and as a batch element.
#[derive(Serialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,

    /// Provider-side delivery-time scheduling directive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<String>,

    /// Campaign correlation token, for provider-side analytics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    pub track_opens: bool,

    /// Suppresses real delivery; the provider tags the message as test.
    pub test_mode: bool,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct SendResponse {
    // the provider spells it "MessageID", not "MessageId"
    #[serde(rename = "MessageID")]
    message_id: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct BatchResponse {
    accepted: Option<u64>,
}

/// Connection setup is expensive; one `EmailClient` (whose inner
/// `reqwest::Client` pools connections) is cloned across all dispatch
/// workers. Constructed from `ProviderSettings::client`, never held as
/// process-wide state, so tests and per-campaign credential overrides can
/// substitute their own.
#[derive(Clone)]
pub struct EmailClient {
    http_client: Client,
    base_url: String,
    authorization_token: Secret<String>,
    timeout: Duration,
}

impl EmailClient {
    pub fn new(
        base_url: String,
        authorization_token: Secret<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client: Client::new(),
            base_url,
            authorization_token,
            timeout,
        }
    }

    /// Send one message; returns the provider's message identifier when the
    /// response carries one.
    #[tracing::instrument(skip_all, fields(to = %email.to))]
    pub async fn send_email(
        &self,
        email: &OutboundEmail,
    ) -> Result<Option<String>, ProviderError> {
        let response = self.post("email", email).await?;
        let parsed: SendResponse = response.json().await?;
        Ok(parsed.message_id)
    }

    /// Submit a chunk of messages as a single provider call; returns the
    /// provider's accepted count (falling back to the chunk size when the
    /// provider does not report one).
    #[tracing::instrument(skip_all, fields(chunk_size = emails.len()))]
    pub async fn send_batch(
        &self,
        emails: &[OutboundEmail],
    ) -> Result<u64, ProviderError> {
        let response = self.post("email/batch", &emails).await?;
        let parsed: BatchResponse = response.json().await?;
        Ok(parsed.accepted.unwrap_or(emails.len() as u64))
    }

    async fn post<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .http_client
            .post(format!("{}/{path}", self.base_url))
            .bearer_auth(self.authorization_token.expose_secret())
            .timeout(self.timeout)
            .json(body)
            .send()
            .await?;
        classify(response).await
    }
}

/// Map provider status codes onto the error taxonomy; 2xx passes through.
async fn classify(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(match status {
        StatusCode::UNAUTHORIZED => ProviderError::Auth,
        StatusCode::BAD_REQUEST => {
            let detail = response.text().await.unwrap_or_default();
            ProviderError::BadRequest(detail)
        }
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
        s if s.is_server_error() => ProviderError::Server(s.as_u16()),
        s => ProviderError::UnexpectedStatus(s.as_u16()),
    })
}
