//! HTTP transport for the sync endpoints.
//!
//! Everything above this layer talks through [`SyncApi`], so pull and
//! push logic can be exercised against scripted responses in tests.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SyncConfig;
use crate::error::Result;
use crate::sync::wire::{PullPage, PushMutation, PushResponse};

/// Outcome of one sync HTTP call.
///
/// Transport failures and non-2xx statuses other than 403 both fold
/// into `Error`; the caller treats them identically (leave local state
/// untouched, retry on the next sync). 403 is the one status with its
/// own local side effect (access revocation) so it keeps a variant.
#[derive(Debug, Clone)]
pub enum ApiResponse<T> {
    Success(T),
    /// HTTP 403: the server revoked this client's access
    Forbidden,
    Error(String),
}

#[allow(async_fn_in_trait)]
pub trait SyncApi {
    /// Fetch one page of changes for a baby, strictly after `since`.
    async fn pull_page(&self, baby_id: i64, since: i64, limit: u32) -> ApiResponse<PullPage>;

    /// Submit a batch of queued mutations.
    async fn push_batch(&self, mutations: &[PushMutation]) -> ApiResponse<PushResponse>;
}

/// [`SyncApi`] backed by reqwest against the configured base URL.
#[derive(Clone)]
pub struct HttpSyncApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSyncApi {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url.clone(),
            client: reqwest::Client::builder().build()?,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PushRequest<'a> {
    mutations: &'a [PushMutation],
}

impl SyncApi for HttpSyncApi {
    async fn pull_page(&self, baby_id: i64, since: i64, limit: u32) -> ApiResponse<PullPage> {
        let url = format!(
            "{}/api/sync/pull?babyId={baby_id}&since={since}&limit={limit}",
            self.base_url
        );
        debug!("Pulling changes for baby {baby_id} since cursor {since}");

        let response = match self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => return ApiResponse::Error(error.to_string()),
        };

        decode_response(response).await
    }

    async fn push_batch(&self, mutations: &[PushMutation]) -> ApiResponse<PushResponse> {
        let url = format!("{}/api/sync/push", self.base_url);
        debug!("Pushing {} queued mutations", mutations.len());

        let response = match self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .json(&PushRequest { mutations })
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => return ApiResponse::Error(error.to_string()),
        };

        decode_response(response).await
    }
}

async fn decode_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> ApiResponse<T> {
    let status = response.status();
    if status == StatusCode::FORBIDDEN {
        return ApiResponse::Forbidden;
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return ApiResponse::Error(parse_api_error(status, &body));
    }

    match response.json::<T>().await {
        Ok(payload) => ApiResponse::Success(payload),
        Err(error) => ApiResponse::Error(error.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_api_error_prefers_message_field() {
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        let parsed = parse_api_error(status, r#"{"message": "cursor out of range"}"#);
        assert_eq!(parsed, "cursor out of range (500)");
    }

    #[test]
    fn parse_api_error_falls_back_to_body_then_status() {
        let status = StatusCode::BAD_GATEWAY;
        assert_eq!(parse_api_error(status, "upstream down"), "upstream down (502)");
        assert_eq!(parse_api_error(status, "  "), "HTTP 502");
    }
}
