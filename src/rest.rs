// Shared plumbing for the Google REST clients.

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{Result, SourceError};
use crate::version::USER_AGENT;

/// HTTP client for the warehouse and monitoring paths. No request timeout is set:
/// a slow query holds the scrape for its full duration.
pub fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().user_agent(USER_AGENT).build()?)
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Decode a JSON body, mapping non-success statuses to `SourceError::Api` with the
/// API's own error message when it sent one.
pub async fn decode_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or(body);
        return Err(SourceError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(serde_json::from_str(&body)?)
}

/// Join a base URL and a path without doubling the slash.
pub fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Treat `""` page tokens as the last page.
pub fn next_page(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.is_empty())
}
