//! Shared HTTP client and request header construction.

use std::sync::OnceLock;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::error::StreamError;

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
///
/// No client-level timeout is set; stream deadlines are owned by the driver.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    })
}

/// JSON content type plus caller headers, plus an optional bearer token.
pub fn request_headers(
    extra: &[(String, String)],
    bearer_token: Option<&str>,
) -> Result<HeaderMap, StreamError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for (name, value) in extra {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| StreamError::InvalidArgument(format!("header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| StreamError::InvalidArgument(format!("header value for {name}: {e}")))?;
        headers.insert(name, value);
    }
    if let Some(token) = bearer_token.filter(|t| !t.is_empty()) {
        if let Ok(val) = HeaderValue::from_str(&format!("Bearer {token}")) {
            headers.insert(AUTHORIZATION, val);
        }
    }
    Ok(headers)
}

/// Turn a non-success response into an error carrying its status.
pub fn status_to_error(status: u16, body: &str) -> StreamError {
    let message = extract_detail(body).unwrap_or_else(|| {
        if body.is_empty() {
            format!("request failed with status {status}")
        } else {
            body.to_string()
        }
    });
    StreamError::http(status, message)
}

// FastAPI-style bodies carry the reason under `detail`.
fn extract_detail(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
}
