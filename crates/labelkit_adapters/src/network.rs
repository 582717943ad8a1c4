//! Shared HTTP client configuration and response handling for the LabelKit API.
//!
//! Every request goes through one client carrying the deployment API key;
//! bearer tokens are attached per call.

use std::time::Duration;

use labelkit_core::config::ApiSettings;
use labelkit_core::Error;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

pub const API_KEY_HEADER: &str = "X-API-Key";

pub const USER_AGENT: &str = concat!("labelkit/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client used for every API call.
///
/// This client is configured with:
/// - `X-API-Key` default header (omitted when no key is configured)
/// - `labelkit/<version>` user agent
/// - Request and connect timeouts from settings
pub fn build_api_client(settings: &ApiSettings) -> Result<Client, Error> {
    let mut headers = HeaderMap::new();
    if settings.api_key.is_empty() {
        warn!("no API key configured, requests may be rejected");
    } else {
        let mut value = HeaderValue::from_str(&settings.api_key)
            .map_err(|_| Error::Validation("API key contains invalid characters".to_string()))?;
        value.set_sensitive(true);
        headers.insert(API_KEY_HEADER, value);
    }

    Client::builder()
        .default_headers(headers)
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(settings.timeout_secs))
        .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
        .build()
        .map_err(|e| Error::Network(format!("failed to create API HTTP client: {}", e)))
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

pub(crate) fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Network("request timed out".to_string())
    } else if e.is_connect() {
        Error::Network("could not connect to server".to_string())
    } else {
        Error::Network(format!("request failed: {}", e))
    }
}

/// Pass 2xx responses through; turn anything else into a categorized error.
pub(crate) async fn ensure_success(response: Response, fallback: &str) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body, fallback))
}

pub(crate) async fn read_json<T: DeserializeOwned>(
    response: Response,
    fallback: &str,
) -> Result<T, Error> {
    let response = ensure_success(response, fallback).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| Error::InvalidServerResponse(format!("{}: {}", fallback, e)))
}

pub(crate) fn status_error(status: StatusCode, body: &str, fallback: &str) -> Error {
    let message = server_message(body).unwrap_or_else(|| fallback.to_string());

    match status.as_u16() {
        401 => Error::Authentication(message),
        402 | 403 => Error::Authorization(message),
        400 | 409 | 422 => Error::Validation(message),
        code => Error::Network(format!("{} (HTTP {})", message, code)),
    }
}

/// Extract the human-readable message from an error body.
///
/// Looks at `detail`, then `message`, then `error`. Validation error arrays
/// (`[{"loc": [...], "msg": "..."}]`) are joined with `"; "`.
fn server_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;

    ["detail", "message", "error"]
        .iter()
        .find_map(|field| match value.get(field)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Array(items) => {
                let messages: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(Value::as_str))
                    .collect();
                (!messages.is_empty()).then(|| messages.join("; "))
            }
            _ => None,
        })
}
