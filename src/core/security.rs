use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

use crate::core::errors::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Shared secret expected on inbound webhook calls.
///
/// An unset key leaves the webhook open, matching deployments where the
/// workflow engine sits on a private network.
#[derive(Debug, Clone, Default)]
pub struct WebhookKey {
    value: Option<String>,
}

impl WebhookKey {
    pub fn new(value: Option<String>) -> Self {
        Self {
            value: value.filter(|key| !key.trim().is_empty()),
        }
    }
}

pub fn require_api_key(headers: &HeaderMap, expected: &WebhookKey) -> Result<(), ApiError> {
    let Some(expected) = expected.value.as_deref() else {
        return Ok(());
    };

    let header_value = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if header_value.is_empty() {
        return Err(ApiError::Unauthorized);
    }

    if !bool::from(header_value.as_bytes().ct_eq(expected.as_bytes())) {
        return Err(ApiError::Unauthorized);
    }

    Ok(())
}
