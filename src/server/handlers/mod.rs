pub mod audit;
pub mod chat;
pub mod documents;
pub mod health;
pub mod tickets;

use std::str::FromStr;

use axum::extract::{FromRequest, FromRequestParts};

use crate::core::errors::ApiError;

/// `Json` whose rejections use the standard `{"error": ...}` body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `Query` whose rejections use the standard `{"error": ...}` body.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

pub(crate) const MAX_FIELD_CHARS: usize = 255;

/// Parses an optional enum label from a request, answering 400 on unknown values.
pub(crate) fn parse_label_param<T>(field: &str, value: Option<&str>) -> Result<Option<T>, ApiError>
where
    T: FromStr<Err = String>,
{
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|err| ApiError::BadRequest(format!("invalid {}: {}", field, err))),
    }
}

pub(crate) fn check_len(field: &str, value: Option<&str>, max: usize) -> Result<(), ApiError> {
    if value.is_some_and(|v| v.chars().count() > max) {
        return Err(ApiError::BadRequest(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(())
}
