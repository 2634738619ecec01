use std::any::Any;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::core::errors::{
    internal_error_response, panic_message, InternalErrorDetail, GENERIC_ERROR,
};
use crate::state::AppState;

/// Global catch-all for failed requests.
///
/// Every 500 produced by an [`ApiError::Internal`](crate::core::errors::ApiError)
/// or a caught panic carries an [`InternalErrorDetail`]. This layer logs it
/// as `unhandled_exception` and, in debug mode only, replaces the generic
/// detail in the body with the raw error text.
pub async fn unhandled_errors(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;
    let Some(detail) = response.extensions().get::<InternalErrorDetail>().cloned() else {
        return response;
    };

    tracing::error!(
        error = %detail.0,
        path = %path,
        method = %method,
        "unhandled_exception"
    );

    if !state.settings.debug {
        return response;
    }

    let mut debug_response = (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": GENERIC_ERROR,
            "detail": detail.0,
        })),
    )
        .into_response();
    debug_response.extensions_mut().insert(detail);
    debug_response
}

/// Turns a handler panic into the standard 500 response.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    internal_error_response(panic_message(&*panic))
}
