use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::security::API_KEY_HEADER;
use crate::server::handlers::{audit, chat, documents, health, tickets};
use crate::server::middleware::{panic_response, unhandled_errors};
use crate::state::AppState;

/// Creates the main application router with all routes and middleware.
///
/// This function sets up:
/// - Health and root endpoints
/// - Chat, webhook, audit, ticket and document APIs
/// - The global error handler and panic catcher
/// - CORS and request tracing
///
/// # Arguments
///
/// * `state` - Shared application state
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state.settings.cors_allowed_origins);
    Router::new()
        .route("/health", get(health::health))
        .route("/", get(health::root))
        .route("/api/v1/chat", post(chat::chat))
        .route(
            "/api/v1/chat/:session_id/history",
            get(chat::get_history),
        )
        .route(
            "/api/v1/chat/:session_id",
            delete(chat::clear_history),
        )
        .route("/webhook/message", post(chat::webhook_message))
        .route("/api/v1/audit", get(audit::list_audit_logs))
        .route("/api/v1/audit/stats", get(audit::audit_stats))
        .route("/api/v1/audit/:id", get(audit::get_audit_log))
        .route(
            "/api/v1/ticket",
            get(tickets::list_tickets).post(tickets::create_ticket),
        )
        .route(
            "/api/v1/ticket/:ticket_number",
            get(tickets::get_ticket).patch(tickets::update_ticket),
        )
        .route(
            "/api/v1/documents",
            get(documents::list_documents).post(documents::upload_document),
        )
        .route("/api/v1/documents/:id", get(documents::get_document))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(from_fn_with_state(state.clone(), unhandled_errors))
        .with_state(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin.trim() == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin.trim()).ok())
                .collect::<Vec<_>>(),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ACCEPT,
            header::CONTENT_TYPE,
            HeaderName::from_static(API_KEY_HEADER),
        ])
}
