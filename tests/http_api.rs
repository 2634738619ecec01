mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{spawn_app, FAILURE_TRIGGER, PANIC_TRIGGER};

#[tokio::test]
async fn health_reports_name_and_version() {
    let app = spawn_app(&[]).await;

    let (status, body) = app.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"status": "healthy", "app": "Support Test", "version": "9.9.9"})
    );
}

#[tokio::test]
async fn root_lists_endpoints() {
    let app = spawn_app(&[]).await;

    let (status, body) = app.get("/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["app"], "Support Test");
    assert_eq!(body["health"], "/health");
    assert_eq!(body["endpoints"]["chat"], "POST /api/v1/chat");
    assert_eq!(body["endpoints"]["webhook"], "POST /webhook/message");
    assert_eq!(body["endpoints"]["ticket"], "POST /api/v1/ticket");
    assert_eq!(body["knowledge_base"]["backend"], "local");
    assert_eq!(body["knowledge_base"]["vectors"], 0);

    let (status, document) = app
        .post(
            "/api/v1/documents",
            json!({"filename": "faq.md", "content": "Refunds are issued within five business days."}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = app.get("/").await;
    assert_eq!(body["knowledge_base"]["vectors"], document["chunk_count"]);
}

#[tokio::test]
async fn chat_is_audited_and_remembered() {
    let app = spawn_app(&[]).await;

    let (status, reply) = app
        .post(
            "/api/v1/chat",
            json!({"session_id": "web-1", "user_id": "u-7", "message": "How do I reset my password?"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["session_id"], "web-1");
    assert_eq!(reply["intent"], "question");
    assert_eq!(reply["token_count"], 50);
    assert!(reply["ticket_number"].is_null());

    let (status, page) = app.get("/api/v1/audit?session_id=web-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    let row = &page["items"][0];
    assert_eq!(row["message_type"], "chat");
    assert_eq!(row["user_id"], "u-7");
    assert_eq!(row["user_message"], "How do I reset my password?");
    assert!(row["error_message"].is_null());

    let audit_id = reply["audit_id"].as_str().expect("audit id");
    let (status, single) = app.get(&format!("/api/v1/audit/{}", audit_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(single["id"], audit_id);

    let (status, history) = app.get("/api/v1/chat/web-1/history").await;
    assert_eq!(status, StatusCode::OK);
    let messages = history["messages"].as_array().expect("messages");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[1]["role"], "assistant");

    let (status, cleared) = app.delete("/api/v1/chat/web-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["deleted"], 2);
    let (_, history) = app.get("/api/v1/chat/web-1/history").await;
    assert_eq!(history["messages"], json!([]));
}

#[tokio::test]
async fn complaint_opens_a_ticket() {
    let app = spawn_app(&[]).await;

    let (status, reply) = app
        .post(
            "/api/v1/chat",
            json!({"session_id": "web-2", "message": "This is unacceptable, my order arrived broken"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["intent"], "complaint");
    assert_eq!(reply["action"], "create_ticket");

    let number = reply["ticket_number"].as_str().expect("ticket number");
    let (status, ticket) = app.get(&format!("/api/v1/ticket/{}", number)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ticket["priority"], "high");
    assert_eq!(ticket["category"], "complaint");
    assert_eq!(ticket["session_id"], "web-2");
}

#[tokio::test]
async fn blank_chat_message_is_rejected() {
    let app = spawn_app(&[]).await;

    let (status, body) = app.post("/api/v1/chat", json!({"message": "  "})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap_or_default().contains("empty"));
}

#[tokio::test]
async fn webhook_requires_configured_key() {
    let app = spawn_app(&[("N8N_API_KEY", "s3cret")]).await;
    let payload = json!({"session_id": "n8n-1", "message": "Where is my order?"});

    let (status, _) = app.post("/webhook/message", payload.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request("POST", "/webhook/message", Some(payload.clone()), &[("x-api-key", "wrong")])
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, reply) = app
        .request("POST", "/webhook/message", Some(payload), &[("X-API-Key", "s3cret")])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["intent"], "order_status");

    let (_, page) = app.get("/api/v1/audit?message_type=webhook").await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["session_id"], "n8n-1");
}

#[tokio::test]
async fn webhook_is_open_without_key() {
    let app = spawn_app(&[]).await;

    let (status, _) = app
        .post("/webhook/message", json!({"message": "hello"}))
        .await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn internal_errors_hide_detail_unless_debug() {
    let app = spawn_app(&[("DEBUG", "false")]).await;
    let message = format!("please {}", FAILURE_TRIGGER);

    let (status, body) = app
        .post("/api/v1/chat", json!({"session_id": "e-1", "message": message}))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({"error": "Internal server error", "detail": "An unexpected error occurred"})
    );

    let (_, page) = app.get("/api/v1/audit?session_id=e-1").await;
    assert_eq!(page["total"], 1);
    assert!(page["items"][0]["error_message"]
        .as_str()
        .unwrap_or_default()
        .contains("stub model failure"));

    let debug_app = spawn_app(&[("DEBUG", "true")]).await;
    let (status, body) = debug_app
        .post("/api/v1/chat", json!({"message": format!("please {}", FAILURE_TRIGGER)}))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal server error");
    assert_eq!(body["detail"], "stub model failure");
}

#[tokio::test]
async fn panics_become_internal_errors() {
    let app = spawn_app(&[]).await;
    let (status, body) = app
        .post("/api/v1/chat", json!({"message": PANIC_TRIGGER}))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["detail"], "An unexpected error occurred");

    let (_, page) = app.get("/api/v1/audit").await;
    assert_eq!(page["total"], 1);
    assert!(page["items"][0]["error_message"]
        .as_str()
        .unwrap_or_default()
        .contains("stub model exploded"));

    let debug_app = spawn_app(&[("DEBUG", "1")]).await;
    let (status, body) = debug_app
        .post("/api/v1/chat", json!({"message": PANIC_TRIGGER}))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["detail"], "stub model exploded");
}

#[tokio::test]
async fn ticket_lifecycle() {
    let app = spawn_app(&[]).await;

    let (status, created) = app
        .post(
            "/api/v1/ticket",
            json!({"title": "Refund not received", "priority": "urgent", "customer_email": "ada@example.com"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "open");
    assert_eq!(created["priority"], "urgent");
    assert!(created["resolved_at"].is_null());
    let number = created["ticket_number"].as_str().expect("number").to_string();
    assert!(number.starts_with("TKT-"));

    let (status, assigned) = app
        .patch(
            &format!("/api/v1/ticket/{}", number),
            json!({"assigned_to": "agent-3"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(assigned["status"], "assigned");

    let (status, resolved) = app
        .patch(
            &format!("/api/v1/ticket/{}", number),
            json!({"status": "resolved"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resolved["status"], "resolved");
    assert!(resolved["resolved_at"].is_string());

    let (status, reopened) = app
        .patch(
            &format!("/api/v1/ticket/{}", number),
            json!({"status": "in_progress"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(reopened["resolved_at"].is_null());

    let (status, list) = app.get("/api/v1/ticket?status=in_progress").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["count"], 1);
    assert_eq!(list["tickets"][0]["ticket_number"], number.as_str());
}

#[tokio::test]
async fn ticket_validation_errors() {
    let app = spawn_app(&[]).await;

    let (status, _) = app.post("/api/v1/ticket", json!({"title": "   "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post("/api/v1/ticket", json!({"title": "x".repeat(501)}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post("/api/v1/ticket", json!({"title": "ok", "priority": "critical"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap_or_default().contains("priority"));

    let (status, created) = app.post("/api/v1/ticket", json!({"title": "ok"})).await;
    assert_eq!(status, StatusCode::CREATED);
    let number = created["ticket_number"].as_str().expect("number");

    let (status, _) = app
        .patch(&format!("/api/v1/ticket/{}", number), json!({"status": "done"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .patch(&format!("/api/v1/ticket/{}", number), json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.get("/api/v1/ticket/TKT-19990101-NOPE00").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn audit_filters_and_stats() {
    let app = spawn_app(&[]).await;
    app.post("/api/v1/chat", json!({"session_id": "a", "message": "Hello"}))
        .await;
    app.post("/api/v1/chat", json!({"session_id": "b", "message": "Where is my package?"}))
        .await;

    let (status, page) = app.get("/api/v1/audit?intent=order_status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["session_id"], "b");

    let (status, _) = app.get("/api/v1/audit?intent=shopping").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.get("/api/v1/audit?since=yesterday").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, stats) = app.get("/api/v1/audit/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_interactions"], 2);
    assert_eq!(stats["errors"], 0);
    assert_eq!(stats["total_tokens"], 100);
    assert_eq!(stats["by_intent"]["greeting"], 1);

    let (status, _) = app.get("/api/v1/audit/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn documents_are_ingested_and_retrievable() {
    let app = spawn_app(&[]).await;

    let (status, document) = app
        .post(
            "/api/v1/documents",
            json!({
                "filename": "returns.md",
                "content": "Returns are accepted within thirty days of delivery. \
                            Refunds are issued to the original payment method within five business days. \
                            Items must be unused and in their original packaging."
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(document["status"], "processed");
    assert!(document["chunk_count"].as_i64().unwrap_or(0) >= 2);

    let id = document["id"].as_str().expect("id");
    let (status, fetched) = app.get(&format!("/api/v1/documents/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["filename"], "returns.md");

    let (status, list) = app.get("/api/v1/documents").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["documents"].as_array().map(Vec::len), Some(1));

    let (status, reply) = app
        .post("/api/v1/chat", json!({"message": "How long do refunds take?"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["sources"][0]["source"], "returns.md");

    let (status, _) = app
        .post("/api/v1/documents", json!({"filename": "empty.md", "content": ""}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.get("/api/v1/documents/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn minio_storage_is_reported_unavailable() {
    let app = spawn_app(&[("STORAGE_TYPE", "minio")]).await;

    let (status, _) = app
        .post("/api/v1/documents", json!({"filename": "a.md", "content": "text"}))
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn malformed_requests_use_the_error_body() {
    let app = spawn_app(&[]).await;

    let (status, body) = app.post_raw("/api/v1/chat", "{\"message\": ").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));

    let (status, body) = app.post("/api/v1/chat", json!({"session_id": "s"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap_or_default()
        .contains("message"));

    let (status, body) = app.get("/api/v1/ticket?limit=many").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (_, page) = app.get("/api/v1/audit").await;
    assert_eq!(page["total"], 0);
}
