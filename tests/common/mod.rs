#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use support_backend::core::config::Settings;
use support_backend::core::errors::ApiError;
use support_backend::db::Database;
use support_backend::llm::{ChatCompletion, ChatRequest, LlmProvider, TokenUsage};
use support_backend::rag::LocalVectorStore;
use support_backend::server;
use support_backend::state::AppState;
use support_backend::types::MessageRole;

pub const FAILURE_TRIGGER: &str = "trigger failure";
pub const PANIC_TRIGGER: &str = "trigger panic";

/// Offline model: classification requests fail so the keyword rules decide,
/// generation echoes a canned answer, embeddings are word hashes.
pub struct StubLlm;

fn last_user_message(request: &ChatRequest) -> &str {
    request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::User)
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn name(&self) -> &str {
        "stub"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatCompletion, ApiError> {
        let message = last_user_message(&request).to_string();
        if message.contains(PANIC_TRIGGER) {
            panic!("stub model exploded");
        }
        if request.json_mode {
            return Err(ApiError::ServiceUnavailable("classifier offline".to_string()));
        }
        if message.contains(FAILURE_TRIGGER) {
            return Err(ApiError::Internal("stub model failure".to_string()));
        }

        Ok(ChatCompletion {
            content: "Thanks for reaching out, here is what I found.".to_string(),
            usage: TokenUsage {
                prompt_tokens: 40,
                completion_tokens: 10,
                total_tokens: 50,
            },
        })
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        Ok(inputs.iter().map(|input| hash_embedding(input)).collect())
    }
}

fn hash_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; 16];
    for word in text.split_whitespace() {
        let bucket = word
            .to_lowercase()
            .bytes()
            .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
        vector[bucket % 16] += 1.0;
    }
    vector
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    _dir: TempDir,
}

pub async fn spawn_app(overrides: &[(&str, &str)]) -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    let chroma_dir = dir.path().join("chroma").to_string_lossy().into_owned();
    let upload_dir = dir.path().join("uploads").to_string_lossy().into_owned();

    let mut vars: HashMap<String, String> = HashMap::from([
        ("APP_NAME".to_string(), "Support Test".to_string()),
        ("APP_VERSION".to_string(), "9.9.9".to_string()),
        ("N8N_WEBHOOK_URL".to_string(), String::new()),
        ("CHROMA_PERSIST_DIR".to_string(), chroma_dir),
        ("LOCAL_STORAGE_PATH".to_string(), upload_dir),
        ("RAG_SIMILARITY_THRESHOLD".to_string(), "0.0".to_string()),
        ("CHUNK_SIZE".to_string(), "120".to_string()),
        ("CHUNK_OVERLAP".to_string(), "20".to_string()),
    ]);
    for (key, value) in overrides {
        vars.insert(key.to_string(), value.to_string());
    }

    let settings = Settings::from_lookup(|key| vars.get(key).cloned()).expect("settings");
    let db = Database::in_memory().await.expect("db");
    let store = LocalVectorStore::new(&settings.chroma_persist_dir)
        .await
        .expect("vector store");

    let state = AppState::from_parts(Arc::new(settings), db, Arc::new(StubLlm), Arc::new(store))
        .expect("state");
    let router = server::router(state.clone());

    TestApp {
        router,
        state,
        _dir: dir,
    }
}

impl TestApp {
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        self.send(request).await
    }

    /// POSTs `raw` verbatim as a JSON body.
    pub async fn post_raw(&self, uri: &str, raw: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(raw.to_string()))
            .expect("request");
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request("GET", uri, None, &[]).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, Some(body), &[]).await
    }

    pub async fn patch(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request("PATCH", uri, Some(body), &[]).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.request("DELETE", uri, None, &[]).await
    }
}
