//! Stub CIRIS backend for integration tests.
//!
//! One Axum server plays both the manager and the agent. Behavior is chosen
//! per test and every route counts its hits.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};

use ciris_console::auth::Navigator;

#[derive(Clone)]
pub enum ManagerMode {
    Agents(Value),
    Absent,
}

#[derive(Clone)]
pub enum IdentityMode {
    Known { agent_id: String, name: String },
    Unauthorized,
    Absent,
}

#[derive(Default)]
pub struct Hits {
    pub manager: AtomicUsize,
    pub identity: AtomicUsize,
    pub providers: AtomicUsize,
    pub templates: AtomicUsize,
    pub validate: AtomicUsize,
    pub complete: AtomicUsize,
    pub login: AtomicUsize,
    pub status: AtomicUsize,
}

impl Hits {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub struct Stub {
    pub manager: ManagerMode,
    pub identity: IdentityMode,
    pub validate_delay: Duration,
    pub complete_delay: Duration,
    pub fail_complete: AtomicBool,
    pub hits: Hits,
    pub last_complete_body: Mutex<Option<Value>>,
}

impl Stub {
    pub fn new(manager: ManagerMode, identity: IdentityMode) -> Self {
        Self {
            manager,
            identity,
            validate_delay: Duration::ZERO,
            complete_delay: Duration::ZERO,
            fail_complete: AtomicBool::new(false),
            hits: Hits::default(),
            last_complete_body: Mutex::new(None),
        }
    }

    pub fn with_validate_delay(mut self, delay: Duration) -> Self {
        self.validate_delay = delay;
        self
    }

    pub fn with_complete_delay(mut self, delay: Duration) -> Self {
        self.complete_delay = delay;
        self
    }
}

pub fn datum_and_sage() -> Value {
    json!({
        "agents": [
            {
                "agent_id": "datum",
                "agent_name": "Datum",
                "status": "running",
                "health": "healthy",
                "api_endpoint": "http://datum:8080",
                "api_port": 8080,
                "container_name": "ciris-datum",
                "created_at": "2025-01-01T00:00:00Z"
            },
            {
                "agent_id": "sage",
                "agent_name": "Sage",
                "status": "running",
                "health": "degraded",
                "api_port": "8081",
                "container_name": "ciris-sage",
                "created_at": "2025-01-02T00:00:00Z"
            }
        ]
    })
}

fn envelope(data: Value) -> Json {
    axum::Json(json!({
        "data": data,
        "metadata": {
            "timestamp": "2025-01-01T00:00:00Z",
            "request_id": "test",
            "duration_ms": 1.0
        }
    }))
}

type Json = axum::Json<Value>;

async fn manager_agents(State(stub): State<Arc<Stub>>) -> Response {
    stub.hits.manager.fetch_add(1, Ordering::SeqCst);
    match &stub.manager {
        ManagerMode::Agents(agents) => axum::Json(agents.clone()).into_response(),
        ManagerMode::Absent => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn agent_identity(State(stub): State<Arc<Stub>>) -> Response {
    stub.hits.identity.fetch_add(1, Ordering::SeqCst);
    match &stub.identity {
        IdentityMode::Known { agent_id, name } => {
            envelope(json!({ "agent_id": agent_id, "name": name, "purpose": "test" }))
                .into_response()
        }
        IdentityMode::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            axum::Json(json!({ "detail": "Not authenticated" })),
        )
            .into_response(),
        IdentityMode::Absent => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn setup_status(State(stub): State<Arc<Stub>>) -> Json {
    stub.hits.status.fetch_add(1, Ordering::SeqCst);
    envelope(json!({
        "is_first_run": true,
        "config_exists": false,
        "config_path": null,
        "setup_required": true
    }))
}

async fn setup_providers(State(stub): State<Arc<Stub>>) -> Json {
    stub.hits.providers.fetch_add(1, Ordering::SeqCst);
    envelope(json!([
        {
            "id": "openai",
            "name": "OpenAI",
            "description": "GPT models",
            "requires_api_key": true,
            "requires_base_url": false,
            "requires_model": true,
            "default_base_url": null,
            "default_model": "gpt-4o",
            "examples": ["gpt-4o"]
        },
        {
            "id": "local",
            "name": "Local",
            "description": "Ollama and friends",
            "requires_api_key": false,
            "requires_base_url": true,
            "requires_model": true,
            "default_base_url": "http://localhost:11434",
            "default_model": "llama3",
            "examples": []
        }
    ]))
}

async fn setup_templates(State(stub): State<Arc<Stub>>) -> Json {
    stub.hits.templates.fetch_add(1, Ordering::SeqCst);
    envelope(json!([
        {
            "id": "general",
            "name": "General",
            "description": "General assistant",
            "identity": "I help",
            "example_use_cases": [],
            "supported_sops": [],
            "stewardship_tier": 2,
            "creator_id": "ciris",
            "signature": "sig"
        },
        {
            "id": "rogue",
            "name": "Rogue",
            "description": "Invalid tier",
            "identity": "",
            "stewardship_tier": 7
        }
    ]))
}

async fn validate_llm(State(stub): State<Arc<Stub>>, axum::Json(body): Json) -> Json {
    stub.hits.validate.fetch_add(1, Ordering::SeqCst);
    if !stub.validate_delay.is_zero() {
        tokio::time::sleep(stub.validate_delay).await;
    }
    let key = body.get("api_key").and_then(Value::as_str).unwrap_or_default();
    if key.starts_with("sk-") {
        envelope(json!({ "valid": true, "message": "Connection successful" }))
    } else {
        envelope(json!({ "valid": false, "message": "", "error": "Invalid API key" }))
    }
}

async fn setup_complete(State(stub): State<Arc<Stub>>, axum::Json(body): Json) -> Response {
    stub.hits.complete.fetch_add(1, Ordering::SeqCst);
    if !stub.complete_delay.is_zero() {
        tokio::time::sleep(stub.complete_delay).await;
    }
    if stub.fail_complete.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(json!({ "detail": "Config write failed" })),
        )
            .into_response();
    }

    let username = body
        .get("admin_username")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    *stub.last_complete_body.lock().unwrap() = Some(body);
    envelope(json!({
        "status": "completed",
        "message": "Setup completed successfully",
        "config_path": "/tmp/ciris/.env",
        "username": username,
        "next_steps": "Log in"
    }))
    .into_response()
}

async fn login(State(stub): State<Arc<Stub>>, axum::Json(body): Json) -> Response {
    stub.hits.login.fetch_add(1, Ordering::SeqCst);
    let ok = body.get("username").and_then(Value::as_str) == Some("admin")
        && body.get("password").and_then(Value::as_str) == Some("ciris_admin_password");
    if ok {
        axum::Json(json!({
            "access_token": "tok-123",
            "token_type": "bearer",
            "expires_in": 3600,
            "role": "SYSTEM_ADMIN",
            "user_id": "wa-system-admin"
        }))
        .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            axum::Json(json!({ "detail": "Invalid username or password" })),
        )
            .into_response()
    }
}

fn is_bind_permission_error<E: std::fmt::Display>(err: &E) -> bool {
    err.to_string().contains("Operation not permitted")
        || err.to_string().contains("failed to bind")
}

/// Start the stub on a random port. `None` when the sandbox forbids binding.
pub async fn start_stub(stub: Arc<Stub>) -> Option<SocketAddr> {
    let app = Router::new()
        .route("/manager/v1/agents", get(manager_agents))
        .route("/v1/agent/identity", get(agent_identity))
        .route("/v1/setup/status", get(setup_status))
        .route("/v1/setup/providers", get(setup_providers))
        .route("/v1/setup/templates", get(setup_templates))
        .route("/v1/setup/validate-llm", post(validate_llm))
        .route("/v1/setup/complete", post(setup_complete))
        .route("/v1/auth/login", post(login))
        .with_state(stub);

    let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(e) if is_bind_permission_error(&e) => return None,
        Err(e) => panic!("Failed to bind stub backend: {e}"),
    };
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Some(addr)
}

/// An address with nothing listening on it.
pub async fn closed_addr() -> Option<SocketAddr> {
    let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(e) if is_bind_permission_error(&e) => return None,
        Err(e) => panic!("Failed to bind: {e}"),
    };
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Some(addr)
}

/// An address that accepts connections but never answers.
pub async fn silent_addr() -> Option<SocketAddr> {
    let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(e) if is_bind_permission_error(&e) => return None,
        Err(e) => panic!("Failed to bind: {e}"),
    };
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    Some(addr)
}

/// Navigator that records addresses instead of opening them.
#[derive(Default)]
pub struct RecordingNavigator {
    pub urls: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn visited(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, url: &str) -> Result<(), String> {
        self.urls.lock().unwrap().push(url.to_string());
        Ok(())
    }
}
