use std::sync::Arc;
use std::time::Duration;

use axum::response::IntoResponse;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;

use aether_engine::RunOrchestrator;
use aether_store::Database;
use aether_telemetry::TelemetryGuard;

use crate::handlers;
use crate::seed;
use crate::sse;

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 4005,
            request_timeout_secs: 300,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub orchestrator: Arc<RunOrchestrator>,
    pub telemetry: Option<Arc<TelemetryGuard>>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let api = Router::new()
        .route(
            "/api/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route("/api/users/{id}", patch(handlers::update_user))
        .route(
            "/api/rooms",
            get(handlers::list_rooms).post(handlers::create_room),
        )
        .route("/api/rooms/{id}", patch(handlers::update_room))
        .route("/api/rooms/{id}/messages", get(handlers::room_messages))
        .route("/api/run/start", post(handlers::start_run))
        .route("/api/run/stop", post(handlers::stop_run))
        .route("/api/run/continue", post(handlers::continue_run))
        .route("/api/runs/{room_id}/latest", get(handlers::latest_run))
        .route(
            "/api/prompts",
            get(handlers::list_prompts).post(handlers::create_prompt),
        )
        .route(
            "/api/triggers",
            get(handlers::list_triggers).post(handlers::create_trigger),
        )
        .route("/api/triggers/{id}", delete(handlers::delete_trigger))
        .route("/api/logs", get(handlers::list_logs))
        .layer(TimeoutLayer::new(request_timeout));

    // The stream route stays outside the timeout layer; subscriptions
    // are long-lived.
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/run/{id}/stream", get(sse::stream_run))
        .merge(api)
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle to shut it down.
pub async fn start(
    config: ServerConfig,
    db: Database,
    orchestrator: Arc<RunOrchestrator>,
) -> Result<ServerHandle, std::io::Error> {
    start_inner(config, db, orchestrator, None).await
}

/// Like [`start`], but wires the telemetry guard into the handlers so
/// persisted logs are queryable over the API.
pub async fn start_with_telemetry(
    config: ServerConfig,
    db: Database,
    orchestrator: Arc<RunOrchestrator>,
    telemetry: Arc<TelemetryGuard>,
) -> Result<ServerHandle, std::io::Error> {
    start_inner(config, db, orchestrator, Some(telemetry)).await
}

async fn start_inner(
    config: ServerConfig,
    db: Database,
    orchestrator: Arc<RunOrchestrator>,
    telemetry: Option<Arc<TelemetryGuard>>,
) -> Result<ServerHandle, std::io::Error> {
    match seed::seed_if_empty(&db) {
        Ok(true) => tracing::info!("seeded demo fixtures into empty database"),
        Ok(false) => {}
        Err(e) => tracing::warn!(error = %e, "seeding failed; continuing with existing data"),
    }

    let state = AppState {
        db,
        orchestrator,
        telemetry,
    };

    let router = build_router(state, Duration::from_secs(config.request_timeout_secs));
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "Aether server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
    })
}

/// Handle returned by `start()`; keeps the accept loop alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
}

/// Health check HTTP endpoint.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_llm::chunking::ChunkDelay;
    use aether_llm::mock::MockProvider;

    async fn start_test_server(provider: Arc<MockProvider>) -> (ServerHandle, Database) {
        let db = Database::in_memory().unwrap();
        let orchestrator = Arc::new(
            RunOrchestrator::new(provider, db.clone())
                .with_channel_capacity(16 * 1024)
                .with_channel_grace(Duration::from_millis(200)),
        );
        let config = ServerConfig {
            port: 0, // Random port
            ..Default::default()
        };
        let handle = start(config, db.clone(), orchestrator).await.unwrap();
        (handle, db)
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let (handle, _db) = start_test_server(Arc::new(MockProvider::instant())).await;
        assert!(handle.port > 0);

        let url = format!("http://127.0.0.1:{}/health", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn empty_database_is_seeded_on_start() {
        let (handle, _db) = start_test_server(Arc::new(MockProvider::instant())).await;

        let url = format!("http://127.0.0.1:{}/api/users", handle.port);
        let users: serde_json::Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
        assert_eq!(users.as_array().unwrap().len(), 4);

        let url = format!("http://127.0.0.1:{}/api/rooms", handle.port);
        let rooms: serde_json::Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
        assert_eq!(rooms.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn missing_name_returns_message_payload() {
        let (handle, _db) = start_test_server(Arc::new(MockProvider::instant())).await;

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("http://127.0.0.1:{}/api/users", handle.port))
            .json(&serde_json::json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["message"], "Name is required");
    }

    #[tokio::test]
    async fn run_start_and_stream_round_trip() {
        // Paced chunks keep the run in flight long enough for the
        // stream subscriber to connect after the start call returns.
        let provider = Arc::new(MockProvider::with_pacing(ChunkDelay::Fixed(
            Duration::from_millis(5),
        )));
        let (handle, _db) = start_test_server(provider).await;
        let base = format!("http://127.0.0.1:{}", handle.port);

        let rooms: serde_json::Value = reqwest::get(format!("{base}/api/rooms"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let users: serde_json::Value = reqwest::get(format!("{base}/api/users"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let room_id = rooms[0]["id"].as_str().unwrap();
        let user_id = users[0]["id"].as_str().unwrap();

        let client = reqwest::Client::new();
        let started: serde_json::Value = client
            .post(format!("{base}/api/run/start"))
            .json(&serde_json::json!({
                "room_id": room_id,
                "user_id": user_id,
                "message": "What is X?",
                "config": {
                    "rounds": 1,
                    "always_latest": true,
                    "citations_required": false,
                    "enabled_agents": ["coordinator", "researcher", "summarizer"],
                },
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let run_id = started["run_id"].as_str().unwrap();

        // The body completes once the stream closes after the terminal
        // event (or, for a missed run, once the channel is removed).
        let body = client
            .get(format!("{base}/api/run/{run_id}/stream"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("event: run_done"), "stream tail: {body}");
        assert!(body.contains("event: round_summary"), "stream tail: {body}");

        let latest: serde_json::Value = reqwest::get(format!("{base}/api/runs/{room_id}/latest"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(latest["id"].as_str().unwrap(), run_id);
        assert_eq!(latest["status"], "done");
    }

    #[test]
    fn build_router_creates_routes() {
        let db = Database::in_memory().unwrap();
        let orchestrator = Arc::new(RunOrchestrator::new(
            Arc::new(MockProvider::instant()),
            db.clone(),
        ));
        let state = AppState {
            db,
            orchestrator,
            telemetry: None,
        };

        let _router = build_router(state, Duration::from_secs(300));
        // If this doesn't panic, the router was built successfully
    }
}
