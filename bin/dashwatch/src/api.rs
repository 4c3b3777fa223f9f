use std::time::Instant;

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use dashwatch_core::RevolverState;
use dashwatch_scheduler::{RevolverAction, SchedulerHandle};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct ApiState {
    pub scheduler: SchedulerHandle,
    pub started: Instant,
}

/// Error body returned by every failing endpoint.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<dashwatch_core::Error> for ApiError {
    fn from(e: dashwatch_core::Error) -> Self {
        let status = match e {
            dashwatch_core::Error::Other(_) => StatusCode::SERVICE_UNAVAILABLE,
            dashwatch_core::Error::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    version: String,
    uptime_secs: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunningResponse {
    is_running: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MuteResponse {
    tab_id: String,
    is_muted: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntervalRequest {
    interval_ms: u64,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/v1/health", get(handle_health))
        .route("/v1/state", get(handle_state))
        .route("/v1/toggle", post(handle_toggle))
        .route("/v1/reset", post(handle_reset))
        .route("/v1/alerts/clear", post(handle_clear_alerts))
        .route("/v1/tabs/:id/mute", post(handle_mute))
        .route("/v1/poll", post(handle_poll))
        .route("/v1/revolver", get(handle_revolver_status))
        .route("/v1/revolver/interval", put(handle_revolver_interval))
        .route("/v1/revolver/:action", post(handle_revolver_action))
        .layer(CorsLayer::permissive().allow_credentials(false))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_health(State(state): State<ApiState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started.elapsed().as_secs(),
    })
}

async fn handle_state(State(state): State<ApiState>) -> ApiResult<dashwatch_core::ExtensionState> {
    Ok(Json(state.scheduler.state().await?))
}

async fn handle_toggle(State(state): State<ApiState>) -> ApiResult<RunningResponse> {
    let is_running = state.scheduler.toggle_running().await?;
    Ok(Json(RunningResponse { is_running }))
}

async fn handle_reset(State(state): State<ApiState>) -> ApiResult<serde_json::Value> {
    state.scheduler.reset().await?;
    Ok(Json(json!({ "ok": true })))
}

async fn handle_clear_alerts(State(state): State<ApiState>) -> ApiResult<serde_json::Value> {
    state.scheduler.clear_alerts().await?;
    Ok(Json(json!({ "ok": true })))
}

async fn handle_mute(
    State(state): State<ApiState>,
    AxumPath(tab_id): AxumPath<String>,
) -> ApiResult<MuteResponse> {
    let is_muted = state.scheduler.toggle_mute(tab_id.clone()).await?;
    Ok(Json(MuteResponse { tab_id, is_muted }))
}

async fn handle_poll(State(state): State<ApiState>) -> ApiResult<dashwatch_scheduler::CycleSummary> {
    Ok(Json(state.scheduler.poll_now().await?))
}

async fn handle_revolver_status(State(state): State<ApiState>) -> ApiResult<RevolverState> {
    Ok(Json(state.scheduler.revolver(RevolverAction::Status).await?))
}

async fn handle_revolver_action(
    State(state): State<ApiState>,
    AxumPath(action): AxumPath<String>,
) -> ApiResult<RevolverState> {
    let action = match action.as_str() {
        "toggle" => RevolverAction::Toggle,
        "start" => RevolverAction::Start,
        "stop" => RevolverAction::Stop,
        other => return Err(ApiError::not_found(format!("Unknown revolver action: {}", other))),
    };
    Ok(Json(state.scheduler.revolver(action).await?))
}

async fn handle_revolver_interval(
    State(state): State<ApiState>,
    Json(req): Json<IntervalRequest>,
) -> ApiResult<RevolverState> {
    let action = RevolverAction::SetInterval(req.interval_ms);
    Ok(Json(state.scheduler.revolver(action).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use dashwatch_agent::{LogSink, Monitor, TabHost};
    use dashwatch_core::{Config, ExtensionState, Result, TabInfo};
    use dashwatch_extract::{ExtractOptions, PageContent};
    use dashwatch_scheduler::{command_channel, PollScheduler};
    use dashwatch_storage::JsonStateStore;
    use serde_json::Value;
    use tokio::sync::broadcast;
    use tower::ServiceExt;

    struct EmptyHost;

    #[async_trait]
    impl TabHost for EmptyHost {
        async fn list_tabs(&self) -> Result<Vec<TabInfo>> {
            Ok(Vec::new())
        }

        async fn read_page(&self, tab: &TabInfo) -> Result<PageContent> {
            Err(dashwatch_core::Error::NotFound(tab.id.clone()))
        }

        async fn activate(&self, _tab_id: &str) -> Result<()> {
            Ok(())
        }
    }

    struct Harness {
        state: ApiState,
        shutdown: broadcast::Sender<()>,
        _dir: tempfile::TempDir,
    }

    fn start() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStateStore::new(dir.path().join("state.json"));
        let monitor = Monitor::new(ExtensionState::fresh(0), &Config::default());
        let scheduler = PollScheduler::new(
            monitor,
            Arc::new(EmptyHost),
            Arc::new(LogSink),
            Arc::new(storage),
            ExtractOptions::default(),
            Duration::from_secs(3600),
        );
        let (handle, commands) = command_channel(8);
        let (shutdown, rx) = broadcast::channel(1);
        tokio::spawn(scheduler.run_loop(commands, rx));
        Harness {
            state: ApiState {
                scheduler: handle,
                started: Instant::now(),
            },
            shutdown,
            _dir: dir,
        }
    }

    async fn call(state: &ApiState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = router(state.clone())
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let h = start();
        let (status, body) = call(&h.state, "GET", "/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        let _ = h.shutdown.send(());
    }

    #[tokio::test]
    async fn test_toggle_and_state() {
        let h = start();
        let (status, body) = call(&h.state, "POST", "/v1/toggle", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isRunning"], false);

        let (_, state) = call(&h.state, "GET", "/v1/state", None).await;
        assert_eq!(state["isRunning"], false);
        let _ = h.shutdown.send(());
    }

    #[tokio::test]
    async fn test_mute_round_trip() {
        let h = start();
        let (_, body) = call(&h.state, "POST", "/v1/tabs/42/mute", None).await;
        assert_eq!(body["tabId"], "42");
        assert_eq!(body["isMuted"], true);
        let (_, body) = call(&h.state, "POST", "/v1/tabs/42/mute", None).await;
        assert_eq!(body["isMuted"], false);
        let _ = h.shutdown.send(());
    }

    #[tokio::test]
    async fn test_poll_reports_summary() {
        let h = start();
        let (status, body) = call(&h.state, "POST", "/v1/poll", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ran"], true);
        assert_eq!(body["tabsChecked"], 0);
        let _ = h.shutdown.send(());
    }

    #[tokio::test]
    async fn test_revolver_endpoints() {
        let h = start();
        let (_, body) = call(&h.state, "POST", "/v1/revolver/start", None).await;
        assert_eq!(body["enabled"], true);

        let (_, body) = call(
            &h.state,
            "PUT",
            "/v1/revolver/interval",
            Some(serde_json::json!({ "intervalMs": 120000 })),
        )
        .await;
        assert_eq!(body["intervalMs"], 60000);

        let (_, body) = call(&h.state, "GET", "/v1/revolver", None).await;
        assert_eq!(body["enabled"], true);

        let (status, _) = call(&h.state, "POST", "/v1/revolver/spin", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let _ = h.shutdown.send(());
    }

    #[tokio::test]
    async fn test_stopped_scheduler_is_unavailable() {
        let h = start();
        let _ = h.shutdown.send(());
        tokio::time::sleep(Duration::from_millis(50)).await;
        let (status, body) = call(&h.state, "GET", "/v1/state", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("scheduler"));
    }
}
