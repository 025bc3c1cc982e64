use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::supervisor::{Supervisor, SupervisorError};

/// IPC 요청 타입
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub config: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StopQuery {
    /// Wait for the stop to complete instead of replying immediately.
    #[serde(default)]
    pub wait: bool,
}

/// IPC Server State
#[derive(Clone)]
pub struct IPCServer {
    pub supervisor: Arc<Supervisor>,
    pub listen_addr: String,
}

impl IPCServer {
    pub fn new(supervisor: Arc<Supervisor>, listen_addr: &str) -> Self {
        Self {
            supervisor,
            listen_addr: listen_addr.to_string(),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/start", post(start_handler))
            .route("/api/stop", post(stop_handler))
            .route("/api/logs", get(logs_handler))
            .route("/api/status", get(status_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    /// Serve until `shutdown` resolves.
    pub async fn start<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();

        // TCP 리스너
        let listener = tokio::net::TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("IPC listening on http://{}", self.listen_addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

/// POST /api/start - frpc 시작
async fn start_handler(
    State(state): State<IPCServer>,
    Json(payload): Json<StartRequest>,
) -> Result<impl IntoResponse, SupervisorError> {
    // 빈 설정은 supervisor 호출 전에 거부
    if payload.config.trim().is_empty() {
        return Err(SupervisorError::InvalidConfig("Config is empty".to_string()));
    }

    let outcome = state.supervisor.start(&payload.config).await?;
    Ok(Json(json!({
        "success": true,
        "result": outcome.as_str(),
    })))
}

/// POST /api/stop?wait=true - frpc 중지
///
/// Without `wait` the stop runs in the background and the reply is
/// `"stopping"` right away.
async fn stop_handler(
    State(state): State<IPCServer>,
    Query(query): Query<StopQuery>,
) -> Result<impl IntoResponse, SupervisorError> {
    if query.wait {
        let outcome = state.supervisor.stop().await?;
        return Ok(Json(json!({
            "success": true,
            "result": "stopped",
            "outcome": outcome,
        })));
    }

    let supervisor = state.supervisor.clone();
    tokio::spawn(async move {
        if let Err(e) = supervisor.stop().await {
            tracing::error!("Background stop failed: {}", e);
        }
    });
    Ok(Json(json!({
        "success": true,
        "result": "stopping",
    })))
}

/// GET /api/logs - 버퍼에 쌓인 로그를 가져오고 비움
async fn logs_handler(State(state): State<IPCServer>) -> impl IntoResponse {
    Json(json!({
        "success": true,
        "logs": state.supervisor.drain_logs(),
    }))
}

/// GET /api/status - 현재 상태 조회
async fn status_handler(State(state): State<IPCServer>) -> impl IntoResponse {
    Json(state.supervisor.status())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn server(tmp: &tempfile::TempDir) -> IPCServer {
        let settings = Settings {
            binary_path: tmp.path().join("missing-frpc"),
            data_dir: tmp.path().to_path_buf(),
            ..Settings::default()
        };
        IPCServer::new(Arc::new(Supervisor::new(settings)), "127.0.0.1:0")
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 1024 * 64).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn blank_config_is_invalid_config() {
        let tmp = tempfile::TempDir::new().unwrap();
        let app = server(&tmp).router();

        let req = Request::builder()
            .method("POST")
            .uri("/api/start")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "config": "  " }).to_string()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["error_code"], "invalid_config");
        assert!(!tmp.path().join("frpc.toml").exists());
    }

    #[tokio::test]
    async fn missing_config_field_is_invalid_config() {
        let tmp = tempfile::TempDir::new().unwrap();
        let app = server(&tmp).router();

        let req = Request::builder()
            .method("POST")
            .uri("/api/start")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let tmp = tempfile::TempDir::new().unwrap();
        let app = server(&tmp).router();

        let req = Request::builder()
            .method("POST")
            .uri("/api/start")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "config": "serverPort = 7000" }).to_string()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(resp).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error_code"], "spawn_failed");
    }

    #[tokio::test]
    async fn stop_replies_stopping_immediately() {
        let tmp = tempfile::TempDir::new().unwrap();
        let app = server(&tmp).router();

        let req = Request::builder()
            .method("POST")
            .uri("/api/stop")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["result"], "stopping");
    }

    #[tokio::test]
    async fn stop_with_wait_reports_outcome() {
        let tmp = tempfile::TempDir::new().unwrap();
        let app = server(&tmp).router();

        let req = Request::builder()
            .method("POST")
            .uri("/api/stop?wait=true")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        let json = body_json(resp).await;
        assert_eq!(json["result"], "stopped");
        assert_eq!(json["outcome"]["kind"], "not_running");
    }

    #[tokio::test]
    async fn logs_and_status_on_idle_supervisor() {
        let tmp = tempfile::TempDir::new().unwrap();
        let app = server(&tmp).router();

        let req = Request::builder().uri("/api/logs").body(Body::empty()).unwrap();
        let json = body_json(app.clone().oneshot(req).await.unwrap()).await;
        assert_eq!(json["logs"], "");

        let req = Request::builder().uri("/api/status").body(Body::empty()).unwrap();
        let json = body_json(app.oneshot(req).await.unwrap()).await;
        assert_eq!(json["state"], "stopped");
        assert!(json["pid"].is_null());
    }
}
