//! Supervisor 전용 에러 타입 — IPC 핸들러에서 에러 종류별로
//! 적절한 HTTP 상태 코드와 error_code를 돌려줄 수 있게 합니다.

use std::path::PathBuf;

use axum::http::StatusCode;

use super::state_machine::TransitionError;

/// Errors surfaced by supervisor operations.
#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to write config file '{path}': {source}")]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn '{binary}': {source}")]
    SpawnFailed {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    /// HTTP 상태 코드 매핑
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            Self::Transition(_) => StatusCode::CONFLICT,
            Self::ConfigWrite { .. } | Self::SpawnFailed { .. } | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// JSON 에러 응답 생성
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": self.to_string(),
            "error_code": self.error_code(),
        })
    }

    /// 머신 리더블 에러 코드
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "invalid_config",
            Self::ConfigWrite { .. } => "config_write_failed",
            Self::SpawnFailed { .. } => "spawn_failed",
            Self::Transition(_) => "invalid_state",
            Self::Io(_) => "internal_error",
        }
    }
}

/// axum 핸들러에서 SupervisorError를 직접 반환할 수 있도록 IntoResponse 구현
impl axum::response::IntoResponse for SupervisorError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = axum::Json(self.to_json());
        (status, body).into_response()
    }
}
