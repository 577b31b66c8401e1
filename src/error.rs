use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Transport failure, timeout, or non-2xx status from the telemetry
    /// source. Aborts the whole run; no partial snapshot is written.
    #[error("failed to fetch telemetry for {device}: {source}")]
    Fetch {
        device: String,
        #[source]
        source: reqwest::Error,
    },

    /// The source responded but the body was not a record list.
    #[error("unexpected telemetry payload for {device}: {detail}")]
    Payload { device: String, detail: String },

    /// Required fields could not be resolved after alias matching.
    #[error("telemetry for {device} missing required fields: {missing}")]
    Schema { device: String, missing: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = match &self {
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            PipelineError::Fetch { .. }
            | PipelineError::Payload { .. }
            | PipelineError::Schema { .. } => StatusCode::BAD_GATEWAY,
            PipelineError::Io(_) | PipelineError::Encode(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
