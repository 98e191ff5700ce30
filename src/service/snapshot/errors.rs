use axum::extract::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Serialize)]
#[serde(tag = "error", content = "details", rename_all = "snake_case")]
pub enum SnapshotHandlerError {
    #[error("Missing query parameter: {0}")]
    MissingParameter(String),
}

impl IntoResponse for SnapshotHandlerError {
    fn into_response(self) -> axum::response::Response {
        let status_code = match self {
            Self::MissingParameter(_) => StatusCode::BAD_REQUEST,
        };

        (status_code, Json(self)).into_response()
    }
}
