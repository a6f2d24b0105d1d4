use axum::{
    extract::rejection::JsonRejection,
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::store::StoreError;

#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    pub code: String,
    pub retryable: bool,
}

impl ProblemDetails {
    fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        let code = code.into();
        let title = status
            .canonical_reason()
            .unwrap_or("Unknown Error")
            .to_string();
        Self {
            r#type: format!("https://runrelay.dev/problems/{code}"),
            title,
            status: status.as_u16(),
            detail: detail.into(),
            code,
            retryable: false,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub problem: Box<ProblemDetails>,
}

impl ApiError {
    fn with_status(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        let problem = Box::new(ProblemDetails::new(status, code, message));
        Self { status, problem }
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, code, message)
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::CONFLICT, code, message)
    }

    pub fn service_unavailable(code: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::with_status(StatusCode::SERVICE_UNAVAILABLE, code, message);
        err.problem.retryable = true;
        err
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::NotFound(_) => Self::not_found("run_not_found", err.to_string()),
            StoreError::AlreadyExists(_) => Self::conflict("run_exists", err.to_string()),
            StoreError::Conflict { .. } => Self::conflict("version_conflict", err.to_string()),
            StoreError::Unavailable(_) => {
                tracing::error!(error = %err, "Store unavailable");
                Self::service_unavailable("store_unavailable", err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request("invalid_body", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.problem)).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runrelay_reconcile::RunKey;

    #[test]
    fn test_store_error_mapping() {
        let key = RunKey::new("default", "r1").unwrap();

        let err = ApiError::from(StoreError::AlreadyExists(key.clone()));
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.problem.code, "run_exists");

        let err = ApiError::from(StoreError::NotFound(key));
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err = ApiError::from(StoreError::Unavailable("down".into()));
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.problem.retryable);
    }
}
