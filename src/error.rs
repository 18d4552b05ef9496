use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use opentelemetry::trace::TraceContextExt;
use serde_json::json;
use thiserror::Error;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Input error: {0}")]
    Input(String),

    #[error("Busy: {0}")]
    Busy(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Source error: {0}")]
    Source(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Generic remediation text shown next to a failure.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            AppError::Llm(_) => Some("Check the API key, model access and remaining quota, then reset and try again."),
            AppError::Source(_) => Some("The knowledge source could not be reached or rejected the query. Check connectivity, simplify the industry name and try again."),
            _ => None,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Input(_) => StatusCode::BAD_REQUEST,
            AppError::Busy(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Llm(_) | AppError::Source(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn get_trace_id() -> Option<String> {
    let span = Span::current();
    let context = span.context();
    let span_ref = context.span();
    let span_context = span_ref.span_context();

    if span_context.is_valid() {
        Some(span_context.trace_id().to_string())
    } else {
        None
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match &self {
            AppError::Input(msg) | AppError::Busy(msg) | AppError::NotFound(msg) => msg.clone(),
            AppError::Llm(msg) | AppError::Source(msg) => {
                tracing::error!(error = %msg, "Provider error");
                msg.clone()
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                "Internal server error".to_string()
            }
        };

        let mut body = json!({
            "error": error_message,
            "status": status.as_u16(),
        });
        if let Some(hint) = self.hint() {
            body["hint"] = json!(hint);
        }
        if let Some(trace_id) = get_trace_id() {
            body["trace_id"] = json!(trace_id);
        }

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_error() {
        let error = AppError::Input("industry name is required".to_string());
        assert_eq!(error.to_string(), "Input error: industry name is required");
    }

    #[test]
    fn test_llm_error() {
        let error = AppError::Llm("provider timeout".to_string());
        assert_eq!(error.to_string(), "LLM error: provider timeout");
    }

    #[test]
    fn test_source_error() {
        let error = AppError::Source("connection refused".to_string());
        assert_eq!(error.to_string(), "Source error: connection refused");
    }

    #[test]
    fn test_error_status_codes() {
        let test_cases = vec![
            (AppError::Input("test".to_string()), StatusCode::BAD_REQUEST),
            (AppError::Busy("test".to_string()), StatusCode::CONFLICT),
            (AppError::NotFound("test".to_string()), StatusCode::NOT_FOUND),
            (AppError::Llm("test".to_string()), StatusCode::BAD_GATEWAY),
            (AppError::Source("test".to_string()), StatusCode::BAD_GATEWAY),
            (
                AppError::Internal("test".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected_status) in test_cases {
            assert_eq!(error.status(), expected_status, "{error}");
            assert_eq!(error.into_response().status(), expected_status);
        }
    }

    #[test]
    fn test_hints_only_for_provider_errors() {
        assert!(AppError::Llm("x".into()).hint().is_some());
        assert!(AppError::Source("x".into()).hint().is_some());
        assert!(AppError::Input("x".into()).hint().is_none());
        assert!(AppError::Busy("x".into()).hint().is_none());
    }

    #[test]
    fn test_app_result_err() {
        fn returns_err() -> AppResult<i32> {
            Err(AppError::NotFound("test".to_string()))
        }
        assert!(returns_err().is_err());
    }
}
