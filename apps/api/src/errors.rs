use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::dispatch::DispatchError;
use crate::entitlements::store::StoreError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown feature key: {0}")]
    UnknownFeature(String),

    #[error("'{feature}' requires a Pro subscription")]
    ProRequired { feature: String },

    #[error("Daily limit of {limit} reached for '{feature}'")]
    QuotaExhausted { feature: String, limit: u32 },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut retry_after_seconds: Option<u64> = None;

        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::UnknownFeature(key) => {
                // Configuration error: the limit tables have no entry for this key.
                tracing::error!("Unknown feature key requested: {key}");
                (
                    StatusCode::BAD_REQUEST,
                    "UNKNOWN_FEATURE",
                    format!("Unrecognized feature '{key}'"),
                )
            }
            AppError::ProRequired { feature } => (
                StatusCode::FORBIDDEN,
                "PRO_REQUIRED",
                format!("{feature} is a Pro feature. Upgrade to access!"),
            ),
            AppError::QuotaExhausted { feature, limit } => (
                StatusCode::TOO_MANY_REQUESTS,
                "QUOTA_EXHAUSTED",
                format!(
                    "You've reached your daily limit of {limit} for {feature}. \
                     Upgrade to Pro for unlimited access!"
                ),
            ),
            AppError::Storage(e) => {
                tracing::error!("Storage error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Dispatch(e) => match e {
                DispatchError::RateLimited { retry_after } => {
                    retry_after_seconds = *retry_after;
                    let message = match retry_after {
                        Some(secs) => {
                            format!("Rate limit exceeded. Please wait {secs}s and try again.")
                        }
                        None => "Rate limit exceeded. Please try again later.".to_string(),
                    };
                    (StatusCode::TOO_MANY_REQUESTS, "AI_RATE_LIMITED", message)
                }
                DispatchError::ProviderQuotaExhausted => (
                    StatusCode::PAYMENT_REQUIRED,
                    "AI_CREDITS_EXHAUSTED",
                    "AI credits exhausted. Please try again later.".to_string(),
                ),
                DispatchError::MalformedResponse
                | DispatchError::ProviderError { .. }
                | DispatchError::Transport(_) => {
                    tracing::error!("AI dispatch error: {e}");
                    (
                        StatusCode::BAD_GATEWAY,
                        "AI_ERROR",
                        "An AI processing error occurred".to_string(),
                    )
                }
            },
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let Some(secs) = retry_after_seconds {
            error["retry_after_seconds"] = json!(secs);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}
