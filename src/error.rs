use async_openai::error::OpenAIError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use log::error;
use thiserror::Error;

pub const INVALID_REQUEST_MESSAGE: &str = "Invalid or missing messages in the request body";
pub const MISSING_CONFIG_MESSAGE: &str = "Missing required environment variables";
pub const UNAVAILABLE_MESSAGE: &str = "Service temporarily unavailable. Please try again later.";

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Invalid or missing messages in the request body")]
    InvalidRequest,

    #[error("Chat backend is not configured")]
    NotConfigured,

    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ChatError::InvalidRequest => (StatusCode::BAD_REQUEST, INVALID_REQUEST_MESSAGE),
            ChatError::NotConfigured => {
                error!("Chat request rejected: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, MISSING_CONFIG_MESSAGE)
            }
            _ => {
                error!("Error when processing chat request: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, UNAVAILABLE_MESSAGE)
            }
        };

        (status, body).into_response()
    }
}
