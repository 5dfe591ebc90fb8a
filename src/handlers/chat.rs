use async_openai::config::Config;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use futures::stream::Stream;
use log::{error, info};
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc as tokio_mpsc;
use uuid::Uuid;

use crate::chat_service::{forward_stream, ChatService};
use crate::error::ChatError;
use crate::message_parser::{parse_message, ParsedMessage};
use crate::state::AppState;
use crate::types::{ChatCompletion, ChatCompletionRequest, ChatMessage};

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

pub struct NdjsonStream {
    pub receiver: tokio_mpsc::Receiver<Result<String, Infallible>>,
}

impl Stream for NdjsonStream {
    type Item = Result<String, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

pub async fn chat_post(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ChatCompletion>, ChatError> {
    complete(state.azure, &body).await
}

pub async fn chat_stream_post(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ChatError> {
    stream(state.azure, &body).await
}

pub async fn openai_chat_post(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ChatCompletion>, ChatError> {
    complete(state.openai, &body).await
}

pub async fn openai_chat_stream_post(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ChatError> {
    stream(state.openai, &body).await
}

/// Runs the message parser server-side. Citations are returned unrendered.
pub async fn parse_message_post(body: Bytes) -> Result<Json<ParsedMessage<()>>, ChatError> {
    let message: ChatMessage =
        serde_json::from_slice(&body).map_err(|_| ChatError::InvalidRequest)?;
    Ok(Json(parse_message(&message, |_: &str, _: usize| ())))
}

fn decode_request(body: &[u8]) -> Result<ChatCompletionRequest, ChatError> {
    let request: ChatCompletionRequest =
        serde_json::from_slice(body).map_err(|_| ChatError::InvalidRequest)?;

    if !request.is_valid() {
        return Err(ChatError::InvalidRequest);
    }
    Ok(request)
}

async fn complete<C: Config>(
    service: Option<Arc<ChatService<C>>>,
    body: &[u8],
) -> Result<Json<ChatCompletion>, ChatError> {
    let request = decode_request(body)?;
    let service = service.ok_or(ChatError::NotConfigured)?;

    let request_id = Uuid::new_v4();
    info!(
        "[{}] Using AI model: {} at {}",
        request_id,
        service.model(),
        service.endpoint()
    );

    let completion = service.complete(&request.messages).await?;
    Ok(Json(completion))
}

async fn stream<C: Config>(
    service: Option<Arc<ChatService<C>>>,
    body: &[u8],
) -> Result<Response, ChatError> {
    let request = decode_request(body)?;
    let service = service.ok_or(ChatError::NotConfigured)?;

    let request_id = Uuid::new_v4();
    info!(
        "[{}] Using AI model: {} at {} (streaming)",
        request_id,
        service.model(),
        service.endpoint()
    );

    let upstream = service.open_stream(&request.messages).await?;
    let (tx, rx) = tokio_mpsc::channel(100);

    tokio::spawn(async move {
        if let Err(e) = forward_stream(upstream, tx).await {
            error!("[{}] Error forwarding completion stream: {}", request_id, e);
        }
    });

    Ok((
        [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)],
        Body::from_stream(NdjsonStream { receiver: rx }),
    )
        .into_response())
}
