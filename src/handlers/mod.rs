mod chat;
pub use chat::*;

use axum::{routing::post, Router};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat_post))
        .route("/api/chat/stream", post(chat_stream_post))
        .route("/api/openai/chat", post(openai_chat_post))
        .route("/api/openai/chat/stream", post(openai_chat_stream_post))
        .route("/api/messages/parse", post(parse_message_post))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
