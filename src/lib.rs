pub mod config;
pub mod message_parser;
pub mod render;
pub mod streaming;
pub mod types;

#[cfg(feature = "server")]
pub mod chat_service;
#[cfg(feature = "server")]
pub mod error;
#[cfg(feature = "server")]
pub mod handlers;
#[cfg(feature = "server")]
pub mod state;

pub use message_parser::{parse_message, CitationRenderer, ContentSegment, ParsedMessage};
