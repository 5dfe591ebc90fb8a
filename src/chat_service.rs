use async_openai::{
    config::{AzureConfig, Config, OpenAIConfig},
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestUserMessage, CreateChatCompletionRequest,
    },
    Client,
};
use futures::{stream, Stream, StreamExt};
use log::{debug, error, info};
use serde::Deserialize;
use std::convert::Infallible;
use std::pin::Pin;
use tokio::sync::mpsc;

use crate::config::InferenceConfig;
use crate::error::ChatError;
use crate::types::{ChatCompletion, ChatCompletionDelta, ChatMessage, ChatRole};

pub type NdjsonSender = mpsc::Sender<Result<String, Infallible>>;

pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<CompletionChunk, OpenAIError>> + Send>>;

// Upstream payloads. Reasoning models add `reasoning_content` next to
// `content`, which the stock async-openai types drop.

#[derive(Debug, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
pub struct CompletionChoice {
    pub message: CompletionMessage,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompletionMessage {
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompletionChunk {
    #[serde(default)]
    pub choices: Vec<CompletionChunkChoice>,
}

#[derive(Debug, Deserialize)]
pub struct CompletionChunkChoice {
    #[serde(default)]
    pub delta: CompletionMessage,
}

/// Completion gateway in front of one inference endpoint.
pub struct ChatService<C: Config> {
    client: Client<C>,
    model: String,
    endpoint: String,
    system_prompt: String,
    temperature: f32,
}

impl ChatService<AzureConfig> {
    pub fn azure(config: &InferenceConfig) -> Self {
        let azure = AzureConfig::new()
            .with_api_base(&config.endpoint)
            .with_api_version(&config.api_version)
            .with_deployment_id(&config.deployment)
            .with_api_key(&config.api_key);

        Self::with_client(Client::with_config(azure), config)
    }
}

impl ChatService<OpenAIConfig> {
    pub fn openai_compatible(config: &InferenceConfig) -> Self {
        let openai = OpenAIConfig::new()
            .with_api_base(&config.endpoint)
            .with_api_key(&config.api_key);

        Self::with_client(Client::with_config(openai), config)
    }
}

impl<C: Config> ChatService<C> {
    fn with_client(client: Client<C>, config: &InferenceConfig) -> Self {
        Self {
            client,
            model: config.deployment.clone(),
            endpoint: config.endpoint.clone(),
            system_prompt: config.system_prompt.clone(),
            temperature: config.temperature,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Single-shot completion for the given turns.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<ChatCompletion, ChatError> {
        let request = self.build_request(messages, false);
        let response: CompletionResponse = self.client.chat().create_byot(request).await?;

        let message = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .unwrap_or_default();

        Ok(ChatCompletion {
            message: ChatMessage::assistant_with_reasoning(
                message.content.unwrap_or_default(),
                message.reasoning_content,
            ),
            context: None,
            session_state: None,
        })
    }

    /// Opens the upstream stream and waits for its first event, so that
    /// connection and auth failures surface before any response bytes are
    /// sent.
    pub async fn open_stream(&self, messages: &[ChatMessage]) -> Result<CompletionStream, ChatError> {
        let request = self.build_request(messages, true);
        let upstream: CompletionStream = self.client.chat().create_stream_byot(request).await?;
        prime_stream(upstream).await
    }

    fn build_request(&self, messages: &[ChatMessage], stream: bool) -> CreateChatCompletionRequest {
        let system_message = ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
            content: self.system_prompt.clone().into(),
            name: None,
        });

        CreateChatCompletionRequest {
            model: self.model.clone(),
            messages: std::iter::once(system_message)
                .chain(messages.iter().map(to_request_message))
                .collect(),
            stream: stream.then_some(true),
            temperature: Some(self.temperature),
            ..Default::default()
        }
    }
}

fn to_request_message(message: &ChatMessage) -> ChatCompletionRequestMessage {
    match message.role {
        ChatRole::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: message.content.clone().into(),
            name: None,
        }),
        ChatRole::Assistant => {
            ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                content: Some(ChatCompletionRequestAssistantMessageContent::Text(
                    message.content.clone(),
                )),
                ..Default::default()
            })
        }
        ChatRole::System => ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
            content: message.content.clone().into(),
            name: None,
        }),
    }
}

/// Pulls the first item off `upstream`. An error there fails the whole
/// stream. Otherwise the item is put back in front of the rest.
pub async fn prime_stream(mut upstream: CompletionStream) -> Result<CompletionStream, ChatError> {
    match upstream.next().await {
        Some(Err(e)) => Err(e.into()),
        Some(Ok(first)) => Ok(Box::pin(stream::once(async move { Ok(first) }).chain(upstream))),
        None => Ok(upstream),
    }
}

/// Re-frames upstream chunks as NDJSON lines until the stream ends, fails,
/// or the receiver goes away.
pub async fn forward_stream<S>(mut upstream: S, tx: NdjsonSender) -> Result<(), ChatError>
where
    S: Stream<Item = Result<CompletionChunk, OpenAIError>> + Unpin,
{
    let mut forwarded = 0usize;

    while let Some(result) = upstream.next().await {
        match result {
            Ok(response) => {
                let Some(choice) = response.choices.into_iter().next() else {
                    continue;
                };

                let delta = ChatCompletionDelta::assistant(choice.delta.content.unwrap_or_default())
                    .with_reasoning(choice.delta.reasoning_content);
                let mut line = serde_json::to_string(&delta)?;
                line.push('\n');

                if tx.send(Ok(line)).await.is_err() {
                    info!("Client disconnected after {} chunks", forwarded);
                    return Ok(());
                }
                forwarded += 1;
            }
            Err(e) => {
                error!("Error in streaming response: {}", e);
                break;
            }
        }
    }

    debug!("Stream finished after {} chunks", forwarded);
    Ok(())
}
