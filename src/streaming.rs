use serde_json::Value;

use crate::message_parser::{parse_message, CitationRenderer, ParsedMessage};
use crate::types::{ChatCompletionDelta, ChatMessage, ChatMessageDelta, ChatRole};

/// Splits a chunked NDJSON body into complete lines.
///
/// Bytes are held until a newline arrives, so UTF-8 sequences cut across
/// network chunks decode intact.
#[derive(Debug, Default)]
pub struct NdjsonLineBuffer {
    pending: Vec<u8>,
}

impl NdjsonLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every complete, non-blank line in arrival order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if !text.is_empty() {
                lines.push(text.to_string());
            }
        }
        lines
    }

    /// Whatever is left once the body ends without a final newline.
    pub fn finish(self) -> Option<String> {
        let text = String::from_utf8_lossy(&self.pending);
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

/// An assistant reply being assembled from stream deltas.
#[derive(Debug, Clone)]
pub struct StreamingMessage {
    role: ChatRole,
    content: String,
    reasoning: String,
    context: Option<Value>,
}

impl Default for StreamingMessage {
    fn default() -> Self {
        Self {
            role: ChatRole::Assistant,
            content: String::new(),
            reasoning: String::new(),
            context: None,
        }
    }
}

impl StreamingMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_delta(&mut self, delta: &ChatMessageDelta) {
        if let Some(role) = delta.role {
            self.role = role;
        }
        if let Some(content) = &delta.content {
            self.content.push_str(content);
        }
        if let Some(context) = &delta.context {
            if let Some(piece) = context.get("reasoning").and_then(Value::as_str) {
                self.reasoning.push_str(piece);
            }
            if !context.is_null() {
                self.context = Some(context.clone());
            }
        }
    }

    pub fn push_line(&mut self, line: &str) -> Result<(), serde_json::Error> {
        let chunk: ChatCompletionDelta = serde_json::from_str(line)?;
        self.push_delta(&chunk.delta);
        Ok(())
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Reasoning output streamed alongside the content, joined across deltas.
    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn message(&self) -> ChatMessage {
        let mut context = self.context.clone();
        if let Some(Value::Object(fields)) = context.as_mut() {
            if fields.contains_key("reasoning") {
                fields.insert("reasoning".to_string(), Value::String(self.reasoning.clone()));
            }
        }

        ChatMessage {
            role: self.role,
            content: self.content.clone(),
            context,
        }
    }

    /// Parses everything received so far from scratch.
    pub fn parse<C>(&self, renderer: C) -> ParsedMessage<C::Output>
    where
        C: CitationRenderer,
    {
        parse_message(&self.message(), renderer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_render(_: &str, _: usize) {}

    mod line_buffer {
        use super::*;

        #[test]
        fn test_lines_split_across_chunks() {
            let mut buffer = NdjsonLineBuffer::new();

            assert!(buffer.push(b"{\"delta\":{\"con").is_empty());
            let lines = buffer.push(b"tent\":\"a\"}}\n{\"delta\":{}}\n{\"de");
            assert_eq!(
                lines,
                vec![r#"{"delta":{"content":"a"}}"#, r#"{"delta":{}}"#]
            );
            assert_eq!(buffer.finish(), Some("{\"de".to_string()));
        }

        #[test]
        fn test_blank_lines_are_skipped() {
            let mut buffer = NdjsonLineBuffer::new();
            let lines = buffer.push(b"\n\r\n  \n{}\r\n");
            assert_eq!(lines, vec!["{}"]);
            assert_eq!(buffer.finish(), None);
        }

        #[test]
        fn test_multibyte_char_split_across_chunks() {
            let bytes = "{\"delta\":{\"content\":\"180°C\"}}\n".as_bytes();
            let split = bytes.iter().position(|&b| b == 0xC2).expect("degree sign") + 1;

            let mut buffer = NdjsonLineBuffer::new();
            assert!(buffer.push(&bytes[..split]).is_empty());
            let lines = buffer.push(&bytes[split..]);
            assert_eq!(lines, vec![r#"{"delta":{"content":"180°C"}}"#]);
        }
    }

    mod accumulation {
        use super::*;

        #[test]
        fn test_deltas_accumulate() {
            let mut message = StreamingMessage::new();
            message.push_line(r#"{"delta":{"content":"Hel","role":"assistant"}}"#).unwrap();
            message.push_line(r#"{"delta":{"content":"lo"}}"#).unwrap();
            message.push_line(r#"{"delta":{}}"#).unwrap();

            assert_eq!(message.content(), "Hello");
            assert_eq!(message.message().role, ChatRole::Assistant);
        }

        #[test]
        fn test_bad_line_is_an_error() {
            let mut message = StreamingMessage::new();
            assert!(message.push_line("not json").is_err());
            assert_eq!(message.content(), "", "A bad line should not change content");
        }

        #[test]
        fn test_latest_context_wins() {
            let mut message = StreamingMessage::new();
            message.push_delta(&ChatMessageDelta {
                context: Some(json!({ "reasoning": "a" })),
                ..Default::default()
            });
            message.push_delta(&ChatMessageDelta {
                context: Some(Value::Null),
                ..Default::default()
            });
            assert_eq!(message.message().context, Some(json!({ "reasoning": "a" })));
        }

        #[test]
        fn test_reasoning_pieces_are_joined() {
            let mut message = StreamingMessage::new();
            for (content, reasoning) in [("", Some("Eggs ")), ("", Some("set at 70C.")), ("Boil.", None)] {
                let delta = ChatCompletionDelta::assistant(content).with_reasoning(reasoning.map(String::from));
                message.push_delta(&delta.delta);
            }

            assert_eq!(message.reasoning(), "Eggs set at 70C.");
            assert_eq!(message.content(), "Boil.");
            assert_eq!(
                message.message().context,
                Some(json!({ "reasoning": "Eggs set at 70C." }))
            );
        }

        #[test]
        fn test_each_snapshot_reparses() {
            let chunks = ["Mix [flour.md", "] well.", "<<How much", " sugar?>>"];
            let mut message = StreamingMessage::new();
            let mut snapshots = Vec::new();

            for chunk in chunks {
                message.push_delta(&ChatCompletionDelta::assistant(chunk).delta);
                snapshots.push(message.parse(no_render));
            }

            assert!(snapshots[0].citations.is_empty(), "Citation is not complete yet");
            assert_eq!(snapshots[0].plain_text(), "Mix ");
            assert_eq!(snapshots[1].citations, vec!["flour.md"]);
            assert!(snapshots[2].followup_questions.is_empty());
            assert_eq!(snapshots[2].plain_text(), "Mix  well.");
            assert_eq!(snapshots[3].followup_questions, vec!["How much sugar?"]);

            let whole = parse_message(&ChatMessage::assistant(message.content()), no_render);
            assert_eq!(snapshots[3], whole);
        }
    }
}
