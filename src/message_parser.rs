//! Turns a raw chat message into renderable parts.
//!
//! Assistant messages may carry a `<think>` trace, `[source]` citation
//! markers and `<<question>>` follow-up suggestions. The parser is re-run on
//! the whole accumulated text for every streamed chunk, so markers that are
//! still arriving at the end of the text are dropped instead of being shown
//! as raw syntax.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::Value;

use crate::types::{ChatMessage, ChatRole};

const THINK_START: &str = "<think>";
const THINK_END: &str = "</think>";
const FOLLOWUP_OPEN: &str = "<<";

static FOLLOWUP_QUESTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<<([^>]+)>>").expect("follow-up question pattern is valid"));

static CITATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]").expect("citation pattern is valid"));

/// Produces the value shown in place of a citation marker.
///
/// Called once per resolved citation, left to right. Any
/// `FnMut(&str, usize) -> R` closure is a renderer.
pub trait CitationRenderer {
    type Output;

    fn render_citation(&mut self, citation_id: &str, reference_number: usize) -> Self::Output;
}

impl<F, R> CitationRenderer for F
where
    F: FnMut(&str, usize) -> R,
{
    type Output = R;

    fn render_citation(&mut self, citation_id: &str, reference_number: usize) -> R {
        self(citation_id, reference_number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ContentSegment<R> {
    Text {
        value: String,
    },
    #[serde(rename_all = "camelCase")]
    Citation {
        citation_id: String,
        reference_number: usize,
        #[serde(skip)]
        rendered: R,
    },
}

impl<R> ContentSegment<R> {
    pub fn text(value: impl Into<String>) -> Self {
        ContentSegment::Text {
            value: value.into(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentSegment::Text { value } => Some(value.as_str()),
            ContentSegment::Citation { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedMessage<R> {
    /// Renderable body in reading order.
    pub segments: Vec<ContentSegment<R>>,
    pub thoughts: Vec<ContentSegment<R>>,
    /// Unique citation ids; `citations[n - 1]` is reference number `n`.
    pub citations: Vec<String>,
    pub followup_questions: Vec<String>,
    pub role: ChatRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    pub has_content: bool,
}

impl<R> ParsedMessage<R> {
    pub fn has_thoughts(&self) -> bool {
        !self.thoughts.is_empty()
    }

    pub fn thoughts_text(&self) -> String {
        self.thoughts.iter().filter_map(ContentSegment::as_text).collect()
    }

    /// Body text with citation markers elided.
    pub fn plain_text(&self) -> String {
        self.segments.iter().filter_map(ContentSegment::as_text).collect()
    }
}

/// Parses a complete snapshot of a message.
///
/// User messages are passed through verbatim. Everything else goes through
/// thought extraction, then follow-up extraction, then citation splitting,
/// each step working on the trimmed result of the one before.
pub fn parse_message<C>(message: &ChatMessage, mut renderer: C) -> ParsedMessage<C::Output>
where
    C: CitationRenderer,
{
    if message.role == ChatRole::User {
        return ParsedMessage {
            segments: vec![ContentSegment::text(message.content.as_str())],
            thoughts: Vec::new(),
            citations: Vec::new(),
            followup_questions: Vec::new(),
            role: message.role,
            context: message.context.clone(),
            has_content: true,
        };
    }

    let (text, thoughts) = extract_thoughts(&message.content);
    let (text, followup_questions) = extract_followup_questions(&text);
    let has_content = !text.is_empty();

    let mut index = CitationIndex::default();
    let segments = split_citations(&text, &mut index, &mut renderer);

    ParsedMessage {
        segments,
        thoughts: thoughts
            .map(|trace| vec![ContentSegment::text(trace)])
            .unwrap_or_default(),
        citations: index.into_citations(),
        followup_questions,
        role: message.role,
        context: message.context.clone(),
        has_content,
    }
}

/// Removes the first `<think>` block, returning the trimmed remainder and the
/// trace. An unclosed block runs to the end of the text.
fn extract_thoughts(content: &str) -> (String, Option<String>) {
    let Some(start) = content.find(THINK_START) else {
        return (trim_residue(content).to_string(), None);
    };

    let body = &content[start + THINK_START.len()..];
    let (trace, after) = match body.find(THINK_END) {
        Some(end) => (&body[..end], &body[end + THINK_END.len()..]),
        None => (body, ""),
    };

    let mut text = String::with_capacity(start + after.len());
    text.push_str(&content[..start]);
    text.push_str(after);

    (trim_residue(&text).to_string(), Some(trace.to_string()))
}

/// Trims the ECMAScript whitespace set: Unicode `White_Space` plus the byte
/// order mark, without NEL (U+0085).
fn trim_residue(text: &str) -> &str {
    text.trim_matches(|c: char| c == '\u{feff}' || (c.is_whitespace() && c != '\u{85}'))
}

fn extract_followup_questions(text: &str) -> (String, Vec<String>) {
    let mut questions = Vec::new();
    let stripped = FOLLOWUP_QUESTION.replace_all(text, |caps: &Captures| {
        questions.push(caps[1].to_string());
        ""
    });

    // a question that is still streaming in
    let complete = match stripped.find(FOLLOWUP_OPEN) {
        Some(open) => &stripped[..open],
        None => &stripped[..],
    };

    (trim_residue(complete).to_string(), questions)
}

/// First-seen numbering of citation ids.
#[derive(Debug, Default)]
struct CitationIndex {
    order: Vec<String>,
    numbers: HashMap<String, usize>,
}

impl CitationIndex {
    fn resolve(&mut self, citation_id: &str) -> usize {
        if let Some(&number) = self.numbers.get(citation_id) {
            return number;
        }
        self.order.push(citation_id.to_string());
        let number = self.order.len();
        self.numbers.insert(citation_id.to_string(), number);
        number
    }

    fn into_citations(self) -> Vec<String> {
        self.order
    }
}

fn split_citations<C>(
    text: &str,
    index: &mut CitationIndex,
    renderer: &mut C,
) -> Vec<ContentSegment<C::Output>>
where
    C: CitationRenderer,
{
    let mut segments = Vec::new();
    let mut cursor = 0;

    for caps in CITATION.captures_iter(text) {
        let (Some(marker), Some(id)) = (caps.get(0), caps.get(1)) else {
            continue;
        };

        segments.push(ContentSegment::text(&text[cursor..marker.start()]));

        let citation_id = id.as_str();
        let reference_number = index.resolve(citation_id);
        segments.push(ContentSegment::Citation {
            citation_id: citation_id.to_string(),
            reference_number,
            rendered: renderer.render_citation(citation_id, reference_number),
        });

        cursor = marker.end();
    }

    segments.push(ContentSegment::text(strip_dangling_bracket(&text[cursor..])));
    segments
}

/// Cuts the final run at a `[` that has no closing `]` yet.
fn strip_dangling_bracket(run: &str) -> &str {
    let tail = run.rfind(']').map_or(0, |close| close + 1);
    match run[tail..].find('[') {
        Some(open) => &run[..tail + open],
        None => run,
    }
}
