use crate::message_parser::{CitationRenderer, ContentSegment, ParsedMessage};

/// Renders citations as `[n]` for terminal output.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextRenderer;

impl CitationRenderer for PlainTextRenderer {
    type Output = String;

    fn render_citation(&mut self, _citation_id: &str, reference_number: usize) -> String {
        format!("[{}]", reference_number)
    }
}

pub fn render_plain(parsed: &ParsedMessage<String>) -> String {
    parsed
        .segments
        .iter()
        .map(|segment| match segment {
            ContentSegment::Text { value } => value.as_str(),
            ContentSegment::Citation { rendered, .. } => rendered.as_str(),
        })
        .collect()
}

/// Numbered source list matching the reference markers.
pub fn render_sources(parsed: &ParsedMessage<String>) -> Vec<String> {
    parsed
        .citations
        .iter()
        .enumerate()
        .map(|(i, citation)| format!("[{}] {}", i + 1, citation))
        .collect()
}
