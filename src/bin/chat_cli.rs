use ai_chat::config;
use ai_chat::render::{render_plain, render_sources, PlainTextRenderer};
use ai_chat::streaming::{NdjsonLineBuffer, StreamingMessage};
use ai_chat::types::{ChatCompletionRequest, ChatMessage};
use anyhow::{bail, Result};
use dotenv::dotenv;
use env_logger::Env;
use futures::StreamExt;
use log::{info, warn};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Prints the part of `rendered` not yet on screen. Returns what is now
/// shown. A rendering that no longer extends the printed text is held back
/// until the final pass.
fn print_progress(printed: String, rendered: String) -> Result<String> {
    if !rendered.starts_with(&printed) {
        return Ok(printed);
    }

    let mut stdout = std::io::stdout();
    write!(stdout, "{}", &rendered[printed.len()..])?;
    stdout.flush()?;
    Ok(rendered)
}

/// Sends `history` and prints the streamed reply. Returns the finished
/// assistant message.
async fn stream_reply(
    client: &reqwest::Client,
    url: &str,
    history: &[ChatMessage],
) -> Result<ChatMessage> {
    let request = ChatCompletionRequest {
        messages: history.to_vec(),
        context: None,
        session_state: None,
    };

    let response = client.post(url).json(&request).send().await?;
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        bail!("{}: {}", status, body);
    }

    let mut lines = NdjsonLineBuffer::new();
    let mut message = StreamingMessage::new();
    let mut printed = String::new();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        for line in lines.push(&chunk) {
            if let Err(e) = message.push_line(&line) {
                warn!("Skipping malformed line: {}", e);
            }
        }
        printed = print_progress(printed, render_plain(&message.parse(PlainTextRenderer)))?;
    }
    if let Some(line) = lines.finish() {
        if let Err(e) = message.push_line(&line) {
            warn!("Skipping malformed trailing line: {}", e);
        }
    }

    let parsed = message.parse(PlainTextRenderer);
    let rendered = render_plain(&parsed);
    if rendered.starts_with(&printed) {
        print_progress(printed, rendered)?;
    } else {
        print!("\n{}", rendered);
    }
    println!();

    if parsed.has_thoughts() {
        info!("Reasoning: {}", parsed.thoughts_text());
    }
    if !message.reasoning().is_empty() {
        info!("Model reasoning: {}", message.reasoning());
    }

    let sources = render_sources(&parsed);
    if !sources.is_empty() {
        println!("\nSources:");
        for source in sources {
            println!("  {}", source);
        }
    }
    if !parsed.followup_questions.is_empty() {
        println!("\nYou could also ask:");
        for question in &parsed.followup_questions {
            println!("  - {}", question);
        }
    }

    Ok(message.message())
}

/// Asks one question. The history only grows when a full reply arrived, so
/// a failed exchange leaves it as it was.
async fn ask(
    client: &reqwest::Client,
    url: &str,
    history: &mut Vec<ChatMessage>,
    question: String,
) -> Result<()> {
    history.push(ChatMessage::user(question));

    match stream_reply(client, url, history).await {
        Ok(reply) => {
            history.push(reply);
            Ok(())
        }
        Err(e) => {
            history.pop();
            Err(e)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init_from_env(Env::default().default_filter_or("warn"));

    let url = config::chat_api_url();
    let client = reqwest::Client::new();
    let mut history = Vec::new();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        return ask(&client, &url, &mut history, args.join(" ")).await;
    }

    println!("Ask a cooking question (Ctrl+D to quit).");
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = input.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }

        if let Err(e) = ask(&client, &url, &mut history, question.to_string()).await {
            eprintln!("Request failed: {}", e);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, Bytes},
        routing::post,
        Router,
    };
    use std::io;

    /// One NDJSON line, then a broken body.
    fn chunk_then_failure() -> impl futures::Stream<Item = Result<Bytes, io::Error>> {
        futures::stream::iter(vec![
            Ok(Bytes::from_static(b"{\"delta\":{\"content\":\"Half\",\"role\":\"assistant\"}}\n")),
            Err(io::Error::new(io::ErrorKind::Other, "upstream dropped")),
        ])
    }

    async fn serve_broken_stream() -> String {
        let app = Router::new().route(
            "/api/chat/stream",
            post(|| async { Body::from_stream(chunk_then_failure()) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api/chat/stream", addr)
    }

    fn earlier_turns() -> Vec<ChatMessage> {
        vec![
            ChatMessage::user("How do I boil an egg?"),
            ChatMessage::assistant("Ten minutes."),
        ]
    }

    #[tokio::test]
    async fn test_refused_connection_keeps_history() {
        let client = reqwest::Client::new();
        let mut history = earlier_turns();

        let result = ask(&client, "http://127.0.0.1:1/api/chat/stream", &mut history, "Soft?".to_string()).await;

        assert!(result.is_err());
        assert_eq!(history, earlier_turns(), "The failed question should be dropped");
    }

    #[tokio::test]
    async fn test_broken_body_keeps_history() {
        let url = serve_broken_stream().await;
        let client = reqwest::Client::new();
        let mut history = earlier_turns();

        let result = ask(&client, &url, &mut history, "Soft?".to_string()).await;

        assert!(result.is_err(), "A body cut off mid-stream should fail the exchange");
        assert_eq!(history, earlier_turns(), "The failed question should be dropped");
    }
}
