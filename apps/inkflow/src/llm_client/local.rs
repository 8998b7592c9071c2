//! Runtime backed by a locally running model server speaking newline-delimited JSON.
//!
//! - capability probe: `GET /api/version`
//! - engine creation: `POST /api/show` (cache lookup), `POST /api/pull` (download with
//!   progress), then `POST /api/generate` without a prompt to load the weights
//! - streaming: `POST /api/chat` with `stream: true`
//!
//! The server's model store is the persistent cache: once a model has been pulled,
//! later loads skip the download entirely.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::llm_client::engine::{
    ChatMessage, Delta, EngineHandle, EngineOptions, GenerationCapability, TokenChunk,
    TokenSender, TokenStream,
};
use crate::llm_client::progress::InitProgress;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:11434";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const STREAM_BUFFER: usize = 64;

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ModelRequest<'a> {
    model: &'a str,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct PullEvent {
    #[serde(default)]
    status: String,
    total: Option<u64>,
    completed: Option<u64>,
    error: Option<String>,
}

impl PullEvent {
    fn progress(&self) -> Option<InitProgress> {
        if self.status == "success" {
            return Some(InitProgress::Fraction(1.0));
        }
        match (self.total, self.completed) {
            (Some(total), Some(completed)) if total > 0 => {
                Some(InitProgress::Fraction(completed as f64 / total as f64))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatEvent {
    message: Option<ChatEventMessage>,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatEventMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatEvent {
    fn into_chunk(self) -> TokenChunk {
        TokenChunk {
            delta: Delta {
                content: self.message.and_then(|m| m.content),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ServerError {
    error: String,
}

// ────────────────────────────────────────────────────────────────────────────
// NDJSON framing
// ────────────────────────────────────────────────────────────────────────────

/// Reassembles newline-delimited records from arbitrarily split body chunks.
#[derive(Debug, Default)]
struct LineBuffer {
    buf: BytesMut,
}

impl LineBuffer {
    /// Appends `chunk` and returns every complete, non-blank line it finished.
    fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line = self.buf.split_to(pos + 1).freeze().slice(..pos);
            if !is_blank(&line) {
                lines.push(line);
            }
        }
        lines
    }

    /// Whatever is left once the body has ended.
    fn finish(&mut self) -> Option<Bytes> {
        let rest = self.buf.split().freeze();
        (!is_blank(&rest)).then_some(rest)
    }
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

// ────────────────────────────────────────────────────────────────────────────
// Server capability
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct LocalModelServer {
    client: Client,
    base_url: String,
}

impl LocalModelServer {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn is_cached(&self, model_id: &str) -> bool {
        let request = ModelRequest {
            model: model_id,
            stream: false,
        };
        self.client
            .post(self.url("/api/show"))
            .json(&request)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn pull(
        &self,
        model_id: &str,
        on_progress: &mut (dyn FnMut(InitProgress) + Send),
    ) -> Result<()> {
        let request = ModelRequest {
            model: model_id,
            stream: true,
        };
        let response = self
            .client
            .post(self.url("/api/pull"))
            .json(&request)
            .send()
            .await
            .context("pull request failed")?;
        let mut response = check_status(response).await?;

        let mut lines = LineBuffer::default();
        while let Some(bytes) = response.chunk().await.context("pull stream interrupted")? {
            for line in lines.push(&bytes) {
                handle_pull_line(&line, on_progress)?;
            }
        }
        if let Some(line) = lines.finish() {
            handle_pull_line(&line, on_progress)?;
        }
        Ok(())
    }

    /// Asks the server to load the weights into memory so the first chat is not slow.
    async fn warm(&self, model_id: &str) -> Result<()> {
        let request = ModelRequest {
            model: model_id,
            stream: false,
        };
        let response = self
            .client
            .post(self.url("/api/generate"))
            .json(&request)
            .send()
            .await
            .context("warm-up request failed")?;
        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl GenerationCapability for LocalModelServer {
    async fn has_capability(&self) -> bool {
        match self
            .client
            .get(self.url("/api/version"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Model server probe failed: {e}");
                false
            }
        }
    }

    fn missing_capability_message(&self) -> String {
        format!(
            "No local model server is reachable at {}. Start it and try again.",
            self.base_url
        )
    }

    async fn create_engine(
        &self,
        model_id: &str,
        options: EngineOptions,
        on_progress: &mut (dyn FnMut(InitProgress) + Send),
    ) -> Result<Box<dyn EngineHandle>> {
        if options.cache_enabled && self.is_cached(model_id).await {
            debug!(model = model_id, "Model found in local cache");
        } else {
            info!(model = model_id, "Pulling model into local cache");
            self.pull(model_id, on_progress).await?;
        }

        self.warm(model_id).await?;
        on_progress(InitProgress::Report { progress: 1.0 });

        Ok(Box::new(LocalEngine {
            client: self.client.clone(),
            chat_url: self.url("/api/chat"),
            model_id: model_id.to_string(),
        }))
    }
}

fn handle_pull_line(line: &[u8], on_progress: &mut (dyn FnMut(InitProgress) + Send)) -> Result<()> {
    let event: PullEvent = serde_json::from_slice(line).context("malformed pull event")?;
    if let Some(error) = event.error {
        bail!("model server: {error}");
    }
    if let Some(progress) = event.progress() {
        on_progress(progress);
    }
    Ok(())
}

/// Passes successful responses through; turns anything else into an error carrying the
/// server's message when it sent one.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ServerError>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    bail!("model server returned {status}: {message}")
}

// ────────────────────────────────────────────────────────────────────────────
// Engine
// ────────────────────────────────────────────────────────────────────────────

struct LocalEngine {
    client: Client,
    chat_url: String,
    model_id: String,
}

#[async_trait]
impl EngineHandle for LocalEngine {
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<TokenStream> {
        let request = ChatRequest {
            model: &self.model_id,
            messages: &messages,
            stream: true,
        };
        let response = self
            .client
            .post(&self.chat_url)
            .json(&request)
            .send()
            .await
            .context("chat request failed")?;
        let response = check_status(response).await?;

        let (tx, stream) = TokenStream::channel(STREAM_BUFFER);
        tokio::spawn(async move {
            if let Err(e) = pump_chat(response, &tx).await {
                let _ = tx.send(Err(e)).await;
            }
        });
        Ok(stream)
    }
}

async fn pump_chat(mut response: Response, tx: &TokenSender) -> Result<()> {
    let mut lines = LineBuffer::default();
    while let Some(bytes) = response.chunk().await.context("chat stream interrupted")? {
        for line in lines.push(&bytes) {
            if !forward_chat_line(&line, tx).await? {
                return Ok(());
            }
        }
    }
    if let Some(line) = lines.finish() {
        forward_chat_line(&line, tx).await?;
    }
    Ok(())
}

/// Sends one chat record downstream. Returns false once the server says it is done or
/// the reader has gone away.
async fn forward_chat_line(line: &[u8], tx: &TokenSender) -> Result<bool> {
    let event: ChatEvent = serde_json::from_slice(line).context("malformed chat event")?;
    if let Some(error) = event.error {
        bail!("model server: {error}");
    }
    let done = event.done;
    if tx.send(Ok(event.into_chunk())).await.is_err() {
        debug!("Token reader dropped, stopping producer");
        return Ok(false);
    }
    Ok(!done)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── framing ─────────────────────────────────────────────────────────────

    #[test]
    fn test_line_buffer_reassembles_split_records() {
        let mut buf = LineBuffer::default();
        assert!(buf.push(b"{\"a\":").is_empty());
        let lines = buf.push(b"1}\n{\"b\":2}\n{\"c\"");
        assert_eq!(lines, vec![Bytes::from_static(b"{\"a\":1}"), Bytes::from_static(b"{\"b\":2}")]);
        assert!(buf.push(b":3}").is_empty());
        assert_eq!(buf.finish(), Some(Bytes::from_static(b"{\"c\":3}")));
    }

    #[test]
    fn test_line_buffer_skips_blank_lines() {
        let mut buf = LineBuffer::default();
        let lines = buf.push(b"\n  \n{}\n");
        assert_eq!(lines, vec![Bytes::from_static(b"{}")]);
        assert_eq!(buf.finish(), None);
    }

    // ── pull events ─────────────────────────────────────────────────────────

    #[test]
    fn test_pull_event_progress() {
        let event: PullEvent =
            serde_json::from_str(r#"{"status":"pulling abc","total":200,"completed":50}"#).unwrap();
        assert_eq!(event.progress(), Some(InitProgress::Fraction(0.25)));

        let event: PullEvent = serde_json::from_str(r#"{"status":"pulling manifest"}"#).unwrap();
        assert_eq!(event.progress(), None);

        let event: PullEvent = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
        assert_eq!(event.progress(), Some(InitProgress::Fraction(1.0)));
    }

    #[test]
    fn test_pull_line_error_is_surfaced() {
        let mut sink = |_: InitProgress| {};
        let err = handle_pull_line(br#"{"error":"model not found"}"#, &mut sink).unwrap_err();
        assert!(err.to_string().contains("model not found"));
    }

    #[test]
    fn test_pull_line_forwards_progress() {
        let mut seen = Vec::new();
        let mut sink = |p: InitProgress| seen.push(p.percent());
        handle_pull_line(br#"{"status":"x","total":4,"completed":3}"#, &mut sink).unwrap();
        assert_eq!(seen, vec![75]);
    }

    // ── chat events ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_chat_lines_become_chunks() {
        let (tx, mut stream) = TokenStream::channel(4);
        let more = forward_chat_line(
            br#"{"message":{"role":"assistant","content":"Hel"},"done":false}"#,
            &tx,
        )
        .await
        .unwrap();
        assert!(more);

        let more = forward_chat_line(br#"{"message":{"role":"assistant","content":""},"done":true}"#, &tx)
            .await
            .unwrap();
        assert!(!more);

        assert_eq!(stream.next().await.unwrap().unwrap().content(), Some("Hel"));
        assert_eq!(stream.next().await.unwrap().unwrap().content(), None);
    }

    #[tokio::test]
    async fn test_chat_line_stops_when_reader_dropped() {
        let (tx, stream) = TokenStream::channel(1);
        drop(stream);
        let more = forward_chat_line(br#"{"message":{"content":"x"}}"#, &tx).await.unwrap();
        assert!(!more);
    }

    #[tokio::test]
    async fn test_chat_line_error() {
        let (tx, _stream) = TokenStream::channel(1);
        let err = forward_chat_line(br#"{"error":"out of memory"}"#, &tx).await.unwrap_err();
        assert!(err.to_string().contains("out of memory"));
    }

    // ── server ──────────────────────────────────────────────────────────────

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let server = LocalModelServer::new("http://localhost:11434/").unwrap();
        assert_eq!(server.base_url(), "http://localhost:11434");
        assert_eq!(server.url("/api/chat"), "http://localhost:11434/api/chat");
    }

    #[tokio::test]
    async fn test_unreachable_server_has_no_capability() {
        let server = LocalModelServer::new("http://127.0.0.1:9").unwrap();
        assert!(!server.has_capability().await);
        assert!(server.missing_capability_message().contains("127.0.0.1:9"));
    }
}
