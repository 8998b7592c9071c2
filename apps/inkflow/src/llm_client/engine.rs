//! Seams between the generation client and a concrete model runtime.
//!
//! A runtime provides two capabilities: create an engine for a model id (reporting
//! init progress), and stream chat completion chunks from that engine. Chunks travel
//! through a bounded channel so the client can stop reading at any point.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::llm_client::progress::InitProgress;

// ────────────────────────────────────────────────────────────────────────────
// Messages and chunks
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Incremental text carried by a chunk. `content` may be absent on keep-alive or
/// role-only chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
}

/// One piece of a streamed completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenChunk {
    #[serde(default)]
    pub delta: Delta,
}

impl TokenChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            delta: Delta {
                content: Some(content.into()),
            },
        }
    }

    /// The chunk's text, or `None` when the delta is missing or empty.
    pub fn content(&self) -> Option<&str> {
        self.delta.content.as_deref().filter(|s| !s.is_empty())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Token stream
// ────────────────────────────────────────────────────────────────────────────

pub type TokenSender = mpsc::Sender<Result<TokenChunk>>;

/// Receiving half of a completion stream. Dropping it tells the producer to stop.
#[derive(Debug)]
pub struct TokenStream {
    rx: mpsc::Receiver<Result<TokenChunk>>,
}

impl TokenStream {
    pub fn channel(buffer: usize) -> (TokenSender, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self { rx })
    }

    /// Next chunk, or `None` once the producer has finished.
    pub async fn next(&mut self) -> Option<Result<TokenChunk>> {
        self.rx.recv().await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Runtime traits
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Reuse the runtime's persistent model cache when the model is already there.
    pub cache_enabled: bool,
}

/// A model runtime able to create engines.
#[async_trait]
pub trait GenerationCapability: Send + Sync {
    /// Whether the platform can run the generator at all.
    async fn has_capability(&self) -> bool;

    /// Message surfaced to the user when `has_capability` is false.
    fn missing_capability_message(&self) -> String {
        "Text generation is not supported on this platform.".to_string()
    }

    async fn create_engine(
        &self,
        model_id: &str,
        options: EngineOptions,
        on_progress: &mut (dyn FnMut(InitProgress) + Send),
    ) -> Result<Box<dyn EngineHandle>>;
}

/// An initialized model.
#[async_trait]
pub trait EngineHandle: Send + Sync {
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<TokenStream>;
}
