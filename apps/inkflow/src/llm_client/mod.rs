/// Generation Client — owns the model session used to fill practice sheets with text.
///
/// The client is an explicit value held by the caller: engine handle, readiness and the
/// active model id live here, never in process-wide state. Lifecycle:
/// `Unloaded → Loading → Ready`. A failed load always lands back in `Unloaded` with no
/// handle retained.
///
/// Each `generate` call is governed by its own `CancelToken`. At most one call may be
/// in flight; a second concurrent call is rejected with `GenerationError::Busy`.
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

pub mod engine;
pub mod local;
pub mod progress;

/// Per-call cancellation signal. Clones share one signal; the generate loop stops
/// forwarding once it fires and never closes the producer forcibly.
pub use tokio_util::sync::CancellationToken as CancelToken;
pub use engine::{
    ChatMessage, EngineHandle, EngineOptions, GenerationCapability, TokenChunk, TokenStream,
};

use crate::llm_client::progress::{InitProgress, ProgressTracker};
use crate::store::KeyValueStore;

/// Model used when nothing has been loaded before.
pub const DEFAULT_MODEL_ID: &str = "llama3.2:3b";
/// Store key holding the last successfully loaded model id.
pub const MODEL_KEY: &str = "app.llm.model";

#[derive(Debug, Error)]
pub enum GenerationError {
    /// The platform cannot run the generator. Not retried.
    #[error("{0}")]
    Capability(String),

    #[error("Model load failed: {0}")]
    Load(String),

    #[error("Model not loaded")]
    NotReady,

    #[error("A generation is already in progress")]
    Busy,

    #[error("Stream error: {0}")]
    Stream(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Unloaded,
    Loading,
    Ready,
}

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub system_prompt: Option<String>,
    /// Token for this call. A fresh one is created when absent.
    pub cancel: Option<CancelToken>,
}

/// How a successful `generate` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationOutcome {
    /// Number of non-empty chunks handed to `on_token`.
    pub tokens: usize,
    /// True if the call stopped because its token was cancelled.
    pub cancelled: bool,
}

pub struct GenerationClient {
    capability: Arc<dyn GenerationCapability>,
    store: Arc<dyn KeyValueStore>,
    engine: Option<Box<dyn EngineHandle>>,
    status: ClientStatus,
    model_id: String,
    load_timeout: Option<Duration>,
    active: Mutex<Option<CancelToken>>,
}

impl GenerationClient {
    /// Creates an unloaded client. The default model id is the last one persisted in
    /// `store`, or `DEFAULT_MODEL_ID`.
    pub fn new(capability: Arc<dyn GenerationCapability>, store: Arc<dyn KeyValueStore>) -> Self {
        let model_id = match store.get(MODEL_KEY) {
            Ok(Some(id)) if !id.trim().is_empty() => id,
            Ok(_) => DEFAULT_MODEL_ID.to_string(),
            Err(e) => {
                warn!("Could not read last model id, using default: {e}");
                DEFAULT_MODEL_ID.to_string()
            }
        };

        Self {
            capability,
            store,
            engine: None,
            status: ClientStatus::Unloaded,
            model_id,
            load_timeout: None,
            active: Mutex::new(None),
        }
    }

    /// Bounds how long `load` may wait for engine initialization.
    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = Some(timeout);
        self
    }

    pub fn status(&self) -> ClientStatus {
        self.status
    }

    pub fn is_ready(&self) -> bool {
        self.status == ClientStatus::Ready && self.engine.is_some()
    }

    /// The active model id: the loaded one when ready, otherwise the default for the
    /// next `load`.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Loads `model_id` (or the active default), reporting whole-number progress.
    ///
    /// Loading the model that is already ready returns immediately. Loading a different
    /// id drops the current engine first.
    pub async fn load(
        &mut self,
        model_id: Option<&str>,
        on_progress: Option<&mut (dyn FnMut(u8) + Send)>,
    ) -> Result<(), GenerationError> {
        if !self.capability.has_capability().await {
            let message = self.capability.missing_capability_message();
            warn!("Generation capability unavailable: {message}");
            return Err(GenerationError::Capability(message));
        }

        let id = model_id.unwrap_or(self.model_id.as_str()).to_string();

        if self.is_ready() && self.model_id == id {
            debug!(model = %id, "Model already loaded");
            return Ok(());
        }

        if self.engine.take().is_some() {
            info!(from = %self.model_id, to = %id, "Reloading generation engine");
        }
        self.status = ClientStatus::Loading;
        info!(model = %id, "Loading generation engine");

        let capability = Arc::clone(&self.capability);
        let mut tracker = ProgressTracker::new(on_progress);
        let mut forward = |signal: InitProgress| tracker.report(signal);
        let options = EngineOptions {
            cache_enabled: true,
        };

        let created = capability.create_engine(&id, options, &mut forward);
        let result = match self.load_timeout {
            Some(limit) => match tokio::time::timeout(limit, created).await {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!(
                    "initialization timed out after {}s",
                    limit.as_secs_f32()
                )),
            },
            None => created.await,
        };

        match result {
            Ok(engine) => {
                self.engine = Some(engine);
                self.status = ClientStatus::Ready;
                self.model_id = id;
                if let Err(e) = self.store.set(MODEL_KEY, &self.model_id) {
                    warn!("Could not persist model id: {e}");
                }
                info!(model = %self.model_id, "Generation engine ready");
                Ok(())
            }
            Err(e) => {
                self.status = ClientStatus::Unloaded;
                warn!(model = %id, "Generation engine failed to load: {e:#}");
                Err(GenerationError::Load(format!("{e:#}")))
            }
        }
    }

    /// Streams a completion for `prompt`, calling `on_token` once per non-empty chunk in
    /// the order the engine produced them.
    ///
    /// Cancellation is checked before every receive. A cancelled call returns `Ok` with
    /// whatever was delivered up to that point.
    pub async fn generate<F>(
        &self,
        prompt: &str,
        options: GenerateOptions,
        mut on_token: F,
    ) -> Result<GenerationOutcome, GenerationError>
    where
        F: FnMut(&str),
    {
        let engine = match (&self.engine, self.status) {
            (Some(engine), ClientStatus::Ready) => engine,
            _ => return Err(GenerationError::NotReady),
        };

        let cancel = options.cancel.unwrap_or_default();
        let _call = self.begin_call(cancel.clone())?;

        let messages = build_messages(options.system_prompt.as_deref(), prompt);
        debug!(model = %self.model_id, messages = messages.len(), "Opening token stream");

        let mut stream = engine
            .stream_chat(messages)
            .await
            .map_err(|e| GenerationError::Stream(format!("{e:#}")))?;

        let mut tokens = 0usize;
        loop {
            if cancel.is_cancelled() {
                return Ok(cancelled_outcome(tokens));
            }

            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(cancelled_outcome(tokens)),
                chunk = stream.next() => chunk,
            };

            let Some(chunk) = chunk else { break };
            let chunk = chunk.map_err(|e| GenerationError::Stream(format!("{e:#}")))?;

            if let Some(text) = chunk.content() {
                on_token(text);
                tokens += 1;
            }
        }

        debug!(tokens, "Token stream finished");
        Ok(GenerationOutcome {
            tokens,
            cancelled: false,
        })
    }

    /// Cancels the in-flight `generate` call, if any.
    pub fn cancel(&self) {
        let active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        match active.as_ref() {
            Some(token) => token.cancel(),
            None => debug!("Cancel requested with no generation in flight"),
        }
    }

    fn begin_call(&self, token: CancelToken) -> Result<ActiveCall<'_>, GenerationError> {
        let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        if active.is_some() {
            return Err(GenerationError::Busy);
        }
        *active = Some(token);
        Ok(ActiveCall { slot: &self.active })
    }
}

/// Clears the in-flight slot when a `generate` call ends, however it ends.
struct ActiveCall<'a> {
    slot: &'a Mutex<Option<CancelToken>>,
}

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        let mut active = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        *active = None;
    }
}

fn cancelled_outcome(tokens: usize) -> GenerationOutcome {
    debug!(tokens, "Generation cancelled");
    GenerationOutcome {
        tokens,
        cancelled: true,
    }
}

/// Optional system message followed by the user prompt. An empty system prompt is
/// treated as absent.
pub fn build_messages(system_prompt: Option<&str>, prompt: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(prompt));
    messages
}
