//! Sheet session — the caller-side owner of the snapshot.
//!
//! Every mutation goes through the session so the snapshot is persisted and a fresh
//! render plan is produced in one step. Generated text streams into the snapshot token
//! by token; the caller is handed the accumulated text after each one.

pub mod persist;
pub mod prompts;

use std::sync::Arc;

use tracing::{info, warn};

use crate::errors::AppError;
use crate::layout::plan::{render_plan, RenderPlan};
use crate::llm_client::{CancelToken, GenerateOptions, GenerationClient, GenerationOutcome};
use crate::models::snapshot::{is_valid_guide_size, is_valid_text_scale, PracticeMode, Snapshot};
use crate::sheet::persist::{load_snapshot, save_snapshot};
use crate::sheet::prompts::{build_practice_prompt, PRACTICE_SYSTEM};
use crate::store::{KeyValueStore, StoreError};

pub struct SheetSession {
    store: Arc<dyn KeyValueStore>,
    snapshot: Snapshot,
}

impl SheetSession {
    /// Opens a session on the snapshot saved in `store`, or the defaults.
    pub fn open(store: Arc<dyn KeyValueStore>) -> Self {
        let snapshot = load_snapshot(store.as_ref());
        info!(
            mode = ?snapshot.mode,
            guide_mm = snapshot.guide_size_mm,
            "Sheet session opened"
        );
        Self { store, snapshot }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn render(&self) -> RenderPlan {
        render_plan(&self.snapshot)
    }

    pub fn save(&self) -> Result<(), StoreError> {
        save_snapshot(self.store.as_ref(), &self.snapshot)
    }

    /// Applies `change`, persists, and returns the new plan.
    ///
    /// A guide size or text scale outside its valid range keeps its previous value.
    pub fn update<F>(&mut self, change: F) -> Result<RenderPlan, StoreError>
    where
        F: FnOnce(&mut Snapshot),
    {
        let guide_size_mm = self.snapshot.guide_size_mm;
        let text_scale = self.snapshot.text_scale;
        change(&mut self.snapshot);

        if !is_valid_guide_size(self.snapshot.guide_size_mm) {
            warn!(rejected = self.snapshot.guide_size_mm, "Guide size out of range");
            self.snapshot.guide_size_mm = guide_size_mm;
        }
        if !is_valid_text_scale(self.snapshot.text_scale) {
            warn!(rejected = self.snapshot.text_scale, "Text scale out of range");
            self.snapshot.text_scale = text_scale;
        }
        self.save()?;
        Ok(self.render())
    }

    pub fn set_text(&mut self, text: impl Into<String>) -> Result<RenderPlan, StoreError> {
        let text = text.into();
        self.update(|s| s.text = text)
    }

    /// Switches mode. Alphabet and repeat-letter rewrite the text before rendering.
    pub fn set_mode(&mut self, mode: PracticeMode) -> Result<RenderPlan, StoreError> {
        self.update(|s| s.apply_mode(mode))
    }

    /// Fills the sheet with generated practice sentences about `topic`.
    ///
    /// Loads the model first when the client is not ready. `on_update` receives the
    /// accumulated text after every token. A cancelled run keeps the partial text; a run
    /// that fails, or is cancelled before any token arrives, restores the previous text.
    /// The snapshot is saved only on success.
    pub async fn generate_practice_text<F>(
        &mut self,
        client: &mut GenerationClient,
        topic: &str,
        cancel: CancelToken,
        on_progress: Option<&mut (dyn FnMut(u8) + Send)>,
        mut on_update: F,
    ) -> Result<GenerationOutcome, AppError>
    where
        F: FnMut(&str),
    {
        if !client.is_ready() {
            client.load(None, on_progress).await?;
        }

        let prompt = build_practice_prompt(topic);
        let options = GenerateOptions {
            system_prompt: Some(PRACTICE_SYSTEM.to_string()),
            cancel: Some(cancel),
        };

        let previous = std::mem::take(&mut self.snapshot.text);
        let text = &mut self.snapshot.text;
        let result = client
            .generate(&prompt, options, |token| {
                text.push_str(token);
                on_update(text.as_str());
            })
            .await;

        match result {
            Ok(outcome) if outcome.tokens == 0 && outcome.cancelled => {
                self.snapshot.text = previous;
                info!("Generation cancelled before any text arrived");
                Ok(outcome)
            }
            Ok(outcome) => {
                self.save()?;
                info!(
                    tokens = outcome.tokens,
                    cancelled = outcome.cancelled,
                    "Practice text generated"
                );
                Ok(outcome)
            }
            Err(e) => {
                self.snapshot.text = previous;
                warn!("Practice text generation failed: {e}");
                Err(e.into())
            }
        }
    }
}
