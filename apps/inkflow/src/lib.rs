//! inkflow — printable handwriting practice sheets.
//!
//! - `layout` turns a configuration snapshot into a render plan (guide rows + text block).
//! - `llm_client` loads a local text generator and streams practice text from it.
//! - `sheet` owns the snapshot on the caller's side and keeps it persisted.

pub mod config;
pub mod errors;
pub mod layout;
pub mod llm_client;
pub mod models;
pub mod sheet;
pub mod store;

pub use errors::AppError;
pub use layout::{render_plan, RenderPlan};
pub use llm_client::{CancelToken, GenerationClient, GenerationError};
pub use models::snapshot::{PracticeMode, Snapshot};
pub use sheet::SheetSession;
