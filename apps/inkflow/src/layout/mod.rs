// Layout/render engine: snapshot in, render plan out. Pure and synchronous.

pub mod guides;
pub mod page;
pub mod plan;

// Re-export the public API consumed by the sheet session and the host.
pub use guides::{GuideRow, GuideRule, LineStyle, RuleKind};
pub use page::{Orientation, PageGeometry, PaperSize};
pub use plan::{render_plan, RenderPlan, TextBlock};
