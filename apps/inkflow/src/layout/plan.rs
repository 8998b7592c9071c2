//! Render plan — the full geometric description of one practice sheet.
//!
//! `render_plan` is a pure function of the snapshot: no I/O, no errors, and two calls on
//! the same snapshot produce equal plans. The plan is rebuilt from scratch on every
//! call; callers swap the whole value so a half-updated sheet is never visible.
//!
//! Word wrapping and page breaks belong to the rendering surface. The text block only
//! states the typography and insets the surface should honour.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::layout::guides::{guide_rows, GuideRow};
use crate::layout::page::PageGeometry;
use crate::models::snapshot::Snapshot;

/// Horizontal inset of the text layer, applied to both sides.
pub const TEXT_INSET_X_MM: f64 = 10.0;
/// Top inset that lands the first text line on the first baseline rule.
pub const TEXT_INSET_TOP_MM: f64 = 1.0;
/// Generic family the surface falls back to when the practice font is missing.
pub const FALLBACK_FONT_FAMILY: &str = "monospace";

// ────────────────────────────────────────────────────────────────────────────
// Plan types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Insets {
    pub left_mm: f64,
    pub right_mm: f64,
    pub top_mm: f64,
}

/// How the surface should treat whitespace and long words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WrapPolicy {
    /// Keep newlines and runs of spaces, wrap at word boundaries, break long words.
    PreWrapBreakWords,
}

/// The text overlay drawn on top of the guides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub content: String,
    pub font_family: String,
    pub fallback_family: String,
    pub font_size_mm: f64,
    pub line_height_mm: f64,
    pub color: String,
    /// Vertical translation of the whole block.
    pub offset_y_mm: f64,
    pub insets: Insets,
    pub wrap: WrapPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderPlan {
    pub page: PageGeometry,
    /// Rows that fit on the page, whether or not guides are drawn.
    pub rows_per_page: u32,
    pub show_guides: bool,
    pub guide_rows: Vec<GuideRow>,
    pub text: TextBlock,
}

// ────────────────────────────────────────────────────────────────────────────
// Engine
// ────────────────────────────────────────────────────────────────────────────

/// Converts a snapshot into a render plan.
///
/// Mode-agnostic: alphabet and repeat-letter text must already be applied to
/// `snapshot.text`.
pub fn render_plan(snapshot: &Snapshot) -> RenderPlan {
    let page = PageGeometry::new(snapshot.paper_size, snapshot.orientation);
    let line_height_mm = snapshot.guide_size_mm;
    let rows_per_page = page.rows_per_page(line_height_mm);

    let rows = if snapshot.show_guides {
        guide_rows(rows_per_page, line_height_mm, &snapshot.guide_color)
    } else {
        Vec::new()
    };

    let text = TextBlock {
        content: snapshot.text.clone(),
        font_family: snapshot.font_family.clone(),
        fallback_family: FALLBACK_FONT_FAMILY.to_string(),
        font_size_mm: snapshot.font_size_mm(),
        line_height_mm,
        color: snapshot.font_color.clone(),
        offset_y_mm: snapshot.baseline_offset_mm,
        insets: Insets {
            left_mm: TEXT_INSET_X_MM,
            right_mm: TEXT_INSET_X_MM,
            top_mm: TEXT_INSET_TOP_MM,
        },
        wrap: WrapPolicy::PreWrapBreakWords,
    };

    trace!(
        rows = rows_per_page,
        guides = snapshot.show_guides,
        chars = snapshot.text.chars().count(),
        "render plan built"
    );

    RenderPlan {
        page,
        rows_per_page,
        show_guides: snapshot.show_guides,
        guide_rows: rows,
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::page::{Orientation, PaperSize};

    fn snapshot_with_guide(guide_size_mm: f64) -> Snapshot {
        Snapshot {
            guide_size_mm,
            ..Snapshot::default()
        }
    }

    // ── rows ────────────────────────────────────────────────────────────────

    #[test]
    fn test_default_snapshot_has_21_rows() {
        let plan = render_plan(&Snapshot::default());
        assert_eq!(plan.rows_per_page, 21);
        assert_eq!(plan.guide_rows.len(), 21);
    }

    #[test]
    fn test_rows_match_floor_of_page_height() {
        for guide in [5.0, 7.5, 9.0, 14.0, 20.0, 33.3, 150.0] {
            let plan = render_plan(&snapshot_with_guide(guide));
            assert_eq!(
                plan.rows_per_page,
                (297.0_f64 / guide).floor() as u32,
                "guide {guide}"
            );
        }
    }

    #[test]
    fn test_oversized_guide_renders_no_rows() {
        let plan = render_plan(&snapshot_with_guide(300.0));
        assert_eq!(plan.rows_per_page, 0);
        assert!(plan.guide_rows.is_empty());
        assert_eq!(plan.text.line_height_mm, 300.0);
    }

    #[test]
    fn test_landscape_uses_short_edge() {
        let snapshot = Snapshot {
            orientation: Orientation::Landscape,
            paper_size: PaperSize::A4,
            ..Snapshot::default()
        };
        assert_eq!(render_plan(&snapshot).rows_per_page, 15);
    }

    #[test]
    fn test_hidden_guides_emit_no_rows() {
        let snapshot = Snapshot {
            show_guides: false,
            ..Snapshot::default()
        };
        let plan = render_plan(&snapshot);
        assert_eq!(plan.rows_per_page, 21);
        assert!(plan.guide_rows.is_empty());
    }

    #[test]
    fn test_rows_carry_guide_color() {
        let snapshot = Snapshot {
            guide_color: "#ff0000".to_string(),
            ..Snapshot::default()
        };
        let plan = render_plan(&snapshot);
        assert!(plan.guide_rows.iter().all(|r| r.color == "#ff0000"));
        assert!(plan.guide_rows.iter().all(|r| r.height_mm == 14.0));
    }

    // ── text block ──────────────────────────────────────────────────────────

    #[test]
    fn test_font_size_is_guide_times_scale() {
        let snapshot = Snapshot {
            guide_size_mm: 14.0,
            text_scale: 0.8,
            ..Snapshot::default()
        };
        let plan = render_plan(&snapshot);
        assert_eq!(plan.text.font_size_mm, 14.0 * 0.8);
        assert!((plan.text.font_size_mm - 11.2).abs() < 1e-12);
    }

    #[test]
    fn test_text_block_typography() {
        let snapshot = Snapshot {
            font_family: "Playwrite".to_string(),
            font_color: "#123456".to_string(),
            baseline_offset_mm: -1.5,
            ..Snapshot::default()
        };
        let text = render_plan(&snapshot).text;
        assert_eq!(text.font_family, "Playwrite");
        assert_eq!(text.fallback_family, "monospace");
        assert_eq!(text.color, "#123456");
        assert_eq!(text.offset_y_mm, -1.5);
        assert_eq!(text.line_height_mm, 14.0);
        assert_eq!(text.insets.left_mm, 10.0);
        assert_eq!(text.insets.right_mm, 10.0);
        assert_eq!(text.insets.top_mm, 1.0);
    }

    #[test]
    fn test_empty_text_still_renders() {
        let snapshot = Snapshot {
            text: String::new(),
            ..Snapshot::default()
        };
        let plan = render_plan(&snapshot);
        assert_eq!(plan.text.content, "");
        assert_eq!(plan.guide_rows.len(), 21);
    }

    // ── determinism ─────────────────────────────────────────────────────────

    #[test]
    fn test_render_is_idempotent() {
        let snapshot = Snapshot::default();
        assert_eq!(render_plan(&snapshot), render_plan(&snapshot));
    }

    #[test]
    fn test_render_does_not_touch_snapshot() {
        let snapshot = Snapshot::default();
        let before = snapshot.clone();
        let _ = render_plan(&snapshot);
        assert_eq!(snapshot, before);
    }
}
