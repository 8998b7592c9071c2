//! Guide rows — the ruled pattern printed under the practice text.
//!
//! Each row is `guide_size_mm` tall and carries three horizontal rules:
//! a solid top line, a dashed midline, and a solid baseline at the bottom.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Top,
    Middle,
    Baseline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStyle {
    Solid,
    Dashed,
}

/// One horizontal rule inside a guide row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuideRule {
    pub kind: RuleKind,
    pub style: LineStyle,
    /// Offset from the top of the row.
    pub offset_mm: f64,
    /// Offset from the top of the page.
    pub page_y_mm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuideRow {
    pub index: u32,
    pub top_mm: f64,
    pub height_mm: f64,
    pub color: String,
    pub rules: [GuideRule; 3],
}

/// Builds the row at `index`, stacked from the top of the page.
pub fn guide_row(index: u32, height_mm: f64, color: &str) -> GuideRow {
    let top_mm = f64::from(index) * height_mm;
    let rule = |kind, style, offset_mm: f64| GuideRule {
        kind,
        style,
        offset_mm,
        page_y_mm: top_mm + offset_mm,
    };

    GuideRow {
        index,
        top_mm,
        height_mm,
        color: color.to_string(),
        rules: [
            rule(RuleKind::Top, LineStyle::Solid, 0.0),
            rule(RuleKind::Middle, LineStyle::Dashed, height_mm / 2.0),
            rule(RuleKind::Baseline, LineStyle::Solid, height_mm),
        ],
    }
}

/// Builds `count` consecutive rows.
pub fn guide_rows(count: u32, height_mm: f64, color: &str) -> Vec<GuideRow> {
    (0..count).map(|i| guide_row(i, height_mm, color)).collect()
}
