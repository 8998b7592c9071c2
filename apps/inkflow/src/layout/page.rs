//! Paper geometry for the supported sheet sizes.
//!
//! All dimensions are in millimetres, portrait first (width × height).

use serde::{Deserialize, Serialize};


// ────────────────────────────────────────────────────────────────────────────
// Paper size / orientation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PaperSize {
    #[default]
    A4,
    A5,
    Letter,
    Legal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl PaperSize {
    /// Portrait `(width_mm, height_mm)`.
    pub fn portrait_mm(self) -> (f64, f64) {
        match self {
            PaperSize::A4 => (210.0, 297.0),
            PaperSize::A5 => (148.0, 210.0),
            PaperSize::Letter => (215.9, 279.4),
            PaperSize::Legal => (215.9, 355.6),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Page geometry
// ────────────────────────────────────────────────────────────────────────────

/// Physical page the guide rows are laid out on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width_mm: f64,
    pub height_mm: f64,
}

impl PageGeometry {
    pub fn new(paper: PaperSize, orientation: Orientation) -> Self {
        let (w, h) = paper.portrait_mm();
        match orientation {
            Orientation::Portrait => Self {
                width_mm: w,
                height_mm: h,
            },
            Orientation::Landscape => Self {
                width_mm: h,
                height_mm: w,
            },
        }
    }

    /// Number of whole guide rows of `guide_size_mm` that fit on the page.
    ///
    /// A guide taller than the page yields 0. Non-positive or non-finite sizes also
    /// yield 0, and so does a count too large for `u32`; it is never truncated.
    pub fn rows_per_page(&self, guide_size_mm: f64) -> u32 {
        if !(guide_size_mm.is_finite() && guide_size_mm > 0.0) {
            return 0;
        }
        let rows = (self.height_mm / guide_size_mm).floor();
        if !(0.0..=f64::from(u32::MAX)).contains(&rows) {
            return 0;
        }
        rows as u32
    }
}
