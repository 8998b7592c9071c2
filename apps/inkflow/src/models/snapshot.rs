//! Configuration Snapshot — the complete set of values needed to render one practice sheet.
//!
//! The snapshot is plain data. The layout engine reads it and never mutates it; the
//! sheet session owns the only mutable copy and persists it after every change.

use serde::{Deserialize, Serialize};

use crate::layout::page::{Orientation, PaperSize};

// ────────────────────────────────────────────────────────────────────────────
// Defaults
// ────────────────────────────────────────────────────────────────────────────

pub const DEFAULT_GUIDE_SIZE_MM: f64 = 14.0;
pub const DEFAULT_TEXT_SCALE: f64 = 0.8;
pub const DEFAULT_BASELINE_OFFSET_MM: f64 = 2.0;
pub const DEFAULT_FONT_FAMILY: &str = "Raleway Dots";
pub const DEFAULT_FONT_COLOR: &str = "#000000";
pub const DEFAULT_GUIDE_COLOR: &str = "#9ca3af";
pub const DEFAULT_TEXT: &str = "The quick brown fox jumps over the lazy dog.";

/// Fixed text written by [`PracticeMode::Alphabet`]: uppercase row, newline, lowercase row.
pub const ALPHABET_TEXT: &str = "A B C D E F G H I J K L M N O P Q R S T U V W X Y Z\n\
                                 a b c d e f g h i j k l m n o p q r s t u v w x y z";

/// How many times [`PracticeMode::RepeatLetter`] repeats its letter.
pub const REPEAT_LETTER_COUNT: usize = 50;

/// Smallest guide row height accepted from storage or the host. Finer guides are not
/// writable and would put an unbounded number of rows on the page.
pub const MIN_GUIDE_SIZE_MM: f64 = 1.0;

// ────────────────────────────────────────────────────────────────────────────
// Practice mode
// ────────────────────────────────────────────────────────────────────────────

/// Where the practice text comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PracticeMode {
    /// Free text typed by the user.
    #[default]
    Custom,
    /// Sentences, usually produced by the generator.
    Sentences,
    /// Fixed upper + lower case alphabet.
    Alphabet,
    /// A single letter repeated across the sheet.
    RepeatLetter,
}

impl PracticeMode {
    /// Returns the text this mode forces onto the sheet, if any.
    ///
    /// Custom and sentence modes keep whatever text is already there.
    pub fn forced_text(self, current: &str) -> Option<String> {
        match self {
            PracticeMode::Alphabet => Some(ALPHABET_TEXT.to_string()),
            PracticeMode::RepeatLetter => Some(repeat_letter(current)),
            PracticeMode::Custom | PracticeMode::Sentences => None,
        }
    }
}

/// Repeats the first non-whitespace character of `text` (or `A`) space-separated.
pub fn repeat_letter(text: &str) -> String {
    let letter = text.trim().chars().next().unwrap_or('A');
    vec![letter.to_string(); REPEAT_LETTER_COUNT].join(" ")
}

// ────────────────────────────────────────────────────────────────────────────
// Snapshot
// ────────────────────────────────────────────────────────────────────────────

/// Current rendering and generation parameters.
///
/// Invariants: `guide_size_mm >= MIN_GUIDE_SIZE_MM`, `0 < text_scale <= 1`. Values
/// loaded from storage are checked by `sheet::persist` and updates by `SheetSession`;
/// a snapshot built by hand is the caller's responsibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub paper_size: PaperSize,
    pub orientation: Orientation,
    /// Height of one guide row in millimetres.
    pub guide_size_mm: f64,
    pub font_family: String,
    pub font_color: String,
    pub guide_color: String,
    pub text: String,
    pub mode: PracticeMode,
    pub show_guides: bool,
    /// Font size as a fraction of the guide row height.
    pub text_scale: f64,
    /// Vertical nudge applied to the whole text layer.
    pub baseline_offset_mm: f64,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            paper_size: PaperSize::A4,
            orientation: Orientation::Portrait,
            guide_size_mm: DEFAULT_GUIDE_SIZE_MM,
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            font_color: DEFAULT_FONT_COLOR.to_string(),
            guide_color: DEFAULT_GUIDE_COLOR.to_string(),
            text: DEFAULT_TEXT.to_string(),
            mode: PracticeMode::Custom,
            show_guides: true,
            text_scale: DEFAULT_TEXT_SCALE,
            baseline_offset_mm: DEFAULT_BASELINE_OFFSET_MM,
        }
    }
}

impl Snapshot {
    /// Font size derived from the guide height. Not rounded.
    pub fn font_size_mm(&self) -> f64 {
        self.guide_size_mm * self.text_scale
    }

    /// Switches practice mode, rewriting `text` when the mode dictates it.
    pub fn apply_mode(&mut self, mode: PracticeMode) {
        self.mode = mode;
        if let Some(text) = mode.forced_text(&self.text) {
            self.text = text;
        }
    }
}

pub fn is_valid_guide_size(mm: f64) -> bool {
    mm.is_finite() && mm >= MIN_GUIDE_SIZE_MM
}

pub fn is_valid_text_scale(scale: f64) -> bool {
    scale.is_finite() && scale > 0.0 && scale <= 1.0
}
