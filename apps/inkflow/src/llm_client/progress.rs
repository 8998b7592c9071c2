//! Model-initialization progress.
//!
//! Engines report progress in one of two shapes: an object with a fractional
//! `progress` field, or a bare fraction. Both are normalized here into a
//! whole-number percentage before anything else sees them.

use serde::Deserialize;

/// Raw progress signal as emitted by an engine backend.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InitProgress {
    Report { progress: f64 },
    Fraction(f64),
}

impl InitProgress {
    pub fn fraction(self) -> f64 {
        match self {
            InitProgress::Report { progress } => progress,
            InitProgress::Fraction(f) => f,
        }
    }

    /// `floor(fraction * 100)` clamped to `0..=100`. NaN maps to 0.
    pub fn percent(self) -> u8 {
        let pct = (self.fraction() * 100.0).floor();
        if pct.is_nan() {
            0
        } else {
            pct.clamp(0.0, 100.0) as u8
        }
    }
}

/// Forwards percentages to a callback, dropping any that would move backwards.
pub struct ProgressTracker<'a> {
    last: Option<u8>,
    sink: Option<&'a mut (dyn FnMut(u8) + Send)>,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(sink: Option<&'a mut (dyn FnMut(u8) + Send)>) -> Self {
        Self { last: None, sink }
    }

    pub fn report(&mut self, signal: InitProgress) {
        let pct = signal.percent();
        if self.last.is_some_and(|last| pct < last) {
            return;
        }
        self.last = Some(pct);
        if let Some(sink) = self.sink.as_deref_mut() {
            sink(pct);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_shapes_deserialize() {
        let report: InitProgress = serde_json::from_str(r#"{"progress": 0.42, "text": "x"}"#).unwrap();
        let bare: InitProgress = serde_json::from_str("0.42").unwrap();
        assert_eq!(report.percent(), 42);
        assert_eq!(bare.percent(), 42);
    }

    #[test]
    fn test_percent_floors_and_clamps() {
        assert_eq!(InitProgress::Fraction(0.999).percent(), 99);
        assert_eq!(InitProgress::Fraction(1.0).percent(), 100);
        assert_eq!(InitProgress::Fraction(1.7).percent(), 100);
        assert_eq!(InitProgress::Fraction(-0.2).percent(), 0);
        assert_eq!(InitProgress::Fraction(f64::NAN).percent(), 0);
    }

    #[test]
    fn test_tracker_is_monotonic() {
        let mut seen = Vec::new();
        let mut sink = |p: u8| seen.push(p);
        {
            let mut tracker = ProgressTracker::new(Some(&mut sink));
            for f in [0.1, 0.3, 0.2, 0.3, 0.9, 0.5, 1.0] {
                tracker.report(InitProgress::Fraction(f));
            }
        }
        assert_eq!(seen, vec![10, 30, 30, 90, 100]);
    }

    #[test]
    fn test_tracker_without_sink_still_filters() {
        let mut tracker = ProgressTracker::new(None);
        tracker.report(InitProgress::Report { progress: 0.5 });
        tracker.report(InitProgress::Fraction(0.2));
        assert_eq!(tracker.last, Some(50));
    }
}
