//! Snapshot persistence with field-by-field recovery.
//!
//! Stored snapshots may come from older builds or be hand-edited, so loading never fails:
//! a payload that is not a JSON object gives the default snapshot, and inside an object
//! every field that is missing, mistyped, or out of range falls back to its default on
//! its own. Unknown fields are ignored.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

use crate::models::snapshot::{is_valid_guide_size, is_valid_text_scale, Snapshot};
use crate::store::{KeyValueStore, StoreError};

/// Store key holding the serialized snapshot.
pub const STATE_KEY: &str = "inkflow_state";

pub fn save_snapshot(store: &dyn KeyValueStore, snapshot: &Snapshot) -> Result<(), StoreError> {
    let json = serde_json::to_string(snapshot)?;
    store.set(STATE_KEY, &json)
}

pub fn load_snapshot(store: &dyn KeyValueStore) -> Snapshot {
    match store.get(STATE_KEY) {
        Ok(Some(raw)) => snapshot_from_json(&raw),
        Ok(None) => Snapshot::default(),
        Err(e) => {
            warn!("Could not read saved sheet, using defaults: {e}");
            Snapshot::default()
        }
    }
}

/// Rebuilds a snapshot from stored JSON, defaulting each field that cannot be used.
pub fn snapshot_from_json(raw: &str) -> Snapshot {
    let map = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            warn!("Saved sheet is not a JSON object, using defaults");
            return Snapshot::default();
        }
        Err(e) => {
            warn!("Saved sheet is not valid JSON, using defaults: {e}");
            return Snapshot::default();
        }
    };

    let defaults = Snapshot::default();
    Snapshot {
        paper_size: field(&map, &["paperSize"]).unwrap_or(defaults.paper_size),
        orientation: field(&map, &["orientation"]).unwrap_or(defaults.orientation),
        // `guideSize` and `baselineOffset` are the keys older saves used.
        guide_size_mm: number(&map, &["guideSizeMm", "guideSize"])
            .filter(|v| is_valid_guide_size(*v))
            .unwrap_or(defaults.guide_size_mm),
        font_family: field(&map, &["fontFamily"]).unwrap_or(defaults.font_family),
        font_color: field(&map, &["fontColor"]).unwrap_or(defaults.font_color),
        guide_color: field(&map, &["guideColor"]).unwrap_or(defaults.guide_color),
        text: field(&map, &["text"]).unwrap_or(defaults.text),
        mode: field(&map, &["mode"]).unwrap_or(defaults.mode),
        show_guides: field(&map, &["showGuides"]).unwrap_or(defaults.show_guides),
        text_scale: number(&map, &["textScale"])
            .filter(|v| is_valid_text_scale(*v))
            .unwrap_or(defaults.text_scale),
        baseline_offset_mm: number(&map, &["baselineOffsetMm", "baselineOffset"])
            .filter(|v| v.is_finite())
            .unwrap_or(defaults.baseline_offset_mm),
    }
}

/// First of `keys` present in `map` that deserializes as `T`.
fn field<T: DeserializeOwned>(map: &Map<String, Value>, keys: &[&str]) -> Option<T> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .find_map(|value| serde_json::from_value(value.clone()).ok())
}

/// Like `field`, but also accepts numbers stored as strings (form inputs did that).
fn number(map: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .find_map(|value| match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::page::{Orientation, PaperSize};
    use crate::models::snapshot::PracticeMode;
    use crate::store::MemoryStore;

    #[test]
    fn test_round_trip_preserves_fields() {
        let store = MemoryStore::new();
        let snapshot = Snapshot {
            text: "Line one\n  indented ünïcödé".to_string(),
            guide_size_mm: 12.7,
            font_color: "#1e40af".to_string(),
            orientation: Orientation::Landscape,
            mode: PracticeMode::Sentences,
            ..Snapshot::default()
        };

        save_snapshot(&store, &snapshot).unwrap();
        let loaded = load_snapshot(&store);

        assert_eq!(loaded.text, snapshot.text);
        assert_eq!(loaded.guide_size_mm.to_bits(), snapshot.guide_size_mm.to_bits());
        assert_eq!(loaded.font_color, snapshot.font_color);
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_missing_record_gives_defaults() {
        assert_eq!(load_snapshot(&MemoryStore::new()), Snapshot::default());
    }

    #[test]
    fn test_malformed_payloads_give_defaults() {
        for raw in ["not json", "[1, 2, 3]", "42", "null", "{\"guideSizeMm\": "] {
            assert_eq!(snapshot_from_json(raw), Snapshot::default(), "payload {raw}");
        }
    }

    #[test]
    fn test_bad_fields_fall_back_individually() {
        let raw = r#"{
            "text": "keep me",
            "guideSizeMm": -3,
            "textScale": "1.8",
            "fontColor": 7,
            "paperSize": "B9",
            "showGuides": false,
            "somethingElse": {"nested": true}
        }"#;
        let loaded = snapshot_from_json(raw);
        let defaults = Snapshot::default();

        assert_eq!(loaded.text, "keep me");
        assert!(!loaded.show_guides);
        assert_eq!(loaded.guide_size_mm, defaults.guide_size_mm);
        assert_eq!(loaded.text_scale, defaults.text_scale);
        assert_eq!(loaded.font_color, defaults.font_color);
        assert_eq!(loaded.paper_size, PaperSize::A4);
    }

    #[test]
    fn test_tiny_guide_size_falls_back() {
        let loaded = snapshot_from_json(r#"{"guideSizeMm": 0.000000001, "text": "keep"}"#);
        assert_eq!(loaded.guide_size_mm, Snapshot::default().guide_size_mm);
        assert_eq!(loaded.text, "keep");
        assert_eq!(crate::layout::render_plan(&loaded).guide_rows.len(), 21);
    }

    #[test]
    fn test_legacy_keys_and_string_numbers() {
        let raw = r#"{"guideSize": "18", "baselineOffset": "3.5", "textScale": "0.75", "mode": "alphabet"}"#;
        let loaded = snapshot_from_json(raw);
        assert_eq!(loaded.guide_size_mm, 18.0);
        assert_eq!(loaded.baseline_offset_mm, 3.5);
        assert_eq!(loaded.text_scale, 0.75);
        assert_eq!(loaded.mode, PracticeMode::Alphabet);
    }

    #[test]
    fn test_current_key_wins_over_legacy_key() {
        let loaded = snapshot_from_json(r#"{"guideSizeMm": 10, "guideSize": 20}"#);
        assert_eq!(loaded.guide_size_mm, 10.0);
    }

    #[test]
    fn test_corrupt_stored_record_gives_defaults() {
        let store = MemoryStore::new();
        store.set(STATE_KEY, "{{{{").unwrap();
        assert_eq!(load_snapshot(&store), Snapshot::default());
    }
}
