//! Validation and normalisation of decoded item candidates.

use serde_json::{Map, Value};

use crate::models::{Demographic, IconCategory, ItemCategory, RecognizedItem, parse_or_default};

pub const DEFAULT_MIN_CONFIDENCE: u8 = 6;

const MAX_NAME_CHARS: usize = 100;
const MAX_BRAND_CHARS: usize = 60;
const MAX_COLOR_CHARS: usize = 30;
const MAX_QUERY_CHARS: usize = 200;
const MAX_FEATURES: usize = 5;
const MAX_FEATURE_CHARS: usize = 40;

pub(crate) const NAME_KEYS: &[&str] = &["name", "productName", "product_name"];
pub(crate) const ICON_KEYS: &[&str] = &["iconCategory", "icon_category", "icon"];
pub(crate) const CATEGORY_KEYS: &[&str] = &["category", "productCategory", "product_category"];

/// Turns raw decoded objects into `RecognizedItem`s, dropping low-confidence ones.
#[derive(Debug, Clone, Copy)]
pub struct ItemSanitizer {
    min_confidence: u8,
}

impl Default for ItemSanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CONFIDENCE)
    }
}

impl ItemSanitizer {
    pub fn new(min_confidence: u8) -> Self {
        Self {
            min_confidence: min_confidence.clamp(1, 10),
        }
    }

    pub fn min_confidence(&self) -> u8 {
        self.min_confidence
    }

    /// Returns `None` when the candidate should be discarded.
    pub fn sanitize(&self, raw: &Map<String, Value>) -> Option<RecognizedItem> {
        let name = text(raw, NAME_KEYS, MAX_NAME_CHARS)?;
        let confidence = confidence(raw)?;
        if confidence < self.min_confidence {
            tracing::debug!(name = %name, confidence, "Discarding low-confidence item");
            return None;
        }

        let search_query = text(raw, &["searchQuery", "search_query", "query"], MAX_QUERY_CHARS)
            .unwrap_or_else(|| name.clone());

        Some(RecognizedItem {
            category: parse_or_default::<ItemCategory>(str_field(raw, CATEGORY_KEYS)),
            icon_category: parse_or_default::<IconCategory>(str_field(raw, ICON_KEYS)),
            brand: text(raw, &["brand"], MAX_BRAND_CHARS),
            primary_color: text(raw, &["primaryColor", "primary_color", "color"], MAX_COLOR_CHARS),
            secondary_color: text(raw, &["secondaryColor", "secondary_color"], MAX_COLOR_CHARS),
            features: features(raw),
            target_demographic: parse_or_default::<Demographic>(str_field(
                raw,
                &["targetDemographic", "target_demographic", "demographic", "gender"],
            )),
            search_query,
            confidence,
            name,
        })
    }
}

/// Whether an object carries the three identifying keys of an item
pub(crate) fn is_item_candidate(raw: &Map<String, Value>) -> bool {
    [NAME_KEYS, ICON_KEYS, CATEGORY_KEYS]
        .iter()
        .all(|keys| keys.iter().any(|k| raw.contains_key(*k)))
}

fn field<'a>(raw: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| raw.get(*k)).filter(|v| !v.is_null())
}

fn str_field<'a>(raw: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    field(raw, keys).and_then(Value::as_str)
}

fn text(raw: &Map<String, Value>, keys: &[&str], max_chars: usize) -> Option<String> {
    str_field(raw, keys)
        .map(|s| truncate(s.trim(), max_chars))
        .filter(|s| !s.is_empty())
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect::<String>().trim_end().to_string()
}

fn confidence(raw: &Map<String, Value>) -> Option<u8> {
    let value = field(raw, &["confidence"])?;
    let number = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    Some(number.clamp(1, 10) as u8)
}

fn features(raw: &Map<String, Value>) -> Vec<String> {
    let Some(Value::Array(items)) = field(raw, &["features", "tags"]) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_str)
        .map(|s| truncate(s.trim(), MAX_FEATURE_CHARS))
        .filter(|s| !s.is_empty())
        .take(MAX_FEATURES)
        .collect()
}
