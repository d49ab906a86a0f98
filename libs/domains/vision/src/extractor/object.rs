//! Incremental extraction of recognized items from a streamed JSON-ish text.
//!
//! The model is asked for JSON but its output arrives in fragments that never
//! line up with object boundaries, and it may wrap objects in arrays, prose or
//! code fences. The extractor keeps a single forward cursor over its buffer and
//! a stack of open-brace offsets. Every time a `}` balances an open brace the
//! enclosed span is decoded; qualifying objects are emitted and everything up
//! to the end of the span is dropped from the buffer, together with any
//! enclosing braces, so a wrapper can never re-emit its children.
//!
//! A brace whose text can no longer be JSON (a raw control character inside a
//! string, or a stray word between tokens) is abandoned: the scan restarts just
//! after the oldest open brace with fresh string state. Restart points only move
//! forward, so a truncated object or prose such as `{like 12" pizzas}` costs one
//! rescan instead of every later record.

use serde_json::Value;

use super::sanitize::{ItemSanitizer, is_item_candidate};
use crate::models::RecognizedItem;

#[derive(Debug, Default)]
pub struct ObjectExtractor {
    buffer: String,
    /// Next byte of `buffer` to scan
    cursor: usize,
    /// Offsets of unmatched `{` (outside strings)
    open: Vec<usize>,
    in_string: bool,
    escaped: bool,
    sanitizer: ItemSanitizer,
    emitted: usize,
}

impl ObjectExtractor {
    pub fn new(sanitizer: ItemSanitizer) -> Self {
        Self {
            sanitizer,
            ..Self::default()
        }
    }

    /// Feed one fragment, returning every item completed by it, in text order.
    pub fn parse(&mut self, fragment: &str) -> Vec<RecognizedItem> {
        self.buffer.push_str(fragment);

        let mut items = Vec::new();

        while self.cursor < self.buffer.len() {
            let pos = self.cursor;
            let byte = self.buffer.as_bytes()[pos];
            self.cursor += 1;

            if self.in_string {
                match byte {
                    _ if byte < 0x20 => self.abandon(),
                    _ if self.escaped => self.escaped = false,
                    b'\\' => self.escaped = true,
                    b'"' => self.in_string = false,
                    _ => {}
                }
                continue;
            }

            // Prose outside any object is skipped, stray quotes included.
            if self.open.is_empty() {
                if byte == b'{' {
                    self.open.push(pos);
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' => self.open.push(pos),
                b'}' => {
                    let Some(start) = self.open.pop() else {
                        continue;
                    };
                    let before = items.len();
                    self.decode_span(start, pos + 1, &mut items);
                    if items.len() > before {
                        // Enclosing braces belong to already-consumed text now.
                        self.open.clear();
                    }
                }
                _ if is_json_token_byte(byte) => {}
                _ => self.abandon(),
            }
        }

        self.compact();
        self.emitted += items.len();
        items
    }

    /// Items emitted so far
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Bytes currently retained
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn decode_span(&self, start: usize, end: usize, out: &mut Vec<RecognizedItem>) {
        // Incomplete or malformed spans are expected mid-stream.
        let Ok(value) = serde_json::from_str::<Value>(&self.buffer[start..end]) else {
            return;
        };
        match value {
            Value::Object(map) if is_item_candidate(&map) => {
                out.extend(self.sanitizer.sanitize(&map));
            }
            Value::Object(map) => {
                for list in map.values().filter_map(Value::as_array) {
                    self.decode_list(list, out);
                }
            }
            _ => {}
        }
    }

    fn decode_list(&self, list: &[Value], out: &mut Vec<RecognizedItem>) {
        out.extend(
            list.iter()
                .filter_map(Value::as_object)
                .filter(|map| is_item_candidate(map))
                .filter_map(|map| self.sanitizer.sanitize(map)),
        );
    }

    /// Give up on every open brace and rescan from just after the oldest one.
    fn abandon(&mut self) {
        if let Some(&oldest) = self.open.first() {
            self.cursor = oldest + 1;
        }
        self.open.clear();
        self.in_string = false;
        self.escaped = false;
    }

    /// Drop text that can no longer contribute to a future object: everything
    /// before the oldest open brace, or all scanned text when none is open.
    fn compact(&mut self) {
        let drop_to = self.open.first().copied().unwrap_or(self.cursor);
        if drop_to == 0 {
            return;
        }
        self.buffer.drain(..drop_to);
        self.cursor -= drop_to;
        for offset in &mut self.open {
            *offset -= drop_to;
        }
    }
}

/// Bytes that may sit between tokens of a JSON object, outside strings.
fn is_json_token_byte(byte: u8) -> bool {
    matches!(
        byte,
        b' ' | b'\t' | b'\n' | b'\r' | b'[' | b']' | b':' | b',' | b'-' | b'+' | b'.'
    ) || byte.is_ascii_digit()
        // Letters of `true`, `false`, `null` and exponents
        || matches!(byte, b't' | b'r' | b'u' | b'e' | b'E' | b'f' | b'a' | b'l' | b's' | b'n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IconCategory, ItemCategory};

    const MUG: &str = r#"{"name":"Red Mug","iconCategory":"mug","category":"kitchen_dining","brand":"Acme","primaryColor":"red","features":["ceramic"],"targetDemographic":"unisex","searchQuery":"red mug","confidence":8}"#;
    const SHOE: &str = r#"{"name":"Trail Shoe","iconCategory":"shoe","category":"footwear","confidence":9,"features":["waterproof {gore}"]}"#;
    const BLURRY: &str = r#"{"name":"Blurry","iconCategory":"other","category":"other","confidence":3}"#;

    fn names(items: &[RecognizedItem]) -> Vec<&str> {
        items.iter().map(|i| i.name.as_str()).collect()
    }

    fn feed_all(extractor: &mut ObjectExtractor, fragments: &[&str]) -> Vec<RecognizedItem> {
        fragments.iter().flat_map(|f| extractor.parse(f)).collect()
    }

    #[test]
    fn test_single_fragment_object() {
        let mut extractor = ObjectExtractor::default();
        let items = extractor.parse(MUG);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Red Mug");
        assert_eq!(items[0].icon_category, IconCategory::Mug);
        assert_eq!(items[0].category, ItemCategory::KitchenDining);
        assert_eq!(items[0].confidence, 8);
        assert_eq!(extractor.buffered(), 0);
    }

    #[test]
    fn test_low_confidence_never_emitted() {
        let mut extractor = ObjectExtractor::default();
        assert!(extractor.parse(BLURRY).is_empty());
    }

    #[test]
    fn test_fragmentation_invariance() {
        let text = format!("Here you go:\n```json\n[{MUG},\n{SHOE}\n]\n```");
        let whole = ObjectExtractor::default().parse(&text);
        assert_eq!(names(&whole), vec!["Red Mug", "Trail Shoe"]);

        for size in 1..=17 {
            let mut extractor = ObjectExtractor::default();
            let bytes: Vec<char> = text.chars().collect();
            let fragments: Vec<String> = bytes
                .chunks(size)
                .map(|chunk| chunk.iter().collect())
                .collect();
            let refs: Vec<&str> = fragments.iter().map(String::as_str).collect();
            let items = feed_all(&mut extractor, &refs);
            assert_eq!(items, whole, "fragment size {size}");
        }
    }

    #[test]
    fn test_emits_only_when_object_completes() {
        let mut extractor = ObjectExtractor::default();
        let (head, tail) = MUG.split_at(40);
        assert!(extractor.parse(head).is_empty());
        let items = extractor.parse(tail);
        assert_eq!(names(&items), vec!["Red Mug"]);
    }

    #[test]
    fn test_wrapper_object_does_not_reemit_children() {
        let text = format!(r#"{{"items":[{MUG},{SHOE}],"count":2}}"#);
        let mut extractor = ObjectExtractor::default();
        let items = extractor.parse(&text);
        assert_eq!(names(&items), vec!["Red Mug", "Trail Shoe"]);
        assert!(extractor.parse("\n").is_empty());
        assert_eq!(extractor.emitted(), 2);
    }

    #[test]
    fn test_list_wrapper_skips_rejected_children() {
        let text = format!(r#"{{"items":[{BLURRY},{MUG}]}}"#);
        let mut extractor = ObjectExtractor::default();
        let items = extractor.parse(&text);
        assert_eq!(names(&items), vec!["Red Mug"]);
        assert_eq!(extractor.buffered(), 0);
    }

    #[test]
    fn test_no_duplicate_on_repeated_feed() {
        let mut extractor = ObjectExtractor::default();
        let first = extractor.parse(MUG);
        let second = extractor.parse("");
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        let third = extractor.parse(MUG);
        assert_eq!(third.len(), 1, "identical later text is a new record");
    }

    #[test]
    fn test_malformed_input_terminates_and_recovers() {
        let mut extractor = ObjectExtractor::default();
        assert!(extractor.parse(r#"{"name": oops }} }{ bad"#).is_empty());
        // Neither malformed brace survives to swallow the next object.
        let items = extractor.parse(&format!("\n{SHOE}"));
        assert_eq!(names(&items), vec!["Trail Shoe"]);
    }

    #[test]
    fn test_braces_inside_strings_ignored() {
        let mut extractor = ObjectExtractor::default();
        let items = extractor.parse(SHOE);
        assert_eq!(items[0].features, vec!["waterproof {gore}"]);
    }

    #[test]
    fn test_escaped_quotes_inside_strings() {
        let text = r#"{"name":"12\" Pizza {XL}","iconCategory":"food","category":"food_beverage","confidence":7}"#;
        let mut extractor = ObjectExtractor::default();
        let mut items = Vec::new();
        for ch in text.chars() {
            items.extend(extractor.parse(&ch.to_string()));
        }
        assert_eq!(names(&items), vec!["12\" Pizza {XL}"]);
    }

    #[test]
    fn test_prose_is_not_retained() {
        let mut extractor = ObjectExtractor::default();
        assert!(extractor.parse("I can see a few \"things\" here. ").is_empty());
        assert_eq!(extractor.buffered(), 0);
        assert!(extractor.parse("{\"name\":").is_empty());
        assert_eq!(extractor.buffered(), "{\"name\":".len());
    }

    #[test]
    fn test_truncated_object_does_not_block_later_records() {
        let mut extractor = ObjectExtractor::default();
        assert!(extractor.parse(r#"{"name":"Red Mu"#).is_empty());
        let mut items = extractor.parse(&format!("\n{MUG}\n"));
        items.extend(extractor.parse(&format!("{SHOE}\n")));
        assert_eq!(names(&items), vec!["Red Mug", "Trail Shoe"]);
        assert_eq!(extractor.buffered(), 0);
    }

    #[test]
    fn test_truncated_object_followed_without_separator() {
        let mut extractor = ObjectExtractor::default();
        let items = feed_all(&mut extractor, &[r#"{"name":"Red Mu"#, MUG, SHOE]);
        assert_eq!(names(&items), vec!["Red Mug", "Trail Shoe"]);
    }

    #[test]
    fn test_prose_brace_with_stray_quote_is_skipped() {
        let mut extractor = ObjectExtractor::default();
        assert!(extractor.parse("Products {like 12\" pizzas} found:\n").is_empty());
        let items = extractor.parse(&format!("{MUG}\n{SHOE}\n"));
        assert_eq!(names(&items), vec!["Red Mug", "Trail Shoe"]);
    }

    #[test]
    fn test_non_candidate_objects_skipped() {
        let mut extractor = ObjectExtractor::default();
        let items = extractor.parse(r#"{"summary":"two items","note":{"x":1}}"#);
        assert!(items.is_empty());
        assert_eq!(extractor.buffered(), 0);
    }
}
