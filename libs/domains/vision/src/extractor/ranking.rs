//! Line-oriented extraction of ranked candidates.
//!
//! The ranking prompt asks for one JSON object per line. Each complete line is
//! decoded on its own; the trailing partial line waits for more text or for
//! [`RankingExtractor::flush`] at stream end.

use serde_json::Value;
use std::collections::HashSet;

use crate::models::RankedCandidate;

#[derive(Debug, Default)]
pub struct RankingExtractor {
    buffer: String,
    seen: HashSet<String>,
    rejected: usize,
}

impl RankingExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment, returning candidates from every line it completed.
    pub fn parse(&mut self, fragment: &str) -> Vec<RankedCandidate> {
        self.buffer.push_str(fragment);

        let Some(last_newline) = self.buffer.rfind('\n') else {
            return Vec::new();
        };
        let complete: String = self.buffer.drain(..=last_newline).collect();

        complete
            .split('\n')
            .filter_map(|line| self.accept_line(line))
            .collect()
    }

    /// Decode whatever is left as a final line and clear the buffer.
    pub fn flush(&mut self) -> Vec<RankedCandidate> {
        let rest = std::mem::take(&mut self.buffer);
        self.accept_line(&rest).into_iter().collect()
    }

    /// Lines that looked like data but failed validation
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    fn accept_line(&mut self, line: &str) -> Option<RankedCandidate> {
        let line = line.trim().trim_end_matches(',').trim();
        // Blank lines, code fences and array brackets are framing, not data.
        if line.is_empty() || line.starts_with("```") || line == "[" || line == "]" {
            return None;
        }

        let candidate = match decode_candidate(line) {
            Ok(candidate) => candidate,
            Err(reason) => {
                self.rejected += 1;
                tracing::warn!(reason, line = %truncate_for_log(line), "Discarding ranking line");
                return None;
            }
        };

        if !self.seen.insert(candidate.id.clone()) {
            tracing::debug!(id = %candidate.id, "Skipping duplicate ranking id");
            return None;
        }
        Some(candidate)
    }
}

fn decode_candidate(line: &str) -> Result<RankedCandidate, &'static str> {
    let value: Value = serde_json::from_str(line).map_err(|_| "invalid json")?;
    let Value::Object(map) = value else {
        return Err("not an object");
    };

    let id = match map.get("id") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err("missing id"),
    };
    let similarity_score = map
        .get("similarityScore")
        .or_else(|| map.get("similarity_score"))
        .and_then(integer)
        .filter(|score| (0..=100).contains(score))
        .ok_or("similarityScore out of range")?;
    let rank = map
        .get("rank")
        .and_then(integer)
        .filter(|rank| (1..=10).contains(rank))
        .ok_or("rank out of range")?;

    Ok(RankedCandidate {
        id,
        similarity_score: similarity_score as u8,
        rank: rank as u8,
    })
}

fn integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0)
            .map(|f| f as i64)
    })
}

fn truncate_for_log(line: &str) -> String {
    line.chars().take(120).collect()
}
