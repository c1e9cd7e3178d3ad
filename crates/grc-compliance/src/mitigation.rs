//! # Mitigation Normalizer
//!
//! Mitigation arrives in three shapes: an ordered map `{"1": "step"}`, an
//! array of strings or `{"description": ...}` objects, or free text. All
//! three collapse to [`MitigationSteps`], an ordered list rendered on the
//! wire as a map keyed `"1"`, `"2"`, ...
//!
//! ## Free text
//!
//! Text that starts with a numeric marker (`1.`) is split at every marker
//! found at the start of the text or after a newline or semicolon. Other
//! text is split on newlines and semicolons. Text with neither becomes a
//! single step. Text that parses as a JSON object or array is treated as
//! that structure.
//!
//! The normalizer never fails. Unrecognized input yields no steps, and
//! `normalize(normalize(x)) == normalize(x)` in [`NormalizeMode::Canonical`].

use std::sync::OnceLock;

use regex::Regex;
use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::text::canonical_prose;

/// How empty steps are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeMode {
    /// Drop empty steps. Used on create and edit.
    Canonical,
    /// Keep empty steps so UI step indices stay aligned mid-edit.
    PreserveSlots,
}

/// Ordered mitigation steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MitigationSteps(Vec<String>);

impl MitigationSteps {
    /// No steps.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from already-canonical steps, dropping empties.
    pub fn from_steps<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            steps
                .into_iter()
                .map(|s| canonical_prose(s.as_ref()))
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }

    /// Whether there are no non-empty steps.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|s| s.is_empty())
    }

    /// Number of slots, including preserved empty ones.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Steps in order.
    pub fn steps(&self) -> &[String] {
        &self.0
    }

    /// Render as the canonical `{"1": ..}` JSON object.
    pub fn to_value(&self) -> Value {
        let map = self
            .0
            .iter()
            .enumerate()
            .map(|(i, s)| ((i + 1).to_string(), Value::String(s.clone())))
            .collect::<serde_json::Map<_, _>>();
        Value::Object(map)
    }
}

impl Serialize for MitigationSteps {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (i, step) in self.0.iter().enumerate() {
            map.serialize_entry(&(i + 1).to_string(), step)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MitigationSteps {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(normalize(&value, NormalizeMode::Canonical))
    }
}

/// Normalize any mitigation shape into ordered steps.
pub fn normalize(value: &Value, mode: NormalizeMode) -> MitigationSteps {
    let raw = match value {
        Value::Object(map) => from_object(map),
        Value::Array(items) => items.iter().filter_map(step_text).collect(),
        Value::String(text) => from_text(text, mode),
        Value::Null | Value::Bool(_) | Value::Number(_) => Vec::new(),
    };
    finish(raw, mode)
}

fn finish(raw: Vec<String>, mode: NormalizeMode) -> MitigationSteps {
    let cleaned = raw.iter().map(|s| canonical_prose(s));
    match mode {
        NormalizeMode::Canonical => MitigationSteps(cleaned.filter(|s| !s.is_empty()).collect()),
        NormalizeMode::PreserveSlots => {
            let steps: Vec<String> = cleaned.collect();
            if steps.iter().all(|s| s.is_empty()) {
                MitigationSteps::new()
            } else {
                MitigationSteps(steps)
            }
        }
    }
}

fn from_object(map: &serde_json::Map<String, Value>) -> Vec<String> {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    // Numeric keys first in numeric order, then anything else by key.
    entries.sort_by(|(a, _), (b, _)| {
        match (a.trim().parse::<u64>(), b.trim().parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => std::cmp::Ordering::Less,
            (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
            (Err(_), Err(_)) => a.cmp(b),
        }
    });
    entries
        .into_iter()
        .map(|(_, v)| step_text(v).unwrap_or_default())
        .collect()
}

fn step_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(obj) => obj
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn from_text(text: &str, mode: NormalizeMode) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(parsed @ (Value::Object(_) | Value::Array(_))) =
            serde_json::from_str::<Value>(trimmed)
        {
            return normalize(&parsed, mode).0;
        }
    }
    if let Some(steps) = split_numbered(trimmed) {
        return steps;
    }
    if trimmed.contains(['\n', '\r', ';']) {
        return separator_re()
            .split(trimmed)
            .map(str::to_string)
            .collect();
    }
    vec![trimmed.to_string()]
}

/// Split at numeric markers. Returns `None` unless the text opens with one.
fn split_numbered(text: &str) -> Option<Vec<String>> {
    let markers: Vec<(usize, usize)> = marker_re()
        .find_iter(text)
        .filter(|m| !text[m.end()..].starts_with(|c: char| c.is_ascii_digit()))
        .map(|m| (m.start(), m.end()))
        .collect();
    match markers.first() {
        Some((0, _)) => {}
        _ => return None,
    }
    let mut steps = Vec::with_capacity(markers.len());
    for (i, (_, body_start)) in markers.iter().enumerate() {
        let body_end = markers.get(i + 1).map_or(text.len(), |(s, _)| *s);
        steps.push(text[*body_start..body_end].to_string());
    }
    Some(steps)
}

fn marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|[\r\n;])[ \t]*\d+\.").unwrap_or_else(|_| unreachable!()))
}

fn separator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\r\n;]+").unwrap_or_else(|_| unreachable!()))
}


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;

    fn mitigation_input() -> impl Strategy<Value = Value> {
        let text = "[a-zA-Z0-9 .;\n\t-]{0,60}";
        prop_oneof![
            text.prop_map(Value::String),
            prop::collection::vec(text, 0..6)
                .prop_map(|v| Value::Array(v.into_iter().map(Value::String).collect())),
            prop::collection::btree_map("[0-9]{1,2}", text, 0..6).prop_map(|m| {
                Value::Object(m.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
            }),
            Just(Value::Null),
            any::<i64>().prop_map(|n| serde_json::json!(n)),
        ]
    }

    proptest! {
        /// Normalizing the normalizer's output changes nothing.
        #[test]
        fn normalize_is_idempotent(input in mitigation_input()) {
            let once = normalize(&input, NormalizeMode::Canonical);
            let twice = normalize(&once.to_value(), NormalizeMode::Canonical);
            prop_assert_eq!(once, twice);
        }

        /// Canonical output never contains empty or untrimmed steps.
        #[test]
        fn canonical_steps_are_trimmed_and_non_empty(input in mitigation_input()) {
            let out = normalize(&input, NormalizeMode::Canonical);
            for step in out.steps() {
                prop_assert!(!step.is_empty());
                prop_assert_eq!(step.trim(), step.as_str());
            }
        }
    }
}
