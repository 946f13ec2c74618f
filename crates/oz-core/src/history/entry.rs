use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Stable entry identifier. Stores written by the desktop app use integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryId {
    Number(i64),
    Text(String),
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryId::Number(n) => write!(f, "{n}"),
            EntryId::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for EntryId {
    fn from(value: i64) -> Self {
        EntryId::Number(value)
    }
}

impl From<&str> for EntryId {
    fn from(value: &str) -> Self {
        EntryId::Text(value.to_string())
    }
}

impl From<String> for EntryId {
    fn from(value: String) -> Self {
        EntryId::Text(value)
    }
}

/// One past interaction.
///
/// `id` and `text` are optional so malformed records survive loading; such
/// entries are skipped when the list renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub id: Option<EntryId>,

    #[serde(default)]
    pub text: Option<String>,

    /// Creation time in epoch milliseconds.
    #[serde(default, deserialize_with = "lenient_millis")]
    pub timestamp: i64,
}

impl HistoryEntry {
    pub fn new(id: impl Into<EntryId>, text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: Some(id.into()),
            text: Some(text.into()),
            timestamp,
        }
    }

    /// Has both an id and text.
    pub fn is_renderable(&self) -> bool {
        self.id.is_some() && self.text.is_some()
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

/// Accept integer or fractional milliseconds; anything else reads as 0.
fn lenient_millis<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        _ => 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_desktop_shape() {
        let entry: HistoryEntry =
            serde_json::from_str(r#"{"id": 3, "text": "hi", "timestamp": 1700000000000}"#).unwrap();
        assert_eq!(entry, HistoryEntry::new(3, "hi", 1_700_000_000_000));
        assert!(entry.is_renderable());
    }

    #[test]
    fn test_missing_fields_tolerated() {
        let entry: HistoryEntry = serde_json::from_str(r#"{"text": "orphan"}"#).unwrap();
        assert!(entry.id.is_none());
        assert!(!entry.is_renderable());
        assert_eq!(entry.timestamp, 0);
    }

    #[test]
    fn test_string_id_and_float_timestamp() {
        let entry: HistoryEntry =
            serde_json::from_str(r#"{"id": "abc", "text": "x", "timestamp": 12.7}"#).unwrap();
        assert_eq!(entry.id, Some(EntryId::from("abc")));
        assert_eq!(entry.timestamp, 12);
        assert_eq!(entry.id.unwrap().to_string(), "abc");
    }
}
