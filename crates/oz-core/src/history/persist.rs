use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::entry::{EntryId, HistoryEntry};
use crate::{Error, Result};

/// Oldest entries beyond this count are dropped on append.
pub const MAX_HISTORY_ENTRIES: usize = 10_000;

/// Durable storage for history entries.
#[async_trait]
pub trait PersistenceSource: Send + Sync {
    /// All stored entries, in storage order.
    async fn load(&self) -> Result<Vec<HistoryEntry>>;

    /// Remove every entry. `Ok(false)` means the store refused.
    async fn clear_all(&self) -> Result<bool>;
}

/// History stored as `{"history": [...]}` in a JSON file.
#[derive(Debug, Clone)]
pub struct JsonHistoryFile {
    path: PathBuf,
}

impl JsonHistoryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Prepend a new entry, newest first, as the desktop app does.
    pub async fn append(&self, text: &str, timestamp: i64) -> Result<Option<HistoryEntry>> {
        if text.is_empty() {
            return Ok(None);
        }
        let mut items = self.read_items().await?;
        let entry = HistoryEntry::new(EntryId::Number(next_id(&items)), text, timestamp);
        items.insert(0, serde_json::to_value(&entry)?);
        items.truncate(MAX_HISTORY_ENTRIES);
        self.write_items(items).await?;
        Ok(Some(entry))
    }

    async fn read_items(&self) -> Result<Vec<Value>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::persistence(format!("{}: {e}", self.path.display()))),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        let root: Value = serde_json::from_slice(&bytes)?;
        match root {
            Value::Object(mut map) => match map.remove("history") {
                Some(Value::Array(items)) => Ok(items),
                None | Some(Value::Null) => Ok(Vec::new()),
                Some(_) => Err(Error::serialization("\"history\" is not an array")),
            },
            _ => Err(Error::serialization("history file is not a JSON object")),
        }
    }

    /// Write via a sibling temp file and rename so readers never see a partial file.
    async fn write_items(&self, items: Vec<Value>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(&serde_json::json!({ "history": items }))?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// One past the largest numeric id on record.
fn next_id(items: &[Value]) -> i64 {
    items
        .iter()
        .filter_map(|item| match item.get("id")? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
        .max()
        .unwrap_or(0)
        .saturating_add(1)
}

#[async_trait]
impl PersistenceSource for JsonHistoryFile {
    async fn load(&self) -> Result<Vec<HistoryEntry>> {
        let items = self.read_items().await?;
        let total = items.len();
        let entries: Vec<HistoryEntry> = items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect();
        if entries.len() < total {
            warn!(
                path = %self.path.display(),
                skipped = total - entries.len(),
                "Skipped unreadable history records"
            );
        }
        debug!(path = %self.path.display(), entries = entries.len(), "Read history file");
        Ok(entries)
    }

    async fn clear_all(&self) -> Result<bool> {
        self.write_items(Vec::new()).await?;
        debug!(path = %self.path.display(), "Cleared history file");
        Ok(true)
    }
}
