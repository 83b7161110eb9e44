use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize)]
struct WatermarkFile {
    last_processed: DateTime<Utc>,
}

/// Persists the time of the last completed cycle.
#[derive(Debug, Clone)]
pub struct WatermarkStore {
    path: PathBuf,
}

impl WatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        WatermarkStore { path: path.into() }
    }

    /// `None` when no cycle has completed yet.
    pub fn load(&self) -> Result<Option<DateTime<Utc>>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Unable to read watermark {}", self.path.display()))?;
        let file: WatermarkFile = serde_json::from_str(&content)
            .with_context(|| format!("Invalid watermark file {}", self.path.display()))?;

        Ok(Some(file.last_processed))
    }

    pub fn store(&self, last_processed: DateTime<Utc>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Unable to create directory {}", parent.display()))?;
            }
        }

        let content = serde_json::to_string_pretty(&WatermarkFile { last_processed })?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Unable to write watermark {}", self.path.display()))
    }
}

/// Search clause bounding a query to messages after `watermark`.
pub fn after_clause(watermark: DateTime<Utc>) -> String {
    format!("after:{}", watermark.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_missing_watermark_is_none() {
        let dir = TempDir::new().unwrap();
        let store = WatermarkStore::new(dir.path().join("watermark.json"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_store_then_load() {
        let dir = TempDir::new().unwrap();
        let store = WatermarkStore::new(dir.path().join("nested").join("watermark.json"));
        let at = Utc.with_ymd_and_hms(2026, 3, 10, 8, 30, 0).unwrap();

        store.store(at).unwrap();

        assert_eq!(store.load().unwrap(), Some(at));
        assert_eq!(after_clause(at), format!("after:{}", at.timestamp()));
    }
}
