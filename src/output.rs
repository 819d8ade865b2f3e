//! JSON file output for click records

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::OutputConfig;
use crate::error::{AdsError, Result};
use crate::models::ClickRecord;

/// Destination for the records of a run
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Persist the records and return where they went
    async fn write(&self, records: &[ClickRecord]) -> Result<PathBuf>;
}

/// `<prefix>_<YYYY-MM-DDTHH-MM-SSZ>.json`
pub fn output_file_name(prefix: &str, generated_at: DateTime<Utc>) -> String {
    format!("{}_{}.json", prefix, generated_at.format("%Y-%m-%dT%H-%M-%SZ"))
}

/// Writes a pretty-printed JSON array into a directory
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    directory: PathBuf,
    prefix: String,
}

impl JsonFileSink {
    pub fn new(directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(config.directory.clone(), config.prefix.clone())
    }

    /// Sink for the best-effort dump after the primary write failed
    pub fn fallback_from_config(config: &OutputConfig) -> Self {
        Self::new(config.fallback_directory(), config.prefix.clone())
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

#[async_trait]
impl OutputSink for JsonFileSink {
    async fn write(&self, records: &[ClickRecord]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.directory).await.map_err(|e| {
            AdsError::OutputError(format!(
                "Failed to create output directory {:?}: {}",
                self.directory, e
            ))
        })?;

        let path = self.directory.join(output_file_name(&self.prefix, Utc::now()));
        let json = serde_json::to_string_pretty(records)
            .map_err(|e| AdsError::OutputError(format!("Failed to serialize records: {}", e)))?;

        tokio::fs::write(&path, json)
            .await
            .map_err(|e| AdsError::OutputError(format!("Failed to write {:?}: {}", path, e)))?;

        info!("Wrote {} records to {:?}", records.len(), path);
        Ok(path)
    }
}
