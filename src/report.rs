//! Handling of user reports about wrongly scraped products.
//!
//! A report turns into a fixture: the product as it was delivered plus the
//! markup it was extracted from. Once someone corrects the product in the
//! `.json` file, the fixture regression test holds the extractor to it.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::links::{cache_key, log_id};
use crate::models::ArchiveRecord;

#[async_trait]
pub trait ReportHandler: Send + Sync {
    async fn handle(&self, record: ArchiveRecord) -> Result<()>;
}

/// Writes `<log id>-<unix time>.json` and a sibling `.html` per report
#[derive(Debug, Clone)]
pub struct FixtureWriter {
    dir: PathBuf,
}

impl FixtureWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Writes the fixture pair and returns the path of the `.json` file
    pub async fn write(&self, record: &ArchiveRecord) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create report directory {}", self.dir.display()))?;

        let stem = format!(
            "{}-{}",
            log_id(&cache_key(&record.product.url)),
            Utc::now().timestamp()
        );
        let json_path = self.dir.join(format!("{stem}.json"));
        let html_path = self.dir.join(format!("{stem}.html"));

        let json = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&json_path, json)
            .await
            .with_context(|| format!("Failed to write {}", json_path.display()))?;
        tokio::fs::write(&html_path, record.html.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", html_path.display()))?;

        Ok(json_path)
    }
}

#[async_trait]
impl ReportHandler for FixtureWriter {
    async fn handle(&self, record: ArchiveRecord) -> Result<()> {
        let path = self.write(&record).await?;
        info!("Report received for '{}': {}", record.product.title, path.display());
        Ok(())
    }
}

/// Keeps reports in memory, mostly useful in tests
#[derive(Debug, Default)]
pub struct CollectingReportHandler {
    records: Mutex<Vec<ArchiveRecord>>,
}

impl CollectingReportHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ArchiveRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ReportHandler for CollectingReportHandler {
    async fn handle(&self, record: ArchiveRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| anyhow::anyhow!("report collector lock poisoned"))?
            .push(record);
        Ok(())
    }
}

/// Reads a fixture written by [`FixtureWriter`]
pub fn read_fixture(path: &Path) -> Result<ArchiveRecord> {
    let data = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("Failed to parse {}", path.display()))
}
