//! Local JSON file feed.
//!
//! Re-reads the file on every load, so an external scraper (or a person
//! with an editor) can update odds while the pipeline runs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::feed::{FeedBookie, FeedSnapshot, OddsFeed};

pub struct FileFeed {
    path: PathBuf,
}

impl FileFeed {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Convenience constructor for a bookie backed by a file feed.
    pub fn bookie(name: &str, path: impl AsRef<Path>, dry_run: bool) -> FeedBookie {
        FeedBookie::new(name, Arc::new(Self::new(path)), dry_run)
    }
}

#[async_trait]
impl OddsFeed for FileFeed {
    async fn load(&self) -> Result<FeedSnapshot> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read odds file: {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse odds file: {}", self.path.display()))
    }
}
