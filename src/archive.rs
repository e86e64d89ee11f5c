// Archive writer: persists the final rendered report under a timestamped, never-reused name.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use tokio::io::AsyncWriteExt;

pub const ARCHIVE_EXTENSION: &str = "html";

pub struct ArchiveWriter {
    dir: PathBuf,
    prefix: String,
}

impl ArchiveWriter {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<prefix>_<YYYYMMDD_HHMMSS>.html`, second granularity.
    pub fn entry_name<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        format!(
            "{}_{}.{}",
            self.prefix,
            at.format("%Y%m%d_%H%M%S"),
            ARCHIVE_EXTENSION
        )
    }

    /// Writes `blob` as `name`. Fails if an entry with that name already exists.
    pub async fn write(&self, name: &str, blob: &[u8]) -> anyhow::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| anyhow::anyhow!("create {}: {}", path.display(), e))?;
        file.write_all(blob).await?;
        file.sync_all().await?;
        Ok(path)
    }

    /// Archives a rendered report taken at `at`.
    pub async fn archive<Tz: TimeZone>(&self, blob: &[u8], at: &DateTime<Tz>) -> anyhow::Result<PathBuf>
    where
        Tz::Offset: std::fmt::Display,
    {
        let name = self.entry_name(at);
        self.write(&name, blob).await
    }
}
