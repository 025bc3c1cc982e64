//! Materializes the frpc configuration file.
//!
//! frpc is always told to log to the console at debug level so the collector
//! has something to read; the caller's own `[log]` settings are overridden by
//! the section appended here.

use std::path::{Path, PathBuf};

/// Appended after the caller's configuration, separated by one blank line.
pub const LOG_SECTION: &str = "[log]\nto = \"console\"\nlevel = \"debug\"\n";

#[derive(Debug, Clone)]
pub struct ConfigWriter {
    path: PathBuf,
}

impl ConfigWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Trimmed payload, one blank line, then the fixed `[log]` section.
    pub fn render(payload: &str) -> String {
        let trimmed = payload.trim();
        let mut out = String::with_capacity(trimmed.len() + LOG_SECTION.len() + 2);
        out.push_str(trimmed);
        out.push_str("\n\n");
        out.push_str(LOG_SECTION);
        out
    }

    /// Write the rendered payload, replacing any previous file. Blank payloads
    /// are not rejected here.
    pub async fn write(&self, payload: &str) -> std::io::Result<PathBuf> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, Self::render(payload)).await?;
        tracing::debug!("Wrote frpc config to {}", self.path.display());
        Ok(self.path.clone())
    }
}
