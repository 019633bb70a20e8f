//! JSON run record persistence.
//!
//! The whole record is rewritten after every URL. Each write goes to a
//! sibling `.tmp` file that is then renamed over the output, so a reader sees
//! either the previous record or the new one, never a partial file. The cost
//! is O(n) per URL, which is fine for runs of a few hundred URLs.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, instrument};

use super::ResultSink;
use crate::errors::PipelineError;
use crate::models::RunEntry;

#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut tmp = OsString::from(path.as_os_str());
        tmp.push(".tmp");
        Self {
            tmp_path: PathBuf::from(tmp),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Make sure the output directory exists and accepts writes.
    pub async fn prepare(&self) -> Result<(), PipelineError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        crate::utils::ensure_writable_dir(&dir)
            .await
            .map_err(|source| PipelineError::Write {
                path: self.path.clone(),
                source,
            })
    }

    /// Read back a previously persisted record, if the output file exists.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<Option<Vec<RunEntry>>, PipelineError> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PipelineError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let entries: Vec<RunEntry> =
            serde_json::from_slice(&raw).map_err(|e| PipelineError::Read {
                path: self.path.clone(),
                source: e.into(),
            })?;
        info!(entries = entries.len(), "Loaded existing run record");
        Ok(Some(entries))
    }
}

impl ResultSink for JsonFileSink {
    async fn persist(&mut self, entries: &[RunEntry]) -> Result<(), PipelineError> {
        let json = serde_json::to_vec_pretty(entries)?;
        let write_err = |source| PipelineError::Write {
            path: self.path.clone(),
            source,
        };
        fs::write(&self.tmp_path, &json).await.map_err(write_err)?;
        fs::rename(&self.tmp_path, &self.path)
            .await
            .map_err(write_err)?;
        debug!(path = %self.path.display(), entries = entries.len(), bytes = json.len(), "Checkpointed run record");
        Ok(())
    }
}
