use crate::errors::{EnrollError, Result};
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Append-only, timestamped narrative of a run.
///
/// Every line is `<rfc3339> <message>` and is flushed before `append`
/// returns, so the log survives the process being killed mid-batch.
pub struct RunLog {
    path: PathBuf,
    file: File,
}

impl RunLog {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| EnrollError::persistence(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, message: &str) -> Result<()> {
        let flattened = message.replace(['\r', '\n'], " ");
        let line = format!("{} {}\n", Utc::now().to_rfc3339(), flattened);
        self.file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.flush())
            .map_err(|e| EnrollError::persistence(&self.path, e))
    }

    /// Header line that separates runs in a shared log file.
    pub fn start_run(&mut self, run_id: Uuid, group: &str, roster_len: usize) -> Result<()> {
        self.append(&format!(
            "=== run {} started: group '{}', {} participant(s) in roster ===",
            run_id, group, roster_len
        ))
    }
}
