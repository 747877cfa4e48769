//! Durable run state kept in the state directory.
//!
//! | File                         | Contents                                   |
//! |------------------------------|--------------------------------------------|
//! | `processed.json`             | identities resolved in any run             |
//! | `manual_selections.json`     | identity → operator-confirmed entry text   |
//! | `batches/<partition>_<n>.txt`| one identity per line, four files a batch  |
//! | `process_log.txt`            | append-only run log                        |
//! | `.lock`                      | advisory lock held while a run is active   |
//!
//! JSON state is written to a sibling temp file and renamed over the old one,
//! so a crash mid-write leaves the previous valid file in place.

mod run_log;

pub use run_log::RunLog;

use crate::batch::Partition;
use crate::errors::{EnrollError, Result};
use crate::phone::PhoneIdentity;
use fs2::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub type ProcessedSet = BTreeSet<PhoneIdentity>;
pub type ManualSelectionMap = BTreeMap<PhoneIdentity, String>;

/// Resume state read once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    pub processed: ProcessedSet,
    pub manual: ManualSelectionMap,
}

const PROCESSED_FILE: &str = "processed.json";
const MANUAL_SELECTIONS_FILE: &str = "manual_selections.json";
const LOG_FILE: &str = "process_log.txt";
const BATCHES_DIR: &str = "batches";
const LOCK_FILE: &str = ".lock";

pub struct PersistenceStore {
    dir: PathBuf,
    log: RunLog,
    // Held for the lifetime of the store; released on drop.
    _lock: File,
}

impl PersistenceStore {
    /// Open (creating if needed) the state directory and take its lock.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir.join(BATCHES_DIR))
            .map_err(|e| EnrollError::persistence(dir, e))?;

        let lock_path = dir.join(LOCK_FILE);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| EnrollError::persistence(&lock_path, e))?;
        if let Err(e) = lock.try_lock_exclusive() {
            if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                return Err(EnrollError::StateLocked {
                    path: dir.to_path_buf(),
                });
            }
            return Err(EnrollError::persistence(&lock_path, e));
        }

        let log = RunLog::open(&dir.join(LOG_FILE))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            log,
            _lock: lock,
        })
    }

    pub fn log(&mut self) -> &mut RunLog {
        &mut self.log
    }

    pub fn append_log(&mut self, line: &str) -> Result<()> {
        self.log.append(line)
    }

    pub fn load_state(&self) -> Result<RunState> {
        Ok(RunState {
            processed: self.load_processed_set()?,
            manual: self.load_manual_selections()?,
        })
    }

    pub fn load_processed_set(&self) -> Result<ProcessedSet> {
        self.load_json(PROCESSED_FILE)
    }

    pub fn save_processed_set(&self, processed: &ProcessedSet) -> Result<()> {
        self.save_json(PROCESSED_FILE, processed)
    }

    pub fn load_manual_selections(&self) -> Result<ManualSelectionMap> {
        self.load_json(MANUAL_SELECTIONS_FILE)
    }

    pub fn save_manual_selections(&self, selections: &ManualSelectionMap) -> Result<()> {
        self.save_json(MANUAL_SELECTIONS_FILE, selections)
    }

    /// Write one partition of a batch, one identity per line. An empty
    /// partition still produces an (empty) file.
    pub fn write_partition_file(
        &self,
        batch_number: u32,
        partition: Partition,
        identities: &[PhoneIdentity],
    ) -> Result<PathBuf> {
        let path = self.partition_path(batch_number, partition);
        let mut content = String::new();
        for identity in identities {
            content.push_str(identity.as_str());
            content.push('\n');
        }
        write_atomic(&path, content.as_bytes())?;
        Ok(path)
    }

    pub fn partition_path(&self, batch_number: u32, partition: Partition) -> PathBuf {
        self.dir
            .join(BATCHES_DIR)
            .join(format!("{}_{}.txt", partition.file_stem(), batch_number))
    }

    /// One past the highest batch number with partition files on disk.
    pub fn next_batch_number(&self) -> Result<u32> {
        let batches = self.dir.join(BATCHES_DIR);
        let entries = fs::read_dir(&batches).map_err(|e| EnrollError::persistence(&batches, e))?;

        let highest = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                let stem = name.strip_suffix(".txt")?;
                Partition::ALL.iter().find_map(|p| {
                    stem.strip_prefix(p.file_stem())?
                        .strip_prefix('_')?
                        .parse::<u32>()
                        .ok()
                })
            })
            .max()
            .unwrap_or(0);

        Ok(highest + 1)
    }

    fn load_json<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        let path = self.dir.join(name);
        if !path.exists() {
            return Ok(T::default());
        }
        let content = fs::read_to_string(&path).map_err(|source| EnrollError::ResourceLoad {
            path: path.clone(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(T::default());
        }
        serde_json::from_str(&content).map_err(|e| EnrollError::CorruptState {
            path,
            message: e.to_string(),
        })
    }

    fn save_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(name);
        let json = serde_json::to_string_pretty(value).map_err(|e| {
            EnrollError::persistence(&path, std::io::Error::other(e.to_string()))
        })?;
        write_atomic(&path, json.as_bytes())
    }
}

/// Write `bytes` to a temp file next to `path`, sync it, then rename it into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let result = File::create(&tmp_path)
        .and_then(|mut f| {
            f.write_all(bytes)?;
            f.sync_all()
        })
        .and_then(|_| fs::rename(&tmp_path, path));

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(EnrollError::persistence(path, e));
    }
    Ok(())
}
