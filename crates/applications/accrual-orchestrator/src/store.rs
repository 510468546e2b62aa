//! On-disk artifact store
//!
//! One JSON file per (artifact, year) under the data directory:
//!
//! ```text
//! <data-dir>/
//! ├── writer.lock            single-writer lock (token, pid)
//! ├── checkpoints.json       checkpoint log
//! ├── foundation/<year>.json
//! ├── events/<year>.json     finalized event partition
//! ├── generation/<year>.json generation report (merit pool, shortfalls)
//! ├── drafts/<year>.json     accumulated, not yet validated snapshot
//! ├── snapshots/<year>.json  finalized snapshot; <start-1> is the census baseline
//! ├── validation/<year>.json
//! ├── compliance/<year>.json
//! └── summaries/<year>.json
//! ```
//!
//! Writes go to a temp file and are renamed into place, and the directory
//! is synced after the rename so the new entry survives a crash. Every write
//! re-checks the writer lock token.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use accrual_core::{AccrualError, CompletionLedger, Result, YearSnapshot};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

const LOCK_FILE: &str = "writer.lock";

/// A per-year artifact family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Foundation,
    Events,
    Generation,
    Draft,
    Snapshot,
    Validation,
    Compliance,
    Summary,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 8] = [
        ArtifactKind::Foundation,
        ArtifactKind::Events,
        ArtifactKind::Generation,
        ArtifactKind::Draft,
        ArtifactKind::Snapshot,
        ArtifactKind::Validation,
        ArtifactKind::Compliance,
        ArtifactKind::Summary,
    ];

    pub fn dir_name(&self) -> &'static str {
        match self {
            ArtifactKind::Foundation => "foundation",
            ArtifactKind::Events => "events",
            ArtifactKind::Generation => "generation",
            ArtifactKind::Draft => "drafts",
            ArtifactKind::Snapshot => "snapshots",
            ArtifactKind::Validation => "validation",
            ArtifactKind::Compliance => "compliance",
            ArtifactKind::Summary => "summaries",
        }
    }
}

/// Hex SHA-256 of a byte slice
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockRecord {
    token: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Exclusive write access to a data directory
///
/// Released when dropped. A lock left behind by a dead process is reclaimed
/// on the next acquire; a live holder is a `TransactionConflict`.
#[derive(Debug)]
pub struct WriterLock {
    path: PathBuf,
    token: String,
}

impl WriterLock {
    fn acquire(root: &Path) -> Result<Self> {
        let path = root.join(LOCK_FILE);
        let record = LockRecord {
            token: uuid::Uuid::new_v4().to_string(),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };

        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(&serde_json::to_vec_pretty(&record)?)?;
                    file.sync_all()?;
                    info!(path = %path.display(), "🔒 Writer lock acquired");
                    return Ok(Self {
                        path,
                        token: record.token,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let holder = fs::read_to_string(&path)
                        .ok()
                        .and_then(|content| serde_json::from_str::<LockRecord>(&content).ok());
                    match holder {
                        Some(holder) if process_alive(holder.pid) => {
                            return Err(AccrualError::conflict(
                                LOCK_FILE,
                                format!(
                                    "data directory is locked by pid {} since {}",
                                    holder.pid, holder.acquired_at
                                ),
                            ));
                        }
                        _ => {
                            warn!(path = %path.display(), "⚠️  Reclaiming stale writer lock");
                            fs::remove_file(&path)?;
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(AccrualError::conflict(LOCK_FILE, "lock file reappeared while reclaiming it"))
    }

    /// Fail unless the lock file still carries this holder's token
    fn verify(&self) -> Result<()> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            AccrualError::conflict(LOCK_FILE, format!("writer lock lost: {}", e))
        })?;
        let record: LockRecord = serde_json::from_str(&content)
            .map_err(|e| AccrualError::conflict(LOCK_FILE, format!("writer lock unreadable: {}", e)))?;
        if record.token != self.token {
            return Err(AccrualError::conflict(
                LOCK_FILE,
                format!("writer lock taken over by pid {}", record.pid),
            ));
        }
        Ok(())
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        if self.verify().is_ok() {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!("⚠️  Failed to release writer lock: {}", e);
            } else {
                debug!(path = %self.path.display(), "🔓 Writer lock released");
            }
        }
    }
}

/// Whether `pid` names a running process
///
/// Without `/proc` there is no cheap check, so the holder is assumed alive
/// and the lock must be cleared with `unlock`.
fn process_alive(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    let proc_root = Path::new("/proc");
    !proc_root.exists() || proc_root.join(pid.to_string()).exists()
}

/// Artifact store rooted at a data directory
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    lock: Option<WriterLock>,
}

impl FileStore {
    /// Open for reading only; any write fails
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: None,
        }
    }

    /// Open for writing, creating the layout and taking the writer lock
    ///
    /// # Errors
    /// `TransactionConflict` if another live process holds the lock.
    pub fn open_writer(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for kind in ArtifactKind::ALL {
            fs::create_dir_all(root.join(kind.dir_name()))?;
        }
        let lock = WriterLock::acquire(&root)?;
        Ok(Self { root, lock: Some(lock) })
    }

    /// Remove a lock file regardless of holder; returns whether one existed
    pub fn force_unlock(root: &Path) -> Result<bool> {
        match fs::remove_file(root.join(LOCK_FILE)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, kind: ArtifactKind, year: i32) -> PathBuf {
        self.root.join(kind.dir_name()).join(format!("{}.json", year))
    }

    pub fn exists(&self, kind: ArtifactKind, year: i32) -> bool {
        self.path(kind, year).is_file()
    }

    fn writer(&self) -> Result<&WriterLock> {
        let lock = self
            .lock
            .as_ref()
            .ok_or_else(|| AccrualError::conflict(self.root.display().to_string(), "store opened read-only"))?;
        lock.verify()?;
        Ok(lock)
    }

    /// Atomically replace `path` with `bytes`
    pub fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let lock = self.writer()?;
        let tmp = path.with_extension(format!("tmp-{}", lock.token()));
        {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        sync_parent(path)
    }

    /// Serialize and write an artifact, returning the hash of the bytes written
    pub fn write<T: Serialize>(&self, kind: ArtifactKind, year: i32, value: &T) -> Result<String> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let path = self.path(kind, year);
        self.write_bytes(&path, &bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "💾 Artifact written");
        Ok(content_hash(&bytes))
    }

    pub fn read<T: DeserializeOwned>(&self, kind: ArtifactKind, year: i32) -> Result<T> {
        let path = self.path(kind, year);
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                AccrualError::Io(std::io::Error::new(
                    ErrorKind::NotFound,
                    format!("{} not found", path.display()),
                ))
            } else {
                e.into()
            }
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Hash of an artifact's current bytes, if it exists
    pub fn hash(&self, kind: ArtifactKind, year: i32) -> Result<Option<String>> {
        match fs::read(self.path(kind, year)) {
            Ok(bytes) => Ok(Some(content_hash(&bytes))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write a snapshot, refusing to replace a finalized one with different content
    ///
    /// Rewriting identical finalized content is a no-op, so a stage repeated
    /// after a crash between its write and its checkpoint succeeds.
    pub fn write_snapshot(&self, snapshot: &YearSnapshot) -> Result<String> {
        let year = snapshot.simulation_year();
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let path = self.path(ArtifactKind::Snapshot, year);

        if let Ok(existing) = fs::read(&path) {
            match serde_json::from_slice::<YearSnapshot>(&existing) {
                Ok(current) if current.is_finalized() => {
                    if existing == bytes {
                        debug!(year, "Finalized snapshot unchanged, skipping write");
                        return Ok(content_hash(&bytes));
                    }
                    return Err(AccrualError::conflict(
                        format!("snapshots/{}", year),
                        "snapshot is finalized and cannot be overwritten",
                    ));
                }
                Ok(_) => debug!(year, "Replacing unfinalized snapshot"),
                Err(e) => warn!(year, "⚠️  Replacing unreadable snapshot: {}", e),
            }
        }

        self.write_bytes(&path, &bytes)?;
        Ok(content_hash(&bytes))
    }

    pub fn read_snapshot(&self, year: i32) -> Result<YearSnapshot> {
        self.read(ArtifactKind::Snapshot, year)
    }

    /// Years with an artifact of `kind`, ascending
    pub fn years(&self, kind: ArtifactKind) -> Result<Vec<i32>> {
        let dir = self.root.join(kind.dir_name());
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut years = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(year) = path.file_stem().and_then(|s| s.to_str()).and_then(|s| s.parse().ok()) {
                    years.push(year);
                }
            }
        }
        years.sort_unstable();
        Ok(years)
    }
}

/// Flush the directory entry created by a rename
#[cfg(unix)]
fn sync_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

/// Directories cannot be opened for syncing here
#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> Result<()> {
    Ok(())
}

impl CompletionLedger for FileStore {
    fn events_written(&self, year: i32) -> bool {
        self.exists(ArtifactKind::Events, year)
    }

    fn snapshot_written(&self, year: i32) -> bool {
        self.exists(ArtifactKind::Draft, year) || self.exists(ArtifactKind::Snapshot, year)
    }

    fn snapshot_finalized(&self, year: i32) -> bool {
        self.read_snapshot(year).is_ok_and(|s| s.is_finalized())
    }
}
