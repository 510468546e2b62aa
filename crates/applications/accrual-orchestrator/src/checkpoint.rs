//! Durable stage checkpoints
//!
//! A checkpoint records that a stage completed for a year, together with the
//! hash of the artifacts it wrote and of the configuration it ran under. On
//! restart a stage whose checkpoint still matches the files on disk is
//! skipped; a mismatch means the data directory was modified underneath the
//! run and is treated as a conflict.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use accrual_core::{AccrualError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::stage::Stage;
use crate::store::{content_hash, ArtifactKind, FileStore};

const CHECKPOINT_FILE: &str = "checkpoints.json";

/// Completion record for one (year, stage)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub simulation_year: i32,
    pub stage: Stage,
    /// SHA-256 over the stage's artifacts, in [`stage_artifacts`] order
    pub content_hash: String,
    pub config_hash: String,
    pub completed_at: DateTime<Utc>,
}

/// What to do with a stage on this run
#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointDecision {
    /// No checkpoint yet: run the stage
    Execute,
    /// Checkpoint matches the artifacts on disk: nothing to do
    Skip,
}

/// Artifacts a stage writes, in hashing order
pub fn stage_artifacts(stage: Stage) -> &'static [ArtifactKind] {
    match stage {
        Stage::Foundation => &[ArtifactKind::Foundation],
        Stage::EventGeneration => &[ArtifactKind::Events, ArtifactKind::Generation],
        Stage::StateAccumulation => &[ArtifactKind::Draft],
        Stage::Validation => &[ArtifactKind::Snapshot, ArtifactKind::Validation],
        Stage::Reporting => &[ArtifactKind::Compliance, ArtifactKind::Summary],
    }
}

/// Combined hash of a stage's artifacts as they are on disk now
///
/// `None` if any artifact is missing.
pub fn hash_stage(store: &FileStore, year: i32, stage: Stage) -> Result<Option<String>> {
    let mut parts = Vec::new();
    for kind in stage_artifacts(stage) {
        match store.hash(*kind, year)? {
            Some(hash) => parts.push(hash),
            None => return Ok(None),
        }
    }
    Ok(Some(combine(&parts)))
}

/// Combine per-artifact hashes into one stage hash
pub fn combine(parts: &[String]) -> String {
    content_hash(parts.join("\n").as_bytes())
}

/// Ordered checkpoint history for a data directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointLog {
    checkpoints: Vec<Checkpoint>,
}

impl CheckpointLog {
    fn path(store: &FileStore) -> PathBuf {
        store.root().join(CHECKPOINT_FILE)
    }

    /// Load the log, or an empty one for a fresh directory
    pub fn load(store: &FileStore) -> Result<Self> {
        match fs::read(Self::path(store)) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn find(&self, year: i32, stage: Stage) -> Option<&Checkpoint> {
        self.checkpoints
            .iter()
            .find(|c| c.simulation_year == year && c.stage == stage)
    }

    pub fn is_complete(&self, year: i32, stage: Stage) -> bool {
        self.find(year, stage).is_some()
    }

    /// Most recent checkpoint in (year, stage) order
    pub fn last_completed(&self) -> Option<&Checkpoint> {
        self.checkpoints
            .iter()
            .max_by_key(|c| (c.simulation_year, c.stage))
    }

    /// Decide whether a stage must run
    ///
    /// # Errors
    /// `TransactionConflict` if a checkpoint exists but was written under a
    /// different configuration or its artifacts changed since.
    pub fn decide(&self, store: &FileStore, year: i32, stage: Stage, config_hash: &str) -> Result<CheckpointDecision> {
        let Some(checkpoint) = self.find(year, stage) else {
            return Ok(CheckpointDecision::Execute);
        };
        let resource = format!("checkpoint {}/{}", year, stage);
        if checkpoint.config_hash != config_hash {
            return Err(AccrualError::conflict(
                resource,
                "completed under a different configuration; use a fresh data directory",
            ));
        }
        match hash_stage(store, year, stage)? {
            Some(hash) if hash == checkpoint.content_hash => Ok(CheckpointDecision::Skip),
            Some(_) => Err(AccrualError::conflict(resource, "artifacts changed since the checkpoint was written")),
            None => Err(AccrualError::conflict(resource, "artifacts missing for a completed stage")),
        }
    }

    /// Append a checkpoint and durably rewrite the log
    ///
    /// Recording the same (year, stage, hash) twice is a no-op.
    pub fn record(&mut self, store: &FileStore, checkpoint: Checkpoint) -> Result<()> {
        if let Some(existing) = self.find(checkpoint.simulation_year, checkpoint.stage) {
            if existing.content_hash == checkpoint.content_hash {
                return Ok(());
            }
            return Err(AccrualError::conflict(
                format!("checkpoint {}/{}", checkpoint.simulation_year, checkpoint.stage),
                "stage already checkpointed with different content",
            ));
        }
        debug!(
            year = checkpoint.simulation_year,
            stage = %checkpoint.stage,
            hash = %checkpoint.content_hash,
            "Checkpoint recorded"
        );
        self.checkpoints.push(checkpoint);
        let bytes = serde_json::to_vec_pretty(self)?;
        store.write_bytes(&Self::path(store), &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn checkpoint(year: i32, stage: Stage, content_hash: &str) -> Checkpoint {
        Checkpoint {
            simulation_year: year,
            stage,
            content_hash: content_hash.to_string(),
            config_hash: "cfg".to_string(),
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn test_log_survives_reload() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open_writer(dir.path()).unwrap();
        let mut log = CheckpointLog::load(&store).unwrap();
        log.record(&store, checkpoint(2025, Stage::Foundation, "a")).unwrap();
        log.record(&store, checkpoint(2025, Stage::EventGeneration, "b")).unwrap();

        let reloaded = CheckpointLog::load(&store).unwrap();
        assert_eq!(reloaded.checkpoints().len(), 2);
        assert_eq!(reloaded.last_completed().unwrap().stage, Stage::EventGeneration);
    }

    #[test]
    fn test_rerecording_same_hash_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open_writer(dir.path()).unwrap();
        let mut log = CheckpointLog::default();
        log.record(&store, checkpoint(2025, Stage::Foundation, "a")).unwrap();
        log.record(&store, checkpoint(2025, Stage::Foundation, "a")).unwrap();
        assert_eq!(log.checkpoints().len(), 1);

        let err = log.record(&store, checkpoint(2025, Stage::Foundation, "z")).unwrap_err();
        assert!(matches!(err, AccrualError::TransactionConflict { .. }));
    }

    #[test]
    fn test_decide_detects_modified_artifacts() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open_writer(dir.path()).unwrap();
        let hash = combine(&[store.write(ArtifactKind::Foundation, 2025, &"ok").unwrap()]);

        let mut log = CheckpointLog::default();
        assert_eq!(
            log.decide(&store, 2025, Stage::Foundation, "cfg").unwrap(),
            CheckpointDecision::Execute
        );
        log.record(&store, checkpoint(2025, Stage::Foundation, &hash)).unwrap();
        assert_eq!(
            log.decide(&store, 2025, Stage::Foundation, "cfg").unwrap(),
            CheckpointDecision::Skip
        );

        assert!(log.decide(&store, 2025, Stage::Foundation, "other").is_err());

        store.write(ArtifactKind::Foundation, 2025, &"tampered").unwrap();
        let err = log.decide(&store, 2025, Stage::Foundation, "cfg").unwrap_err();
        assert!(matches!(err, AccrualError::TransactionConflict { .. }));
    }
}
