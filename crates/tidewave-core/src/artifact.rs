//! Artifact registry: registration, re-validation, cleanup, and manifests.
//!
//! Parallel steps within a wave register concurrently, so the registry is
//! guarded by a single mutex (single-writer discipline). Registration takes a
//! best-effort filesystem snapshot; a not-yet-created path is recorded with
//! `exists = false` for later re-validation.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use serde_json::{Value, json};
use tidewave_types::artifact::{Artifact, CleanupReport, ValidationReport};

/// Serialized registry of files produced (or declared) by workflow steps.
#[derive(Debug, Default)]
pub struct ArtifactManager {
    registry: Mutex<Vec<Artifact>>,
}

impl ArtifactManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Artifact>> {
        match self.registry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register an artifact path for a producing step.
    ///
    /// Existence and size are captured best-effort at registration time; a
    /// missing file is recorded with `exists = false, size = 0` rather than
    /// rejected.
    pub fn register(
        &self,
        path: &str,
        step_id: &str,
        metadata: HashMap<String, Value>,
    ) -> Artifact {
        let (exists, size) = match std::fs::metadata(path) {
            Ok(meta) => (true, meta.len()),
            Err(_) => (false, 0),
        };

        let artifact = Artifact {
            path: path.to_string(),
            step_id: step_id.to_string(),
            created_at: Utc::now(),
            size,
            exists,
            metadata,
        };

        tracing::debug!(path, step_id, exists, size, "artifact registered");
        self.lock().push(artifact.clone());
        artifact
    }

    /// Snapshot of every registered artifact.
    pub fn artifacts(&self) -> Vec<Artifact> {
        self.lock().clone()
    }

    /// Re-check every registered artifact against the filesystem.
    pub fn validate_all(&self) -> ValidationReport {
        let registry = self.lock();
        let mut missing_paths = Vec::new();
        for artifact in registry.iter() {
            if !std::path::Path::new(&artifact.path).exists() {
                missing_paths.push(artifact.path.clone());
            }
        }

        let total = registry.len() as u32;
        let missing = missing_paths.len() as u32;
        ValidationReport {
            total,
            existing: total - missing,
            missing,
            valid: missing_paths.is_empty(),
            missing_paths,
        }
    }

    /// Delete registered artifact files.
    ///
    /// Dry-run mode lists candidates without deleting. Live mode records
    /// per-file errors and never aborts the batch. Entries for missing files
    /// are skipped silently.
    pub fn cleanup(&self, dry_run: bool) -> CleanupReport {
        let registry = self.lock();
        let mut report = CleanupReport::default();

        for artifact in registry.iter() {
            if !std::path::Path::new(&artifact.path).exists() {
                continue;
            }
            if dry_run {
                report.deleted.push(artifact.path.clone());
                continue;
            }
            match std::fs::remove_file(&artifact.path) {
                Ok(()) => report.deleted.push(artifact.path.clone()),
                Err(e) => {
                    tracing::warn!(path = %artifact.path, error = %e, "artifact delete failed");
                    report.errors.push(format!("{}: {}", artifact.path, e));
                }
            }
        }
        report
    }

    /// Serializable audit snapshot of the registry. No control flow effect.
    pub fn generate_manifest(&self) -> Value {
        let registry = self.lock();
        json!({
            "generated_at": Utc::now().to_rfc3339(),
            "artifact_count": registry.len(),
            "artifacts": *registry,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
