//! Artifact tracking types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file produced (or declared) by a workflow step.
///
/// Registered only after the producing step reports success or the path
/// was explicitly declared via `emits`. Existence and size are best-effort
/// snapshots taken at registration time; `validate_all` re-checks them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Filesystem path of the artifact.
    pub path: String,
    /// ID of the step that produced (or declared) it.
    pub step_id: String,
    /// When the artifact was registered.
    pub created_at: DateTime<Utc>,
    /// Size in bytes at registration time (0 if the file did not exist yet).
    pub size: u64,
    /// Whether the file existed at registration time.
    pub exists: bool,
    /// Caller-supplied metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Aggregate report from re-validating every registered artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Total registered artifacts.
    pub total: u32,
    /// Artifacts that exist on disk right now.
    pub existing: u32,
    /// Artifacts missing from disk.
    pub missing: u32,
    /// Paths of the missing artifacts.
    pub missing_paths: Vec<String>,
    /// True iff `missing_paths` is empty.
    pub valid: bool,
}

/// Outcome of a cleanup pass over registered artifacts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Paths deleted (or, in dry-run mode, candidates that would be deleted).
    pub deleted: Vec<String>,
    /// Per-file errors; a failed delete never aborts the batch.
    pub errors: Vec<String>,
}
