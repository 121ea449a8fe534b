//! Step complexity scoring and operation-category inference.
//!
//! `analyze` is a pure, total function: it never fails and never touches the
//! filesystem. The file-count estimate comes from declared `with.files`
//! pattern cardinality only.

use tidewave_types::routing::{ComplexityAnalysis, OperationCategory};
use tidewave_types::workflow::StepDefinition;

// ---------------------------------------------------------------------------
// Keyword table
// ---------------------------------------------------------------------------

/// Category keyword table: (category, base weight, keywords).
///
/// Table order is the deterministic tie-break order when a step matches
/// multiple categories of equal weight.
const CATEGORY_KEYWORDS: &[(OperationCategory, f64, &[&str])] = &[
    (
        OperationCategory::Edit,
        0.6,
        &["edit", "patch", "fix", "refactor", "modify", "rewrite"],
    ),
    (
        OperationCategory::Generate,
        0.7,
        &["generate", "create", "write", "scaffold", "implement", "draft"],
    ),
    (
        OperationCategory::Test,
        0.4,
        &["test", "pytest", "lint", "clippy", "check", "verify"],
    ),
    (
        OperationCategory::Infra,
        0.5,
        &["build", "deploy", "install", "docker", "release", "migrate"],
    ),
];

/// Per-pattern file estimates: recursive globs count for more than single
/// wildcards, which count for more than literal paths.
const FILES_PER_RECURSIVE_GLOB: u32 = 10;
const FILES_PER_WILDCARD: u32 = 5;
const FILES_PER_LITERAL: u32 = 1;

/// Ceiling on the estimated file count.
const MAX_ESTIMATED_FILES: u32 = 50;

/// Contribution of the file estimate to the score, and its ceiling.
const FILE_SCORE_WEIGHT: f64 = 0.01;
const FILE_SCORE_CAP: f64 = 0.3;

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Scores a step's complexity and infers its operation category.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplexityAnalyzer;

impl ComplexityAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Analyze one step. Pure and total: missing fields default to category
    /// `Unknown` with score 0.
    pub fn analyze(&self, step: &StepDefinition) -> ComplexityAnalysis {
        let haystack = format!("{} {}", step.actor, step.name).to_lowercase();

        let mut category = OperationCategory::Unknown;
        let mut base_score = 0.0;
        for (candidate, weight, keywords) in CATEGORY_KEYWORDS {
            let matched = keywords.iter().any(|kw| haystack.contains(kw));
            // Strictly-greater keeps the first (declaration-order) winner on ties.
            if matched && *weight > base_score {
                category = *candidate;
                base_score = *weight;
            }
        }

        let estimated_files = Self::estimate_files(step);
        let file_score = (f64::from(estimated_files) * FILE_SCORE_WEIGHT).min(FILE_SCORE_CAP);
        let score = (base_score + file_score).clamp(0.0, 1.0);

        ComplexityAnalysis {
            score,
            category,
            estimated_files,
        }
    }

    /// Bounded file-count estimate from declared `with.files` patterns.
    fn estimate_files(step: &StepDefinition) -> u32 {
        let Some(files) = step.with.get("files") else {
            return 0;
        };

        let patterns: Vec<&str> = match files {
            serde_json::Value::String(s) => vec![s.as_str()],
            serde_json::Value::Array(items) => {
                items.iter().filter_map(|v| v.as_str()).collect()
            }
            _ => return 0,
        };

        let total: u32 = patterns
            .iter()
            .map(|p| {
                if p.contains("**") {
                    FILES_PER_RECURSIVE_GLOB
                } else if p.contains('*') || p.contains('?') || p.contains('[') {
                    FILES_PER_WILDCARD
                } else {
                    FILES_PER_LITERAL
                }
            })
            .sum();
        total.min(MAX_ESTIMATED_FILES)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
