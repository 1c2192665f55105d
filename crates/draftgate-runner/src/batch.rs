//! Run many documents through one gate with bounded parallelism.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use draftgate_core::{IssueKind, QualityScore};
use draftgate_store::FailureReason;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{error, info};

use crate::{Gate, GateError, GateOutcome, GateStatus};

/// Cooperative stop flag. Once raised, documents that have not started are
/// skipped; documents already running finish their loop.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    Exhausted,
    Stuck,
    Error(String),
}

impl From<FailureReason> for FailureCause {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::Exhausted => Self::Exhausted,
            FailureReason::Stuck => Self::Stuck,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    pub cause: FailureCause,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_score: Option<QualityScore>,
    pub remaining_issues: Vec<IssueKind>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,
    pub outcomes: Vec<GateOutcome>,
    pub failures: Vec<FailureReport>,
}

impl BatchSummary {
    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.errored == 0 && self.skipped == 0
    }

    fn record(&mut self, path: PathBuf, result: Option<Result<GateOutcome, GateError>>) {
        match result {
            None => self.skipped += 1,
            Some(Ok(outcome)) => {
                match outcome.status {
                    GateStatus::Passed => self.passed += 1,
                    GateStatus::Failed { reason } => {
                        self.failed += 1;
                        self.failures.push(FailureReport {
                            path,
                            keyword: Some(outcome.keyword.clone()),
                            cause: reason.into(),
                            final_score: Some(outcome.final_score),
                            remaining_issues: outcome.remaining_issues.clone(),
                        });
                    }
                }
                self.outcomes.push(outcome);
            }
            Some(Err(err)) => {
                error!(path = %path.display(), error = %err, "document errored");
                self.errored += 1;
                self.failures.push(FailureReport {
                    path,
                    keyword: None,
                    cause: FailureCause::Error(err.to_string()),
                    final_score: None,
                    remaining_issues: Vec::new(),
                });
            }
        }
    }
}

/// Run every distinct document in `paths` through `gate`, at most
/// `concurrency` at a time.
///
/// Paths naming the same file are collapsed so a document is never worked on
/// by two workers at once. Reports are sorted by path.
pub async fn run_batch(
    gate: &Gate,
    paths: &[PathBuf],
    concurrency: usize,
    stop: &StopSignal,
) -> BatchSummary {
    let paths = dedupe(paths);
    info!(documents = paths.len(), concurrency, "batch started");

    let results: Vec<(PathBuf, Option<Result<GateOutcome, GateError>>)> = stream::iter(paths)
        .map(|path| async move {
            if stop.is_raised() {
                return (path, None);
            }
            let result = gate.run(&path).await;
            (path, Some(result))
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut summary = BatchSummary::default();
    for (path, result) in results {
        summary.record(path, result);
    }
    summary.outcomes.sort_by(|a, b| a.path.cmp(&b.path));
    summary.failures.sort_by(|a, b| a.path.cmp(&b.path));

    info!(
        passed = summary.passed,
        failed = summary.failed,
        errored = summary.errored,
        skipped = summary.skipped,
        "batch finished"
    );
    summary
}

/// Keep the first spelling of each file. Paths that cannot be canonicalized
/// (usually missing files) are compared as given.
fn dedupe(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .iter()
        .filter(|path| seen.insert(canonical(path)))
        .cloned()
        .collect()
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
