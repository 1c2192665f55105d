//! Per-document retry loop.
//!
//! ```text
//! Start -> Scored -> Passed
//!                 -> Analyzing -> Fixing -> Scored ...
//!                              -> StuckFail (nothing to fix)
//!                 -> ExhaustedFail (budget spent)
//! ```
//!
//! `attempts` counts oracle scorings, the initial one included, so a run
//! performs at most `max_attempts - 1` fix passes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use draftgate_core::{GateConfig, Issue, IssueKind, QualityScore, Threshold, analyze, fix};
use draftgate_oracle::{QualityOracle, score_or_zero};
use draftgate_store::{FailureReason, Journal, JournalEntry, load_document, save_document};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::GateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum GateStatus {
    Passed,
    Failed { reason: FailureReason },
}

/// One fix pass and the rescore that followed it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    /// Scoring number produced by this pass (2 for the first fix pass).
    pub attempt: u32,
    pub score_before: QualityScore,
    pub score_after: QualityScore,
    pub issues: Vec<IssueKind>,
    pub fixes_applied: Vec<IssueKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GateOutcome {
    pub keyword: String,
    pub path: PathBuf,
    pub status: GateStatus,
    pub threshold: Threshold,
    pub initial_score: QualityScore,
    pub final_score: QualityScore,
    pub attempts: u32,
    /// Every score the oracle reported, in order.
    pub scores: Vec<QualityScore>,
    pub history: Vec<AttemptRecord>,
    /// Issues still present in the final document.
    pub remaining_issues: Vec<IssueKind>,
    /// Scorings that fell back to zero.
    pub oracle_errors: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal_error: Option<String>,
}

impl GateOutcome {
    pub fn passed(&self) -> bool {
        self.status == GateStatus::Passed
    }

    /// Journal record for this run. Passing on the first scoring is not a
    /// fix success, so it produces nothing.
    pub fn journal_entry(&self) -> Option<JournalEntry> {
        let timestamp = Utc::now();
        match self.status {
            GateStatus::Passed if self.history.is_empty() => None,
            GateStatus::Passed => Some(JournalEntry::FixSuccess {
                timestamp,
                keyword: self.keyword.clone(),
                path: self.path.clone(),
                initial_score: self.initial_score,
                final_score: self.final_score,
                attempts: self.attempts,
                threshold: self.threshold,
                score_trail: self.scores.clone(),
            }),
            GateStatus::Failed { reason } => Some(JournalEntry::Failure {
                timestamp,
                keyword: self.keyword.clone(),
                path: self.path.clone(),
                reason,
                attempts: self.attempts,
                initial_score: self.initial_score,
                final_score: self.final_score,
                threshold: self.threshold,
                remaining_issues: self.remaining_issues.clone(),
                score_trail: self.scores.clone(),
            }),
        }
    }
}

/// Drives documents through the score/fix loop.
///
/// The configuration, and with it the threshold, is fixed at construction.
pub struct Gate {
    config: GateConfig,
    oracle: Arc<dyn QualityOracle>,
    journal: Option<Arc<Journal>>,
}

impl Gate {
    pub fn new(config: GateConfig, oracle: Arc<dyn QualityOracle>) -> Self {
        Self {
            config,
            oracle,
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn threshold(&self) -> Threshold {
        self.config.threshold
    }

    /// Run one document to a terminal state.
    ///
    /// Fails fast only on unreadable input or when fixes cannot be saved.
    pub async fn run(&self, path: &Path) -> Result<GateOutcome, GateError> {
        let owned = path.to_path_buf();
        let mut doc = blocking(move || load_document(&owned))
            .await?
            .map_err(|source| GateError::Load {
                path: path.to_path_buf(),
                source,
            })?;
        let keyword = doc.keyword();
        let threshold = self.config.threshold;
        let rubric = &self.config.rubric;
        info!(%keyword, path = %path.display(), threshold = threshold.value(), "gate started");

        let mut oracle_errors = 0;
        let reading = score_or_zero(self.oracle.as_ref(), path).await;
        oracle_errors += u32::from(reading.is_fallback());
        let initial_score = reading.score;
        let mut score = reading.score;
        let mut scores = vec![score];
        let mut attempts: u32 = 1;
        let mut history = Vec::new();
        info!(%keyword, attempt = attempts, %score, "scored");

        let (status, issues) = loop {
            let issues = analyze(&doc, rubric);
            if threshold.is_met_by(score) {
                break (GateStatus::Passed, issues);
            }
            if attempts >= self.config.max_attempts {
                break (
                    GateStatus::Failed {
                        reason: FailureReason::Exhausted,
                    },
                    issues,
                );
            }
            if issues.is_empty() {
                break (
                    GateStatus::Failed {
                        reason: FailureReason::Stuck,
                    },
                    issues,
                );
            }

            let report = fix::apply(&mut doc, &issues, rubric);
            if report.changed() {
                let snapshot = doc.clone();
                blocking(move || save_document(&snapshot))
                    .await?
                    .map_err(|source| GateError::Persist {
                        path: path.to_path_buf(),
                        source,
                    })?;
                debug!(%keyword, applied = ?report.applied, "fixes saved");
            } else {
                info!(%keyword, skipped = ?report.skipped, "no applicable fixes, rescoring unchanged document");
            }

            let reading = score_or_zero(self.oracle.as_ref(), path).await;
            oracle_errors += u32::from(reading.is_fallback());
            attempts += 1;
            history.push(AttemptRecord {
                attempt: attempts,
                score_before: score,
                score_after: reading.score,
                issues: issues.iter().map(Issue::kind).collect(),
                fixes_applied: report.applied,
            });
            score = reading.score;
            scores.push(score);
            info!(%keyword, attempt = attempts, %score, "rescored");
        };

        let mut outcome = GateOutcome {
            keyword,
            path: path.to_path_buf(),
            status,
            threshold,
            initial_score,
            final_score: score,
            attempts,
            scores,
            history,
            remaining_issues: issues.iter().map(Issue::kind).collect(),
            oracle_errors,
            journal_error: None,
        };

        match outcome.status {
            GateStatus::Passed => info!(
                keyword = %outcome.keyword,
                attempts,
                final_score = %outcome.final_score,
                "passed"
            ),
            GateStatus::Failed { reason } => warn!(
                keyword = %outcome.keyword,
                attempts,
                final_score = %outcome.final_score,
                %reason,
                "failed"
            ),
        }

        self.record(&mut outcome).await;
        Ok(outcome)
    }

    async fn record(&self, outcome: &mut GateOutcome) {
        let (Some(journal), Some(entry)) = (&self.journal, outcome.journal_entry()) else {
            return;
        };
        let writer = Arc::clone(journal);
        let result = match blocking(move || writer.append(&entry)).await {
            Ok(appended) => appended.map_err(|err| err.to_string()),
            Err(err) => Err(err.to_string()),
        };
        if let Err(err) = result {
            error!(
                keyword = %outcome.keyword,
                journal = %journal.path().display(),
                error = %err,
                "failed to write journal entry"
            );
            outcome.journal_error = Some(err);
        }
    }
}

/// Run file work (locks, `sync_all`) on the blocking pool so other
/// documents in the batch keep making progress.
async fn blocking<T, F>(work: F) -> Result<T, GateError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(work).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedOracle, clean_doc, short_doc, write_doc};
    use draftgate_store::StoreError;

    fn gate(oracle: Arc<ScriptedOracle>) -> Gate {
        Gate::new(GateConfig::default(), oracle)
    }

    fn journaled_gate(oracle: Arc<ScriptedOracle>, dir: &Path) -> (Gate, Arc<Journal>) {
        let journal = Arc::new(Journal::new(dir.join("journal.ndjson")));
        (gate(oracle).with_journal(Arc::clone(&journal)), journal)
    }

    #[tokio::test]
    async fn passes_on_first_scoring_without_journal_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(dir.path(), "a.md", &clean_doc());
        let oracle = ScriptedOracle::new([Some(95.0)]);
        let (gate, journal) = journaled_gate(Arc::clone(&oracle), dir.path());

        let outcome = gate.run(&path).await.unwrap();
        assert!(outcome.passed());
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.history.is_empty());
        assert!(journal.read_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rescoring_until_threshold_records_fix_success() {
        let dir = tempfile::tempdir().unwrap();
        // Word count is the only issue, which no fix can address.
        let path = write_doc(dir.path(), "a.md", &short_doc());
        let oracle = ScriptedOracle::new([Some(72.0), Some(82.0), Some(92.0)]);
        let (gate, journal) = journaled_gate(Arc::clone(&oracle), dir.path());

        let outcome = gate.run(&path).await.unwrap();
        assert!(outcome.passed());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.initial_score.value(), 0.72);
        assert_eq!(outcome.final_score.value(), 0.92);
        assert_eq!(outcome.history.len(), 2);
        assert!(outcome.history.iter().all(|h| h.fixes_applied.is_empty()));

        let entries = journal.read_all().unwrap();
        assert_eq!(entries.len(), 1);
        match &entries[0] {
            JournalEntry::FixSuccess {
                keyword,
                initial_score,
                final_score,
                attempts,
                score_trail,
                ..
            } => {
                assert_eq!(keyword, "espresso");
                assert_eq!(initial_score.value(), 0.72);
                assert_eq!(final_score.value(), 0.92);
                assert_eq!(*attempts, 3);
                assert_eq!(score_trail.len(), 3);
            }
            other => panic!("unexpected entry {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausts_attempt_budget_below_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(dir.path(), "a.md", &short_doc());
        let oracle = ScriptedOracle::new([Some(60.0)]);
        let (gate, journal) = journaled_gate(Arc::clone(&oracle), dir.path());

        let outcome = gate.run(&path).await.unwrap();
        assert_eq!(
            outcome.status,
            GateStatus::Failed {
                reason: FailureReason::Exhausted
            }
        );
        assert_eq!(outcome.attempts, 5);
        assert_eq!(oracle.calls(), 5);
        assert_eq!(outcome.final_score.value(), 0.6);
        assert_eq!(outcome.remaining_issues, vec![IssueKind::WordCountBelowMinimum]);

        let entries = journal.read_all().unwrap();
        assert!(matches!(
            &entries[..],
            [JournalEntry::Failure {
                reason: FailureReason::Exhausted,
                attempts: 5,
                ..
            }]
        ));
    }

    #[tokio::test]
    async fn nothing_to_fix_below_threshold_is_stuck() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(dir.path(), "a.md", &clean_doc());
        let oracle = ScriptedOracle::new([Some(50.0)]);
        let outcome = gate(Arc::clone(&oracle)).run(&path).await.unwrap();

        assert_eq!(
            outcome.status,
            GateStatus::Failed {
                reason: FailureReason::Stuck
            }
        );
        assert_eq!(outcome.attempts, 1);
        assert_eq!(oracle.calls(), 1);
        assert!(outcome.remaining_issues.is_empty());
    }

    #[tokio::test]
    async fn fixes_are_saved_before_rescoring() {
        let dir = tempfile::tempdir().unwrap();
        let raw = clean_doc().replace("## Conclusion", "## Wrap");
        let path = write_doc(dir.path(), "a.md", &raw);
        let oracle = ScriptedOracle::new([Some(70.0), Some(95.0)]);
        let outcome = gate(Arc::clone(&oracle)).run(&path).await.unwrap();

        assert!(outcome.passed());
        assert_eq!(outcome.history[0].fixes_applied, vec![IssueKind::MissingSection]);
        let seen = oracle.seen();
        assert!(!seen[0].contains("## Conclusion"));
        assert!(seen[1].contains("## Conclusion"));
    }

    #[tokio::test]
    async fn threshold_is_inclusive_and_never_relaxed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(dir.path(), "a.md", &short_doc());

        let just_below = ScriptedOracle::new([Some(89.0)]);
        let config = GateConfig {
            max_attempts: 2,
            ..GateConfig::default()
        };
        let outcome = Gate::new(config.clone(), just_below).run(&path).await.unwrap();
        assert!(!outcome.passed());
        assert!(outcome.final_score.value() < outcome.threshold.value());

        let at_threshold = ScriptedOracle::new([Some(90.0)]);
        let outcome = Gate::new(config, at_threshold).run(&path).await.unwrap();
        assert!(outcome.passed());
    }

    #[tokio::test]
    async fn single_attempt_budget_never_fixes() {
        let dir = tempfile::tempdir().unwrap();
        let raw = clean_doc().replace("## Conclusion", "## Wrap");
        let path = write_doc(dir.path(), "a.md", &raw);
        let config = GateConfig {
            max_attempts: 1,
            ..GateConfig::default()
        };
        let outcome = Gate::new(config, ScriptedOracle::new([Some(10.0)]))
            .run(&path)
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.history.is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), raw);
    }

    #[tokio::test]
    async fn oracle_failure_scores_zero_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(dir.path(), "a.md", &short_doc());
        let oracle = ScriptedOracle::new([None, Some(91.0)]);
        let outcome = gate(oracle).run(&path).await.unwrap();

        assert!(outcome.passed());
        assert_eq!(outcome.initial_score, QualityScore::ZERO);
        assert_eq!(outcome.oracle_errors, 1);
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn unreadable_input_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let oracle = ScriptedOracle::new([Some(95.0)]);

        let err = gate(Arc::clone(&oracle))
            .run(&dir.path().join("missing.md"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GateError::Load {
                source: StoreError::NotFound(_),
                ..
            }
        ));

        let bad = write_doc(dir.path(), "bad.md", "---\ntitle: x\n");
        let err = gate(Arc::clone(&oracle)).run(&bad).await.unwrap_err();
        assert!(matches!(
            err,
            GateError::Load {
                source: StoreError::Parse { .. },
                ..
            }
        ));
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn journal_failure_does_not_change_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(dir.path(), "a.md", &short_doc());
        // The journal's parent is a regular file, so every append fails.
        let blocker = write_doc(dir.path(), "blocker", "");
        let journal = Arc::new(Journal::new(blocker.join("journal.ndjson")));
        let oracle = ScriptedOracle::new([Some(50.0), Some(95.0)]);

        let outcome = gate(oracle).with_journal(journal).run(&path).await.unwrap();
        assert!(outcome.passed());
        assert!(outcome.journal_error.is_some());
    }

    #[test]
    fn outcome_serializes_status_tag() {
        let outcome = GateOutcome {
            keyword: "k".into(),
            path: PathBuf::from("k.md"),
            status: GateStatus::Failed {
                reason: FailureReason::Stuck,
            },
            threshold: Threshold::DEFAULT,
            initial_score: QualityScore::ZERO,
            final_score: QualityScore::ZERO,
            attempts: 1,
            scores: vec![QualityScore::ZERO],
            history: vec![],
            remaining_issues: vec![],
            oracle_errors: 1,
            journal_error: None,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"]["result"], "failed");
        assert_eq!(json["status"]["reason"], "stuck");
        assert!(json.get("journal_error").is_none());
    }
}
