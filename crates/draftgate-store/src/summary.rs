//! Offline aggregation over journal entries.

use std::collections::BTreeMap;

use draftgate_core::IssueKind;
use serde::Serialize;

use crate::journal::{FailureReason, JournalEntry};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JournalSummary {
    pub entries: usize,
    pub successes: usize,
    pub exhausted: usize,
    pub stuck: usize,
    pub mean_initial_score: Option<f64>,
    pub mean_final_score: Option<f64>,
    pub mean_attempts: Option<f64>,
    /// Issue kinds left unresolved by failed runs, most frequent first.
    pub unresolved_issues: Vec<(IssueKind, usize)>,
}

pub fn summarize(entries: &[JournalEntry]) -> JournalSummary {
    let mut summary = JournalSummary {
        entries: entries.len(),
        ..JournalSummary::default()
    };
    let mut initial = Vec::with_capacity(entries.len());
    let mut final_scores = Vec::with_capacity(entries.len());
    let mut attempts = Vec::with_capacity(entries.len());
    let mut unresolved: BTreeMap<IssueKind, usize> = BTreeMap::new();

    for entry in entries {
        match entry {
            JournalEntry::FixSuccess {
                initial_score,
                final_score,
                attempts: n,
                ..
            } => {
                summary.successes += 1;
                initial.push(initial_score.value());
                final_scores.push(final_score.value());
                attempts.push(f64::from(*n));
            }
            JournalEntry::Failure {
                reason,
                initial_score,
                final_score,
                attempts: n,
                remaining_issues,
                ..
            } => {
                match reason {
                    FailureReason::Exhausted => summary.exhausted += 1,
                    FailureReason::Stuck => summary.stuck += 1,
                }
                initial.push(initial_score.value());
                final_scores.push(final_score.value());
                attempts.push(f64::from(*n));
                for kind in remaining_issues {
                    *unresolved.entry(*kind).or_default() += 1;
                }
            }
        }
    }

    summary.mean_initial_score = mean(&initial);
    summary.mean_final_score = mean(&final_scores);
    summary.mean_attempts = mean(&attempts);

    let mut unresolved: Vec<(IssueKind, usize)> = unresolved.into_iter().collect();
    unresolved.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    summary.unresolved_issues = unresolved;
    summary
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}
