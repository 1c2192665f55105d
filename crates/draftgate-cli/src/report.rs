//! Human-readable terminal output. Logs go to stderr; everything here is stdout.

use std::path::Path;

use draftgate_core::{FixReport, Issue, IssueKind};
use draftgate_runner::{BatchSummary, FailureCause, GateStatus};
use draftgate_store::{JournalEntry, JournalSummary};

pub fn print_check(path: &Path, error: Option<&str>, issues: &[Issue]) {
    if let Some(error) = error {
        println!("{}: error: {error}", path.display());
        return;
    }
    if issues.is_empty() {
        println!("{}: ok", path.display());
        return;
    }
    println!("{}: {} issue(s)", path.display(), issues.len());
    for issue in issues {
        println!("  - [{}] {issue}", issue.kind());
    }
}

pub fn print_fix(path: &Path, report: &FixReport) {
    println!(
        "{}: applied {}, skipped {}",
        path.display(),
        kinds(&report.applied),
        kinds(&report.skipped)
    );
}

pub fn print_batch(summary: &BatchSummary) {
    for outcome in &summary.outcomes {
        let status = match outcome.status {
            GateStatus::Passed => "PASS".to_string(),
            GateStatus::Failed { reason } => format!("FAIL ({reason})"),
        };
        println!(
            "{status:<16} {:<32} {} -> {} in {} attempt(s)  {}",
            outcome.keyword,
            outcome.initial_score,
            outcome.final_score,
            outcome.attempts,
            outcome.path.display()
        );
    }

    if !summary.failures.is_empty() {
        println!();
        println!("Failures:");
        for failure in &summary.failures {
            let cause = match &failure.cause {
                FailureCause::Exhausted => "attempts exhausted".to_string(),
                FailureCause::Stuck => "no fixable issues left".to_string(),
                FailureCause::Error(message) => message.clone(),
            };
            println!("  {}: {cause}", failure.path.display());
            if !failure.remaining_issues.is_empty() {
                println!("    remaining: {}", kinds(&failure.remaining_issues));
            }
        }
    }

    println!();
    println!(
        "passed {}, failed {}, errored {}, skipped {}",
        summary.passed, summary.failed, summary.errored, summary.skipped
    );
}

pub fn print_journal_summary(summary: &JournalSummary) {
    println!("entries:    {}", summary.entries);
    println!("successes:  {}", summary.successes);
    println!("exhausted:  {}", summary.exhausted);
    println!("stuck:      {}", summary.stuck);
    println!("mean initial score: {}", mean(summary.mean_initial_score));
    println!("mean final score:   {}", mean(summary.mean_final_score));
    println!("mean attempts:      {}", mean(summary.mean_attempts));
    if !summary.unresolved_issues.is_empty() {
        println!("unresolved issues:");
        for (kind, count) in &summary.unresolved_issues {
            println!("  {count:>5}  {kind}");
        }
    }
}

pub fn print_journal_entry(entry: &JournalEntry) {
    match entry {
        JournalEntry::FixSuccess {
            timestamp,
            keyword,
            initial_score,
            final_score,
            attempts,
            ..
        } => println!(
            "{}  fix_success  {keyword}  {} -> {}  attempts {attempts}",
            timestamp.format("%Y-%m-%d %H:%M:%S"),
            initial_score,
            final_score
        ),
        JournalEntry::Failure {
            timestamp,
            keyword,
            reason,
            initial_score,
            final_score,
            attempts,
            remaining_issues,
            ..
        } => println!(
            "{}  failure ({reason})  {keyword}  {} -> {}  attempts {attempts}  remaining [{}]",
            timestamp.format("%Y-%m-%d %H:%M:%S"),
            initial_score,
            final_score,
            kinds(remaining_issues)
        ),
    }
}

fn kinds(kinds: &[IssueKind]) -> String {
    if kinds.is_empty() {
        return "none".to_string();
    }
    kinds
        .iter()
        .map(IssueKind::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn mean(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}
