//! Append-only result journal.
//!
//! One JSON object per line (NDJSON). Appends are serialized twice over: a
//! process-wide mutex for writers sharing a [`Journal`], and an exclusive
//! `flock` on a sibling `.lock` file for writers in other processes. Existing
//! lines are never edited; bounded retention drops the oldest lines by
//! rewriting the surviving tail to a temp file and renaming it into place
//! while the lock is held.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use draftgate_core::{IssueKind, JournalConfig, QualityScore, Threshold};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::StoreError;

/// Why a run ended without passing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The attempt budget ran out below the threshold.
    Exhausted,
    /// The analyzer found nothing left to repair below the threshold.
    Stuck,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exhausted => "exhausted",
            Self::Stuck => "stuck",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One journal record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JournalEntry {
    /// Fixes brought the document over the threshold.
    FixSuccess {
        timestamp: DateTime<Utc>,
        keyword: String,
        path: PathBuf,
        initial_score: QualityScore,
        final_score: QualityScore,
        attempts: u32,
        threshold: Threshold,
        score_trail: Vec<QualityScore>,
    },
    Failure {
        timestamp: DateTime<Utc>,
        keyword: String,
        path: PathBuf,
        reason: FailureReason,
        attempts: u32,
        initial_score: QualityScore,
        final_score: QualityScore,
        /// Threshold in force when the run failed.
        threshold: Threshold,
        remaining_issues: Vec<IssueKind>,
        score_trail: Vec<QualityScore>,
    },
}

impl JournalEntry {
    pub fn keyword(&self) -> &str {
        match self {
            Self::FixSuccess { keyword, .. } | Self::Failure { keyword, .. } => keyword,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::FixSuccess { timestamp, .. } | Self::Failure { timestamp, .. } => *timestamp,
        }
    }
}

/// Handle to a journal file. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    lock_path: PathBuf,
    max_entries: Option<usize>,
    writer: Mutex<()>,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_path = OsString::from(path.as_os_str());
        lock_path.push(".lock");
        Self {
            path,
            lock_path: PathBuf::from(lock_path),
            max_entries: None,
            writer: Mutex::new(()),
        }
    }

    pub fn from_config(config: &JournalConfig) -> Self {
        Self::new(&config.path).with_max_entries(config.max_entries)
    }

    pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry, then apply retention if configured.
    pub fn append(&self, entry: &JournalEntry) -> Result<(), StoreError> {
        let _writer = self.writer.lock().map_err(|_| StoreError::LockPoisoned)?;
        ensure_parent_dir(&self.path)?;
        let lock = self.lock_file()?;
        FileExt::lock_exclusive(&lock).map_err(StoreError::io(&self.lock_path))?;

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(StoreError::io(&self.path))?;
        file.write_all(line.as_bytes())
            .map_err(StoreError::io(&self.path))?;
        file.sync_all().map_err(StoreError::io(&self.path))?;

        if let Some(max) = self.max_entries {
            self.drop_oldest(max)?;
        }
        drop(lock);
        Ok(())
    }

    /// All readable entries, oldest first. Corrupt lines are logged and skipped.
    pub fn read_all(&self) -> Result<Vec<JournalEntry>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let _writer = self.writer.lock().map_err(|_| StoreError::LockPoisoned)?;
        let lock = self.lock_file()?;
        FileExt::lock_shared(&lock).map_err(StoreError::io(&self.lock_path))?;
        let text = fs::read_to_string(&self.path).map_err(StoreError::io(&self.path))?;
        drop(lock);

        let mut entries = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(err) => warn!(
                    path = %self.path.display(),
                    line = idx + 1,
                    error = %err,
                    "skipping unreadable journal line"
                ),
            }
        }
        Ok(entries)
    }

    fn lock_file(&self) -> Result<File, StoreError> {
        ensure_parent_dir(&self.lock_path)?;
        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(StoreError::io(&self.lock_path))
    }

    /// Keep only the newest `max` lines. Caller holds the file lock.
    fn drop_oldest(&self, max: usize) -> Result<(), StoreError> {
        let text = fs::read_to_string(&self.path).map_err(StoreError::io(&self.path))?;
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.len() <= max {
            return Ok(());
        }
        let dropped = lines.len() - max;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(StoreError::io(dir))?;
        for line in &lines[dropped..] {
            tmp.write_all(line.as_bytes())
                .and_then(|()| tmp.write_all(b"\n"))
                .map_err(StoreError::io(&self.path))?;
        }
        tmp.as_file().sync_all().map_err(StoreError::io(&self.path))?;
        tmp.persist(&self.path).map_err(|err| StoreError::Io {
            path: self.path.clone(),
            source: err.error,
        })?;

        info!(path = %self.path.display(), dropped, kept = max, "journal retention applied");
        Ok(())
    }
}

fn ensure_parent_dir(path: &Path) -> Result<(), StoreError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(StoreError::io(parent))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn score(pct: f64) -> QualityScore {
        QualityScore::from_percentage(pct).unwrap()
    }

    fn success(keyword: &str) -> JournalEntry {
        JournalEntry::FixSuccess {
            timestamp: Utc::now(),
            keyword: keyword.to_string(),
            path: PathBuf::from(format!("drafts/{keyword}.md")),
            initial_score: score(72.0),
            final_score: score(92.0),
            attempts: 3,
            threshold: Threshold::DEFAULT,
            score_trail: vec![score(72.0), score(82.0), score(92.0)],
        }
    }

    fn failure(keyword: &str) -> JournalEntry {
        JournalEntry::Failure {
            timestamp: Utc::now(),
            keyword: keyword.to_string(),
            path: PathBuf::from(format!("drafts/{keyword}.md")),
            reason: FailureReason::Exhausted,
            attempts: 5,
            initial_score: score(55.0),
            final_score: score(60.0),
            threshold: Threshold::DEFAULT,
            remaining_issues: vec![IssueKind::WordCountBelowMinimum],
            score_trail: vec![score(55.0), score(60.0)],
        }
    }

    #[test]
    fn appends_preserve_order() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path().join("logs/journal.ndjson"));
        journal.append(&success("espresso")).unwrap();
        journal.append(&failure("grinder")).unwrap();

        let entries = journal.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].keyword(), "espresso");
        assert_eq!(entries[1].keyword(), "grinder");
        assert!(matches!(
            entries[1],
            JournalEntry::Failure {
                reason: FailureReason::Exhausted,
                attempts: 5,
                ..
            }
        ));
    }

    #[test]
    fn entries_are_tagged_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path().join("journal.ndjson"));
        journal.append(&failure("grinder")).unwrap();

        let text = fs::read_to_string(journal.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(value["outcome"], "failure");
        assert_eq!(value["reason"], "exhausted");
        assert_eq!(value["threshold"], 0.9);
        assert_eq!(value["final_score"], 0.6);
        assert_eq!(value["remaining_issues"][0], "word_count_below_minimum");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn missing_journal_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path().join("none.ndjson"));
        assert!(journal.read_all().unwrap().is_empty());
    }

    #[test]
    fn corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path().join("journal.ndjson"));
        journal.append(&success("a")).unwrap();
        let mut file = OpenOptions::new().append(true).open(journal.path()).unwrap();
        file.write_all(b"{not json\n").unwrap();
        journal.append(&success("b")).unwrap();

        let keywords: Vec<String> = journal
            .read_all()
            .unwrap()
            .iter()
            .map(|e| e.keyword().to_string())
            .collect();
        assert_eq!(keywords, vec!["a", "b"]);
    }

    #[test]
    fn retention_drops_oldest_entries() {
        let dir = tempfile::tempdir().unwrap();
        let journal =
            Journal::new(dir.path().join("journal.ndjson")).with_max_entries(Some(3));
        for keyword in ["a", "b", "c", "d", "e"] {
            journal.append(&success(keyword)).unwrap();
        }
        let keywords: Vec<String> = journal
            .read_all()
            .unwrap()
            .iter()
            .map(|e| e.keyword().to_string())
            .collect();
        assert_eq!(keywords, vec!["c", "d", "e"]);
    }

    #[test]
    fn concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Arc::new(Journal::new(dir.path().join("journal.ndjson")));

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let journal = Arc::clone(&journal);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        journal.append(&success(&format!("w{worker}-{i}"))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let text = fs::read_to_string(journal.path()).unwrap();
        assert_eq!(text.lines().count(), 200);
        assert_eq!(journal.read_all().unwrap().len(), 200);
    }

    #[test]
    fn separate_handles_share_the_file_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.ndjson");
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let journal = Journal::new(&path);
                std::thread::spawn(move || {
                    for i in 0..20 {
                        journal.append(&failure(&format!("h{worker}-{i}"))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(Journal::new(&path).read_all().unwrap().len(), 80);
    }
}
