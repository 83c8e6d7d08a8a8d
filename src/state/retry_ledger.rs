//! Persisted set of canonical URLs whose processing failed

use super::line_file::LineFile;
use crate::error::PersistenceError;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Items waiting to be reprocessed
///
/// Failures are appended to disk as soon as they happen. Removals are only
/// applied in memory and reach the disk on [`RetryLedger::flush`], so the file
/// is never rewritten in the middle of a walk.
#[derive(Debug)]
pub struct RetryLedger {
    file: LineFile,
    entries: BTreeSet<String>,
    dirty: bool,
}

impl RetryLedger {
    /// Open (or create) the ledger file at `path`
    pub fn open(path: PathBuf) -> Result<Self, PersistenceError> {
        let file = LineFile::open(path)?;
        let lines = file.read_lines()?;
        let loaded = lines.len();
        let entries: BTreeSet<String> = lines.into_iter().collect();

        Ok(Self {
            file,
            // Duplicate lines from older runs are collapsed on the next flush
            dirty: entries.len() != loaded,
            entries,
        })
    }

    /// Whether `url` is waiting for a retry
    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains(url)
    }

    /// Record a failed item; returns `false` if it was already in the ledger
    pub fn record_failure(&mut self, url: &str) -> Result<bool, PersistenceError> {
        if self.entries.contains(url) {
            return Ok(false);
        }
        self.file.append(url)?;
        self.entries.insert(url.to_string());
        Ok(true)
    }

    /// Drop `url` after it was processed successfully
    pub fn resolve(&mut self, url: &str) -> bool {
        let removed = self.entries.remove(url);
        if removed {
            self.dirty = true;
        }
        removed
    }

    /// Replace the ledger wholesale and write it out
    pub fn replace_all<I>(&mut self, urls: I) -> Result<(), PersistenceError>
    where
        I: IntoIterator<Item = String>,
    {
        self.entries = urls.into_iter().collect();
        self.dirty = true;
        self.flush()
    }

    /// Write pending removals to disk
    pub fn flush(&mut self) -> Result<(), PersistenceError> {
        if !self.dirty {
            return Ok(());
        }
        self.file.rewrite(&self.entries)?;
        self.dirty = false;
        Ok(())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in sorted order
    pub fn entries(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_failures_are_appended_immediately() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("retry_ledger.txt");
        let mut ledger = RetryLedger::open(path.clone()).unwrap();

        assert!(ledger.record_failure("https://x/2").unwrap());
        assert!(!ledger.record_failure("https://x/2").unwrap());
        assert!(ledger.record_failure("https://x/1").unwrap());

        assert_eq!(fs::read_to_string(&path).unwrap(), "https://x/2\nhttps://x/1\n");
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_resolve_is_deferred_until_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("retry_ledger.txt");
        fs::write(&path, "https://x/1\nhttps://x/2\n").unwrap();

        let mut ledger = RetryLedger::open(path.clone()).unwrap();
        assert!(ledger.resolve("https://x/1"));
        assert!(!ledger.resolve("https://x/9"));
        assert!(!ledger.contains("https://x/1"));

        // Still on disk until flushed
        assert!(fs::read_to_string(&path).unwrap().contains("https://x/1"));

        ledger.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "https://x/2\n");
    }

    #[test]
    fn test_open_collapses_duplicates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("retry_ledger.txt");
        fs::write(&path, "https://x/1\nhttps://x/1\n").unwrap();

        let mut ledger = RetryLedger::open(path.clone()).unwrap();
        assert_eq!(ledger.len(), 1);
        ledger.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "https://x/1\n");
    }

    #[test]
    fn test_replace_all() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("retry_ledger.txt");
        let mut ledger = RetryLedger::open(path.clone()).unwrap();
        ledger.record_failure("https://x/1").unwrap();

        ledger
            .replace_all(vec!["https://x/3".to_string(), "https://x/2".to_string()])
            .unwrap();
        assert_eq!(ledger.entries(), vec!["https://x/2", "https://x/3"]);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "https://x/2\nhttps://x/3\n"
        );

        ledger.replace_all(Vec::new()).unwrap();
        assert!(ledger.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }
}
