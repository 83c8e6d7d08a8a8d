//! Persisted crawl state of one feed owner
//!
//! Three files live in the owner's content directory:
//!
//! | File | Content |
//! |------|---------|
//! | `captured_urls.txt` | canonical URL of every captured item |
//! | `capture_timestamps.txt` | encoded timestamp (`YYYYMMDDHHMM`) of every captured item |
//! | `retry_ledger.txt` | canonical URL of every item waiting for a retry |
//!
//! During a walk the files only grow. The timestamp log is re-sorted
//! descending and the retry ledger's removals are written out by
//! [`DedupState::finalize`] and [`RetryLedger::flush`] at the end of the walk.

use crate::config::{ClockZone, DedupConfig, DedupStrategy};
use crate::error::{Error, PersistenceError, Result};
use crate::types::Item;
use crate::utils::encode_timestamp;
use std::collections::HashSet;
use std::path::Path;

mod line_file;
mod retry_ledger;

use line_file::LineFile;
pub use retry_ledger::RetryLedger;

/// File holding the captured canonical URLs
pub const CAPTURED_URLS_FILE: &str = "captured_urls.txt";
/// File holding the encoded capture timestamps
pub const CAPTURE_TIMESTAMPS_FILE: &str = "capture_timestamps.txt";
/// File holding the retry ledger
pub const RETRY_LEDGER_FILE: &str = "retry_ledger.txt";

/// Verdict of [`DedupState::admit`] for an incoming item
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Process the item
    Proceed,
    /// The canonical URL is already captured; skip the item and keep walking
    AlreadyCaptured,
    /// The item is older than the date threshold; end the walk
    BelowThreshold,
}

/// Which items of an owner's feed have been captured already
///
/// One type covers both strategies: the URL set is always maintained, and the
/// timestamp log provides the date threshold when
/// [`DedupStrategy::DateThreshold`] is selected.
#[derive(Debug)]
pub struct DedupState {
    strategy: DedupStrategy,
    clock: ClockZone,
    threshold: Option<u64>,
    captured_file: LineFile,
    captured: HashSet<String>,
    timestamps_file: LineFile,
    timestamps: Vec<u64>,
}

impl DedupState {
    /// Load (or create) the state files in `dir`
    ///
    /// Under [`DedupStrategy::DateThreshold`] the threshold is the configured
    /// one if set, else the newest persisted timestamp. It stays fixed for the
    /// lifetime of this value so items captured during the walk do not move it.
    ///
    /// # Errors
    /// Fails if a state file cannot be created or read, or if the timestamp
    /// log contains a line that is not an integer.
    pub fn open(dir: &Path, config: &DedupConfig, clock: ClockZone) -> Result<Self> {
        let captured_file = LineFile::open(dir.join(CAPTURED_URLS_FILE))?;
        let captured: HashSet<String> = captured_file.read_lines()?.into_iter().collect();

        let timestamps_file = LineFile::open(dir.join(CAPTURE_TIMESTAMPS_FILE))?;
        let timestamps = parse_timestamps(&timestamps_file)?;

        let threshold = match config.strategy {
            DedupStrategy::UrlMembership => None,
            DedupStrategy::DateThreshold => config
                .date_threshold
                .or_else(|| timestamps.iter().copied().max()),
        };

        tracing::debug!(
            dir = %dir.display(),
            strategy = ?config.strategy,
            captured = captured.len(),
            threshold = ?threshold,
            "Loaded dedup state"
        );

        Ok(Self {
            strategy: config.strategy,
            clock,
            threshold,
            captured_file,
            captured,
            timestamps_file,
            timestamps,
        })
    }

    /// Active strategy
    pub fn strategy(&self) -> DedupStrategy {
        self.strategy
    }

    /// Active date threshold, if any
    pub fn threshold(&self) -> Option<u64> {
        self.threshold
    }

    /// Encoded timestamp of `item` in this state's clock
    pub fn encode(&self, item: &Item) -> u64 {
        encode_timestamp(&item.published_at, self.clock)
    }

    /// Decide whether `item` should be processed
    ///
    /// The threshold is checked first: an item strictly older than it ends
    /// the walk. Items already in the URL set are skipped under both
    /// strategies so nothing is ever captured twice.
    pub fn admit(&self, item: &Item) -> Admission {
        if self.strategy == DedupStrategy::DateThreshold
            && let Some(threshold) = self.threshold
            && self.encode(item) < threshold
        {
            return Admission::BelowThreshold;
        }
        if self.is_captured(&item.canonical_url) {
            return Admission::AlreadyCaptured;
        }
        Admission::Proceed
    }

    /// Whether `url` is in the captured set
    pub fn is_captured(&self, url: &str) -> bool {
        self.captured.contains(url)
    }

    /// Record a successfully persisted item
    ///
    /// Appends the encoded timestamp, then the URL, to their files. Returns
    /// `false` and writes nothing if the URL was already recorded.
    ///
    /// The URL line is what marks an item as captured, so it is written last.
    /// If it cannot be written, the timestamp log is restored from memory and
    /// the item stays uncaptured.
    pub fn record_capture(&mut self, item: &Item) -> Result<bool> {
        if self.captured.contains(&item.canonical_url) {
            return Ok(false);
        }
        let encoded = self.encode(item);

        self.timestamps_file.append(&encoded.to_string())?;
        if let Err(e) = self.captured_file.append(&item.canonical_url) {
            if let Err(rollback) = self
                .timestamps_file
                .rewrite(self.timestamps.iter().map(u64::to_string))
            {
                tracing::error!(
                    path = %self.timestamps_file.path().display(),
                    error = %rollback,
                    "Failed to roll back capture timestamp"
                );
            }
            return Err(e.into());
        }

        self.timestamps.push(encoded);
        self.captured.insert(item.canonical_url.clone());
        Ok(true)
    }

    /// Re-sort the timestamp log descending and rewrite it
    pub fn finalize(&mut self) -> Result<()> {
        self.timestamps.sort_unstable_by(|a, b| b.cmp(a));
        self.timestamps_file
            .rewrite(self.timestamps.iter().map(u64::to_string))?;
        Ok(())
    }

    /// Number of captured URLs
    pub fn captured_count(&self) -> usize {
        self.captured.len()
    }

    /// Capture timestamps in memory (sorted only after [`DedupState::finalize`])
    pub fn timestamps(&self) -> &[u64] {
        &self.timestamps
    }
}

fn parse_timestamps(file: &LineFile) -> Result<Vec<u64>> {
    file.read_lines()?
        .into_iter()
        .enumerate()
        .map(|(idx, line)| {
            line.parse::<u64>().map_err(|_| {
                Error::from(PersistenceError::CorruptState {
                    path: file.path().to_path_buf(),
                    line: idx + 1,
                    content: line.clone(),
                })
            })
        })
        .collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::fs;
    use tempfile::tempdir;

    const UTC: ClockZone = ClockZone::FixedOffset(0);

    fn item(id: &str, y: i32, mo: u32, d: u32, h: u32, mi: u32) -> Item {
        Item {
            id: id.to_string(),
            published_at: Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap(),
            body: String::new(),
            attachments: vec![],
            canonical_url: format!("https://x/{}", id),
        }
    }

    fn threshold_config(date_threshold: Option<u64>) -> DedupConfig {
        DedupConfig {
            strategy: DedupStrategy::DateThreshold,
            date_threshold,
        }
    }

    #[test]
    fn test_url_membership_admission() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CAPTURED_URLS_FILE), "https://x/1\n").unwrap();

        let state = DedupState::open(dir.path(), &DedupConfig::default(), UTC).unwrap();
        assert_eq!(state.threshold(), None);
        assert_eq!(
            state.admit(&item("1", 2024, 1, 1, 12, 0)),
            Admission::AlreadyCaptured
        );
        assert_eq!(state.admit(&item("2", 2020, 1, 1, 0, 0)), Admission::Proceed);
    }

    #[test]
    fn test_threshold_defaults_to_newest_timestamp() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CAPTURE_TIMESTAMPS_FILE),
            "202312311800\n202401011150\n",
        )
        .unwrap();

        let state = DedupState::open(dir.path(), &threshold_config(None), UTC).unwrap();
        assert_eq!(state.threshold(), Some(202401011150));
        assert_eq!(state.admit(&item("a", 2024, 1, 1, 12, 0)), Admission::Proceed);
        // Equal to the threshold is not older
        assert_eq!(state.admit(&item("b", 2024, 1, 1, 11, 50)), Admission::Proceed);
        assert_eq!(
            state.admit(&item("c", 2024, 1, 1, 11, 49)),
            Admission::BelowThreshold
        );
    }

    #[test]
    fn test_configured_threshold_wins() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CAPTURE_TIMESTAMPS_FILE), "202501010000\n").unwrap();

        let state =
            DedupState::open(dir.path(), &threshold_config(Some(202401011150)), UTC).unwrap();
        assert_eq!(state.threshold(), Some(202401011150));
    }

    #[test]
    fn test_no_threshold_without_history() {
        let dir = tempdir().unwrap();
        let state = DedupState::open(dir.path(), &threshold_config(None), UTC).unwrap();
        assert_eq!(state.threshold(), None);
        assert_eq!(state.admit(&item("a", 1999, 1, 1, 0, 0)), Admission::Proceed);
    }

    #[test]
    fn test_record_capture_is_exactly_once() {
        let dir = tempdir().unwrap();
        let mut state = DedupState::open(dir.path(), &DedupConfig::default(), UTC).unwrap();
        let it = item("7", 2024, 1, 1, 12, 0);

        assert!(state.record_capture(&it).unwrap());
        assert!(!state.record_capture(&it).unwrap());

        assert_eq!(
            fs::read_to_string(dir.path().join(CAPTURED_URLS_FILE)).unwrap(),
            "https://x/7\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join(CAPTURE_TIMESTAMPS_FILE)).unwrap(),
            "202401011200\n"
        );
        assert_eq!(state.captured_count(), 1);
    }

    #[test]
    fn test_unwritable_timestamp_log_leaves_item_uncaptured() {
        let dir = tempdir().unwrap();
        let mut state = DedupState::open(dir.path(), &DedupConfig::default(), UTC).unwrap();
        let it = item("1", 2024, 1, 1, 12, 0);

        let log = dir.path().join(CAPTURE_TIMESTAMPS_FILE);
        fs::remove_file(&log).unwrap();
        fs::create_dir(&log).unwrap();

        assert!(state.record_capture(&it).is_err());
        assert!(!state.is_captured(&it.canonical_url));
        assert!(state.timestamps().is_empty());
        assert_eq!(
            fs::read_to_string(dir.path().join(CAPTURED_URLS_FILE)).unwrap(),
            ""
        );

        fs::remove_dir(&log).unwrap();
        fs::write(&log, "").unwrap();

        assert!(state.record_capture(&it).unwrap());
        assert_eq!(
            fs::read_to_string(dir.path().join(CAPTURED_URLS_FILE)).unwrap(),
            "https://x/1\n"
        );
        assert_eq!(fs::read_to_string(&log).unwrap(), "202401011200\n");
    }

    #[test]
    fn test_unwritable_url_file_rolls_back_timestamp() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CAPTURE_TIMESTAMPS_FILE), "202312311800\n").unwrap();
        let mut state = DedupState::open(dir.path(), &DedupConfig::default(), UTC).unwrap();
        let it = item("2", 2024, 1, 1, 12, 0);

        let urls = dir.path().join(CAPTURED_URLS_FILE);
        fs::remove_file(&urls).unwrap();
        fs::create_dir(&urls).unwrap();

        assert!(state.record_capture(&it).is_err());
        assert!(!state.is_captured(&it.canonical_url));
        assert_eq!(state.timestamps(), [202312311800u64].as_slice());
        assert_eq!(
            fs::read_to_string(dir.path().join(CAPTURE_TIMESTAMPS_FILE)).unwrap(),
            "202312311800\n"
        );
    }

    #[test]
    fn test_finalize_sorts_descending() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CAPTURE_TIMESTAMPS_FILE), "202401011100\n").unwrap();
        let mut state = DedupState::open(dir.path(), &DedupConfig::default(), UTC).unwrap();

        state.record_capture(&item("1", 2023, 12, 31, 18, 0)).unwrap();
        state.record_capture(&item("2", 2024, 1, 1, 12, 0)).unwrap();
        state.finalize().unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join(CAPTURE_TIMESTAMPS_FILE)).unwrap(),
            "202401011200\n202401011100\n202312311800\n"
        );
    }

    #[test]
    fn test_corrupt_timestamp_line_is_reported() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CAPTURE_TIMESTAMPS_FILE),
            "202401011100\nyesterday\n",
        )
        .unwrap();

        let err = DedupState::open(dir.path(), &DedupConfig::default(), UTC).unwrap_err();
        assert!(matches!(
            err,
            Error::Persistence(PersistenceError::CorruptState { line: 2, .. })
        ));
    }
}
