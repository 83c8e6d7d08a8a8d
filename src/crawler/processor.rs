//! Processing of a single item: admission, storage and state updates

use crate::assets::AssetStore;
use crate::classify::{ItemClassifier, StoragePlan, prepare_folder, recorded_url, write_text};
use crate::error::{Error, Result};
use crate::state::{Admission, DedupState, RetryLedger};
use crate::types::{Event, FeedOwner, Item, ProcessOutcome, RawItem};
use tokio::sync::broadcast;

/// How [`ItemProcessor`] treats an item
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ProcessMode {
    /// Part of a feed walk: the dedup strategy applies and failures go to
    /// the retry ledger
    Walk,
    /// Reprocessing a retry-ledger entry: the date threshold is ignored and
    /// the ledger is left to the retry runner
    Retry,
}

/// Everything needed to capture items of one feed owner
///
/// Owns the owner's [`DedupState`] and [`RetryLedger`] for the duration of a
/// walk or retry run, which makes it the single writer of those files.
pub struct ItemProcessor {
    owner: FeedOwner,
    canonical_base: String,
    classifier: ItemClassifier,
    assets: AssetStore,
    state: DedupState,
    ledger: RetryLedger,
    event_tx: broadcast::Sender<Event>,
}

impl ItemProcessor {
    pub(crate) fn new(
        owner: FeedOwner,
        canonical_base: String,
        classifier: ItemClassifier,
        assets: AssetStore,
        state: DedupState,
        ledger: RetryLedger,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            owner,
            canonical_base,
            classifier,
            assets,
            state,
            ledger,
            event_tx,
        }
    }

    /// Feed owner this processor writes for
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Dedup state of the owner
    pub fn state(&self) -> &DedupState {
        &self.state
    }

    /// Retry ledger of the owner
    pub fn ledger(&self) -> &RetryLedger {
        &self.ledger
    }

    pub(crate) fn ledger_mut(&mut self) -> &mut RetryLedger {
        &mut self.ledger
    }

    pub(crate) fn canonical_base(&self) -> &str {
        &self.canonical_base
    }

    /// Process one item of a feed walk
    pub async fn process(&mut self, raw: &RawItem) -> ProcessOutcome {
        self.process_with_mode(raw, ProcessMode::Walk).await
    }

    pub(crate) async fn process_with_mode(
        &mut self,
        raw: &RawItem,
        mode: ProcessMode,
    ) -> ProcessOutcome {
        let item = match raw.decode(&self.canonical_base) {
            Ok(item) => item,
            Err(e) => {
                tracing::debug!(owner = %self.owner, error = %e, "Skipping malformed item");
                return ProcessOutcome::Malformed;
            }
        };

        let admission = match mode {
            ProcessMode::Walk => self.state.admit(&item),
            ProcessMode::Retry if self.state.is_captured(&item.canonical_url) => {
                Admission::AlreadyCaptured
            }
            ProcessMode::Retry => Admission::Proceed,
        };

        match admission {
            Admission::BelowThreshold => {
                tracing::info!(
                    owner = %self.owner,
                    url = %item.canonical_url,
                    threshold = ?self.state.threshold(),
                    "Reached date threshold"
                );
                return ProcessOutcome::EndOfWalk;
            }
            Admission::AlreadyCaptured => {
                tracing::debug!(owner = %self.owner, url = %item.canonical_url, "Already captured, skipping");
                self.emit(Event::ItemSkipped {
                    owner: self.owner.clone(),
                    url: item.canonical_url.clone(),
                });
                return ProcessOutcome::AlreadyCaptured;
            }
            Admission::Proceed => {}
        }

        match self.capture(&item).await {
            Ok(()) => {
                if mode == ProcessMode::Walk {
                    self.ledger.resolve(&item.canonical_url);
                }
                tracing::info!(owner = %self.owner, url = %item.canonical_url, "Captured item");
                self.emit(Event::ItemCaptured {
                    owner: self.owner.clone(),
                    url: item.canonical_url.clone(),
                });
                ProcessOutcome::Captured
            }
            Err(e) => {
                tracing::warn!(owner = %self.owner, url = %item.canonical_url, error = %e, "Failed to capture item");
                if mode == ProcessMode::Walk
                    && let Err(ledger_err) = self.ledger.record_failure(&item.canonical_url)
                {
                    tracing::error!(
                        owner = %self.owner,
                        url = %item.canonical_url,
                        error = %ledger_err,
                        "Failed to record item in retry ledger"
                    );
                }
                self.emit(Event::ItemFailed {
                    owner: self.owner.clone(),
                    url: item.canonical_url.clone(),
                    error: e.to_string(),
                });
                ProcessOutcome::Failed
            }
        }
    }

    /// Write the item's artifacts, then record it as captured
    async fn capture(&mut self, item: &Item) -> Result<()> {
        match self.classifier.plan(item) {
            StoragePlan::TextFile { path, content } => {
                write_text(&path, &content).await?;
                tracing::debug!(path = %path.display(), "Saved text item");
            }
            StoragePlan::Folder {
                dir,
                info,
                attachments,
            } => {
                prepare_folder(&dir).await?;
                if let Some(previous) = recorded_url(&dir).await
                    && previous != item.canonical_url
                {
                    tracing::warn!(
                        dir = %dir.display(),
                        url = %item.canonical_url,
                        previous = %previous,
                        "Item folder already holds another item; attachments on disk are kept"
                    );
                }
                write_text(&dir.join(crate::classify::INFO_FILE), &info).await?;

                let mut saved = 0usize;
                for target in &attachments {
                    if self.assets.fetch(&target.source_url, &target.path).await {
                        saved += 1;
                    }
                }
                tracing::debug!(
                    dir = %dir.display(),
                    saved,
                    total = attachments.len(),
                    "Saved item folder"
                );
            }
        }

        self.state.record_capture(item)?;
        Ok(())
    }

    /// Rewrite the timestamp log and flush the retry ledger
    ///
    /// Both steps are attempted even if the first one fails.
    pub fn finalize(&mut self) -> Result<()> {
        let state_result = self.state.finalize();
        let ledger_result = self.ledger.flush().map_err(Error::from);
        state_result.and(ledger_result)
    }

    fn emit(&self, event: Event) {
        // Ignore send errors (no subscribers)
        self.event_tx.send(event).ok();
    }
}
