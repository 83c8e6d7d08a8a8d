//! Reprocessing of retry-ledger entries

use super::processor::{ItemProcessor, ProcessMode};
use crate::config::Config;
use crate::transport::Transport;
use crate::types::{Event, ProcessOutcome, RetrySummary, item_id_from_url};
use tokio::sync::broadcast;

/// Re-resolves failed items through the detail lookup and processes them again
///
/// Runs up to `max_retry_rounds` rounds over the ledger. Entries that succeed
/// leave the working set; the ones still failing after the last round replace
/// the ledger's previous content. Entries whose identifier cannot be parsed
/// are dropped without consuming an attempt.
pub struct RetryRunner<'a> {
    transport: &'a dyn Transport,
    config: &'a Config,
    event_tx: broadcast::Sender<Event>,
}

impl<'a> RetryRunner<'a> {
    /// Create a runner over `transport`
    pub fn new(
        transport: &'a dyn Transport,
        config: &'a Config,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            transport,
            config,
            event_tx,
        }
    }

    /// Retry every ledger entry of the processor's owner
    pub async fn run(&self, processor: &mut ItemProcessor) -> RetrySummary {
        let owner = processor.owner().to_string();
        let entries = processor.ledger().entries();
        let total = entries.len();

        let mut discarded = 0usize;
        let mut working: Vec<(String, String)> = Vec::with_capacity(total);
        for url in entries {
            match item_id_from_url(processor.canonical_base(), &url) {
                Some(id) => working.push((url, id)),
                None => {
                    tracing::warn!(owner = %owner, url = %url, "Dropping unparseable retry entry");
                    discarded += 1;
                }
            }
        }

        tracing::info!(owner = %owner, total, discarded, "Starting retry run");

        let mut succeeded = 0usize;
        for round in 1..=self.config.max_retry_rounds {
            if working.is_empty() {
                break;
            }
            tracing::info!(owner = %owner, round, remaining = working.len(), "Retry round");

            let mut still_failing = Vec::new();
            for (url, id) in working {
                self.config.pacing.retry_jitter.sleep().await;
                if self.attempt(processor, &url, &id).await {
                    succeeded += 1;
                } else {
                    still_failing.push((url, id));
                }
            }
            working = still_failing;
        }

        let remaining: Vec<String> = working.into_iter().map(|(url, _)| url).collect();

        if let Err(e) = processor.ledger_mut().replace_all(remaining.clone()) {
            tracing::error!(owner = %owner, error = %e, "Failed to rewrite retry ledger");
        }
        if let Err(e) = processor.finalize() {
            tracing::error!(owner = %owner, error = %e, "Failed to finalize crawl state");
        }

        let summary = RetrySummary {
            owner: owner.clone(),
            total,
            succeeded,
            discarded,
            remaining,
        };

        tracing::info!(
            owner = %owner,
            succeeded = summary.succeeded,
            total = summary.total,
            remaining = summary.remaining.len(),
            "Retry run finished"
        );
        // Ignore send errors (no subscribers)
        self.event_tx.send(Event::RetryFinished(summary.clone())).ok();

        summary
    }

    async fn attempt(&self, processor: &mut ItemProcessor, url: &str, id: &str) -> bool {
        let raw = match self.transport.get_item_detail(id).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::warn!(url = %url, "Item detail not found");
                return false;
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Item detail lookup failed");
                return false;
            }
        };

        match processor.process_with_mode(&raw, ProcessMode::Retry).await {
            ProcessOutcome::Captured | ProcessOutcome::AlreadyCaptured => true,
            ProcessOutcome::Malformed => {
                tracing::warn!(url = %url, "Item detail is malformed");
                false
            }
            ProcessOutcome::Failed | ProcessOutcome::EndOfWalk => false,
        }
    }
}
