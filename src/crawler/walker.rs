//! Pagination over an owner's feed

use super::processor::ItemProcessor;
use crate::config::Config;
use crate::retry::with_backoff;
use crate::transport::Transport;
use crate::types::{Event, PageCursor, ProcessOutcome, StopReason, WalkSummary};
use tokio::sync::broadcast;

/// Drives one walk over a feed, newest page first
///
/// The walk ends when the source reports no further pages, when a page is
/// empty, when an item older than the date threshold is reached, or when a
/// page cannot be fetched even after backoff. Whatever the reason, the
/// processor is finalized before the summary is returned.
pub struct FeedWalker<'a> {
    transport: &'a dyn Transport,
    config: &'a Config,
    event_tx: broadcast::Sender<Event>,
}

#[derive(Default)]
struct Counts {
    pages: usize,
    captured: usize,
    skipped: usize,
    malformed: usize,
    failed: usize,
}

impl<'a> FeedWalker<'a> {
    /// Create a walker over `transport`
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

    /// Walk the feed of the processor's owner
    pub async fn walk(&self, processor: &mut ItemProcessor) -> WalkSummary {
        let owner = processor.owner().to_string();
        let threshold = processor.state().threshold();

        tracing::info!(
            owner = %owner,
            transport = self.transport.name(),
            strategy = ?processor.state().strategy(),
            threshold = ?threshold,
            "Starting feed walk"
        );
        self.emit(Event::WalkStarted {
            owner: owner.clone(),
            threshold,
        });

        let mut counts = Counts::default();
        let stop_reason = self.run_pages(&owner, processor, &mut counts).await;

        if let Err(e) = processor.finalize() {
            tracing::error!(owner = %owner, error = %e, "Failed to finalize crawl state");
        }

        let summary = WalkSummary {
            owner: owner.clone(),
            pages: counts.pages,
            captured: counts.captured,
            skipped: counts.skipped,
            malformed: counts.malformed,
            failed: counts.failed,
            stop_reason,
            retry_ledger_size: processor.ledger().len(),
        };

        tracing::info!(
            owner = %owner,
            pages = summary.pages,
            captured = summary.captured,
            skipped = summary.skipped,
            failed = summary.failed,
            retry_ledger = summary.retry_ledger_size,
            stop_reason = ?summary.stop_reason,
            "Feed walk finished"
        );
        self.emit(Event::WalkFinished(summary.clone()));

        summary
    }

    async fn run_pages(
        &self,
        owner: &str,
        processor: &mut ItemProcessor,
        counts: &mut Counts,
    ) -> StopReason {
        let mut cursor = PageCursor::start();

        loop {
            let page = match with_backoff(&self.config.page_retry, || {
                self.transport.get_page(owner, &cursor)
            })
            .await
            {
                Ok(page) => page,
                Err(e) => {
                    tracing::error!(owner = %owner, cursor = %cursor, error = %e, "Giving up on feed page");
                    return StopReason::TransportFailure(e.to_string());
                }
            };

            counts.pages += 1;
            tracing::info!(
                owner = %owner,
                page = counts.pages,
                items = page.items.len(),
                has_more = page.has_more,
                "Fetched feed page"
            );
            self.emit(Event::PageFetched {
                owner: owner.to_string(),
                page: counts.pages,
                items: page.items.len(),
            });

            if page.items.is_empty() {
                return StopReason::EmptyPage;
            }

            for raw in &page.items {
                match processor.process(raw).await {
                    ProcessOutcome::Captured => counts.captured += 1,
                    ProcessOutcome::AlreadyCaptured => counts.skipped += 1,
                    ProcessOutcome::Malformed => counts.malformed += 1,
                    ProcessOutcome::Failed => counts.failed += 1,
                    ProcessOutcome::EndOfWalk => return StopReason::DateThreshold,
                }
            }

            if !page.has_more {
                return StopReason::Exhausted;
            }
            let Some(next) = page.continuation() else {
                return StopReason::Exhausted;
            };
            if next == cursor {
                tracing::warn!(owner = %owner, cursor = %cursor, "Feed cursor did not advance, ending walk");
                return StopReason::Exhausted;
            }
            cursor = next;

            if !self.config.pacing.page_delay.is_zero() {
                tracing::debug!(
                    delay_ms = self.config.pacing.page_delay.as_millis(),
                    "Waiting before next page"
                );
                tokio::time::sleep(self.config.pacing.page_delay).await;
            }
        }
    }

    fn emit(&self, event: Event) {
        // Ignore send errors (no subscribers)
        self.event_tx.send(event).ok();
    }
}
