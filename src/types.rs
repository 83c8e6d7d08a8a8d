//! Core types and events

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of the account whose feed is crawled
pub type FeedOwner = String;

/// One unit of crawled content, decoded and validated
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    /// Stable identifier, unique within a feed owner
    pub id: String,
    /// Publication time on the source clock
    pub published_at: DateTime<Utc>,
    /// Text body; may be empty
    pub body: String,
    /// Attachments in source order
    pub attachments: Vec<AttachmentDescriptor>,
    /// Public URL derived from `id`, used as the dedup key
    pub canonical_url: String,
}

impl Item {
    /// Whether the body has any non-whitespace content
    pub fn has_body(&self) -> bool {
        !self.body.trim().is_empty()
    }

    /// Whether the item carries at least one attachment
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

/// A media attachment of an [`Item`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentDescriptor {
    /// 1-based position within the item's attachment list at the source
    pub position: usize,
    /// Where to download it from
    pub source_url: String,
}

impl AttachmentDescriptor {
    /// File extension inferred from the source URL, with leading dot (default `.jpg`)
    pub fn extension(&self) -> String {
        crate::utils::extension_from_url(&self.source_url)
    }

    /// File name the attachment is stored under: position followed by extension
    pub fn file_name(&self) -> String {
        format!("{}{}", self.position, self.extension())
    }
}

/// An item as it arrives from the source, before validation
///
/// Fields the source may omit are optional; [`RawItem::decode`] turns the
/// result into an [`Item`] or reports it as malformed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawItem {
    /// Identifier, if present
    pub id: Option<String>,
    /// Unix timestamp in seconds, if present
    pub timestamp: Option<i64>,
    /// Text body
    pub body: String,
    /// Attachment URLs in source order; `None` marks an entry without a URL
    pub attachments: Vec<Option<String>>,
}

impl RawItem {
    /// Validate and convert into an [`Item`] whose canonical URL is rooted at `canonical_base`
    pub fn decode(&self, canonical_base: &str) -> Result<Item> {
        let id = self
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty() && *id != "0")
            .ok_or_else(|| Error::MalformedItem("item has no identifier".to_string()))?;

        let timestamp = self
            .timestamp
            .ok_or_else(|| Error::MalformedItem(format!("item {} has no timestamp", id)))?;
        let published_at = DateTime::<Utc>::from_timestamp(timestamp, 0).ok_or_else(|| {
            Error::MalformedItem(format!("item {} has out-of-range timestamp {}", id, timestamp))
        })?;

        let attachments = self
            .attachments
            .iter()
            .enumerate()
            .filter_map(|(idx, url)| {
                url.as_ref()
                    .filter(|u| !u.is_empty())
                    .map(|u| AttachmentDescriptor {
                        position: idx + 1,
                        source_url: u.clone(),
                    })
            })
            .collect();

        Ok(Item {
            id: id.to_string(),
            published_at,
            body: self.body.clone(),
            attachments,
            canonical_url: canonical_url(canonical_base, id),
        })
    }
}

/// Build the canonical URL of an item
pub fn canonical_url(canonical_base: &str, id: &str) -> String {
    format!("{}/{}", canonical_base.trim_end_matches('/'), id)
}

/// Recover the item identifier from a canonical URL
///
/// Returns `None` if the URL is not rooted at `canonical_base` or the trailing
/// segment is not a numeric identifier.
pub fn item_id_from_url(canonical_base: &str, url: &str) -> Option<String> {
    let prefix = format!("{}/", canonical_base.trim_end_matches('/'));
    let id = url.strip_prefix(&prefix)?;
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        Some(id.to_string())
    } else {
        None
    }
}

/// Opaque pagination continuation token
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageCursor(pub String);

impl PageCursor {
    /// The cursor requesting the newest page
    pub fn start() -> Self {
        PageCursor("0".to_string())
    }

    /// The raw token
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PageCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of the feed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeedPage {
    /// Items in source order
    pub items: Vec<RawItem>,
    /// Whether the source reports further pages
    pub has_more: bool,
    /// Explicit continuation token, if the source supplied one
    pub next_cursor: Option<PageCursor>,
}

impl FeedPage {
    /// Cursor for the following page
    ///
    /// Falls back to the last item's identifier when the source omits an
    /// explicit cursor. `None` means there is nothing to continue from.
    pub fn continuation(&self) -> Option<PageCursor> {
        if let Some(cursor) = &self.next_cursor {
            return Some(cursor.clone());
        }
        self.items
            .last()
            .and_then(|item| item.id.clone())
            .map(PageCursor)
    }
}

/// Result of handing one item to the processor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Artifacts written and the item recorded as captured
    Captured,
    /// Already captured earlier; nothing written
    AlreadyCaptured,
    /// Missing identifier or timestamp; skipped without recording anything
    Malformed,
    /// Persisting failed; the item is in the retry ledger
    Failed,
    /// Older than the date threshold; the walk must end here
    EndOfWalk,
}

/// Why a walk ended
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum StopReason {
    /// The source reported no further pages
    Exhausted,
    /// A page came back with no items
    EmptyPage,
    /// An item older than the date threshold was reached
    DateThreshold,
    /// Pages could not be fetched
    TransportFailure(String),
}

/// Outcome of one walk over an owner's feed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkSummary {
    /// Feed owner walked
    pub owner: FeedOwner,
    /// Pages fetched
    pub pages: usize,
    /// Items newly captured
    pub captured: usize,
    /// Items skipped because they were already captured
    pub skipped: usize,
    /// Items skipped because they were malformed
    pub malformed: usize,
    /// Items that failed and went to the retry ledger
    pub failed: usize,
    /// Why the walk ended
    pub stop_reason: StopReason,
    /// Entries in the retry ledger after the walk
    pub retry_ledger_size: usize,
}

/// Outcome of a retry run over an owner's retry ledger
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySummary {
    /// Feed owner whose ledger was processed
    pub owner: FeedOwner,
    /// Ledger entries at the start of the run
    pub total: usize,
    /// Entries reprocessed successfully
    pub succeeded: usize,
    /// Entries dropped because no identifier could be parsed from them
    pub discarded: usize,
    /// Entries still failing, now the full ledger content
    pub remaining: Vec<String>,
}

/// Progress events published while crawling
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// A walk over an owner's feed started
    WalkStarted {
        /// Feed owner
        owner: FeedOwner,
        /// Active date threshold, if any
        threshold: Option<u64>,
    },
    /// A page of the feed was fetched
    PageFetched {
        /// Feed owner
        owner: FeedOwner,
        /// 1-based page number within the walk
        page: usize,
        /// Items on the page
        items: usize,
    },
    /// An item was written and recorded
    ItemCaptured {
        /// Feed owner
        owner: FeedOwner,
        /// Canonical URL of the item
        url: String,
    },
    /// An item was skipped as already captured
    ItemSkipped {
        /// Feed owner
        owner: FeedOwner,
        /// Canonical URL of the item
        url: String,
    },
    /// An item failed and was recorded in the retry ledger
    ItemFailed {
        /// Feed owner
        owner: FeedOwner,
        /// Canonical URL of the item
        url: String,
        /// Error description
        error: String,
    },
    /// An attachment could not be downloaded (the item is still captured)
    AttachmentFailed {
        /// Attachment source URL
        url: String,
        /// Error description
        error: String,
    },
    /// A walk ended
    WalkFinished(WalkSummary),
    /// A retry run ended
    RetryFinished(RetrySummary),
}
