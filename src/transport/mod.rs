//! Access to the remote feed source
//!
//! The crawler talks to the source only through the [`Transport`] trait, so
//! the walk, processing and retry logic can be driven by the HTTP
//! implementation ([`HttpTransport`]) or by an in-memory script in tests.
//!
//! Every method fails with a [`TransportError`]; callers translate those into
//! per-item failures or a graceful end of walk, never into a panic.

use crate::error::TransportError;
use crate::types::{FeedPage, PageCursor, RawItem};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

mod http;
mod wire;

pub use http::{HttpTransport, Session};

/// Streamed body of a downloaded attachment
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// One comment in a reply thread
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reply {
    /// Message text
    pub message: String,
    /// Nested sub-replies
    pub replies: Vec<Reply>,
}

/// One page of a reply thread
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplyPage {
    /// Top-level replies on this page
    pub replies: Vec<Reply>,
}

/// Capability to read a feed source
///
/// # Examples
///
/// ```no_run
/// use dynamic_dl::config::Config;
/// use dynamic_dl::transport::{HttpTransport, Transport};
/// use dynamic_dl::types::PageCursor;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = HttpTransport::new(&Config::default())?;
/// let page = transport.get_page("560647", &PageCursor::start()).await?;
/// println!("{} items, more: {}", page.items.len(), page.has_more);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the page of `owner`'s feed that starts at `cursor`
    async fn get_page(&self, owner: &str, cursor: &PageCursor)
    -> Result<FeedPage, TransportError>;

    /// Look up a single item by identifier
    ///
    /// Returns `Ok(None)` when the source reports no such item.
    async fn get_item_detail(&self, id: &str) -> Result<Option<RawItem>, TransportError>;

    /// Start downloading `url`, returning the body as a byte stream
    async fn download_bytes(&self, url: &str) -> Result<ByteStream, TransportError>;

    /// Display name of a feed owner, if the source knows one
    async fn get_owner_name(&self, owner: &str) -> Result<Option<String>, TransportError>;

    /// Fetch page `page` (1-based) of the reply thread attached to `oid`
    async fn get_reply_page(&self, oid: &str, page: u32) -> Result<ReplyPage, TransportError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
