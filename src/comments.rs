//! Image harvesting from reply threads
//!
//! Reply messages embed image links as plain text. [`CommentImageHarvester`]
//! pages through a thread, collects every image URL in first-seen order and
//! downloads them through the [`AssetStore`].

use crate::assets::AssetStore;
use crate::error::{PersistenceError, Result};
use crate::transport::{Reply, Transport};
use crate::utils::extension_from_url;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

#[allow(clippy::expect_used)]
fn image_url() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"https?://i\d\.hdslb\.com/bfs/[^\s"]+\.(jpg|png|gif)"#).expect("valid pattern")
    })
}

/// Outcome of one thread harvest
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentHarvestSummary {
    /// Reply pages that returned replies
    pub pages: u32,
    /// Distinct image URLs found
    pub discovered: usize,
    /// Images present in the destination afterwards
    pub downloaded: usize,
}

/// Downloads the images linked from a reply thread
pub struct CommentImageHarvester {
    transport: Arc<dyn Transport>,
    assets: AssetStore,
    page_delay: Duration,
}

impl CommentImageHarvester {
    /// Create a harvester pausing `page_delay` between reply pages
    pub fn new(transport: Arc<dyn Transport>, assets: AssetStore, page_delay: Duration) -> Self {
        Self {
            transport,
            assets,
            page_delay,
        }
    }

    /// Collect the images of thread `oid` into `dest` as `image_<n>.<ext>`
    ///
    /// Paging stops at the first empty or failing page; whatever was
    /// collected up to then is still downloaded.
    ///
    /// # Errors
    /// Fails only if `dest` cannot be created. Individual downloads that fail
    /// are left out of the `downloaded` count.
    pub async fn harvest(&self, oid: &str, dest: &Path) -> Result<CommentHarvestSummary> {
        let mut summary = CommentHarvestSummary::default();
        let urls = self.collect_urls(oid, &mut summary).await;
        summary.discovered = urls.len();

        tracing::info!(oid = %oid, pages = summary.pages, images = urls.len(), "Scanned reply thread");

        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|source| PersistenceError::CreateDir {
                path: dest.to_path_buf(),
                source,
            })?;

        for (idx, url) in urls.iter().enumerate() {
            let target = dest.join(format!("image_{}{}", idx, extension_from_url(url)));
            if self.assets.fetch(url, &target).await {
                summary.downloaded += 1;
            }
        }

        tracing::info!(
            oid = %oid,
            discovered = summary.discovered,
            downloaded = summary.downloaded,
            "Reply thread harvest finished"
        );
        Ok(summary)
    }

    async fn collect_urls(&self, oid: &str, summary: &mut CommentHarvestSummary) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut urls = Vec::new();
        let mut page = 1u32;

        loop {
            let replies = match self.transport.get_reply_page(oid, page).await {
                Ok(reply_page) => reply_page.replies,
                Err(e) => {
                    tracing::warn!(oid = %oid, page, error = %e, "Reply page failed, stopping");
                    break;
                }
            };
            if replies.is_empty() {
                tracing::debug!(oid = %oid, page, "No more replies");
                break;
            }
            summary.pages += 1;

            for reply in &replies {
                extract_image_urls(reply, &mut |url: &str| {
                    if seen.insert(url.to_string()) {
                        urls.push(url.to_string());
                    }
                });
            }

            page += 1;
            if !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
        }

        urls
    }
}

/// Visit every image URL in `reply` and its nested replies, depth first
fn extract_image_urls(reply: &Reply, sink: &mut impl FnMut(&str)) {
    for m in image_url().find_iter(&reply.message) {
        sink(m.as_str());
    }
    for nested in &reply.replies {
        extract_image_urls(nested, sink);
    }
}
