//! Incremental crawl engine
//!
//! [`Harvester`] is the entry point. For each feed owner it resolves the
//! content directory, opens the persisted state and hands an
//! [`ItemProcessor`] to either:
//! - [`FeedWalker`] - pages through the feed and captures new items
//! - [`RetryRunner`] - reprocesses the entries of the retry ledger
//!
//! Only one walk or retry run is active per `Harvester` at a time, so each
//! owner's state files have a single writer.

mod processor;
mod retry_failed;
mod walker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use processor::ItemProcessor;
pub use retry_failed::RetryRunner;
pub use walker::FeedWalker;

use crate::assets::AssetStore;
use crate::classify::ItemClassifier;
use crate::comments::{CommentHarvestSummary, CommentImageHarvester};
use crate::config::Config;
use crate::error::{PersistenceError, Result};
use crate::state::{DedupState, RETRY_LEDGER_FILE, RetryLedger};
use crate::transport::{HttpTransport, Transport};
use crate::types::{Event, FeedOwner, RetrySummary, WalkSummary};
use crate::utils::{first_digit_run, sanitize_filename};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};

/// Longest owner display name used in a directory name
const MAX_OWNER_NAME_LENGTH: usize = 64;

/// Crawl facade over a [`Transport`]
///
/// # Examples
///
/// ```no_run
/// use dynamic_dl::{Config, Harvester};
/// use dynamic_dl::config::SessionConfig;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config {
///     owners: vec!["560647".to_string()],
///     session: SessionConfig {
///         cookie: "SESSDATA=...".to_string(),
///         ..Default::default()
///     },
///     ..Default::default()
/// };
///
/// let harvester = Harvester::with_http(config)?;
/// let mut events = harvester.subscribe();
/// tokio::spawn(async move {
///     while let Ok(event) = events.recv().await {
///         println!("{:?}", event);
///     }
/// });
///
/// for (owner, result) in harvester.crawl_all().await {
///     match result {
///         Ok(summary) => println!("{owner}: {} new", summary.captured),
///         Err(e) => eprintln!("{owner}: {e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct Harvester {
    config: Arc<Config>,
    transport: Arc<dyn Transport>,
    event_tx: broadcast::Sender<Event>,
    owner_dirs: Mutex<HashMap<FeedOwner, PathBuf>>,
    run_lock: Mutex<()>,
}

impl Harvester {
    /// Create a harvester over `transport`
    ///
    /// # Errors
    /// Returns [`crate::Error::Config`] if the configuration does not validate.
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(1000);

        Ok(Self {
            config: Arc::new(config),
            transport,
            event_tx,
            owner_dirs: Mutex::new(HashMap::new()),
            run_lock: Mutex::new(()),
        })
    }

    /// Create a harvester talking to the configured HTTP endpoints
    pub fn with_http(config: Config) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Self::new(config, Arc::new(transport))
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Walk the feed of `owner` and capture new items
    ///
    /// # Errors
    /// Fails only if the owner's content directory or state files cannot be
    /// opened. Per-item and per-page failures are reported in the summary.
    pub async fn crawl_owner(&self, owner: &str) -> Result<WalkSummary> {
        let _guard = self.run_lock.lock().await;
        let mut processor = self.open_processor(owner).await?;
        let walker = FeedWalker::new(self.transport.as_ref(), &self.config, self.event_tx.clone());
        Ok(walker.walk(&mut processor).await)
    }

    /// Reprocess the retry ledger of `owner`
    ///
    /// # Errors
    /// Fails only if the owner's content directory or state files cannot be
    /// opened.
    pub async fn retry_owner(&self, owner: &str) -> Result<RetrySummary> {
        let _guard = self.run_lock.lock().await;
        let mut processor = self.open_processor(owner).await?;
        let runner = RetryRunner::new(self.transport.as_ref(), &self.config, self.event_tx.clone());
        Ok(runner.run(&mut processor).await)
    }

    /// Crawl every configured owner in order
    pub async fn crawl_all(&self) -> Vec<(FeedOwner, Result<WalkSummary>)> {
        let mut results = Vec::with_capacity(self.config.owners.len());
        for owner in &self.config.owners {
            let result = self.crawl_owner(owner).await;
            if let Err(e) = &result {
                tracing::error!(owner = %owner, error = %e, "Crawl could not start");
            }
            results.push((owner.clone(), result));
        }
        results
    }

    /// Retry the ledger of every configured owner in order
    pub async fn retry_all(&self) -> Vec<(FeedOwner, Result<RetrySummary>)> {
        let mut results = Vec::with_capacity(self.config.owners.len());
        for owner in &self.config.owners {
            let result = self.retry_owner(owner).await;
            if let Err(e) = &result {
                tracing::error!(owner = %owner, error = %e, "Retry run could not start");
            }
            results.push((owner.clone(), result));
        }
        results
    }

    /// Download the images linked from reply thread `oid` into `dest`
    ///
    /// # Errors
    /// Fails only if `dest` cannot be created.
    pub async fn harvest_comment_images(
        &self,
        oid: &str,
        dest: &Path,
    ) -> Result<CommentHarvestSummary> {
        let assets = AssetStore::new(
            self.transport.clone(),
            self.config.pacing.attachment_jitter,
            self.event_tx.clone(),
        );
        CommentImageHarvester::new(self.transport.clone(), assets, self.config.pacing.page_delay)
            .harvest(oid, dest)
            .await
    }

    /// Content directory of `owner`, creating it on first use
    ///
    /// An existing directory under `base_dir` whose first run of digits is the
    /// owner id is reused. Otherwise `<name>_<owner>` is created, with the name
    /// taken from the source (or `user_<owner>` if the lookup fails).
    pub async fn owner_dir(&self, owner: &str) -> Result<PathBuf> {
        let mut cache = self.owner_dirs.lock().await;
        if let Some(dir) = cache.get(owner) {
            return Ok(dir.clone());
        }

        let base = &self.config.base_dir;
        create_dir(base).await?;

        let dir = match find_owner_dir(base, owner).await? {
            Some(existing) => {
                tracing::debug!(owner = %owner, dir = %existing.display(), "Found content directory");
                existing
            }
            None => {
                let name = self.lookup_owner_name(owner).await;
                let dir = base.join(format!("{}_{}", name, owner));
                create_dir(&dir).await?;
                tracing::info!(owner = %owner, dir = %dir.display(), "Created content directory");
                dir
            }
        };

        cache.insert(owner.to_string(), dir.clone());
        Ok(dir)
    }

    async fn lookup_owner_name(&self, owner: &str) -> String {
        let delay = self.config.pacing.owner_lookup_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let fallback = || format!("user_{}", owner);
        match self.transport.get_owner_name(owner).await {
            Ok(Some(name)) => {
                let name = sanitize_filename(&name, MAX_OWNER_NAME_LENGTH);
                if name.is_empty() { fallback() } else { name }
            }
            Ok(None) => fallback(),
            Err(e) => {
                tracing::warn!(owner = %owner, error = %e, "Owner name lookup failed");
                fallback()
            }
        }
    }

    async fn open_processor(&self, owner: &str) -> Result<ItemProcessor> {
        let dir = self.owner_dir(owner).await?;
        let state = DedupState::open(&dir, &self.config.dedup, self.config.clock)?;
        let ledger = RetryLedger::open(dir.join(RETRY_LEDGER_FILE))?;

        let classifier = ItemClassifier::new(
            dir,
            self.config.clock,
            self.config.filename_max_length,
        );
        let assets = AssetStore::new(
            self.transport.clone(),
            self.config.pacing.attachment_jitter,
            self.event_tx.clone(),
        );

        Ok(ItemProcessor::new(
            owner.to_string(),
            self.config.endpoints.canonical_base.clone(),
            classifier,
            assets,
            state,
            ledger,
            self.event_tx.clone(),
        ))
    }
}

async fn create_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| PersistenceError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
    Ok(())
}

async fn find_owner_dir(base: &Path, owner: &str) -> Result<Option<PathBuf>> {
    let read_err = |source| PersistenceError::Read {
        path: base.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(base).await.map_err(read_err)?;
    let mut matches = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        if !is_dir {
            continue;
        }
        let name = entry.file_name();
        if first_digit_run(&name.to_string_lossy()) == Some(owner) {
            matches.push(entry.path());
        }
    }

    // Directory listing order is platform dependent
    matches.sort();
    Ok(matches.into_iter().next())
}
