//! Configuration types for dynamic-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Minimum plausible length of a session cookie
const MIN_COOKIE_LENGTH: usize = 10;

/// Main configuration for [`crate::Harvester`]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Feed owners to crawl, processed in order
    #[serde(default)]
    pub owners: Vec<String>,

    /// Root directory holding one content area per feed owner (default: "./content")
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Request identity shared by every outbound call
    #[serde(default)]
    pub session: SessionConfig,

    /// Remote endpoints
    #[serde(default)]
    pub endpoints: EndpointConfig,

    /// Pacing between requests
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Deduplication strategy for incremental crawls
    #[serde(default)]
    pub dedup: DedupConfig,

    /// Backoff for page requests that fail transiently
    #[serde(default = "default_page_retry")]
    pub page_retry: RetryConfig,

    /// Number of rounds the retry runner makes over the retry ledger (default: 2)
    #[serde(default = "default_max_retry_rounds")]
    pub max_retry_rounds: u32,

    /// Per-request timeout (default: 10 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Maximum characters of body text used in file and folder names (default: 25)
    #[serde(default = "default_filename_max_length")]
    pub filename_max_length: usize,

    /// Clock used to render item timestamps into names
    #[serde(default)]
    pub clock: ClockZone,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            owners: Vec::new(),
            base_dir: default_base_dir(),
            session: SessionConfig::default(),
            endpoints: EndpointConfig::default(),
            pacing: PacingConfig::default(),
            dedup: DedupConfig::default(),
            page_retry: default_page_retry(),
            max_retry_rounds: default_max_retry_rounds(),
            request_timeout: default_request_timeout(),
            filename_max_length: default_filename_max_length(),
            clock: ClockZone::default(),
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Check the configuration for values that would make a crawl pointless or unsafe
    pub fn validate(&self) -> Result<()> {
        if self.owners.is_empty() {
            return Err(Error::config("owners", "at least one feed owner is required"));
        }
        if let Some(owner) = self.owners.iter().find(|o| o.trim().is_empty()) {
            return Err(Error::config(
                "owners",
                format!("feed owner id must not be blank: {:?}", owner),
            ));
        }
        if self.session.cookie.chars().count() < MIN_COOKIE_LENGTH {
            return Err(Error::config(
                "session.cookie",
                format!(
                    "cookie is shorter than {} characters, it is almost certainly wrong",
                    MIN_COOKIE_LENGTH
                ),
            ));
        }
        if self.pacing.attachment_jitter.min > self.pacing.attachment_jitter.max {
            return Err(Error::config(
                "pacing.attachment_jitter",
                "min must not exceed max",
            ));
        }
        if self.pacing.retry_jitter.min > self.pacing.retry_jitter.max {
            return Err(Error::config("pacing.retry_jitter", "min must not exceed max"));
        }
        let multiplier = self.page_retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(Error::config(
                "page_retry.backoff_multiplier",
                format!("must be a finite number of at least 1.0, got {}", multiplier),
            ));
        }
        if self.filename_max_length == 0 {
            return Err(Error::config(
                "filename_max_length",
                "must be greater than zero",
            ));
        }
        if let ClockZone::FixedOffset(secs) = self.clock
            && secs.abs() >= 86_400
        {
            return Err(Error::config(
                "clock",
                format!("UTC offset of {} seconds is out of range", secs),
            ));
        }
        Ok(())
    }
}

/// Request identity: cookie and headers sent with every call
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Cookie header value (required, at least 10 characters)
    #[serde(default)]
    pub cookie: String,

    /// User-Agent header value
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Referer sent with item detail lookups
    #[serde(default = "default_referer")]
    pub referer: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie: String::new(),
            user_agent: default_user_agent(),
            referer: default_referer(),
        }
    }
}

/// Remote API endpoints
///
/// Overridable so a crawl can be pointed at a mirror or a mock server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Paginated feed history endpoint
    #[serde(default = "default_feed_url")]
    pub feed: String,

    /// Single item detail endpoint
    #[serde(default = "default_detail_url")]
    pub detail: String,

    /// Owner profile endpoint (used to name content directories)
    #[serde(default = "default_owner_info_url")]
    pub owner_info: String,

    /// Comment reply endpoint
    #[serde(default = "default_reply_url")]
    pub reply: String,

    /// Prefix of canonical item URLs; the item id is appended after a `/`
    #[serde(default = "default_canonical_base")]
    pub canonical_base: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            feed: default_feed_url(),
            detail: default_detail_url(),
            owner_info: default_owner_info_url(),
            reply: default_reply_url(),
            canonical_base: default_canonical_base(),
        }
    }
}

/// Delays inserted between requests to respect the source's rate limits
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Pause between feed pages (default: 3 seconds)
    #[serde(default = "default_page_delay", with = "fractional_duration_serde")]
    pub page_delay: Duration,

    /// Jitter before each attachment download (default: 0.5-0.6 seconds)
    #[serde(default = "default_attachment_jitter")]
    pub attachment_jitter: JitterBounds,

    /// Jitter before each retry-ledger attempt (default: 1.0-2.0 seconds)
    #[serde(default = "default_retry_jitter")]
    pub retry_jitter: JitterBounds,

    /// Pause before an owner profile lookup (default: 2 seconds)
    #[serde(default = "default_owner_lookup_delay", with = "fractional_duration_serde")]
    pub owner_lookup_delay: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            page_delay: default_page_delay(),
            attachment_jitter: default_attachment_jitter(),
            retry_jitter: default_retry_jitter(),
            owner_lookup_delay: default_owner_lookup_delay(),
        }
    }
}

impl PacingConfig {
    /// No delays at all; intended for tests and local mirrors
    pub fn none() -> Self {
        Self {
            page_delay: Duration::ZERO,
            attachment_jitter: JitterBounds::ZERO,
            retry_jitter: JitterBounds::ZERO,
            owner_lookup_delay: Duration::ZERO,
        }
    }
}

/// Inclusive bounds of a uniformly random delay
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct JitterBounds {
    /// Lower bound
    #[serde(with = "fractional_duration_serde")]
    pub min: Duration,
    /// Upper bound
    #[serde(with = "fractional_duration_serde")]
    pub max: Duration,
}

impl JitterBounds {
    /// Zero-length jitter
    pub const ZERO: JitterBounds = JitterBounds {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    /// Sleep for a random duration within the bounds
    pub async fn sleep(&self) {
        crate::retry::jittered_sleep(self.min, self.max).await;
    }
}

/// How the crawler decides which items it has already captured
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupStrategy {
    /// Skip items whose canonical URL is already recorded; walk every page
    #[default]
    UrlMembership,
    /// Stop the walk at the first item older than the newest captured timestamp
    DateThreshold,
}

/// Deduplication settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Strategy selector
    #[serde(default)]
    pub strategy: DedupStrategy,

    /// Explicit threshold (`YYYYMMDDHHMM`) overriding the newest persisted timestamp
    #[serde(default)]
    pub date_threshold: Option<u64>,
}

/// Time zone used to render timestamps into names
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockZone {
    /// The machine's local time zone
    #[default]
    Local,
    /// A fixed offset east of UTC, in seconds
    FixedOffset(i32),
}

/// Retry configuration for transient request failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

// Default value functions
fn default_base_dir() -> PathBuf {
    PathBuf::from("content")
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/90.0.4430.93 Safari/537.36".to_string()
}

fn default_referer() -> String {
    "https://t.bilibili.com/".to_string()
}

fn default_feed_url() -> String {
    "https://api.vc.bilibili.com/dynamic_svr/v1/dynamic_svr/space_history".to_string()
}

fn default_detail_url() -> String {
    "https://api.vc.bilibili.com/dynamic_svr/v1/dynamic_svr/get_dynamic_detail".to_string()
}

fn default_owner_info_url() -> String {
    "https://api.bilibili.com/x/space/acc/info".to_string()
}

fn default_reply_url() -> String {
    "https://api.bilibili.com/x/v2/reply/main".to_string()
}

fn default_canonical_base() -> String {
    "https://t.bilibili.com".to_string()
}

fn default_page_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_attachment_jitter() -> JitterBounds {
    JitterBounds {
        min: Duration::from_millis(500),
        max: Duration::from_millis(600),
    }
}

fn default_retry_jitter() -> JitterBounds {
    JitterBounds {
        min: Duration::from_secs(1),
        max: Duration::from_secs(2),
    }
}

fn default_owner_lookup_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_page_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(30),
        backoff_multiplier: 2.0,
        jitter: true,
    }
}

fn default_max_retry_rounds() -> u32 {
    2
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_filename_max_length() -> usize {
    25
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (fractional seconds, for sub-second pacing)
mod fractional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
