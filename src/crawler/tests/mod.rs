use super::*;
use crate::config::{ClockZone, DedupStrategy, PacingConfig, RetryConfig, SessionConfig};
use crate::crawler::test_helpers::ScriptedTransport;
use crate::state::{CAPTURE_TIMESTAMPS_FILE, CAPTURED_URLS_FILE};
use chrono::{TimeZone, Utc};
use std::time::Duration;


const OWNER: &str = "560647";
const BASE: &str = "https://x";

/// Config with no pacing, a UTC clock and no page retries
fn test_config(base_dir: &Path) -> Config {
    Config {
        owners: vec![OWNER.to_string()],
        base_dir: base_dir.to_path_buf(),
        session: SessionConfig {
            cookie: "SESSDATA=0123456789abcdef".to_string(),
            ..Default::default()
        },
        pacing: PacingConfig::none(),
        page_retry: RetryConfig {
            max_attempts: 0,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            backoff_multiplier: 1.0,
            jitter: false,
        },
        clock: ClockZone::FixedOffset(0),
        endpoints: crate::config::EndpointConfig {
            canonical_base: BASE.to_string(),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn threshold_config(base_dir: &Path, threshold: Option<u64>) -> Config {
    let mut config = test_config(base_dir);
    config.dedup.strategy = DedupStrategy::DateThreshold;
    config.dedup.date_threshold = threshold;
    config
}

fn harvester(config: Config, transport: &ScriptedTransport) -> Harvester {
    Harvester::new(config, Arc::new(transport.clone())).unwrap()
}

/// Unix timestamp of a UTC wall-clock minute
fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> i64 {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap().timestamp()
}

/// Pre-create the owner's content directory so no name lookup happens
fn owner_dir(base_dir: &Path) -> PathBuf {
    let dir = base_dir.join(format!("someone_{}", OWNER));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn captured_urls(dir: &Path) -> Vec<String> {
    read_lines(&dir.join(CAPTURED_URLS_FILE))
}

fn capture_timestamps(dir: &Path) -> Vec<String> {
    read_lines(&dir.join(CAPTURE_TIMESTAMPS_FILE))
}

fn retry_ledger(dir: &Path) -> Vec<String> {
    read_lines(&dir.join(RETRY_LEDGER_FILE))
}
