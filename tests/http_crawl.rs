//! End-to-end crawl against a mock feed API
//!
//! Drives [`Harvester::with_http`] through wiremock and checks the resulting
//! content tree on disk.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use dynamic_dl::config::{PacingConfig, SessionConfig};
use dynamic_dl::{ClockZone, Config, Harvester, StopReason};
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const OWNER: &str = "560647";
const CANONICAL: &str = "https://t.example";

fn card(id: u64, ts: i64, payload: serde_json::Value) -> serde_json::Value {
    json!({
        "desc": { "dynamic_id": id, "timestamp": ts },
        "card": payload.to_string(),
    })
}

async fn mount_feed(server: &MockServer) {
    let picture = format!("{}/bfs/cat.png", server.uri());

    Mock::given(method("GET"))
        .and(path("/space_history"))
        .and(query_param("host_uid", OWNER))
        .and(query_param("offset_dynamic_id", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {
                "has_more": 0,
                "cards": [
                    // 2024-01-01 12:00 UTC
                    card(900000000000000002, 1_704_110_400, json!({
                        "item": { "description": "cat", "pictures": [ { "img_src": picture } ] }
                    })),
                    // 2024-01-01 11:00 UTC
                    card(900000000000000001, 1_704_106_800, json!({
                        "item": { "content": "note" }
                    })),
                ]
            }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/acc/info"))
        .and(query_param("mid", OWNER))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": { "name": "Tester" }
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/bfs/cat.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89u8; 64]))
        .expect(1)
        .mount(server)
        .await;
}

fn config_for(server: &MockServer, base_dir: &Path) -> Config {
    let mut config = Config {
        owners: vec![OWNER.to_string()],
        base_dir: base_dir.to_path_buf(),
        session: SessionConfig {
            cookie: "SESSDATA=0123456789abcdef".to_string(),
            ..Default::default()
        },
        pacing: PacingConfig::none(),
        clock: ClockZone::FixedOffset(0),
        ..Default::default()
    };
    config.endpoints.feed = format!("{}/space_history", server.uri());
    config.endpoints.detail = format!("{}/get_dynamic_detail", server.uri());
    config.endpoints.owner_info = format!("{}/acc/info", server.uri());
    config.endpoints.reply = format!("{}/reply/main", server.uri());
    config.endpoints.canonical_base = CANONICAL.to_string();
    config
}

/// Every regular file below `root`, relative and sorted
fn files_under(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().strip_prefix(root).unwrap().to_path_buf())
        .collect();
    files.sort();
    files
}

#[tokio::test]
async fn test_crawl_writes_content_tree() {
    let server = MockServer::start().await;
    mount_feed(&server).await;
    let tmp = TempDir::new().unwrap();

    let harvester = Harvester::with_http(config_for(&server, tmp.path())).unwrap();
    let results = harvester.crawl_all().await;

    assert_eq!(results.len(), 1);
    let summary = results[0].1.as_ref().unwrap();
    assert_eq!(summary.captured, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.stop_reason, StopReason::Exhausted);

    let owner_dir = tmp.path().join("Tester_560647");
    assert_eq!(
        files_under(&owner_dir),
        vec![
            PathBuf::from("2024-1-1-12-00-cat/1.png"),
            PathBuf::from("2024-1-1-12-00-cat/info.txt"),
            PathBuf::from("capture_timestamps.txt"),
            PathBuf::from("captured_urls.txt"),
            PathBuf::from("retry_ledger.txt"),
            PathBuf::from("txt/2024-1-1-11-00-note.txt"),
        ]
    );

    let text = std::fs::read_to_string(owner_dir.join("txt/2024-1-1-11-00-note.txt")).unwrap();
    assert_eq!(
        text,
        "URL: https://t.example/900000000000000001\nPublished: 2024-1-1-11-00\nContent:\nnote"
    );
    assert_eq!(
        std::fs::read(owner_dir.join("2024-1-1-12-00-cat/1.png")).unwrap(),
        vec![0x89u8; 64]
    );
    assert_eq!(
        std::fs::read_to_string(owner_dir.join("capture_timestamps.txt")).unwrap(),
        "202401011200\n202401011100\n"
    );
}

#[tokio::test]
async fn test_second_crawl_captures_nothing_new() {
    let server = MockServer::start().await;
    mount_feed(&server).await;
    let tmp = TempDir::new().unwrap();

    let harvester = Harvester::with_http(config_for(&server, tmp.path())).unwrap();
    harvester.crawl_owner(OWNER).await.unwrap();
    let before = files_under(tmp.path());

    let again = harvester.crawl_owner(OWNER).await.unwrap();
    assert_eq!(again.captured, 0);
    assert_eq!(again.skipped, 2);
    assert_eq!(files_under(tmp.path()), before);

    let urls = std::fs::read_to_string(tmp.path().join("Tester_560647/captured_urls.txt")).unwrap();
    assert_eq!(urls.lines().count(), 2);
    // Mock expectations (one profile lookup, one image download) are verified on drop
}
