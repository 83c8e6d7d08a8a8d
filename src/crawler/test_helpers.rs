//! Shared test helpers: an in-memory [`Transport`] driven by a script.

use crate::error::TransportError;
use crate::transport::{ByteStream, ReplyPage, Transport};
use crate::types::{FeedPage, PageCursor, RawItem};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

/// A scripted response; `Fail` is turned into an HTTP error with that status
#[derive(Clone, Debug)]
pub(crate) enum Step<T> {
    Ok(T),
    Fail(u16),
}

impl<T> Step<T> {
    fn into_result(self, url: &str) -> Result<T, TransportError> {
        match self {
            Step::Ok(value) => Ok(value),
            Step::Fail(status) => Err(TransportError::Http {
                status,
                url: url.to_string(),
            }),
        }
    }
}

#[derive(Default)]
struct Script {
    /// Page responses per owner, served in order; an exhausted queue serves an empty page
    pages: HashMap<String, VecDeque<Step<FeedPage>>>,
    /// Detail responses per id; the last one repeats
    details: HashMap<String, VecDeque<Step<Option<RawItem>>>>,
    assets: HashMap<String, Vec<u8>>,
    /// Assets whose stream hangs after the first chunk
    stalled_assets: HashSet<String>,
    owner_names: HashMap<String, String>,
    replies: HashMap<(String, u32), Step<ReplyPage>>,
    requested_cursors: Vec<String>,
    detail_calls: Vec<String>,
    download_calls: usize,
    owner_name_calls: usize,
}

/// In-memory transport for walker, processor and retry tests
///
/// Clones share the same script, so a test can keep a handle for
/// assertions after giving one to the code under test.
#[derive(Clone, Default)]
pub(crate) struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_page(&self, owner: &str, page: FeedPage) {
        self.push_page_step(owner, Step::Ok(page));
    }

    pub(crate) fn push_page_step(&self, owner: &str, step: Step<FeedPage>) {
        self.script
            .lock()
            .unwrap()
            .pages
            .entry(owner.to_string())
            .or_default()
            .push_back(step);
    }

    pub(crate) fn push_detail(&self, id: &str, step: Step<Option<RawItem>>) {
        self.script
            .lock()
            .unwrap()
            .details
            .entry(id.to_string())
            .or_default()
            .push_back(step);
    }

    pub(crate) fn add_asset(&self, url: &str, bytes: Vec<u8>) {
        self.script
            .lock()
            .unwrap()
            .assets
            .insert(url.to_string(), bytes);
    }

    /// Serve only the first half of `url`, then never finish the stream
    pub(crate) fn stall_asset(&self, url: &str) {
        self.script
            .lock()
            .unwrap()
            .stalled_assets
            .insert(url.to_string());
    }

    pub(crate) fn set_owner_name(&self, owner: &str, name: &str) {
        self.script
            .lock()
            .unwrap()
            .owner_names
            .insert(owner.to_string(), name.to_string());
    }

    pub(crate) fn set_reply_page(&self, oid: &str, page: u32, step: Step<ReplyPage>) {
        self.script
            .lock()
            .unwrap()
            .replies
            .insert((oid.to_string(), page), step);
    }

    pub(crate) fn requested_cursors(&self) -> Vec<String> {
        self.script.lock().unwrap().requested_cursors.clone()
    }

    pub(crate) fn detail_calls(&self) -> Vec<String> {
        self.script.lock().unwrap().detail_calls.clone()
    }

    pub(crate) fn download_calls(&self) -> usize {
        self.script.lock().unwrap().download_calls
    }

    pub(crate) fn owner_name_calls(&self) -> usize {
        self.script.lock().unwrap().owner_name_calls
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get_page(&self, owner: &str, cursor: &PageCursor) -> Result<FeedPage, TransportError> {
        let step = {
            let mut script = self.script.lock().unwrap();
            script.requested_cursors.push(cursor.to_string());
            script
                .pages
                .get_mut(owner)
                .and_then(|queue| queue.pop_front())
        };
        match step {
            Some(step) => step.into_result(&format!("scripted://feed/{owner}")),
            None => Ok(FeedPage::default()),
        }
    }

    async fn get_item_detail(&self, id: &str) -> Result<Option<RawItem>, TransportError> {
        let step = {
            let mut script = self.script.lock().unwrap();
            script.detail_calls.push(id.to_string());
            match script.details.get_mut(id) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        match step {
            Some(step) => step.into_result(&format!("scripted://detail/{id}")),
            None => Ok(None),
        }
    }

    async fn download_bytes(&self, url: &str) -> Result<ByteStream, TransportError> {
        let (body, stalled) = {
            let mut script = self.script.lock().unwrap();
            script.download_calls += 1;
            (
                script.assets.get(url).cloned(),
                script.stalled_assets.contains(url),
            )
        };
        match body {
            Some(bytes) if stalled => {
                let mid = bytes.len() / 2;
                let first = futures::stream::iter(vec![Ok(Bytes::copy_from_slice(&bytes[..mid]))]);
                Ok(first.chain(futures::stream::pending()).boxed())
            }
            Some(bytes) => {
                // Two chunks so callers exercise the streaming path
                let mid = bytes.len() / 2;
                let chunks = vec![
                    Ok(Bytes::copy_from_slice(&bytes[..mid])),
                    Ok(Bytes::copy_from_slice(&bytes[mid..])),
                ];
                Ok(futures::stream::iter(chunks).boxed())
            }
            None => Err(TransportError::Http {
                status: 404,
                url: url.to_string(),
            }),
        }
    }

    async fn get_owner_name(&self, owner: &str) -> Result<Option<String>, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.owner_name_calls += 1;
        Ok(script.owner_names.get(owner).cloned())
    }

    async fn get_reply_page(&self, oid: &str, page: u32) -> Result<ReplyPage, TransportError> {
        let step = self
            .script
            .lock()
            .unwrap()
            .replies
            .get(&(oid.to_string(), page))
            .cloned();
        match step {
            Some(step) => step.into_result(&format!("scripted://reply/{oid}/{page}")),
            None => Ok(ReplyPage::default()),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Raw item with a body and no attachments
pub(crate) fn text_item(id: &str, timestamp: i64, body: &str) -> RawItem {
    RawItem {
        id: Some(id.to_string()),
        timestamp: Some(timestamp),
        body: body.to_string(),
        attachments: vec![],
    }
}

/// Page with `has_more` and an explicit cursor
pub(crate) fn page(items: Vec<RawItem>, has_more: bool, next: Option<&str>) -> FeedPage {
    FeedPage {
        items,
        has_more,
        next_cursor: next.map(|c| PageCursor(c.to_string())),
    }
}
