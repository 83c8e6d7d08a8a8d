//! JSON shapes of the feed API and their conversion into crate types

use crate::transport::{Reply, ReplyPage};
use crate::types::{FeedPage, PageCursor, RawItem};
use serde::Deserialize;
use serde_json::Value;

/// Common response envelope: `{code, message, data}`
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SpaceHistory {
    #[serde(default)]
    pub cards: Option<Vec<Card>>,
    #[serde(default)]
    pub has_more: Option<Value>,
    #[serde(default)]
    pub next_offset: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Card {
    #[serde(default)]
    pub desc: Option<Desc>,
    /// The item payload, itself a JSON document encoded as a string
    #[serde(default)]
    pub card: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Desc {
    #[serde(default)]
    pub dynamic_id: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct InnerCard {
    #[serde(default)]
    item: Option<InnerItem>,
}

#[derive(Debug, Default, Deserialize)]
struct InnerItem {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    pictures: Vec<Picture>,
}

#[derive(Debug, Default, Deserialize)]
struct Picture {
    #[serde(default)]
    img_src: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DynamicDetail {
    #[serde(default)]
    pub card: Option<Card>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct OwnerInfo {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ReplyData {
    #[serde(default)]
    pub replies: Option<Vec<ReplyWire>>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ReplyWire {
    #[serde(default)]
    content: Option<ReplyContent>,
    #[serde(default)]
    replies: Option<Vec<ReplyWire>>,
}

#[derive(Debug, Default, Deserialize)]
struct ReplyContent {
    #[serde(default)]
    message: String,
}

/// Identifiers arrive as JSON numbers or strings depending on the endpoint
pub(crate) fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// `has_more` arrives as `0`/`1` or as a boolean
fn value_to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().is_some_and(|v| v != 0),
        _ => false,
    }
}

impl Card {
    /// Convert into a [`RawItem`]; an unparseable payload yields an empty body
    pub(crate) fn into_raw(self) -> RawItem {
        let (id, timestamp) = match &self.desc {
            Some(desc) => (desc.dynamic_id.as_ref().and_then(value_to_id), desc.timestamp),
            None => (None, None),
        };

        let inner = match self.card.as_deref() {
            Some(payload) => match serde_json::from_str::<InnerCard>(payload) {
                Ok(inner) => inner,
                Err(e) => {
                    tracing::warn!(id = ?id, error = %e, "Failed to parse item payload");
                    InnerCard::default()
                }
            },
            None => InnerCard::default(),
        };

        let (body, attachments) = match inner.item {
            Some(item) => {
                let body = item.description.or(item.content).unwrap_or_default();
                let attachments = item.pictures.into_iter().map(|p| p.img_src).collect();
                (body, attachments)
            }
            None => (String::new(), Vec::new()),
        };

        RawItem {
            id,
            timestamp,
            body,
            attachments,
        }
    }
}

impl SpaceHistory {
    pub(crate) fn into_page(self) -> FeedPage {
        let items: Vec<RawItem> = self
            .cards
            .unwrap_or_default()
            .into_iter()
            .map(Card::into_raw)
            .collect();

        FeedPage {
            items,
            has_more: self.has_more.as_ref().is_some_and(value_to_bool),
            next_cursor: self.next_offset.as_ref().and_then(value_to_id).map(PageCursor),
        }
    }
}

impl ReplyWire {
    fn into_reply(self) -> Reply {
        Reply {
            message: self.content.map(|c| c.message).unwrap_or_default(),
            replies: self
                .replies
                .unwrap_or_default()
                .into_iter()
                .map(ReplyWire::into_reply)
                .collect(),
        }
    }
}

impl ReplyData {
    pub(crate) fn into_page(self) -> ReplyPage {
        ReplyPage {
            replies: self
                .replies
                .unwrap_or_default()
                .into_iter()
                .map(ReplyWire::into_reply)
                .collect(),
        }
    }
}
