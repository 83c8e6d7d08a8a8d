//! HTTP implementation of [`Transport`] over reqwest

use super::wire::{DynamicDetail, Envelope, OwnerInfo, ReplyData, SpaceHistory};
use super::{ByteStream, ReplyPage, Transport};
use crate::config::{Config, EndpointConfig, SessionConfig};
use crate::error::{Error, Result, TransportError};
use crate::types::{FeedPage, PageCursor, RawItem};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue, REFERER, USER_AGENT};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Request context shared by every call of a run
///
/// Built once from [`SessionConfig`]; the cookie and user agent are baked into
/// the client's default headers instead of living in global state.
#[derive(Clone, Debug)]
pub struct Session {
    client: reqwest::Client,
    referer: HeaderValue,
}

impl Session {
    /// Build a session with the given identity and per-request timeout
    ///
    /// # Errors
    /// Returns a configuration error if a header value contains characters
    /// that cannot be sent, or if the HTTP client cannot be created.
    pub fn new(config: &SessionConfig, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| Error::config("session.user_agent", e.to_string()))?,
        );
        if !config.cookie.is_empty() {
            let mut cookie = HeaderValue::from_str(&config.cookie)
                .map_err(|e| Error::config("session.cookie", e.to_string()))?;
            cookie.set_sensitive(true);
            headers.insert(COOKIE, cookie);
        }
        let referer = HeaderValue::from_str(&config.referer)
            .map_err(|e| Error::config("session.referer", e.to_string()))?;

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, referer })
    }

    /// The underlying HTTP client
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

/// [`Transport`] backed by the source's public JSON API
#[derive(Clone, Debug)]
pub struct HttpTransport {
    session: Session,
    endpoints: EndpointConfig,
}

impl HttpTransport {
    /// Create a transport from the run configuration
    pub fn new(config: &Config) -> Result<Self> {
        let session = Session::new(&config.session, config.request_timeout)?;
        Ok(Self::with_session(session, config.endpoints.clone()))
    }

    /// Create a transport around an existing session
    pub fn with_session(session: Session, endpoints: EndpointConfig) -> Self {
        Self { session, endpoints }
    }

    /// GET a JSON endpoint and unwrap its envelope
    ///
    /// Non-success HTTP statuses, undecodable bodies and non-zero `code`s are
    /// all reported as [`TransportError`]s.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        with_referer: bool,
    ) -> std::result::Result<Option<T>, TransportError> {
        let mut request = self.session.client.get(url).query(query);
        if with_referer {
            request = request.header(REFERER, self.session.referer.clone());
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| TransportError::Decode {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if envelope.code != 0 {
            return Err(TransportError::Api {
                code: envelope.code,
                message: envelope.message,
            });
        }

        Ok(envelope.data)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_page(
        &self,
        owner: &str,
        cursor: &PageCursor,
    ) -> std::result::Result<FeedPage, TransportError> {
        tracing::debug!(owner = %owner, cursor = %cursor, "Requesting feed page");

        let data: Option<SpaceHistory> = self
            .get_json(
                &self.endpoints.feed,
                &[("host_uid", owner), ("offset_dynamic_id", cursor.as_str())],
                false,
            )
            .await?;

        Ok(data.unwrap_or_default().into_page())
    }

    async fn get_item_detail(
        &self,
        id: &str,
    ) -> std::result::Result<Option<RawItem>, TransportError> {
        let data: Option<DynamicDetail> = self
            .get_json(&self.endpoints.detail, &[("dynamic_id", id)], true)
            .await?;

        let Some(card) = data.and_then(|d| d.card) else {
            return Ok(None);
        };

        let mut raw = card.into_raw();
        // The detail endpoint is keyed by id; trust the key if the payload omits it
        if raw.id.is_none() {
            raw.id = Some(id.to_string());
        }
        Ok(Some(raw))
    }

    async fn download_bytes(&self, url: &str) -> std::result::Result<ByteStream, TransportError> {
        let response = self
            .session
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let owned_url = url.to_string();
        let stream = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| TransportError::from_reqwest(&owned_url, e)));
        Ok(stream.boxed())
    }

    async fn get_owner_name(
        &self,
        owner: &str,
    ) -> std::result::Result<Option<String>, TransportError> {
        let data: Option<OwnerInfo> = self
            .get_json(&self.endpoints.owner_info, &[("mid", owner)], false)
            .await?;
        Ok(data.and_then(|info| info.name).filter(|n| !n.trim().is_empty()))
    }

    async fn get_reply_page(
        &self,
        oid: &str,
        page: u32,
    ) -> std::result::Result<ReplyPage, TransportError> {
        let page = page.to_string();
        let data: Option<ReplyData> = self
            .get_json(
                &self.endpoints.reply,
                &[("oid", oid), ("type", "17"), ("next", page.as_str())],
                true,
            )
            .await?;
        Ok(data.unwrap_or_default().into_page())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
