//! HTTP client for the Netease Cloud Music desktop APIs.
//!
//! Two request shapes are used:
//!
//! - **EAPI** (`/eapi/...`): the JSON payload is signed with
//!   [`eapi_params`](crate::eapi::eapi_params) and sent as the single form
//!   field `params`.
//! - **Plain** (`/api/...`): ordinary form fields, or a GET.
//!
//! Every request carries the desktop client's `User-Agent`, a `Referer` of
//! `https://music.163.com/` and a `Cookie` header built from the default
//! device cookies merged with the caller's [`CookieSet`].
//!
//! # Response format
//!
//! All API responses share this envelope:
//!
//! ```json
//! {
//!   "code": 200,
//!   ...endpoint-specific fields...
//! }
//! ```
//!
//! Non-200 codes are mapped to [`GatewayError::Api`]. Nothing is retried.

use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use rand::Rng;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HeaderMap, REFERER};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::context::RequestContext;
use crate::cookie::CookieSet;
use crate::eapi::eapi_params;
use crate::error::{GatewayError, Result};

pub const INTERFACE_HOST: &str = "https://interface3.music.163.com";
pub const WEB_HOST: &str = "https://music.163.com";

pub(crate) const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; WOW64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Safari/537.36 Chrome/91.0.4472.164 NeteaseMusicDesktop/2.10.2.200154";
pub(crate) const REFERER_URL: &str = "https://music.163.com/";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Base URLs of the two provider hosts.
///
/// The interface host serves song URL, song detail and lyrics. The web host
/// serves search, playlist and album. Override both to point at a mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub interface: String,
    pub web: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            interface: INTERFACE_HOST.to_owned(),
            web: WEB_HOST.to_owned(),
        }
    }
}

impl Endpoints {
    /// Use the same base for both hosts.
    pub fn single(base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_owned();
        Self {
            interface: base.clone(),
            web: base,
        }
    }

    pub(crate) fn interface(&self, path: &str) -> String {
        format!("{}{path}", self.interface.trim_end_matches('/'))
    }

    pub(crate) fn web(&self, path: &str) -> String {
        format!("{}{path}", self.web.trim_end_matches('/'))
    }
}

/// Async HTTP client for the Netease Cloud Music API.
///
/// Stateless apart from the connection pool: cookies are passed into every
/// call, so one client can be shared across concurrent requests. API methods
/// live in separate modules (`track`, `search`, `playlist`, `album`,
/// `picture`) as `impl NeteaseClient` blocks.
#[derive(Debug, Clone)]
pub struct NeteaseClient {
    http: Client,
    endpoints: Endpoints,
}

impl NeteaseClient {
    /// Create a client against the real provider hosts. A zero timeout means
    /// the 30 second default.
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_endpoints(timeout, Endpoints::default())
    }

    /// Create a client against explicit hosts (useful for testing).
    pub fn with_endpoints(timeout: Duration, endpoints: Endpoints) -> Result<Self> {
        let timeout = if timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            timeout
        };
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { http, endpoints })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// POST form fields and return the checked envelope.
    pub(crate) async fn post_form<F>(
        &self,
        ctx: &RequestContext,
        url: &str,
        form: &F,
        cookies: &CookieSet,
    ) -> Result<Value>
    where
        F: Serialize + ?Sized,
    {
        debug!(url, "POST");
        let req = self.prepare(self.http.post(url), cookies).form(form);
        ctx.run(send_json(req)).await.and_then(check_envelope)
    }

    /// Sign `payload` for `url` and POST it as the `params` field.
    pub(crate) async fn post_eapi<T>(
        &self,
        ctx: &RequestContext,
        url: &str,
        payload: &T,
        cookies: &CookieSet,
    ) -> Result<Value>
    where
        T: Serialize + ?Sized,
    {
        let params = eapi_params(url, payload)?;
        self.post_form(ctx, url, &[("params", params)], cookies)
            .await
    }

    /// GET `url` and return the checked envelope.
    pub(crate) async fn get_json(
        &self,
        ctx: &RequestContext,
        url: &str,
        cookies: &CookieSet,
    ) -> Result<Value> {
        debug!(url, "GET");
        let req = self.prepare(self.http.get(url), cookies);
        ctx.run(send_json(req)).await.and_then(check_envelope)
    }

    /// Open a raw GET to an audio URL.
    ///
    /// Only the response head is awaited here; the body is handed back as a
    /// stream. Dropping the [`AudioStream`] closes the connection.
    pub async fn fetch_stream(&self, ctx: &RequestContext, url: &str) -> Result<AudioStream> {
        if url.trim().is_empty() {
            return Err(GatewayError::InvalidInput("stream url empty".into()));
        }
        debug!(url, "fetching audio stream");
        let req = self.http.get(url).header(REFERER, REFERER_URL);
        let resp = ctx
            .run(async { Ok::<_, GatewayError>(req.send().await?.error_for_status()?) })
            .await?;
        Ok(AudioStream::from_response(resp))
    }

    /// Follow a short link and return where it points.
    ///
    /// Sends HEAD first. A HEAD that fails or is answered with 405 is retried
    /// as GET. Redirects are followed by the HTTP client, so the answer is the
    /// `Location` of an unfollowed 3xx or else the final request URL.
    pub async fn resolve_short_url(&self, ctx: &RequestContext, short_url: &str) -> Result<String> {
        if short_url.trim().is_empty() {
            return Err(GatewayError::InvalidInput("short url empty".into()));
        }
        match self.probe(ctx, self.http.head(short_url)).await {
            Ok(Some(target)) => return Ok(target),
            Ok(None) => debug!(short_url, "HEAD not allowed, retrying with GET"),
            Err(GatewayError::Cancelled) => return Err(GatewayError::Cancelled),
            Err(e) => debug!(short_url, error = %e, "HEAD failed, retrying with GET"),
        }
        self.probe(ctx, self.http.get(short_url))
            .await?
            .ok_or_else(|| GatewayError::Malformed("short link rejected the request method".into()))
    }

    /// `None` when the method is not allowed.
    async fn probe(&self, ctx: &RequestContext, req: RequestBuilder) -> Result<Option<String>> {
        let req = req.header(REFERER, REFERER_URL);
        let resp = ctx.run(async { Ok::<_, GatewayError>(req.send().await?) }).await?;
        let status = resp.status();
        if status == StatusCode::METHOD_NOT_ALLOWED {
            return Ok(None);
        }
        if status.is_redirection() {
            if let Some(location) = resp
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
            {
                return Ok(Some(location.to_owned()));
            }
        }
        Ok(Some(resp.url().to_string()))
    }

    fn prepare(&self, req: RequestBuilder, cookies: &CookieSet) -> RequestBuilder {
        req.header(REFERER, REFERER_URL)
            .header(COOKIE, cookies.header_value())
    }
}

async fn send_json(req: RequestBuilder) -> Result<Value> {
    let resp = req.send().await?.error_for_status()?;
    Ok(resp.json().await?)
}

/// Reject any envelope whose `code` is not 200.
pub(crate) fn check_envelope(json: Value) -> Result<Value> {
    let Some(code) = json.get("code").and_then(Value::as_i64) else {
        return Err(GatewayError::Malformed("response has no envelope code".into()));
    };
    if code != 200 {
        let message = json
            .get("message")
            .or_else(|| json.get("msg"))
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_owned();
        return Err(GatewayError::Api { code, message });
    }
    Ok(json)
}

/// The device-identity JSON the song URL endpoint expects in its `header`
/// field, with a fresh eight-digit request id.
pub(crate) fn device_header() -> String {
    let request_id: u32 = rand::rng().random_range(20_000_000..30_000_000);
    json!({
        "os": "pc",
        "appver": "",
        "osver": "",
        "deviceId": "pyncm!",
        "requestId": request_id.to_string(),
    })
    .to_string()
}

/// An open audio download.
pub struct AudioStream {
    headers: HeaderMap,
    body: BoxStream<'static, reqwest::Result<Bytes>>,
}

impl AudioStream {
    fn from_response(resp: reqwest::Response) -> Self {
        Self {
            headers: resp.headers().clone(),
            body: resp.bytes_stream().boxed(),
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Upstream `Content-Type`, if present and non-empty.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    /// Next body chunk, or `None` at the end. Honors cancellation between chunks.
    pub async fn next_chunk(&mut self, ctx: &RequestContext) -> Result<Option<Bytes>> {
        let body = &mut self.body;
        ctx.run(async move { Ok::<_, GatewayError>(body.next().await.transpose()?) })
            .await
    }

    /// The raw body stream, for forwarding without buffering.
    pub fn into_body(self) -> BoxStream<'static, reqwest::Result<Bytes>> {
        self.body
    }
}

impl std::fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioStream")
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
