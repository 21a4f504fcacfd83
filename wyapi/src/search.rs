//! Search API.
//!
//! Endpoint: `POST https://music.163.com/api/cloudsearch/pc`
//!
//! Form fields:
//! - `s`: search keyword
//! - `type`: always `1` (songs)
//! - `limit`: page size, see [`clamp_search_limit`]
//!
//! Response JSON:
//! ```json
//! {
//!   "code": 200,
//!   "result": {
//!     "songCount": 268,
//!     "songs": [ { "id": 123, "name": "...", "ar": [...], "al": {...}, "dt": 240000 } ]
//!   }
//! }
//! ```

use serde_json::Value;
use tracing::debug;

use crate::client::NeteaseClient;
use crate::context::RequestContext;
use crate::cookie::CookieSet;
use crate::error::{GatewayError, Result};
use crate::track::parse_track;
use crate::types::Track;

pub const DEFAULT_SEARCH_LIMIT: u32 = 10;
pub const MAX_SEARCH_LIMIT: u32 = 100;

/// Non-positive limits become [`DEFAULT_SEARCH_LIMIT`]; anything above
/// [`MAX_SEARCH_LIMIT`] is capped.
pub fn clamp_search_limit(limit: i64) -> u32 {
    if limit <= 0 {
        return DEFAULT_SEARCH_LIMIT;
    }
    u32::try_from(limit).map_or(MAX_SEARCH_LIMIT, |l| l.min(MAX_SEARCH_LIMIT))
}

impl NeteaseClient {
    /// Search songs by keyword and return the raw envelope.
    ///
    /// The `limit` is clamped first. Useful for callers that pass the
    /// provider's `result` object through unchanged.
    pub async fn search_raw(
        &self,
        ctx: &RequestContext,
        keywords: &str,
        limit: i64,
        cookies: &CookieSet,
    ) -> Result<Value> {
        let keywords = keywords.trim();
        if keywords.is_empty() {
            return Err(GatewayError::InvalidInput("search keywords empty".into()));
        }
        let limit = clamp_search_limit(limit);
        debug!(keywords, limit, "searching");
        let form = [
            ("s", keywords.to_owned()),
            ("type", "1".to_owned()),
            ("limit", limit.to_string()),
        ];
        let url = self.endpoints().web("/api/cloudsearch/pc");
        self.post_form(ctx, &url, &form, cookies).await
    }

    /// Search songs by keyword.
    pub async fn search(
        &self,
        ctx: &RequestContext,
        keywords: &str,
        limit: i64,
        cookies: &CookieSet,
    ) -> Result<Vec<Track>> {
        let resp = self.search_raw(ctx, keywords, limit, cookies).await?;
        Ok(resp["result"]["songs"]
            .as_array()
            .map(|songs| songs.iter().map(parse_track).collect())
            .unwrap_or_default())
    }
}
