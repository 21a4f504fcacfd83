//! Album API.
//!
//! Endpoint: `GET https://music.163.com/api/v1/album/{id}`
//!
//! Unlike playlists, one response carries both metadata and full tracks:
//!
//! ```json
//! {
//!   "code": 200,
//!   "album": {
//!     "id": 32311, "name": "专辑", "pic": 109951163071459616,
//!     "artist": { "name": "歌手" },
//!     "publishTime": 1262275200000, "description": "..."
//!   },
//!   "songs": [ { "id": 1, "name": "...", "ar": [...], "al": {...}, "dt": 240000 } ]
//! }
//! ```

use serde_json::Value;

use crate::client::NeteaseClient;
use crate::context::RequestContext;
use crate::cookie::CookieSet;
use crate::error::{GatewayError, Result};
use crate::picture::{DEFAULT_PIC_SIZE, picture_url};
use crate::track::parse_track;
use crate::types::AlbumInfo;

impl NeteaseClient {
    /// Get album metadata and tracks.
    pub async fn album(
        &self,
        ctx: &RequestContext,
        id: u64,
        cookies: &CookieSet,
    ) -> Result<AlbumInfo> {
        let url = self.endpoints().web(&format!("/api/v1/album/{id}"));
        let resp = self.get_json(ctx, &url, cookies).await?;
        if !resp["album"].is_object() {
            return Err(GatewayError::Malformed(format!("no album object for {id}")));
        }
        Ok(parse_album(&resp))
    }
}

fn parse_album(resp: &Value) -> AlbumInfo {
    let a = &resp["album"];
    let cover = picture_url(a["pic"].as_u64().unwrap_or(0), DEFAULT_PIC_SIZE);
    let tracks: Vec<_> = resp["songs"]
        .as_array()
        .map(|songs| songs.iter().map(parse_track).collect())
        .unwrap_or_default();
    AlbumInfo {
        id: a["id"].as_u64().unwrap_or(0),
        name: a["name"].as_str().unwrap_or("").to_owned(),
        pic_url: cover.clone(),
        cover_img_url: cover,
        artist: a["artist"]["name"].as_str().unwrap_or("").to_owned(),
        publish_time: a["publishTime"].as_i64().unwrap_or(0),
        description: a["description"].as_str().unwrap_or("").to_owned(),
        track_count: tracks.len() as u64,
        tracks,
    }
}
