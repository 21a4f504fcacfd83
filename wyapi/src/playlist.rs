//! Playlist API.
//!
//! Endpoint: `POST https://music.163.com/api/v6/playlist/detail`
//!
//! Form: `id=123456`
//!
//! The response only carries bare track IDs in `trackIds`; full records are
//! fetched afterwards through the song detail endpoint, 100 at a time.
//!
//! Response:
//! ```json
//! {
//!   "code": 200,
//!   "playlist": {
//!     "id": 123456,
//!     "name": "歌单名",
//!     "description": "描述...",
//!     "coverImgUrl": "https://...",
//!     "trackCount": 50,
//!     "creator": { "userId": 789, "nickname": "用户名" },
//!     "trackIds": [ { "id": 1 }, { "id": 2 } ]
//!   }
//! }
//! ```

use serde_json::Value;
use tracing::debug;

use crate::client::NeteaseClient;
use crate::context::RequestContext;
use crate::cookie::CookieSet;
use crate::error::{GatewayError, Result};
use crate::types::PlaylistInfo;

impl NeteaseClient {
    /// Get playlist metadata and its full track list.
    pub async fn playlist(
        &self,
        ctx: &RequestContext,
        id: u64,
        cookies: &CookieSet,
    ) -> Result<PlaylistInfo> {
        let url = self.endpoints().web("/api/v6/playlist/detail");
        let resp = self
            .post_form(ctx, &url, &[("id", id.to_string())], cookies)
            .await?;
        let p = &resp["playlist"];
        if !p.is_object() {
            return Err(GatewayError::Malformed(format!("no playlist object for {id}")));
        }

        let mut info = parse_playlist(p);
        let track_ids = track_ids(p);
        debug!(id, tracks = track_ids.len(), "expanding playlist tracks");
        if !track_ids.is_empty() {
            info.tracks = self.song_detail_batch(ctx, &track_ids, cookies).await?;
        }
        Ok(info)
    }
}

fn parse_playlist(p: &Value) -> PlaylistInfo {
    let cover = p["coverImgUrl"].as_str().unwrap_or("").to_owned();
    PlaylistInfo {
        id: p["id"].as_u64().unwrap_or(0),
        name: p["name"].as_str().unwrap_or("").to_owned(),
        pic_url: cover.clone(),
        cover_img_url: cover,
        creator: p["creator"]["nickname"].as_str().unwrap_or("").to_owned(),
        track_count: p["trackCount"].as_u64().unwrap_or(0),
        description: p["description"].as_str().unwrap_or("").to_owned(),
        tracks: Vec::new(),
    }
}

fn track_ids(p: &Value) -> Vec<u64> {
    p["trackIds"]
        .as_array()
        .map(|ids| ids.iter().filter_map(|t| t["id"].as_u64()).collect())
        .unwrap_or_default()
}
