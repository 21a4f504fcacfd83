//! Song URL, detail and lyric APIs.
//!
//! # Endpoints
//!
//! ## `song_url`: `POST /eapi/song/enhance/player/url/v1` (signed)
//!
//! Payload: `{ "ids": [123], "level": "lossless", "encodeType": "flac",
//! "header": "<device json>" }`, plus `"immerseType": "c51"` for `sky`.
//!
//! Response:
//! ```json
//! {
//!   "code": 200,
//!   "data": [{
//!     "id": 123,
//!     "url": "https://m701.music.126.net/...",  // null if unavailable
//!     "level": "lossless", "br": 999000, "size": 12345678, "type": "flac"
//!   }]
//! }
//! ```
//!
//! ## `song_detail`: `POST /api/v3/song/detail`
//!
//! Form: `c=[{"id":123,"v":0}]`
//!
//! Response:
//! ```json
//! {
//!   "code": 200,
//!   "songs": [{
//!     "id": 123, "name": "歌名",
//!     "ar": [{ "id": 1, "name": "歌手" }],
//!     "al": { "id": 2, "name": "专辑", "picUrl": "https://..." },
//!     "dt": 240000
//!   }]
//! }
//! ```
//!
//! ## `lyrics`: `POST /api/song/lyric`
//!
//! Form: `id=123&cp=false&tv=0&lv=0&rv=0&kv=0&yv=0&ytv=0&yrv=0`
//!
//! Response carries `lrc`, `tlyric`, `romalrc` and `klyric`, each an object
//! with a `lyric` string. Any of them may be absent for instrumental tracks.

use serde_json::{Value, json};
use tracing::debug;

use crate::client::{NeteaseClient, device_header};
use crate::context::RequestContext;
use crate::cookie::CookieSet;
use crate::error::{GatewayError, Result};
use crate::types::{Lyrics, Quality, SongUrl, Track};

/// Most songs the detail endpoint accepts in one request.
pub const DETAIL_BATCH_SIZE: usize = 100;

impl NeteaseClient {
    /// Resolve a temporary CDN URL for a song at the requested quality.
    ///
    /// The provider may grant a lower level than asked for; the granted one
    /// is in [`SongUrl::level`]. `url` is `None` when nothing is playable.
    pub async fn song_url(
        &self,
        ctx: &RequestContext,
        id: u64,
        quality: Quality,
        cookies: &CookieSet,
    ) -> Result<SongUrl> {
        let mut payload = json!({
            "ids": [id],
            "level": quality.as_str(),
            "encodeType": "flac",
            "header": device_header(),
        });
        if quality == Quality::Sky {
            payload["immerseType"] = json!("c51");
        }

        debug!(id, level = %quality, "resolving song url");
        let url = self.endpoints().interface("/eapi/song/enhance/player/url/v1");
        let resp = self.post_eapi(ctx, &url, &payload, cookies).await?;
        let data = resp["data"]
            .as_array()
            .ok_or_else(|| GatewayError::Malformed(format!("no url data for song {id}")))?;
        match data.first() {
            Some(entry) => Ok(parse_song_url(entry)),
            None => Ok(SongUrl {
                id,
                level: quality.as_str().to_owned(),
                ..SongUrl::default()
            }),
        }
    }

    /// Get track metadata by ID.
    pub async fn song_detail(
        &self,
        ctx: &RequestContext,
        id: u64,
        cookies: &CookieSet,
    ) -> Result<Track> {
        self.song_detail_batch(ctx, &[id], cookies)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Malformed(format!("track not found: {id}")))
    }

    /// Get metadata for many tracks, [`DETAIL_BATCH_SIZE`] per request.
    ///
    /// Order follows the provider's responses; IDs it does not know are
    /// silently absent.
    pub async fn song_detail_batch(
        &self,
        ctx: &RequestContext,
        ids: &[u64],
        cookies: &CookieSet,
    ) -> Result<Vec<Track>> {
        let url = self.endpoints().interface("/api/v3/song/detail");
        let mut tracks = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(DETAIL_BATCH_SIZE) {
            let c: Vec<Value> = chunk.iter().map(|id| json!({ "id": id, "v": 0 })).collect();
            let c = serde_json::to_string(&c)
                .map_err(|e| GatewayError::Encoding(e.to_string()))?;
            debug!(count = chunk.len(), "fetching song details");
            let resp = self.post_form(ctx, &url, &[("c", c)], cookies).await?;
            if let Some(songs) = resp["songs"].as_array() {
                tracks.extend(songs.iter().map(parse_track));
            }
        }
        Ok(tracks)
    }

    /// Get all lyric blocks for a track. Missing blocks are empty strings.
    pub async fn lyrics(
        &self,
        ctx: &RequestContext,
        id: u64,
        cookies: &CookieSet,
    ) -> Result<Lyrics> {
        let form = [
            ("id", id.to_string()),
            ("cp", "false".to_owned()),
            ("tv", "0".to_owned()),
            ("lv", "0".to_owned()),
            ("rv", "0".to_owned()),
            ("kv", "0".to_owned()),
            ("yv", "0".to_owned()),
            ("ytv", "0".to_owned()),
            ("yrv", "0".to_owned()),
        ];
        let url = self.endpoints().interface("/api/song/lyric");
        let resp = self.post_form(ctx, &url, &form, cookies).await?;
        let block = |key: &str| resp[key]["lyric"].as_str().unwrap_or("").to_owned();
        Ok(Lyrics {
            lrc: block("lrc"),
            tlyric: block("tlyric"),
            romalrc: block("romalrc"),
            klyric: block("klyric"),
        })
    }
}

fn parse_song_url(v: &Value) -> SongUrl {
    SongUrl {
        id: v["id"].as_u64().unwrap_or(0),
        url: v["url"]
            .as_str()
            .filter(|u| !u.is_empty())
            .map(String::from),
        level: v["level"].as_str().unwrap_or("").to_owned(),
        size: v["size"].as_u64().unwrap_or(0),
        file_type: v["type"].as_str().unwrap_or("").to_lowercase(),
        br: v["br"].as_u64().unwrap_or(0),
    }
}

/// Flatten a song object from detail, search or album responses.
pub(crate) fn parse_track(v: &Value) -> Track {
    let artists = v["ar"]
        .as_array()
        .or_else(|| v["artists"].as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|a| a["name"].as_str())
                .filter(|name| !name.is_empty())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default();

    let al = if v["al"].is_null() { &v["album"] } else { &v["al"] };
    Track {
        id: v["id"].as_u64().unwrap_or(0),
        name: v["name"].as_str().unwrap_or("").to_owned(),
        artists,
        album: al["name"].as_str().unwrap_or("").to_owned(),
        pic_url: al["picUrl"].as_str().unwrap_or("").to_owned(),
        duration_ms: v["dt"]
            .as_u64()
            .or_else(|| v["duration"].as_u64())
            .unwrap_or(0),
    }
}
