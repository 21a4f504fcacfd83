//! Netease Cloud Music protocol client and download pipeline.
//!
//! Reproduces the desktop client's EAPI request signing, resolves the many
//! shapes of user-supplied song/album/playlist references to numeric IDs,
//! and turns a song ID into audio either streamed straight through or
//! persisted to disk.
//!
//! # Cookies
//!
//! Cookies are never ambient. A [`CookieStore`] names a flat text file; call
//! [`CookieStore::load`] for a fresh [`CookieSet`] and pass it into each
//! client call. Default device cookies are merged in automatically.
//!
//! ```no_run
//! use std::time::Duration;
//! use wyapi::{CookieStore, NeteaseClient, Quality, RequestContext};
//!
//! # async fn demo() -> wyapi::Result<()> {
//! let client = NeteaseClient::new(Duration::from_secs(30))?;
//! let cookies = CookieStore::new("cookie.txt").load().await?;
//! let ctx = RequestContext::with_timeout(Duration::from_secs(30));
//!
//! let id = wyapi::resolve_id(&ctx, "https://music.163.com/song?id=1901371647", &client).await?;
//! let url = client.song_url(&ctx, id, Quality::Lossless, &cookies).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # API endpoint mapping
//!
//! | Method                                | Endpoint                                   | Description        |
//! |---------------------------------------|--------------------------------------------|--------------------|
//! | [`NeteaseClient::song_url`]           | `POST /eapi/song/enhance/player/url/v1`    | Stream URL (signed)|
//! | [`NeteaseClient::song_detail`]        | `POST /api/v3/song/detail`                 | Track metadata     |
//! | [`NeteaseClient::song_detail_batch`]  | `POST /api/v3/song/detail`                 | Up to 100 per call |
//! | [`NeteaseClient::lyrics`]             | `POST /api/song/lyric`                     | LRC lyric blocks   |
//! | [`NeteaseClient::search`]             | `POST /api/cloudsearch/pc`                 | Song search        |
//! | [`NeteaseClient::playlist`]           | `POST /api/v6/playlist/detail`             | Playlist + tracks  |
//! | [`NeteaseClient::album`]              | `GET /api/v1/album/{id}`                   | Album + tracks     |
//! | [`NeteaseClient::fetch_stream`]       | CDN URL                                    | Raw audio bytes    |
//! | [`NeteaseClient::resolve_short_url`]  | `163cn.tv` link                            | Redirect target    |
//!
//! # Encryption
//!
//! EAPI parameters are AES-128-ECB encrypted under a fixed key, matching the
//! desktop client byte for byte. See [`eapi`] and [`crypto`]. This is wire
//! compatibility, not security.

mod album;
pub mod client;
pub mod context;
pub mod cookie;
pub mod crypto;
pub mod download;
pub mod eapi;
pub mod error;
pub mod picture;
mod playlist;
pub mod resolver;
pub mod search;
pub mod track;
pub mod types;

pub use client::{AudioStream, Endpoints, NeteaseClient};
pub use context::RequestContext;
pub use cookie::{CookieSet, CookieStore};
pub use download::{Downloader, MusicInfo, SavedFile, StreamedAudio, build_filename};
pub use error::{ErrorKind, GatewayError, Result};
pub use picture::picture_url;
pub use resolver::{ShortLinkResolver, resolve_id};
pub use search::clamp_search_limit;
pub use types::{AlbumInfo, Lyrics, PlaylistInfo, Quality, SongUrl, Track};
