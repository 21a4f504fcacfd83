//! Download pipeline: metadata assembly, file naming, and delivery either as
//! a pass-through stream or as a file in the download directory.
//!
//! Persisting is idempotent by presence: a non-empty file at the target path
//! is reused without contacting the CDN. New files are written to a unique
//! `.part` file next to the target and renamed into place, so concurrent
//! downloads of one track never interleave and a failed transfer leaves
//! nothing behind under the final name.

use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::client::{AudioStream, NeteaseClient};
use crate::context::RequestContext;
use crate::cookie::{CookieSet, CookieStore};
use crate::error::{GatewayError, Result};
use crate::types::Quality;

/// Longest file stem, in characters, before the extension is added.
pub const MAX_FILENAME_CHARS: usize = 200;

const ILLEGAL_FILENAME_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Everything needed to deliver one track, assembled per request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MusicInfo {
    pub id: u64,
    pub name: String,
    pub artists: String,
    pub album: String,
    pub pic_url: String,
    /// Milliseconds.
    pub duration: u64,
    /// Lowercase container extension: `flac`, `m4a`, `mp3`, ...
    pub file_type: String,
    /// Bytes, as reported by the provider.
    pub file_size: u64,
    /// Level granted by the provider, or the requested one if it did not say.
    pub quality: String,
    pub url: String,
    pub lyric: String,
    pub tlyric: String,
}

impl MusicInfo {
    /// `<artists> - <name>.<ext>`, sanitized.
    pub fn file_name(&self) -> String {
        let stem = build_filename(self);
        let suffix = format!(".{}", self.file_type);
        if stem.ends_with(&suffix) {
            stem
        } else {
            stem + &suffix
        }
    }
}

/// A persisted (or reused) download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    pub path: PathBuf,
    pub bytes: u64,
    /// The file was already present and nothing was fetched.
    pub reused: bool,
}

/// An audio stream ready to forward to a client.
#[derive(Debug)]
pub struct StreamedAudio {
    pub file_name: String,
    /// Upstream `Content-Type`, or `audio/<ext>`.
    pub content_type: String,
    pub stream: AudioStream,
}

/// Composes provider calls into deliverable audio.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: NeteaseClient,
    cookies: CookieStore,
    dir: PathBuf,
}

impl Downloader {
    /// An empty `dir` means `downloads`.
    pub fn new(client: NeteaseClient, cookies: CookieStore, dir: impl Into<PathBuf>) -> Self {
        let mut dir = dir.into();
        if dir.as_os_str().is_empty() {
            dir = PathBuf::from("downloads");
        }
        Self {
            client,
            cookies,
            dir,
        }
    }

    pub fn client(&self) -> &NeteaseClient {
        &self.client
    }

    pub fn cookie_store(&self) -> &CookieStore {
        &self.cookies
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fresh cookie snapshot. An unreadable cookie file degrades to no cookies.
    pub async fn cookies(&self) -> CookieSet {
        match self.cookies.load().await {
            Ok(set) => set,
            Err(e) => {
                warn!(path = %self.cookies.path().display(), error = %e, "cannot load cookies");
                CookieSet::new()
            }
        }
    }

    /// Resolve stream URL, metadata and lyrics for one song.
    ///
    /// Lyrics are best effort. A missing stream URL is
    /// [`GatewayError::AssetUnavailable`].
    pub async fn music_info(
        &self,
        ctx: &RequestContext,
        id: u64,
        quality: Quality,
    ) -> Result<MusicInfo> {
        let cookies = self.cookies().await;

        let song_url = self.client.song_url(ctx, id, quality, &cookies).await?;
        let Some(url) = song_url.url.filter(|u| !u.is_empty()) else {
            return Err(GatewayError::AssetUnavailable(format!(
                "no playable url for song {id} at {quality}"
            )));
        };

        let track = self.client.song_detail(ctx, id, &cookies).await?;

        let lyrics = match self.client.lyrics(ctx, id, &cookies).await {
            Ok(l) => l,
            Err(GatewayError::Cancelled) => return Err(GatewayError::Cancelled),
            Err(e) => {
                warn!(id, error = %e, "lyrics unavailable");
                Default::default()
            }
        };

        let file_type = if song_url.file_type.is_empty() {
            detect_extension(&url).to_owned()
        } else {
            song_url.file_type.to_lowercase()
        };
        let granted = if song_url.level.is_empty() {
            quality.as_str().to_owned()
        } else {
            song_url.level
        };

        Ok(MusicInfo {
            id,
            name: track.name,
            artists: track.artists,
            album: track.album,
            pic_url: track.pic_url,
            duration: track.duration_ms,
            file_type,
            file_size: song_url.size,
            quality: granted,
            url,
            lyric: lyrics.lrc,
            tlyric: lyrics.tlyric,
        })
    }

    /// Open the audio for pass-through delivery without touching disk.
    pub async fn open_stream(&self, ctx: &RequestContext, info: &MusicInfo) -> Result<StreamedAudio> {
        if info.url.is_empty() {
            return Err(GatewayError::AssetUnavailable(format!("song {} has no url", info.id)));
        }
        let stream = self.client.fetch_stream(ctx, &info.url).await?;
        let content_type = stream
            .content_type()
            .map_or_else(|| format!("audio/{}", info.file_type), str::to_owned);
        Ok(StreamedAudio {
            file_name: info.file_name(),
            content_type,
            stream,
        })
    }

    /// Save the audio under [`MusicInfo::file_name`] in the download directory.
    pub async fn persist(&self, ctx: &RequestContext, info: &MusicInfo) -> Result<SavedFile> {
        if info.url.is_empty() {
            return Err(GatewayError::AssetUnavailable(format!("song {} has no url", info.id)));
        }
        fs::create_dir_all(&self.dir)
            .await
            .map_err(GatewayError::DownloadFailed)?;

        let file_name = info.file_name();
        let path = self.dir.join(&file_name);
        if let Ok(meta) = fs::metadata(&path).await {
            if meta.is_file() && meta.len() > 0 {
                info!(path = %path.display(), bytes = meta.len(), "already downloaded");
                return Ok(SavedFile {
                    path,
                    bytes: meta.len(),
                    reused: true,
                });
            }
        }

        let mut stream = self.client.fetch_stream(ctx, &info.url).await?;
        let tmp = self
            .dir
            .join(format!(".{file_name}.{:016x}.part", rand::random::<u64>()));
        debug!(tmp = %tmp.display(), "writing download");

        let written = match write_stream(ctx, &mut stream, &tmp).await {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&tmp).await;
                return Err(e);
            }
        };
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(GatewayError::DownloadFailed(e));
        }

        info!(path = %path.display(), bytes = written, "download saved");
        Ok(SavedFile {
            path,
            bytes: written,
            reused: false,
        })
    }
}

async fn write_stream(ctx: &RequestContext, stream: &mut AudioStream, dest: &Path) -> Result<u64> {
    let mut file = fs::File::create(dest)
        .await
        .map_err(GatewayError::DownloadFailed)?;
    let mut written = 0u64;
    while let Some(chunk) = stream.next_chunk(ctx).await? {
        file.write_all(&chunk)
            .await
            .map_err(GatewayError::DownloadFailed)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(GatewayError::DownloadFailed)?;
    file.sync_all().await.map_err(GatewayError::DownloadFailed)?;
    Ok(written)
}

/// `"<artists> - <name>"` made safe for every common filesystem.
///
/// Never empty, never longer than [`MAX_FILENAME_CHARS`] characters, and
/// free of `<>:"/\|?*`.
pub fn build_filename(info: &MusicInfo) -> String {
    let raw = format!("{} - {}", info.artists, info.name);
    let replaced: String = raw
        .chars()
        .map(|c| if ILLEGAL_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let name: String = replaced.trim().chars().take(MAX_FILENAME_CHARS).collect();
    if name.is_empty() {
        "unknown".to_owned()
    } else {
        name
    }
}

/// Container type guessed from the URL path. Defaults to `mp3`.
pub fn detect_extension(url: &str) -> &'static str {
    let Ok(parsed) = Url::parse(url) else {
        return "mp3";
    };
    let path = parsed.path().to_ascii_lowercase();
    if path.ends_with(".flac") {
        "flac"
    } else if path.ends_with(".m4a") || path.ends_with(".mp4") {
        "m4a"
    } else {
        "mp3"
    }
}
