//! Normalized records produced from provider responses.
//!
//! These are what the gateway hands back to callers. Field names serialize
//! in the provider's camelCase so JSON clients see familiar keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// A song, flattened for display.
///
/// API JSON fields: `id`, `name`, `ar` (artist array), `al` (album object
/// with `name` and `picUrl`), `dt` (milliseconds).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Netease song ID.
    pub id: u64,
    /// Song title.
    pub name: String,
    /// Non-empty artist names joined with `/`.
    pub artists: String,
    /// Album title.
    pub album: String,
    /// Album art URL.
    pub pic_url: String,
    /// Duration in milliseconds.
    #[serde(rename = "duration")]
    pub duration_ms: u64,
}

/// Result of stream URL resolution for one song.
///
/// `url` is `None` when the track requires VIP/purchase or is region-locked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongUrl {
    pub id: u64,
    pub url: Option<String>,
    /// Quality level the provider actually granted (may be lower than requested).
    pub level: String,
    /// Size in bytes.
    pub size: u64,
    /// Container type as reported (`flac`, `mp3`, `m4a`, ...). May be empty.
    #[serde(rename = "type")]
    pub file_type: String,
    /// Bitrate in bits per second.
    pub br: u64,
}

/// Lyric blocks in LRC format. Missing blocks are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lyrics {
    /// Original lyrics.
    pub lrc: String,
    /// Translated lyrics.
    pub tlyric: String,
    /// Romanized lyrics.
    pub romalrc: String,
    /// Karaoke (word-timed) lyrics.
    pub klyric: String,
}

/// A playlist with its fully resolved track list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistInfo {
    pub id: u64,
    pub name: String,
    pub cover_img_url: String,
    pub pic_url: String,
    /// Creator nickname.
    pub creator: String,
    /// Track count as reported by the provider.
    pub track_count: u64,
    pub description: String,
    pub tracks: Vec<Track>,
}

/// An album with its track list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumInfo {
    pub id: u64,
    pub name: String,
    pub cover_img_url: String,
    pub pic_url: String,
    /// Primary artist name.
    pub artist: String,
    /// Milliseconds since the Unix epoch.
    pub publish_time: i64,
    pub description: String,
    /// Number of tracks in `tracks`.
    pub track_count: u64,
    pub tracks: Vec<Track>,
}

/// Audio quality tier passed as the `level` of a stream URL request.
///
/// | Variant    | `level`    | Typical format     |
/// |------------|------------|--------------------|
/// | `Standard` | `standard` | 128 kbps MP3       |
/// | `Exhigh`   | `exhigh`   | 320 kbps MP3       |
/// | `Lossless` | `lossless` | FLAC               |
/// | `Hires`    | `hires`    | 24-bit FLAC        |
/// | `Sky`      | `sky`      | immersive surround |
/// | `Jyeffect` | `jyeffect` | HD surround        |
/// | `Jymaster` | `jymaster` | studio master      |
/// | `Dolby`    | `dolby`    | Dolby Atmos        |
///
/// The provider downgrades silently when the account tier does not allow
/// the requested level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Standard,
    Exhigh,
    #[default]
    Lossless,
    Hires,
    Sky,
    Jyeffect,
    Jymaster,
    Dolby,
}

impl Quality {
    pub const ALL: [Self; 8] = [
        Self::Standard,
        Self::Exhigh,
        Self::Lossless,
        Self::Hires,
        Self::Sky,
        Self::Jyeffect,
        Self::Jymaster,
        Self::Dolby,
    ];

    /// The `level` string sent to the provider.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Exhigh => "exhigh",
            Self::Lossless => "lossless",
            Self::Hires => "hires",
            Self::Sky => "sky",
            Self::Jyeffect => "jyeffect",
            Self::Jymaster => "jymaster",
            Self::Dolby => "dolby",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|q| q.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| GatewayError::InvalidInput(format!("unknown quality level: {s:?}")))
    }
}
