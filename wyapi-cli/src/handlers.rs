//! Route handlers.
//!
//! Every handler accepts GET and POST, reads its inputs through [`Params`]
//! and answers with the envelope from [`crate::response`], except the file
//! download which streams audio.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use futures::stream::{self, Stream, StreamExt};
use serde_json::{Value, json};
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use wyapi::{GatewayError, MusicInfo, Quality, RequestContext, resolve_id};

use crate::format::{format_duration, format_file_size};
use crate::params::Params;
use crate::response::{ApiError, ApiResult, success};
use crate::server::AppState;

const SONG_ID_KEYS: &[&str] = &["ids", "id", "url"];
const ENTITY_ID_KEYS: &[&str] = &["id", "url"];
const KEYWORD_KEYS: &[&str] = &["keyword", "keywords", "q"];
const QUALITY_KEYS: &[&str] = &["level", "quality"];

/// Shown instead of a size when no stream URL could be obtained.
const SIZE_UNAVAILABLE: &str = "unavailable";

// ── helpers ──

async fn entity_id(
    state: &AppState,
    ctx: &RequestContext,
    params: &Params,
    keys: &[&str],
) -> ApiResult<u64> {
    let input = params
        .first(keys)
        .ok_or_else(|| ApiError::bad_request(format!("missing parameter: {}", keys.join("|"))))?;
    Ok(resolve_id(ctx, input, state.client()).await?)
}

fn parse_quality(params: &Params, keys: &[&str]) -> ApiResult<Quality> {
    Ok(params.first_or(keys, Quality::default().as_str()).parse()?)
}

/// Keep an optional lookup's value, dropping upstream failures. Cancellation
/// and deadline expiry still end the request.
fn best_effort<T>(what: &str, res: wyapi::Result<T>) -> wyapi::Result<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(e @ (GatewayError::Cancelled | GatewayError::TimedOut)) => Err(e),
        Err(e) => {
            warn!(error = %e, "{what} unavailable");
            Ok(None)
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

// ── service ──

pub async fn health(State(state): State<AppState>) -> Response {
    let cookie_valid = state
        .downloader
        .cookie_store()
        .load()
        .await
        .is_ok_and(|c| !c.is_empty());
    success(
        "service is running",
        json!({
            "service": "running",
            "timestamp": unix_now(),
            "cookie_status": if cookie_valid { "valid" } else { "invalid" },
            "version": env!("CARGO_PKG_VERSION"),
        }),
    )
}

pub async fn api_info() -> Response {
    let qualities: Vec<&str> = Quality::ALL.iter().map(|q| q.as_str()).collect();
    success(
        "ok",
        json!({
            "name": "wyapi",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Netease Cloud Music gateway",
            "endpoints": {
                "/health": "GET - health check",
                "/song": "GET/POST - song url, detail, lyric or combined json",
                "/search": "GET/POST - search songs",
                "/playlist": "GET/POST - playlist detail",
                "/album": "GET/POST - album detail",
                "/download": "GET/POST - download a song",
                "/api/info": "GET - this document",
                "/api/music/url": "GET/POST - stream url",
                "/api/music/detail": "GET/POST - song detail",
                "/api/music/lyric": "GET/POST - song lyrics",
                "/api/music/playlist": "GET/POST - playlist detail",
                "/api/music/album": "GET/POST - album detail",
                "/netease/search": "GET/POST - raw search result",
            },
            "supported_qualities": qualities,
        }),
    )
}

// ── songs ──

#[derive(Clone, Copy)]
enum SongView {
    Url,
    Name,
    Lyric,
    Json,
}

impl SongView {
    fn parse(s: &str) -> ApiResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "url" => Ok(Self::Url),
            "name" => Ok(Self::Name),
            "lyric" => Ok(Self::Lyric),
            "json" => Ok(Self::Json),
            other => Err(ApiError::bad_request(format!(
                "invalid type {other:?}, expected url, name, lyric or json"
            ))),
        }
    }
}

/// `/song`: one of four views selected by `type`.
pub async fn song(State(state): State<AppState>, params: Params) -> ApiResult {
    let view = SongView::parse(params.first_or(&["type"], "url"))?;
    let quality = parse_quality(&params, QUALITY_KEYS)?;
    let ctx = state.context();
    let id = entity_id(&state, &ctx, &params, SONG_ID_KEYS).await?;
    let cookies = state.downloader.cookies().await;
    let client = state.client();

    match view {
        SongView::Url => {
            let url = client.song_url(&ctx, id, quality, &cookies).await?;
            Ok(success("ok", [url]))
        }
        SongView::Name => {
            let track = client.song_detail(&ctx, id, &cookies).await?;
            Ok(success("ok", track))
        }
        SongView::Lyric => {
            let lyrics = client.lyrics(&ctx, id, &cookies).await?;
            Ok(success("ok", lyrics))
        }
        SongView::Json => {
            let track = client.song_detail(&ctx, id, &cookies).await?;
            let url =
                best_effort("song url", client.song_url(&ctx, id, quality, &cookies).await)?;
            let lyrics = best_effort("lyrics", client.lyrics(&ctx, id, &cookies).await)?
                .unwrap_or_default();

            let (level, stream_url, size) = match url {
                Some(u) => match u.url {
                    Some(stream_url) => (u.level, stream_url, format_file_size(u.size)),
                    None => (u.level, String::new(), SIZE_UNAVAILABLE.into()),
                },
                None => (quality.to_string(), String::new(), SIZE_UNAVAILABLE.into()),
            };
            Ok(success(
                "ok",
                json!({
                    "id": id,
                    "name": track.name,
                    "ar_name": track.artists.replace('/', ", "),
                    "al_name": track.album,
                    "pic": track.pic_url,
                    "level": level,
                    "lyric": lyrics.lrc,
                    "tlyric": lyrics.tlyric,
                    "url": stream_url,
                    "size": size,
                }),
            ))
        }
    }
}

/// `/api/music/url`
pub async fn song_url(State(state): State<AppState>, params: Params) -> ApiResult {
    let quality = parse_quality(&params, QUALITY_KEYS)?;
    let ctx = state.context();
    let id = entity_id(&state, &ctx, &params, SONG_ID_KEYS).await?;
    let cookies = state.downloader.cookies().await;
    let url = state.client().song_url(&ctx, id, quality, &cookies).await?;
    Ok(success("ok", [url]))
}

/// `/api/music/detail` and `/api/getMusicInfo`
pub async fn song_detail(State(state): State<AppState>, params: Params) -> ApiResult {
    let ctx = state.context();
    let id = entity_id(&state, &ctx, &params, SONG_ID_KEYS).await?;
    let cookies = state.downloader.cookies().await;
    let track = state
        .client()
        .song_detail_batch(&ctx, &[id], &cookies)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found(format!("song {id} not found")))?;

    Ok(success(
        "ok",
        json!({
            "id": track.id,
            "name": track.name,
            "singer": track.artists,
            "album": track.album,
            "picimg": track.pic_url,
            "duration": format_duration(track.duration_ms),
        }),
    ))
}

/// `/api/music/lyric`
pub async fn song_lyric(State(state): State<AppState>, params: Params) -> ApiResult {
    let ctx = state.context();
    let id = entity_id(&state, &ctx, &params, SONG_ID_KEYS).await?;
    let cookies = state.downloader.cookies().await;
    let lyrics = state.client().lyrics(&ctx, id, &cookies).await?;
    Ok(success("ok", lyrics))
}

// ── search ──

/// `/search`: normalized track records.
pub async fn search(State(state): State<AppState>, params: Params) -> ApiResult {
    let keyword = params
        .first(KEYWORD_KEYS)
        .ok_or_else(|| ApiError::bad_request("missing parameter: keyword"))?;
    let limit = params.int("limit", 30);
    let ctx = state.context();
    let cookies = state.downloader.cookies().await;
    let tracks = state.client().search(&ctx, keyword, limit, &cookies).await?;
    Ok(success("ok", tracks))
}

/// `/netease/search`: the provider's `result` object, passed through.
pub async fn netease_search(State(state): State<AppState>, params: Params) -> ApiResult {
    let keyword = params
        .first(&["keywords", "keyword", "q"])
        .ok_or_else(|| ApiError::bad_request("missing parameter: keywords"))?;
    let limit = params.int("limit", 20);
    let ctx = state.context();
    let cookies = state.downloader.cookies().await;
    let raw = state.client().search_raw(&ctx, keyword, limit, &cookies).await?;
    let body = json!({
        "code": 200,
        "status": 200,
        "success": true,
        "msg": "success",
        "message": "success",
        "result": raw.get("result").cloned().unwrap_or(Value::Null),
    });
    Ok(Json(body).into_response())
}

// ── collections ──

/// `/playlist` wraps the record in `{"playlist": ...}`, `/api/music/playlist`
/// returns it bare.
pub async fn playlist(state: State<AppState>, params: Params) -> ApiResult {
    let info = fetch_playlist(&state, &params).await?;
    Ok(success("ok", json!({ "playlist": info })))
}

pub async fn playlist_bare(state: State<AppState>, params: Params) -> ApiResult {
    let info = fetch_playlist(&state, &params).await?;
    Ok(success("ok", info))
}

async fn fetch_playlist(state: &AppState, params: &Params) -> ApiResult<wyapi::PlaylistInfo> {
    let ctx = state.context();
    let id = entity_id(state, &ctx, params, ENTITY_ID_KEYS).await?;
    let cookies = state.downloader.cookies().await;
    Ok(state.client().playlist(&ctx, id, &cookies).await?)
}

pub async fn album(state: State<AppState>, params: Params) -> ApiResult {
    let info = fetch_album(&state, &params).await?;
    Ok(success("ok", json!({ "album": info })))
}

pub async fn album_bare(state: State<AppState>, params: Params) -> ApiResult {
    let info = fetch_album(&state, &params).await?;
    Ok(success("ok", info))
}

async fn fetch_album(state: &AppState, params: &Params) -> ApiResult<wyapi::AlbumInfo> {
    let ctx = state.context();
    let id = entity_id(state, &ctx, params, ENTITY_ID_KEYS).await?;
    let cookies = state.downloader.cookies().await;
    Ok(state.client().album(&ctx, id, &cookies).await?)
}

// ── download ──

/// `/download`: `format=json` describes the file, `format=file` (default)
/// sends it.
pub async fn download(State(state): State<AppState>, params: Params) -> ApiResult {
    let as_json = match params.first_or(&["format"], "file").to_ascii_lowercase().as_str() {
        "file" => false,
        "json" => true,
        other => {
            return Err(ApiError::bad_request(format!(
                "invalid format {other:?}, expected file or json"
            )));
        }
    };
    let quality = parse_quality(&params, QUALITY_KEYS)?;
    let ctx = state.context();
    let id = entity_id(&state, &ctx, &params, &["id", "url", "ids"]).await?;
    let info = state.downloader.music_info(&ctx, id, quality).await?;

    if as_json {
        return Ok(success(
            "ok",
            json!({
                "music_id": info.id,
                "name": info.name,
                "artist": info.artists,
                "album": info.album,
                "quality": info.quality,
                "file_type": info.file_type,
                "file_size": format_file_size(info.file_size),
                "url": info.url,
            }),
        ));
    }
    send_file(&state, &info).await
}

async fn send_file(state: &AppState, info: &MusicInfo) -> ApiResult {
    let permit = state
        .permits
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| ApiError::internal("download limiter closed"))?;
    // No deadline here: large files outlast the request timeout.
    let ctx = RequestContext::new();
    let file_name = info.file_name();

    let (content_type, length, body) = if state.config.download.in_memory {
        let audio = state.downloader.open_stream(&ctx, info).await?;
        let length = audio.stream.content_length();
        let body = Body::from_stream(hold_permit(audio.stream.into_body(), permit));
        (audio.content_type, length, body)
    } else {
        let saved = state.downloader.persist(&ctx, info).await?;
        let file = tokio::fs::File::open(&saved.path)
            .await
            .map_err(GatewayError::DownloadFailed)?;
        let body = Body::from_stream(hold_permit(ReaderStream::new(file), permit));
        (format!("audio/{}", info.file_type), Some(saved.bytes), body)
    };
    info!(id = info.id, file = %file_name, "sending download");

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, content_disposition(&file_name))
        .header("X-Download-Message", "Download completed successfully")
        .header("X-Download-Filename", urlencoding::encode(&file_name).into_owned());
    if let Some(length) = length {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }
    builder
        .body(body)
        .map_err(|e| ApiError::internal(format!("cannot build response: {e}")))
}

/// Non-ASCII names are sent as raw UTF-8, which browsers accept.
fn content_disposition(file_name: &str) -> HeaderValue {
    HeaderValue::from_bytes(format!("attachment; filename=\"{file_name}\"").as_bytes())
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Yield `inner` while holding a download slot, released when the body
/// finishes or is dropped.
fn hold_permit<S>(inner: S, permit: OwnedSemaphorePermit) -> impl Stream<Item = S::Item> + Send + 'static
where
    S: Stream + Unpin + Send + 'static,
    S::Item: Send,
{
    stream::unfold((inner, permit), |(mut inner, permit)| async move {
        let item = inner.next().await?;
        Some((item, (inner, permit)))
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use tokio::sync::Semaphore;

    #[test]
    fn views_parse_case_insensitively() {
        assert!(matches!(SongView::parse("JSON"), Ok(SongView::Json)));
        assert!(matches!(SongView::parse("url"), Ok(SongView::Url)));
        let err = SongView::parse("mp3").err().unwrap();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn optional_lookups_still_stop_on_cancel_and_deadline() {
        assert!(matches!(
            best_effort::<u8>("x", Err(GatewayError::Cancelled)),
            Err(GatewayError::Cancelled)
        ));
        assert!(matches!(
            best_effort::<u8>("x", Err(GatewayError::TimedOut)),
            Err(GatewayError::TimedOut)
        ));
        assert_eq!(
            best_effort::<u8>("x", Err(GatewayError::Malformed("bad".into()))).unwrap(),
            None
        );
        assert_eq!(best_effort("x", Ok(7)).unwrap(), Some(7));
    }

    #[test]
    fn level_wins_over_quality_alias() {
        let params = Params(
            [("quality", "standard"), ("level", "hires")]
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect(),
        );
        assert_eq!(parse_quality(&params, QUALITY_KEYS).unwrap(), Quality::Hires);
        assert_eq!(
            parse_quality(&Params::default(), QUALITY_KEYS).unwrap(),
            Quality::default()
        );
    }

    #[test]
    fn disposition_keeps_utf8_names() {
        let v = content_disposition("周杰伦 - 晴天.flac");
        assert_eq!(
            v.as_bytes(),
            "attachment; filename=\"周杰伦 - 晴天.flac\"".as_bytes()
        );
        assert_eq!(content_disposition("bad\nname").as_bytes(), b"attachment");
    }

    #[tokio::test]
    async fn permit_is_released_with_the_body() {
        let sem = Arc::new(Semaphore::new(1));
        let permit = sem.clone().acquire_owned().await.unwrap();
        let mut body = Box::pin(hold_permit(stream::iter([1, 2]), permit));
        assert_eq!(sem.available_permits(), 0);

        assert_eq!(body.next().await, Some(1));
        assert_eq!(sem.available_permits(), 0);
        drop(body);
        assert_eq!(sem.available_permits(), 1);
    }
}
