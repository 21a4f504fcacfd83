//! In-process mock of the provider's interface and web hosts.
//!
//! Song IDs with special behavior:
//! - `404`: stream URL is `null`
//! - `4040`: url endpoint answers with an empty `data` list
//! - `777`: stream URL has no `type`, path ends in `.m4a`
//! - `808`: any requested level is granted as `exhigh`
//! - `500`: lyrics endpoint answers with an error envelope
//! - `301`: song detail answers with envelope code 301
//! - `503`: song detail answers with HTTP 503

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aes::Aes128;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, head, post};
use axum::{Form, Json, Router};
use ecb::cipher::{BlockDecryptMut, KeyInit, block_padding::Pkcs7};
use serde_json::{Value, json};
use wyapi::eapi::EAPI_KEY;
use wyapi::{Endpoints, NeteaseClient};

pub const AUDIO_BYTES: &[u8] = b"fLaC\x00\x00\x00\x22 pretend this is a whole song";
pub const PLAYLIST_TRACKS: u64 = 250;

#[derive(Clone, Default)]
pub struct MockState {
    pub base: String,
    pub eapi_payloads: Arc<Mutex<Vec<Value>>>,
    pub cookies: Arc<Mutex<Vec<String>>>,
    pub detail_batches: Arc<Mutex<Vec<usize>>>,
    pub search_limits: Arc<Mutex<Vec<String>>>,
    pub audio_hits: Arc<AtomicUsize>,
}

impl MockState {
    pub fn audio_hits(&self) -> usize {
        self.audio_hits.load(Ordering::SeqCst)
    }
}

pub struct MockProvider {
    pub base: String,
    pub state: MockState,
}

impl MockProvider {
    pub async fn spawn() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock provider");
        let base = format!("http://{}", listener.local_addr().expect("local addr"));
        let state = MockState {
            base: base.clone(),
            ..Default::default()
        };

        let app = Router::new()
            .route("/eapi/song/enhance/player/url/v1", post(song_url))
            .route("/api/v3/song/detail", post(song_detail))
            .route("/api/song/lyric", post(lyric))
            .route("/api/cloudsearch/pc", post(search))
            .route("/api/v6/playlist/detail", post(playlist))
            .route("/api/v1/album/{id}", get(album))
            .route("/audio/{file}", get(audio))
            .route("/s/{code}", get(short_link))
            .route(
                "/h/{code}",
                head(|| async { StatusCode::METHOD_NOT_ALLOWED }).get(short_link),
            )
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock provider");
        });

        Self { base, state }
    }

    pub fn client(&self) -> NeteaseClient {
        NeteaseClient::with_endpoints(Duration::from_secs(5), Endpoints::single(&self.base))
            .expect("client")
    }
}

fn record_cookie(state: &MockState, headers: &HeaderMap) {
    let cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_owned();
    state.cookies.lock().unwrap().push(cookie);
}

/// Undo the EAPI envelope and return the JSON body in the middle.
fn open_params(params: &str) -> Value {
    let mut buf = hex::decode(params).expect("hex params");
    let plain = ecb::Decryptor::<Aes128>::new_from_slice(EAPI_KEY)
        .expect("key")
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .expect("padding")
        .to_vec();
    let text = String::from_utf8(plain).expect("utf8");
    let body = text.split("-36cd479b6b5-").nth(1).expect("body segment");
    serde_json::from_str(body).expect("json body")
}

async fn song_url(
    State(state): State<MockState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    record_cookie(&state, &headers);
    let payload = open_params(&form["params"]);
    state.eapi_payloads.lock().unwrap().push(payload.clone());

    let id = payload["ids"][0].as_u64().unwrap_or(0);
    if id == 4040 {
        return Json(json!({ "code": 200, "data": [] }));
    }
    let level = if id == 808 {
        json!("exhigh")
    } else {
        payload["level"].clone()
    };
    let entry = match id {
        404 => json!({ "id": id, "url": null, "level": level, "size": 0, "type": null, "br": 0 }),
        777 => json!({
            "id": id, "url": format!("{}/audio/{id}.m4a", state.base),
            "level": level, "size": AUDIO_BYTES.len(), "type": "", "br": 256_000
        }),
        _ => json!({
            "id": id, "url": format!("{}/audio/{id}.flac", state.base),
            "level": level, "size": AUDIO_BYTES.len(), "type": "FLAC", "br": 999_000
        }),
    };
    Json(json!({ "code": 200, "data": [entry] }))
}

fn song(id: u64) -> Value {
    json!({
        "id": id,
        "name": format!("Song {id}"),
        "ar": [{ "id": 1, "name": "Artist" }, { "id": 2, "name": "Guest" }],
        "al": { "id": 9, "name": "Album", "picUrl": "http://img/9.jpg" },
        "dt": 180_000
    })
}

async fn song_detail(
    State(state): State<MockState>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let c: Vec<Value> = serde_json::from_str(&form["c"]).expect("c is a json array");
    state.detail_batches.lock().unwrap().push(c.len());
    let ids: Vec<u64> = c.iter().filter_map(|e| e["id"].as_u64()).collect();

    if ids.contains(&503) {
        return (StatusCode::SERVICE_UNAVAILABLE, "down").into_response();
    }
    if ids.contains(&301) {
        return Json(json!({ "code": 301, "msg": "need login" })).into_response();
    }
    let songs: Vec<Value> = ids.into_iter().map(song).collect();
    Json(json!({ "code": 200, "songs": songs })).into_response()
}

async fn lyric(Form(form): Form<HashMap<String, String>>) -> Json<Value> {
    if form.get("id").map(String::as_str) == Some("500") {
        return Json(json!({ "code": -460, "message": "Cheating" }));
    }
    assert_eq!(form.get("cp").map(String::as_str), Some("false"));
    Json(json!({
        "code": 200,
        "lrc": { "lyric": "[00:00.00]hello" },
        "romalrc": { "lyric": "" }
    }))
}

async fn search(
    State(state): State<MockState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    record_cookie(&state, &headers);
    let limit = form.get("limit").cloned().unwrap_or_default();
    state.search_limits.lock().unwrap().push(limit.clone());
    let n: u64 = limit.parse().unwrap_or(0).min(3);
    let songs: Vec<Value> = (1..=n).map(song).collect();
    Json(json!({ "code": 200, "result": { "songCount": n, "songs": songs } }))
}

async fn playlist(Form(form): Form<HashMap<String, String>>) -> Json<Value> {
    let id: u64 = form["id"].parse().expect("numeric id");
    let track_ids: Vec<Value> = (1..=PLAYLIST_TRACKS).map(|i| json!({ "id": i })).collect();
    Json(json!({
        "code": 200,
        "playlist": {
            "id": id,
            "name": "Mix",
            "coverImgUrl": "http://img/cover.jpg",
            "creator": { "userId": 1, "nickname": "dj" },
            "trackCount": PLAYLIST_TRACKS,
            "description": "all the songs",
            "trackIds": track_ids
        }
    }))
}

async fn album(Path(id): Path<u64>) -> Json<Value> {
    Json(json!({
        "code": 200,
        "album": {
            "id": id, "name": "Record", "pic": 109_951_163_071_459_616_u64,
            "artist": { "name": "Band" }, "publishTime": 1_262_275_200_000_i64,
            "description": "liner notes"
        },
        "songs": [song(11), song(12), song(13)]
    }))
}

async fn audio(State(state): State<MockState>, Path(file): Path<String>) -> Response {
    state.audio_hits.fetch_add(1, Ordering::SeqCst);
    let content_type = if file.ends_with(".flac") {
        "audio/flac"
    } else {
        ""
    };
    if content_type.is_empty() {
        // no Content-Type header at all
        return Response::new(Body::from(AUDIO_BYTES));
    }
    ([(header::CONTENT_TYPE, content_type)], AUDIO_BYTES).into_response()
}

async fn short_link(Path(code): Path<String>) -> Redirect {
    Redirect::temporary(&format!("/song?id={}", code.len() * 111))
}
