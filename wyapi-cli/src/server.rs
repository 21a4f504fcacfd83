//! HTTP gateway: shared state, router, middleware and the `serve` loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Query, Request, State};
use axum::handler::Handler;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, get};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer, ExposeHeaders};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use wyapi::{CookieStore, Downloader, NeteaseClient, RequestContext};

use crate::config::{Config, CorsConfig};
use crate::handlers;
use crate::response::ApiError;

const CORS_MAX_AGE: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub downloader: Downloader,
    /// One permit per in-flight file download.
    pub permits: Arc<Semaphore>,
}

impl AppState {
    pub fn new(config: Config) -> wyapi::Result<Self> {
        let client = NeteaseClient::new(config.server.request_timeout())?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: Config, client: NeteaseClient) -> Self {
        let downloader = build_downloader(&config, client);
        let permits = Arc::new(Semaphore::new(config.download.max_concurrent.max(1)));
        Self {
            config: Arc::new(config),
            downloader,
            permits,
        }
    }

    pub fn client(&self) -> &NeteaseClient {
        self.downloader.client()
    }

    /// Fresh context bounded by `server.request_timeout_seconds`.
    pub fn context(&self) -> RequestContext {
        RequestContext::with_timeout(self.config.server.request_timeout())
    }
}

pub fn build_downloader(config: &Config, client: NeteaseClient) -> Downloader {
    Downloader::new(
        client,
        CookieStore::new(config.cookie.file.clone()),
        config.download.dir.clone(),
    )
}

// ── routes ──

fn get_or_post<H, T>(handler: H) -> MethodRouter<AppState>
where
    H: Handler<T, AppState>,
    T: 'static,
{
    get(handler.clone()).post(handler)
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/info", get_or_post(handlers::api_info))
        .route("/song", get_or_post(handlers::song))
        .route("/Song_V1", get_or_post(handlers::song))
        .route("/search", get_or_post(handlers::search))
        .route("/Search", get_or_post(handlers::search))
        .route("/playlist", get_or_post(handlers::playlist))
        .route("/Playlist", get_or_post(handlers::playlist))
        .route("/album", get_or_post(handlers::album))
        .route("/Album", get_or_post(handlers::album))
        .route("/download", get_or_post(handlers::download))
        .route("/Download", get_or_post(handlers::download))
        .route("/api/music/url", get_or_post(handlers::song_url))
        .route("/api/music/detail", get_or_post(handlers::song_detail))
        .route("/api/getMusicInfo", get_or_post(handlers::song_detail))
        .route("/api/music/lyric", get_or_post(handlers::song_lyric))
        .route("/api/music/playlist", get_or_post(handlers::playlist_bare))
        .route("/api/music/album", get_or_post(handlers::album_bare))
        .route("/netease/search", get_or_post(handlers::netease_search))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    let app = Router::new()
        .route("/health", get_or_post(handlers::health))
        .merge(api);

    let app = match &state.config.static_dir {
        Some(dir) => app.fallback_service(
            ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html"))),
        ),
        None => app.fallback(|| async { ApiError::not_found("route not found") }),
    };

    app.layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors))
        .with_state(state)
}

// ── middleware ──

async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let security = &state.config.security;
    if !security.require_token {
        return next.run(request).await;
    }
    let rejection = match request_token(&request) {
        Some(token) if token == security.api_token => None,
        Some(_) => Some("invalid API token"),
        None => Some("missing API token"),
    };
    match rejection {
        None => next.run(request).await,
        Some(message) => ApiError::unauthorized(message).into_response(),
    }
}

/// Token from, in order: `Authorization: Bearer`, `X-API-Token`,
/// `X-API-Key`, `?token=`, `?api_token=`.
fn request_token(request: &Request) -> Option<String> {
    let headers = request.headers();
    if let Some(auth) = header_str(headers, header::AUTHORIZATION.as_str()) {
        let bearer = auth
            .get(..7)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("bearer "));
        if bearer {
            let token = auth[7..].trim();
            if !token.is_empty() {
                return Some(token.to_owned());
            }
        }
    }
    if let Some(token) = header_str(headers, "x-api-token").or_else(|| header_str(headers, "x-api-key")) {
        return Some(token.to_owned());
    }

    let Query(query): Query<HashMap<String, String>> = Query::try_from_uri(request.uri()).ok()?;
    ["token", "api_token"]
        .iter()
        .filter_map(|k| query.get(*k))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
        .map(str::to_owned)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// `*` in any list means "anything". With credentials enabled the request's
/// own origin, method and headers are echoed back instead.
fn cors_layer(cfg: &CorsConfig) -> CorsLayer {
    let wildcard = |items: &[String]| items.iter().any(|s| s.trim() == "*");
    let credentials = cfg.allow_credentials;

    let origins = match (wildcard(&cfg.allowed_origins), credentials) {
        (true, true) => AllowOrigin::mirror_request(),
        (true, false) => AllowOrigin::any(),
        (false, _) => AllowOrigin::list(
            cfg.allowed_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o.trim()).ok()),
        ),
    };
    let methods = match (wildcard(&cfg.allowed_methods), credentials) {
        (true, true) => AllowMethods::mirror_request(),
        (true, false) => AllowMethods::any(),
        (false, _) => AllowMethods::list(
            cfg.allowed_methods
                .iter()
                .filter_map(|m| Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes()).ok()),
        ),
    };
    let headers = match (wildcard(&cfg.allowed_headers), credentials) {
        (true, true) => AllowHeaders::mirror_request(),
        (true, false) => AllowHeaders::any(),
        (false, _) => AllowHeaders::list(header_names(&cfg.allowed_headers)),
    };
    let exposed = match (wildcard(&cfg.exposed_headers), credentials) {
        (true, true) => ExposeHeaders::list(std::iter::empty::<HeaderName>()),
        (true, false) => ExposeHeaders::any(),
        (false, _) => ExposeHeaders::list(header_names(&cfg.exposed_headers)),
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
        .expose_headers(exposed)
        .allow_credentials(credentials)
        .max_age(CORS_MAX_AGE)
}

fn header_names(names: &[String]) -> Vec<HeaderName> {
    names
        .iter()
        .filter_map(|n| HeaderName::from_bytes(n.trim().as_bytes()).ok())
        .collect()
}

// ── serve ──

pub async fn serve(config: Config) -> Result<()> {
    let addr = config.server.bind_addr();
    let state = AppState::new(config).context("failed to build HTTP client")?;
    state
        .downloader
        .cookie_store()
        .ensure_file()
        .await
        .context("failed to create cookie file")?;
    if !state.config.security.require_token {
        warn!("security.require_token is off, every route is public");
    }

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, in_memory = state.config.download.in_memory, "gateway listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for ctrl-c, running until killed");
        std::future::pending::<()>().await;
    }
}
