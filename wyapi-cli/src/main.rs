mod config;
mod format;
mod handlers;
mod params;
mod response;
mod server;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use wyapi::{CookieSet, Downloader, NeteaseClient, Quality, RequestContext, resolve_id};

use crate::config::Config;
use crate::format::{format_duration, format_file_size};

#[derive(Parser)]
#[command(name = "wyapi", version, about = "Netease Cloud Music gateway & CLI")]
struct Cli {
    /// Configuration file, created with defaults when missing
    #[arg(short, long, global = true, value_name = "PATH", default_value = "config.json")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway
    Serve,
    /// Search for songs
    Search {
        /// Search keywords
        keywords: String,
        /// Max results
        #[arg(short, long, default_value = "10")]
        limit: i64,
    },
    /// Show song details
    Info {
        /// Song ID, share link or share text
        input: String,
    },
    /// Print song lyrics
    Lyric {
        /// Song ID, share link or share text
        input: String,
    },
    /// Download a song
    Download {
        /// Song ID, share link or share text
        input: String,
        /// Audio quality
        #[arg(short, long, default_value = "lossless")]
        quality: QualityArg,
        /// Output directory (defaults to `download.dir`)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
    /// Show playlist details
    Playlist {
        /// Playlist ID or link
        input: String,
    },
    /// Show album details
    Album {
        /// Album ID or link
        input: String,
    },
    /// Manage the login cookie file
    Cookie {
        #[command(subcommand)]
        action: CookieAction,
    },
}

#[derive(Subcommand)]
enum CookieAction {
    /// Replace the cookie file content, e.g. `MUSIC_U=...; os=pc`
    Set { text: String },
    /// Show which cookies are stored
    Show,
}

#[derive(Clone, ValueEnum)]
enum QualityArg {
    Standard,
    Exhigh,
    Lossless,
    Hires,
    Sky,
    Jyeffect,
    Jymaster,
    Dolby,
}

impl From<QualityArg> for Quality {
    fn from(q: QualityArg) -> Self {
        match q {
            QualityArg::Standard => Self::Standard,
            QualityArg::Exhigh => Self::Exhigh,
            QualityArg::Lossless => Self::Lossless,
            QualityArg::Hires => Self::Hires,
            QualityArg::Sky => Self::Sky,
            QualityArg::Jyeffect => Self::Jyeffect,
            QualityArg::Jymaster => Self::Jymaster,
            QualityArg::Dolby => Self::Dolby,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, created) = Config::load_or_create(&cli.config)?;
    init_tracing(&config.log.level);
    if created {
        info!(path = %cli.config.display(), "wrote default configuration");
    }

    match cli.command {
        Command::Serve => server::serve(config).await,
        Command::Search { keywords, limit } => cmd_search(&config, &keywords, limit).await,
        Command::Info { input } => cmd_info(&config, &input).await,
        Command::Lyric { input } => cmd_lyric(&config, &input).await,
        Command::Download {
            input,
            quality,
            output,
        } => cmd_download(&config, &input, quality.into(), output).await,
        Command::Playlist { input } => cmd_playlist(&config, &input).await,
        Command::Album { input } => cmd_album(&config, &input).await,
        Command::Cookie { action } => cmd_cookie(&config, action).await,
    }
}

/// `RUST_LOG` wins; otherwise `log.level` applies to this workspace's crates.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("wyapi={level},wyapi_cli={level},tower_http=info"))
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// ── shared ──

struct Session {
    downloader: Downloader,
    cookies: CookieSet,
    ctx: RequestContext,
}

impl Session {
    async fn open(config: &Config) -> Result<Self> {
        let client = NeteaseClient::new(config.server.request_timeout())?;
        let downloader = server::build_downloader(config, client);
        let cookies = downloader.cookies().await;
        Ok(Self {
            downloader,
            cookies,
            ctx: RequestContext::with_timeout(config.server.request_timeout()),
        })
    }

    fn client(&self) -> &NeteaseClient {
        self.downloader.client()
    }

    async fn resolve(&self, input: &str) -> Result<u64> {
        resolve_id(&self.ctx, input, self.client())
            .await
            .with_context(|| format!("cannot find an ID in {input:?}"))
    }
}

// ── search ──

async fn cmd_search(config: &Config, keywords: &str, limit: i64) -> Result<()> {
    let s = Session::open(config).await?;
    let tracks = s.client().search(&s.ctx, keywords, limit, &s.cookies).await?;
    if tracks.is_empty() {
        println!("No results.");
    }
    for t in &tracks {
        println!("  [{}] {} - {} ({})", t.id, t.artists, t.name, t.album);
    }
    Ok(())
}

// ── info / lyric / download ──

async fn cmd_info(config: &Config, input: &str) -> Result<()> {
    let s = Session::open(config).await?;
    let id = s.resolve(input).await?;
    let t = s.client().song_detail(&s.ctx, id, &s.cookies).await?;
    println!("Track:    {} (id={})", t.name, t.id);
    println!("Artists:  {}", t.artists);
    println!("Album:    {}", t.album);
    println!("Duration: {}", format_duration(t.duration_ms));
    if !t.pic_url.is_empty() {
        println!("Cover:    {}", t.pic_url);
    }
    Ok(())
}

async fn cmd_lyric(config: &Config, input: &str) -> Result<()> {
    let s = Session::open(config).await?;
    let id = s.resolve(input).await?;
    let lyrics = s.client().lyrics(&s.ctx, id, &s.cookies).await?;
    if !lyrics.lrc.is_empty() {
        println!("{}", lyrics.lrc);
    }
    if !lyrics.tlyric.is_empty() {
        println!("\n--- Translation ---\n{}", lyrics.tlyric);
    }
    if lyrics.lrc.is_empty() && lyrics.tlyric.is_empty() {
        println!("No lyrics available.");
    }
    Ok(())
}

async fn cmd_download(
    config: &Config,
    input: &str,
    quality: Quality,
    output: Option<PathBuf>,
) -> Result<()> {
    let s = Session::open(config).await?;
    let id = s.resolve(input).await?;
    let info = s.downloader.music_info(&s.ctx, id, quality).await?;

    let downloader = match output {
        Some(dir) => Downloader::new(
            s.client().clone(),
            s.downloader.cookie_store().clone(),
            dir,
        ),
        None => s.downloader.clone(),
    };

    // No deadline for the transfer itself; ctrl-c cancels and cleans up.
    let transfer = RequestContext::new();
    let token = transfer.token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let saved = downloader.persist(&transfer, &info).await?;
    let verb = if saved.reused { "Already present" } else { "Downloaded" };
    println!(
        "{verb}: {} ({}, {})",
        saved.path.display(),
        format_file_size(saved.bytes),
        info.quality
    );
    Ok(())
}

// ── playlist / album ──

async fn cmd_playlist(config: &Config, input: &str) -> Result<()> {
    let s = Session::open(config).await?;
    let id = s.resolve(input).await?;
    let p = s.client().playlist(&s.ctx, id, &s.cookies).await?;
    println!("Playlist: {} (id={})", p.name, p.id);
    println!("Tracks:   {}", p.track_count);
    if !p.creator.is_empty() {
        println!("Creator:  {}", p.creator);
    }
    if !p.description.is_empty() {
        println!("Desc:     {}", p.description);
    }
    println!();
    for t in &p.tracks {
        println!("  [{}] {} - {}", t.id, t.artists, t.name);
    }
    Ok(())
}

async fn cmd_album(config: &Config, input: &str) -> Result<()> {
    let s = Session::open(config).await?;
    let id = s.resolve(input).await?;
    let a = s.client().album(&s.ctx, id, &s.cookies).await?;
    println!("Album:  {} (id={})", a.name, a.id);
    println!("Artist: {}", a.artist);
    println!("Tracks: {}", a.track_count);
    println!();
    for (n, t) in a.tracks.iter().enumerate() {
        println!("  {:>2}. [{}] {} ({})", n + 1, t.id, t.name, format_duration(t.duration_ms));
    }
    Ok(())
}

// ── cookie ──

async fn cmd_cookie(config: &Config, action: CookieAction) -> Result<()> {
    let store = wyapi::CookieStore::new(config.cookie.file.clone());
    match action {
        CookieAction::Set { text } => {
            store.write(&text).await?;
            let parsed = store.load().await?;
            println!("Saved {} cookie(s) to {}", parsed.len(), store.path().display());
        }
        CookieAction::Show => {
            let cookies = store.load().await?;
            if cookies.is_empty() {
                println!("No cookies in {}", store.path().display());
            }
            for (key, value) in cookies.iter() {
                println!("  {key} = {}", mask(value));
            }
        }
    }
    Ok(())
}

/// Keep the first four characters of a secret.
fn mask(value: &str) -> String {
    let shown: String = value.chars().take(4).collect();
    if shown.len() == value.len() {
        shown
    } else {
        format!("{shown}…")
    }
}
