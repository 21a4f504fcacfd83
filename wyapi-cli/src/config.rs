//! Gateway configuration, persisted as JSON.
//!
//! A missing file is created with defaults on first start, and an empty API
//! token is replaced by a freshly generated one and written back, so the
//! operator always finds a usable token in the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Bytes of randomness in a generated API token (hex doubles the length).
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub cookie: CookieConfig,
    pub download: DownloadConfig,
    pub cors: CorsConfig,
    pub log: LogConfig,
    /// Directory holding a single-page web front end, served for unmatched GETs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            request_timeout_seconds: 30,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub api_token: String,
    pub require_token: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    pub file: PathBuf,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("cookie.txt"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub dir: PathBuf,
    /// Stream straight from the CDN instead of saving to `dir` first.
    pub in_memory: bool,
    /// Simultaneous file downloads served by the gateway.
    pub max_concurrent: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("downloads"),
            in_memory: true,
            max_concurrent: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| (*s).to_owned()).collect();
        Self {
            allowed_origins: owned(&["*"]),
            allowed_methods: owned(&["GET", "POST", "OPTIONS"]),
            allowed_headers: owned(&["Content-Type", "Authorization", "X-API-Token", "X-API-Key"]),
            exposed_headers: owned(&["X-Download-Message", "X-Download-Filename"]),
            allow_credentials: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Config {
    /// Load `path`, or create it with defaults. The flag is `true` when the
    /// file was created.
    pub fn load_or_create(path: &Path) -> Result<(Self, bool)> {
        let (mut config, created) = match fs::read_to_string(path) {
            Ok(text) => {
                let config: Self = serde_json::from_str(&text)
                    .with_context(|| format!("invalid config file {}", path.display()))?;
                (config, false)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (Self::default(), true),
            Err(e) => {
                return Err(e).with_context(|| format!("cannot read {}", path.display()));
            }
        };

        config.apply_defaults();
        let mut dirty = created;
        if config.security.api_token.trim().is_empty() {
            config.security.api_token = generate_token();
            dirty = true;
        }
        if dirty {
            config.save(path)?;
        }
        Ok((config, created))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data).with_context(|| format!("cannot write {}", path.display()))?;
        Ok(())
    }

    /// Replace zero and empty values with defaults.
    pub fn apply_defaults(&mut self) {
        let d = Self::default();
        if self.server.host.is_empty() {
            self.server.host = d.server.host;
        }
        if self.server.port == 0 {
            self.server.port = d.server.port;
        }
        if self.server.request_timeout_seconds == 0 {
            self.server.request_timeout_seconds = d.server.request_timeout_seconds;
        }
        if self.cookie.file.as_os_str().is_empty() {
            self.cookie.file = d.cookie.file;
        }
        if self.download.dir.as_os_str().is_empty() {
            self.download.dir = d.download.dir;
        }
        if self.download.max_concurrent == 0 {
            self.download.max_concurrent = d.download.max_concurrent;
        }
        if self.cors.allowed_origins.is_empty() {
            self.cors.allowed_origins = d.cors.allowed_origins;
        }
        if self.cors.allowed_methods.is_empty() {
            self.cors.allowed_methods = d.cors.allowed_methods;
        }
        if self.cors.allowed_headers.is_empty() {
            self.cors.allowed_headers = d.cors.allowed_headers;
        }
        if self.cors.exposed_headers.is_empty() {
            self.cors.exposed_headers = d.cors.exposed_headers;
        }
        if self.log.level.is_empty() {
            self.log.level = d.log.level;
        }
    }
}

/// Random hex token.
pub fn generate_token() -> String {
    let mut buf = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut buf[..]);
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_created_with_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let (config, created) = Config::load_or_create(&path).unwrap();
        assert!(created);
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.download.max_concurrent, 3);
        assert!(config.download.in_memory);
        assert_eq!(config.security.api_token.len(), TOKEN_BYTES * 2);

        let (again, created) = Config::load_or_create(&path).unwrap();
        assert!(!created);
        assert_eq!(again, config);
    }

    #[test]
    fn partial_file_is_filled_and_token_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "server": { "port": 0, "host": "127.0.0.1" }, "download": { "dir": "" },
                "cors": { "allowed_origins": [] }, "unknown_key": 1 }"#,
        )
        .unwrap();

        let (config, created) = Config::load_or_create(&path).unwrap();
        assert!(!created);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.download.dir, PathBuf::from("downloads"));
        assert_eq!(config.cors.allowed_origins, vec!["*".to_owned()]);
        assert_eq!(config.cookie.file, PathBuf::from("cookie.txt"));

        let saved: Config = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.security.api_token, config.security.api_token);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(Config::load_or_create(&path).is_err());
    }

    #[test]
    fn tokens_differ() {
        assert_ne!(generate_token(), generate_token());
    }
}
