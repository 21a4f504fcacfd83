//! Cookie file handling.
//!
//! The cookie file is a flat text file holding `key=value` pairs separated by
//! `;` or newlines, exactly as copied from a browser's developer tools:
//!
//! ```text
//! Cookie: MUSIC_U=00AABBCC...; __csrf=0123abcd
//! ```
//!
//! A leading `Cookie:` prefix and a UTF-8 byte-order mark are tolerated.
//! [`CookieStore::load`] reads the file fresh on every call; nothing is cached.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{GatewayError, Result};

/// Device-identity cookies sent with every request unless the user file
/// supplies a non-empty value for the same name.
pub const DEFAULT_COOKIES: [(&str, &str); 4] = [
    ("os", "pc"),
    ("appver", ""),
    ("osver", ""),
    ("deviceId", "pyncm!"),
];

/// Parsed cookie name → value mapping. Never contains empty names or values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieSet(BTreeMap<String, String>);

impl CookieSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse cookie text. Malformed pairs and empty names/values are skipped.
    pub fn parse(text: &str) -> Self {
        let mut set = Self::new();
        let mut text = text.trim_start_matches('\u{feff}').trim();
        if text
            .get(..7)
            .is_some_and(|p| p.eq_ignore_ascii_case("cookie:"))
        {
            text = text[7..].trim();
        }
        if text.is_empty() {
            return set;
        }

        let separator = if text.contains(';') { ';' } else { '\n' };
        for part in text.split(separator) {
            if let Some((key, value)) = part.trim().split_once('=') {
                set.insert(key, value);
            }
        }
        set
    }

    /// Insert a pair after trimming; empty names or values are ignored.
    pub fn insert(&mut self, key: &str, value: &str) {
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            return;
        }
        self.0.insert(key.to_owned(), value.to_owned());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// [`DEFAULT_COOKIES`] overlaid with this set.
    pub fn merged_with_defaults(&self) -> BTreeMap<String, String> {
        let mut merged: BTreeMap<String, String> = DEFAULT_COOKIES
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        for (k, v) in self.iter() {
            merged.insert(k.to_owned(), v.to_owned());
        }
        merged
    }

    /// Value for the `Cookie` request header, defaults included.
    pub fn header_value(&self) -> String {
        self.merged_with_defaults()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Handle to the cookie file on disk.
#[derive(Debug, Clone)]
pub struct CookieStore {
    path: PathBuf,
}

impl CookieStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create an empty cookie file if none exists.
    pub async fn ensure_file(&self) -> Result<()> {
        self.check_path()?;
        if fs::try_exists(&self.path).await? {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.path, b"").await?;
        Ok(())
    }

    /// Raw trimmed file content. A missing file reads as empty.
    pub async fn read(&self) -> Result<String> {
        self.check_path()?;
        match fs::read_to_string(&self.path).await {
            Ok(s) => Ok(s.trim().to_owned()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the file content. Blank content is rejected.
    pub async fn write(&self, content: &str) -> Result<()> {
        self.check_path()?;
        let content = content.trim();
        if content.is_empty() {
            return Err(GatewayError::InvalidInput("cookie content empty".into()));
        }
        fs::write(&self.path, content).await?;
        Ok(())
    }

    /// Read and parse the file. Called once per operation.
    pub async fn load(&self) -> Result<CookieSet> {
        Ok(CookieSet::parse(&self.read().await?))
    }

    fn check_path(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(GatewayError::InvalidInput("cookie file path empty".into()));
        }
        Ok(())
    }
}
