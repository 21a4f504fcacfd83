//! Error types for the gateway core.

use thiserror::Error;

/// Errors that can occur while resolving, querying or downloading.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Caller supplied something unusable (empty identifier, bad quality name, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Every identifier extraction strategy came up empty.
    #[error("no identifier found in input: {0:?}")]
    IdentifierNotFound(String),

    /// HTTP transport error, or a non-2xx status from the provider.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider returned a non-200 `code` in its JSON envelope.
    ///
    /// Common codes:
    /// - `301`: not logged in / cookie expired
    /// - `404`: resource does not exist
    /// - `-460`: cheating detected (request too frequent)
    #[error("API error (code {code}): {message}")]
    Api {
        /// Envelope status code (not HTTP status).
        code: i64,
        /// Human-readable message from the provider, if any.
        message: String,
    },

    /// The envelope was a success but its payload did not have the expected shape.
    #[error("unexpected response: {0}")]
    Malformed(String),

    /// Building a signed payload or serializing a request body failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Block cipher key is empty or has the wrong length.
    #[error("invalid cipher key length: {0}")]
    InvalidKey(usize),

    /// The entity resolved, but the provider offers nothing playable for it.
    #[error("asset unavailable: {0}")]
    AssetUnavailable(String),

    /// Local I/O failed while persisting a download.
    #[error("download failed: {0}")]
    DownloadFailed(#[source] std::io::Error),

    /// Cookie file I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The request context was cancelled before the operation finished.
    #[error("request cancelled")]
    Cancelled,

    /// The request context deadline elapsed.
    #[error("request timed out")]
    TimedOut,
}

/// Coarse classification of [`GatewayError`], used by the boundary layer to
/// pick a status code without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    IdentifierNotFound,
    UpstreamRequestFailed,
    EncodingError,
    AssetUnavailable,
    DownloadFailed,
    Cancelled,
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::IdentifierNotFound(_) => ErrorKind::IdentifierNotFound,
            Self::Http(_) | Self::Api { .. } | Self::Malformed(_) | Self::TimedOut => {
                ErrorKind::UpstreamRequestFailed
            }
            Self::Encoding(_) | Self::InvalidKey(_) => ErrorKind::EncodingError,
            Self::AssetUnavailable(_) => ErrorKind::AssetUnavailable,
            Self::DownloadFailed(_) | Self::Io(_) => ErrorKind::DownloadFailed,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

/// Convenience alias for `Result<T, GatewayError>`.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_variants_share_a_kind() {
        let api = GatewayError::Api {
            code: -460,
            message: "cheating".into(),
        };
        assert_eq!(api.kind(), ErrorKind::UpstreamRequestFailed);
        assert_eq!(GatewayError::TimedOut.kind(), ErrorKind::UpstreamRequestFailed);
        assert_eq!(
            GatewayError::Malformed("x".into()).kind(),
            ErrorKind::UpstreamRequestFailed
        );
    }

    #[test]
    fn messages_are_human_readable() {
        let e = GatewayError::IdentifierNotFound("hello".into());
        assert_eq!(e.to_string(), "no identifier found in input: \"hello\"");
        let e = GatewayError::Api {
            code: 301,
            message: "need login".into(),
        };
        assert_eq!(e.to_string(), "API error (code 301): need login");
    }
}
