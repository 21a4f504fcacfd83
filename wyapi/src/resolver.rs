//! Turning free-form user input into a numeric entity ID.
//!
//! Inputs seen in practice: bare IDs, `music.163.com/#/song?id=...` links,
//! `/playlist/123` style paths, and `163cn.tv` short links pasted together
//! with share text. Strategies run in a fixed order and the first hit wins:
//!
//! 1. the whole trimmed input is digits
//! 2. a short link is expanded (failures fall through with the original text)
//! 3. `id=<digits>`, case-insensitive
//! 4. `song`/`album`/`playlist` followed by non-digits then digits
//! 5. the first run of five or more digits

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use crate::client::NeteaseClient;
use crate::context::RequestContext;
use crate::error::{GatewayError, Result};

/// Host marker of the provider's link shortener.
pub const SHORT_LINK_MARKER: &str = "163cn.tv";

static ID_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)id=([0-9]+)").expect("valid id= pattern"));

static ENTITY_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(song|album|playlist)[^0-9]*([0-9]+)").expect("valid entity pattern")
});

static DIGIT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]{5,}").expect("valid digit-run pattern"));

static SHORT_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:https?://)?[^\s]*163cn\.tv[^\s]*").expect("valid short-link pattern")
});

/// Something that can expand a short link to its target URL.
#[async_trait]
pub trait ShortLinkResolver: Send + Sync {
    async fn expand(&self, ctx: &RequestContext, short_url: &str) -> Result<String>;
}

#[async_trait]
impl ShortLinkResolver for NeteaseClient {
    async fn expand(&self, ctx: &RequestContext, short_url: &str) -> Result<String> {
        self.resolve_short_url(ctx, short_url).await
    }
}

/// Resolve `input` to an entity ID.
///
/// # Errors
///
/// [`GatewayError::InvalidInput`] for blank input or digits that overflow
/// `u64`, [`GatewayError::IdentifierNotFound`] when no strategy matches, and
/// [`GatewayError::Cancelled`] if the context is cancelled while a short link
/// is being expanded.
pub async fn resolve_id<R>(ctx: &RequestContext, input: &str, resolver: &R) -> Result<u64>
where
    R: ShortLinkResolver + ?Sized,
{
    let cleaned = input.trim();
    if cleaned.is_empty() {
        return Err(GatewayError::InvalidInput("identifier empty".into()));
    }
    if cleaned.bytes().all(|b| b.is_ascii_digit()) {
        return parse_id(cleaned);
    }

    let mut text = cleaned.to_owned();
    if let Some(link) = short_link(cleaned) {
        match resolver.expand(ctx, &link).await {
            Ok(target) if !target.is_empty() => {
                debug!(%link, %target, "expanded short link");
                text = target;
            }
            Ok(_) => {}
            Err(GatewayError::Cancelled) => return Err(GatewayError::Cancelled),
            Err(e) => warn!(%link, error = %e, "short link expansion failed, using original text"),
        }
    }

    match extract_id(&text) {
        Some(digits) => parse_id(digits),
        None => Err(GatewayError::IdentifierNotFound(cleaned.to_owned())),
    }
}

/// Text-only strategies 3 to 5. Returns the matched digit run.
pub fn extract_id(text: &str) -> Option<&str> {
    if let Some(m) = ID_PARAM.captures(text).and_then(|c| c.get(1)) {
        return Some(m.as_str());
    }
    if let Some(m) = ENTITY_PATH.captures(text).and_then(|c| c.get(2)) {
        return Some(m.as_str());
    }
    DIGIT_RUN.find(text).map(|m| m.as_str())
}

/// The short link inside `text`, with a scheme.
fn short_link(text: &str) -> Option<String> {
    if !text.contains(SHORT_LINK_MARKER) {
        return None;
    }
    let link = SHORT_LINK.find(text)?.as_str();
    let lower = link.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Some(link.to_owned())
    } else {
        Some(format!("https://{link}"))
    }
}

fn parse_id(digits: &str) -> Result<u64> {
    digits
        .parse()
        .map_err(|_| GatewayError::InvalidInput(format!("identifier out of range: {digits}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    /// Records what it was asked and answers from a fixed result.
    struct FakeResolver {
        answer: std::result::Result<String, ()>,
        seen: Mutex<Vec<String>>,
    }

    impl FakeResolver {
        fn ok(target: &str) -> Self {
            Self {
                answer: Ok(target.to_owned()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                answer: Err(()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ShortLinkResolver for FakeResolver {
        async fn expand(&self, _ctx: &RequestContext, short_url: &str) -> Result<String> {
            self.seen.lock().unwrap().push(short_url.to_owned());
            self.answer
                .clone()
                .map_err(|()| GatewayError::Malformed("boom".into()))
        }
    }

    async fn resolve(input: &str) -> Result<u64> {
        resolve_id(&RequestContext::new(), input, &FakeResolver::failing()).await
    }

    #[tokio::test]
    async fn bare_digits_with_whitespace() {
        assert_eq!(resolve("  12345  ").await.unwrap(), 12345);
        assert_eq!(resolve("7").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn id_query_parameter() {
        assert_eq!(resolve("https://music.example/song?id=99").await.unwrap(), 99);
        assert_eq!(resolve("xx ID=4242 yy").await.unwrap(), 4242);
    }

    #[tokio::test]
    async fn entity_path_segments() {
        assert_eq!(resolve("song1234567").await.unwrap(), 1_234_567);
        assert_eq!(resolve("PLAYLIST7654321").await.unwrap(), 7_654_321);
        assert_eq!(resolve("https://music.163.com/album/32311/").await.unwrap(), 32311);
    }

    #[tokio::test]
    async fn id_param_beats_entity_path() {
        assert_eq!(resolve("playlist/5?id=77").await.unwrap(), 77);
    }

    #[tokio::test]
    async fn long_digit_run_is_last_resort() {
        assert_eq!(resolve("track #1 is 123456 ok").await.unwrap(), 123_456);
    }

    #[tokio::test]
    async fn nothing_found() {
        assert!(matches!(
            resolve("hello 1234").await,
            Err(GatewayError::IdentifierNotFound(_))
        ));
    }

    #[tokio::test]
    async fn blank_and_overflow_are_invalid_input() {
        assert!(matches!(resolve("   ").await, Err(GatewayError::InvalidInput(_))));
        assert!(matches!(
            resolve("99999999999999999999999").await,
            Err(GatewayError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn short_link_is_expanded() {
        let r = FakeResolver::ok("https://music.163.com/song?id=1901371647&uct=x");
        let id = resolve_id(
            &RequestContext::new(),
            "分享歌曲 http://163cn.tv/zKE4Ra (来自@网易云音乐)",
            &r,
        )
        .await
        .unwrap();
        assert_eq!(id, 1_901_371_647);
        assert_eq!(r.seen.lock().unwrap().as_slice(), ["http://163cn.tv/zKE4Ra"]);
    }

    #[tokio::test]
    async fn short_link_without_scheme_gets_https() {
        let r = FakeResolver::ok("https://music.163.com/playlist?id=42");
        resolve_id(&RequestContext::new(), "163cn.tv/abc", &r)
            .await
            .unwrap();
        assert_eq!(r.seen.lock().unwrap().as_slice(), ["https://163cn.tv/abc"]);
    }

    #[tokio::test]
    async fn failed_expansion_falls_back_to_original_text() {
        let err = resolve("https://163cn.tv/abc").await.unwrap_err();
        assert!(matches!(err, GatewayError::IdentifierNotFound(_)));
        assert_eq!(resolve("163cn.tv/abc song 555555").await.unwrap(), 555_555);
    }

    #[test]
    fn extract_prefers_earlier_strategies() {
        assert_eq!(extract_id("album 12 id=34 56789"), Some("34"));
        assert_eq!(extract_id("album 12 56789"), Some("12"));
        assert_eq!(extract_id("x 56789"), Some("56789"));
        assert_eq!(extract_id("x 5678"), None);
    }

    #[test]
    fn only_ascii_digits_count() {
        assert_eq!(extract_id("id=１２３４５ song/٤٥٦ 654321"), Some("654321"));
        assert_eq!(extract_id("song ١٢٣٤٥٦ 98765"), Some("98765"));
        assert_eq!(extract_id("１２３４５６"), None);
    }

    #[tokio::test]
    async fn fullwidth_digits_do_not_hide_the_real_id() {
        assert_eq!(resolve("１２３４５６ 654321").await.unwrap(), 654_321);
        assert!(matches!(
            resolve("１２３４５６").await,
            Err(GatewayError::IdentifierNotFound(_))
        ));
    }

    proptest! {
        #[test]
        fn digit_strings_resolve_to_themselves(n in any::<u64>()) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let got = rt.block_on(resolve(&n.to_string())).unwrap();
            prop_assert_eq!(got, n);
        }

        #[test]
        fn id_param_found_anywhere(
            prefix in "[a-zA-Z/:. ]{0,20}",
            suffix in "[a-zA-Z&]{0,10}",
            n in 0u64..1_000_000_000,
        ) {
            let text = format!("{prefix}Id={n}{suffix}");
            let expected = n.to_string();
            prop_assert_eq!(extract_id(&text), Some(expected.as_str()));
        }
    }
}
