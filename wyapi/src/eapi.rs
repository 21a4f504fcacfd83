//! EAPI request signing.
//!
//! Flow for a request to `https://host/eapi/<path>` with JSON body `B`:
//!
//! 1. `P` = URL path with the first `/eapi/` replaced by `/api/`
//! 2. `D` = `md5_hex("nobody" + P + "use" + B + "md5forencrypt")`
//! 3. `M` = `P + "-36cd479b6b5-" + B + "-36cd479b6b5-" + D`
//! 4. `params` = `hex(AES-128-ECB(EAPI_KEY, pkcs7(M)))`
//!
//! The result is sent as the only form field, `params`.

use reqwest::Url;
use serde::Serialize;

use crate::crypto::{digest_hex, encrypt_ecb};
use crate::error::{GatewayError, Result};

/// Fixed AES key shared with the desktop client.
pub const EAPI_KEY: &[u8; 16] = b"e82ckenh8dichen8";

const SEPARATOR: &str = "-36cd479b6b5-";

/// Serialize `payload` compactly and sign it for `url`.
pub fn eapi_params<T: Serialize + ?Sized>(url: &str, payload: &T) -> Result<String> {
    let body = serde_json::to_string(payload)
        .map_err(|e| GatewayError::Encoding(format!("cannot serialize payload: {e}")))?;
    sign(url, &body)
}

/// Sign an already-serialized JSON body for `url`.
pub fn sign(url: &str, body: &str) -> Result<String> {
    if url.is_empty() {
        return Err(GatewayError::Encoding("empty url".into()));
    }
    let parsed =
        Url::parse(url).map_err(|e| GatewayError::Encoding(format!("invalid url {url:?}: {e}")))?;
    let path = rewrite_path(parsed.path());

    let digest = digest_hex(format!("nobody{path}use{body}md5forencrypt").as_bytes());
    let message = format!("{path}{SEPARATOR}{body}{SEPARATOR}{digest}");

    let ciphertext = encrypt_ecb(EAPI_KEY, message.as_bytes())
        .map_err(|e| GatewayError::Encoding(e.to_string()))?;
    Ok(hex::encode(ciphertext))
}

fn rewrite_path(path: &str) -> String {
    path.replacen("/eapi/", "/api/", 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::Aes128;
    use ecb::cipher::{BlockDecryptMut, KeyInit, block_padding::Pkcs7};
    use serde_json::json;

    fn decrypt(params: &str) -> String {
        let mut buf = hex::decode(params).unwrap();
        let plain = ecb::Decryptor::<Aes128>::new_from_slice(EAPI_KEY)
            .unwrap()
            .decrypt_padded_mut::<Pkcs7>(&mut buf)
            .unwrap()
            .to_vec();
        String::from_utf8(plain).unwrap()
    }

    #[test]
    fn path_rewrite_only_touches_first_segment() {
        assert_eq!(
            rewrite_path("/eapi/song/enhance/player/url/v1"),
            "/api/song/enhance/player/url/v1"
        );
        assert_eq!(rewrite_path("/api/v3/song/detail"), "/api/v3/song/detail");
        assert_eq!(rewrite_path("/eapi/x/eapi/y"), "/api/x/eapi/y");
    }

    #[test]
    fn signed_message_has_expected_layout() {
        let url = "https://interface3.music.163.com/eapi/song/enhance/player/url/v1";
        let body = r#"{"ids":[1],"level":"lossless"}"#;
        let params = sign(url, body).unwrap();

        assert!(params.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(params.len() % 32, 0);

        let path = "/api/song/enhance/player/url/v1";
        let digest = digest_hex(format!("nobody{path}use{body}md5forencrypt").as_bytes());
        assert_eq!(
            decrypt(&params),
            format!("{path}-36cd479b6b5-{body}-36cd479b6b5-{digest}")
        );
    }

    #[test]
    fn signing_is_deterministic() {
        let url = "https://example.com/eapi/a";
        assert_eq!(sign(url, "{}").unwrap(), sign(url, "{}").unwrap());
    }

    #[test]
    fn payload_is_serialized_without_html_escaping() {
        let payload = json!({ "s": "<a&b>" });
        let params = eapi_params("https://example.com/eapi/search", &payload).unwrap();
        assert!(decrypt(&params).contains(r#"{"s":"<a&b>"}"#));
    }

    #[test]
    fn empty_or_invalid_url_is_an_encoding_error() {
        assert!(matches!(sign("", "{}"), Err(GatewayError::Encoding(_))));
        assert!(matches!(sign("not a url", "{}"), Err(GatewayError::Encoding(_))));
    }
}
