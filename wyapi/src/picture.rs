//! Album art URL derivation.
//!
//! The CDN path segment is `url_safe_b64(md5(id_digits XOR key))`, with the
//! key repeating over the decimal digits of the picture ID.

use crate::crypto::{base64_url_safe, digest};

const PIC_KEY: &[u8] = b"3go8&$8*3*3h0k(2)2";

pub const DEFAULT_PIC_SIZE: u32 = 300;

/// Square thumbnail URL for a picture ID. Returns an empty string for ID 0.
/// A size of 0 means [`DEFAULT_PIC_SIZE`].
pub fn picture_url(pic_id: u64, size: u32) -> String {
    if pic_id == 0 {
        return String::new();
    }
    let size = if size == 0 { DEFAULT_PIC_SIZE } else { size };
    let id = pic_id.to_string();
    let mixed: Vec<u8> = id
        .bytes()
        .zip(PIC_KEY.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect();
    let enc = base64_url_safe(&digest(&mixed));
    format!("https://p3.music.126.net/{enc}/{id}.jpg?param={size}y{size}")
}
