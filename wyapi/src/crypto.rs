//! Byte-level primitives used by the EAPI signer and picture URL derivation.
//!
//! AES-128-ECB and MD5 are what the Netease desktop client uses; both are
//! reproduced exactly for wire compatibility, not for any security property.

use aes::Aes128;
use base64::{Engine, engine::general_purpose::URL_SAFE};
use ecb::cipher::{BlockEncryptMut, KeyInit, block_padding::NoPadding};
use md5::{Digest, Md5};

use crate::error::{GatewayError, Result};

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

type Aes128EcbEnc = ecb::Encryptor<Aes128>;

/// PKCS#7 pad `data` to a multiple of `block_size`.
///
/// Always appends at least one byte: block-aligned input gains a full block
/// of padding. `block_size` must be in `1..=255`.
pub fn pad(data: &[u8], block_size: usize) -> Vec<u8> {
    debug_assert!((1..=255).contains(&block_size));
    let pad_len = block_size - (data.len() % block_size);
    #[allow(clippy::cast_possible_truncation)]
    let fill = pad_len as u8;
    let mut out = Vec::with_capacity(data.len() + pad_len);
    out.extend_from_slice(data);
    out.resize(data.len() + pad_len, fill);
    out
}

/// AES-128-ECB encrypt with PKCS#7 padding. Every block is encrypted
/// independently under `key`; there is no IV.
pub fn encrypt_ecb(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if key.len() != BLOCK_SIZE {
        return Err(GatewayError::InvalidKey(key.len()));
    }
    let enc = Aes128EcbEnc::new_from_slice(key).map_err(|_| GatewayError::InvalidKey(key.len()))?;

    let mut buf = pad(data, BLOCK_SIZE);
    let len = buf.len();
    enc.encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .map_err(|e| GatewayError::Encoding(format!("AES-ECB encryption failed: {e}")))?;
    Ok(buf)
}

/// MD5 of `data`.
pub fn digest(data: &[u8]) -> [u8; 16] {
    Md5::digest(data).into()
}

/// Lowercase hex MD5 of `data`.
pub fn digest_hex(data: &[u8]) -> String {
    hex::encode(digest(data))
}

/// Standard base64 with `+` → `-` and `/` → `_`. Padding is kept.
pub fn base64_url_safe(data: &[u8]) -> String {
    URL_SAFE.encode(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn pad_aligned_input_gains_full_block() {
        let padded = pad(&[7u8; 16], 16);
        assert_eq!(padded.len(), 32);
        assert!(padded[16..].iter().all(|&b| b == 16));
    }

    #[test]
    fn pad_empty_input() {
        assert_eq!(pad(&[], 16), vec![16u8; 16]);
    }

    #[test]
    fn pad_partial_block() {
        let padded = pad(b"abc", 8);
        assert_eq!(padded, b"abc\x05\x05\x05\x05\x05");
    }

    #[test]
    fn ecb_matches_fips197_vector() {
        // FIPS-197 appendix C.1: first block is the reference ciphertext,
        // the second block is the encrypted padding.
        let key = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let plaintext = hex::decode("00112233445566778899aabbccddeeff").unwrap();
        let ct = encrypt_ecb(&key, &plaintext).unwrap();
        assert_eq!(ct.len(), 32);
        assert_eq!(hex::encode(&ct[..16]), "69c4e0d86a7b0430d8cdb78070b4c55a");
    }

    #[test]
    fn ecb_is_deterministic() {
        let key = b"e82ckenh8dichen8";
        let a = encrypt_ecb(key, b"same plaintext").unwrap();
        let b = encrypt_ecb(key, b"same plaintext").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn ecb_identical_blocks_encrypt_identically() {
        let ct = encrypt_ecb(b"0123456789abcdef", &[0x41; 32]).unwrap();
        assert_eq!(ct[..16], ct[16..32]);
    }

    #[test]
    fn ecb_rejects_bad_keys() {
        assert!(matches!(encrypt_ecb(b"", b"x"), Err(GatewayError::InvalidKey(0))));
        assert!(matches!(
            encrypt_ecb(b"short", b"x"),
            Err(GatewayError::InvalidKey(5))
        ));
    }

    #[test]
    fn md5_known_values() {
        assert_eq!(digest_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(digest_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn url_safe_alphabet() {
        assert_eq!(base64_url_safe(&[0xfb, 0xff]), "-_8=");
        assert_eq!(base64_url_safe(b"hi"), "aGk=");
    }

    proptest! {
        #[test]
        fn padded_length_is_positive_multiple(data in proptest::collection::vec(any::<u8>(), 0..200)) {
            let padded = pad(&data, BLOCK_SIZE);
            prop_assert!(!padded.is_empty());
            prop_assert_eq!(padded.len() % BLOCK_SIZE, 0);
            prop_assert!(padded.len() > data.len());
            prop_assert_eq!(&padded[..data.len()], &data[..]);
        }

        #[test]
        fn ciphertext_length_tracks_padding(data in proptest::collection::vec(any::<u8>(), 0..200)) {
            let ct = encrypt_ecb(b"e82ckenh8dichen8", &data).unwrap();
            prop_assert_eq!(ct.len(), pad(&data, BLOCK_SIZE).len());
        }
    }
}
