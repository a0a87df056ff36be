//! Access key and secret key generation

use super::cipher::SecretKey;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use zeroize::Zeroizing;

/// Random bytes behind an access key id
pub const ACCESS_KEY_BYTES: usize = 20;
/// Random bytes behind a secret key
pub const SECRET_KEY_BYTES: usize = 40;
pub const ACCESS_KEY_PREFIX: &str = "AK";
pub const SECRET_KEY_PREFIX: &str = "SK";

/// `AK` + base64url(20 random bytes), 29 characters
pub fn generate_access_key() -> String {
    let mut bytes = [0u8; ACCESS_KEY_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    format!("{}{}", ACCESS_KEY_PREFIX, URL_SAFE_NO_PAD.encode(bytes))
}

/// `SK` + base64url(40 random bytes), 56 characters
pub fn generate_secret_key() -> SecretKey {
    let mut bytes = Zeroizing::new([0u8; SECRET_KEY_BYTES]);
    rand::rng().fill_bytes(bytes.as_mut());
    SecretKey::new(format!(
        "{}{}",
        SECRET_KEY_PREFIX,
        URL_SAFE_NO_PAD.encode(bytes.as_ref())
    ))
}

pub fn is_valid_access_key_format(key: &str) -> bool {
    has_format(key, ACCESS_KEY_PREFIX, ACCESS_KEY_BYTES)
}

pub fn is_valid_secret_key_format(key: &str) -> bool {
    has_format(key, SECRET_KEY_PREFIX, SECRET_KEY_BYTES)
}

fn has_format(key: &str, prefix: &str, raw_len: usize) -> bool {
    let Some(body) = key.strip_prefix(prefix) else {
        return false;
    };
    body.len() == encoded_len(raw_len)
        && body
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

// unpadded base64 length
fn encoded_len(raw_len: usize) -> usize {
    (raw_len * 4).div_ceil(3)
}
