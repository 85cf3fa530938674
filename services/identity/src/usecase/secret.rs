use rand::RngExt;
use sha2::{Digest, Sha256};

/// Charset for opaque tokens (alphanumeric, URL-safe without encoding).
const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

pub fn generate_token(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

/// SHA-256 hex digest of a token. Stores only ever see this form.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether `token` has the shape produced by [`generate_token`] for `len`.
pub fn is_well_formed(token: &str, len: usize) -> bool {
    token.len() == len && token.bytes().all(|b| b.is_ascii_alphanumeric())
}
