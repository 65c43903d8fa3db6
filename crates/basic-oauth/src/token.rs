//! Access token issuing and client binding.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Number of random bytes behind each access token.
const TOKEN_BYTES: usize = 32;

/// Generate a fresh access token: 32 random bytes, URL-safe base64.
pub fn generate_access_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE.encode(bytes)
}

/// Bind a token to the client that obtained it.
///
/// A token presented from another address or user agent produces a
/// different signature.
pub fn sign_token(token: &str, remote_addr: &str, user_agent: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{token}:{remote_addr}:{user_agent}").as_bytes());
    hex::encode(hasher.finalize())
}

/// Resolve the client address.
///
/// Takes the last entry of `X-Forwarded-For` (the one appended by the
/// nearest proxy), falling back to the peer address.
pub fn client_ip(forwarded_for: Option<&str>, remote_addr: &str) -> String {
    forwarded_for
        .and_then(|v| v.split(',').next_back())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or(remote_addr)
        .to_string()
}
