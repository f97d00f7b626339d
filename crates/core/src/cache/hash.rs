//! Request-key generation for cache entries.

use sha2::{Digest, Sha256};
use url::Url;

/// Compute the cache key for a request.
///
/// The key covers the method and the URL with its fragment removed, so
/// `/#top` and `/` share an entry.
pub fn compute_request_key(method: &str, url: &Url) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize_url(url).as_bytes());
    hex::encode(hasher.finalize())
}

/// URL as stored in the cache: fragment stripped, everything else verbatim.
pub fn normalize_url(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}
