//! Fixed-length digests for cache key components.

use sha2::{Digest, Sha256};

/// Length of every string returned by [`digest`].
pub const DIGEST_LEN: usize = 64;

/// Hex-encoded SHA-256 of `data`.
///
/// Stable across processes and platforms; used only to partition the cache,
/// never as a security boundary.
pub fn digest(data: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(data.as_ref()))
}
