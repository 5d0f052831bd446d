//! Content hashing for exact-match lookups.

use sha2::{Digest, Sha256};

/// SHA-256 hasher over raw image bytes.
///
/// No normalization is applied: re-encoding an image changes its hash, which
/// is what makes the exact tier exact.
///
/// # Example
///
/// ```rust
/// use ecotag_cache::ContentHasher;
///
/// let hash = ContentHasher::hash(b"image bytes");
/// assert_eq!(hash.len(), 64);
/// assert_eq!(hash, ContentHasher::hash(b"image bytes"));
/// ```
pub struct ContentHasher;

impl ContentHasher {
    /// Returns the lowercase hex SHA-256 digest (64 characters).
    #[must_use]
    pub fn hash(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            ContentHasher::hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            ContentHasher::hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_single_byte_change_changes_hash() {
        assert_ne!(ContentHasher::hash(b"tag-a"), ContentHasher::hash(b"tag-b"));
    }
}
