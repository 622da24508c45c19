use sha2::{Digest, Sha256};

/// `content_hash` = hex-encoded SHA-256 over the raw UTF-8 bytes of a file's
/// on-disk contents (§3). Used to skip re-embedding unchanged files.
pub fn content_hash(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_content_hashes_identically() {
        assert_eq!(content_hash("hello"), content_hash("hello"));
    }

    #[test]
    fn different_content_hashes_differently() {
        assert_ne!(content_hash("hello"), content_hash("hellp"));
    }

    #[test]
    fn hash_is_64_lowercase_hex_chars() {
        let hash = content_hash("anything");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
