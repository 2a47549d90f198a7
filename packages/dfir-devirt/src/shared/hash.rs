//! Structural hashing of declaration names
//!
//! Public types, public functions, fields and interface methods are identified
//! across compilation units by a 64-bit hash of their fully qualified name.
//! The hash must be stable between the compilation that serializes a library's
//! DFIR and every compilation that reads it back.

/// 64-bit hash of a name (first eight bytes of its BLAKE3 digest, little-endian)
pub fn local_hash(name: &str) -> u64 {
    let digest = blake3::hash(name.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(local_hash("core.Any"), local_hash("core.Any"));
        assert_ne!(local_hash("core.Any"), local_hash("core.Unit"));
    }

    #[test]
    fn test_empty_name() {
        // Hash of the empty string is still well-defined
        assert_eq!(local_hash(""), local_hash(""));
    }
}
