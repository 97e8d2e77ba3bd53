//! Hashing functions.

/// Trait for 64-bit hash functions used to fingerprint text.
pub trait HashFunction: Send + Sync {
    /// Hash raw bytes to a u64.
    fn hash_u64(&self, data: &[u8]) -> u64;

    /// Hash the UTF-8 bytes of a string.
    fn hash_str(&self, text: &str) -> u64 {
        self.hash_u64(text.as_bytes())
    }
}

/// XXHash3 hasher - extremely fast, stable across platforms and releases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XxHash3 {
    seed: u64,
}

impl XxHash3 {
    /// Create a new unseeded XXHash3 hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a hasher with a specific seed.
    ///
    /// Signatures computed with different seeds are not comparable, so every
    /// shard of a dedup run must use the same seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self { seed }
    }

    /// The seed this hasher was built with.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl HashFunction for XxHash3 {
    fn hash_u64(&self, data: &[u8]) -> u64 {
        if self.seed == 0 {
            xxhash_rust::xxh3::xxh3_64(data)
        } else {
            xxhash_rust::xxh3::xxh3_64_with_seed(data, self.seed)
        }
    }
}
