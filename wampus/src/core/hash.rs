/// Hash map used across the crate.
pub type HashMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;

/// Hash set used across the crate.
pub type HashSet<V> = std::collections::HashSet<V, ahash::RandomState>;
