//! Hash map alias.
//!
//! Use this instead of `std::collections::HashMap` so hashing is consistent
//! (FxHash) across the workspace.
//!
//! ```rust
//! use omnivec_common::collections::{FxMap, fx_map};
//!
//! let mut usage: FxMap<&str, usize> = fx_map();
//! *usage.entry("aggregation").or_insert(0) += 64;
//! assert_eq!(usage["aggregation"], 64);
//! ```

use rustc_hash::FxBuildHasher;

/// HashMap with FxHash (fast, non-cryptographic).
pub type FxMap<K, V> = hashbrown::HashMap<K, V, FxBuildHasher>;

/// Create a new empty [`FxMap`].
#[inline]
#[must_use]
pub fn fx_map<K, V>() -> FxMap<K, V> {
    FxMap::with_hasher(FxBuildHasher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fx_map() {
        let mut map = fx_map::<String, usize>();
        map.insert("key".to_string(), 42);
        assert_eq!(map.get("key"), Some(&42));
    }
}
