//! Unique ids and names for test isolation.
//!
//! Sessions, channels and participants are keyed by `u64` snowflake-style
//! ids. Tests that share a store or a registry take ids from here so they
//! never collide.

use ulid::Ulid;

/// A fresh non-zero id that fits in a signed 64-bit column.
///
/// # Examples
/// ```
/// use engine_test_support::unique_helpers::unique_id;
///
/// let a = unique_id();
/// let b = unique_id();
/// assert_ne!(a, b);
/// assert!(a <= i64::MAX as u64);
/// ```
pub fn unique_id() -> u64 {
    let raw = (Ulid::new().0 as u64) & (i64::MAX as u64);
    raw.max(1)
}

/// `count` distinct ids, in generation order.
pub fn unique_ids(count: usize) -> Vec<u64> {
    let mut ids = Vec::with_capacity(count);
    while ids.len() < count {
        let id = unique_id();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

/// A unique display name: `{prefix}-{ulid}`.
///
/// # Examples
/// ```
/// use engine_test_support::unique_helpers::unique_name;
///
/// let name = unique_name("player");
/// assert!(name.starts_with("player-"));
/// ```
pub fn unique_name(prefix: &str) -> String {
    format!("{}-{}", prefix, Ulid::new())
}
