//! Shared test utilities
//!
//! - `TestRedis`: Redis container with automatic cleanup (feature: "redis")
//! - `TestDataBuilder`: deterministic stream names, entry IDs and keys
//! - `assertions`: custom assertion helpers
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { workspace = true, features = ["redis"] }
//! ```
//!
//! ```rust,ignore
//! use test_utils::{TestDataBuilder, TestRedis};
//!
//! #[tokio::test]
//! async fn my_redis_test() {
//!     let redis = TestRedis::new().await;
//!     let manager = redis.connection_manager().await;
//!     let data = TestDataBuilder::from_test_name("my_redis_test");
//!
//!     let key = data.key("failed");
//!     let id = data.entry_id(1);
//! }
//! ```

#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "redis")]
pub use redis::TestRedis;

/// Builder for test data with deterministic values
///
/// Tests that share one Redis container use it to keep their keys apart.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    /// Create a new builder with a seed
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (seed is the hash of the name)
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("test_retry_all");
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Redis key scoped to this builder
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::new(7);
    /// assert_eq!(builder.key("failed"), "test:7:failed");
    /// ```
    pub fn key(&self, name: &str) -> String {
        format!("test:{}:{}", self.seed, name)
    }

    /// Stream name scoped to this builder, e.g. `orders.7`
    pub fn stream(&self, name: &str) -> String {
        format!("{}.{}", name, self.seed)
    }

    /// Explicit stream entry ID in `<ms>-<seq>` form
    ///
    /// The millisecond part is derived from the seed so IDs stay valid for
    /// XADD on a fresh stream.
    pub fn entry_id(&self, seq: u64) -> String {
        format!("{}-{}", self.seed % 1_000_000_000 + 1, seq)
    }
}

/// Test assertion helpers
pub mod assertions {
    /// Assert that an optional value is Some
    pub fn assert_some<T>(value: Option<T>, context: &str) -> T {
        value.unwrap_or_else(|| panic!("{}: expected Some, got None", context))
    }

    /// Assert that two string lists contain the same items in any order
    pub fn assert_same_items(actual: &[String], expected: &[&str], context: &str) {
        let mut actual: Vec<&str> = actual.iter().map(String::as_str).collect();
        let mut expected = expected.to_vec();
        actual.sort_unstable();
        expected.sort_unstable();
        assert_eq!(actual, expected, "{}: items differ", context);
    }
}
