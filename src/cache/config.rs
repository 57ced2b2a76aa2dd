//! Cache configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for a [`ReadThroughCache`](super::ReadThroughCache).
///
/// The default reproduces the plain read-through behavior: no fetch timeout and
/// an empty store with no preallocated capacity.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use readthru::cache::CacheConfig;
///
/// let config = CacheConfig::from_json(r#"{ "fetch_timeout_ms": 250 }"#).unwrap();
/// assert_eq!(config.timeout(), Some(Duration::from_millis(250)));
/// assert_eq!(config.initial_capacity, 0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Upper bound on a single upstream fetch. A fetch that exceeds it is
    /// treated as "unavailable" and nothing is stored.
    pub fetch_timeout_ms: Option<u64>,

    /// Number of entries to preallocate in the store.
    pub initial_capacity: usize,
}

impl CacheConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Sets the upstream fetch timeout.
    #[must_use]
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Sets the number of entries to preallocate.
    #[must_use]
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Returns the configured fetch timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_is_default() {
        assert_eq!(CacheConfig::from_json("{}").unwrap(), CacheConfig::default());
    }

    #[test]
    fn builder_sets_fields() {
        let config = CacheConfig::new()
            .fetch_timeout(Duration::from_millis(1500))
            .initial_capacity(64);
        assert_eq!(config.fetch_timeout_ms, Some(1500));
        assert_eq!(config.timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.initial_capacity, 64);
    }

    #[test]
    fn rejects_wrong_types() {
        assert!(CacheConfig::from_json(r#"{ "fetch_timeout_ms": "soon" }"#).is_err());
    }
}
