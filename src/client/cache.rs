//! Client-side query cache.
//!
//! Entries are keyed by resource path plus filter. Mutations invalidate by
//! path, which drops every filtered variant of that resource as well as the
//! item paths below it (`/api/products` also covers `/api/products/3`).

use moka::sync::Cache;
use serde_json::Value;

/// Upper bound on cached responses per client.
const DEFAULT_CAPACITY: u64 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub path: String,
    pub filter: Vec<(String, String)>,
}

impl QueryKey {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            filter: Vec::new(),
        }
    }

    /// Adds a query-string pair. `None` leaves the key unfiltered.
    pub fn filter(mut self, name: &str, value: Option<impl ToString>) -> Self {
        if let Some(value) = value {
            self.filter.push((name.to_string(), value.to_string()));
        }
        self
    }

    fn is_under(&self, path: &str) -> bool {
        self.path == path
            || self
                .path
                .strip_prefix(path)
                .map_or(false, |rest| rest.starts_with('/'))
    }
}

/// Decoded JSON responses held in a Moka cache.
pub struct QueryCache {
    inner: Cache<QueryKey, Value>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .support_invalidation_closures()
                .build(),
        }
    }

    pub fn get(&self, key: &QueryKey) -> Option<Value> {
        self.inner.get(key)
    }

    pub fn insert(&self, key: QueryKey, value: Value) {
        self.inner.insert(key, value);
    }

    /// Drops every entry at or below `path`, whatever its filter.
    pub fn invalidate(&self, path: &str) {
        let path = path.to_string();
        if let Err(e) = self
            .inner
            .invalidate_entries_if(move |key, _| key.is_under(&path))
        {
            tracing::warn!(error = %e, "Falling back to clearing the whole query cache");
            self.inner.invalidate_all();
        }
    }

    pub fn clear(&self) {
        self.inner.invalidate_all();
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}
