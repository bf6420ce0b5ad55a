//! Persistent response cache keyed by request fingerprint.
//!
//! Entries carry the time window of the request that produced them and are
//! deleted by ingestion when new data overlaps that window.

use metrics::counter;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use emissions_common::TimeWindow;
use storage::{CacheEntry, CacheStore};

use crate::error::{QueryError, QueryResult};
use crate::filter::Params;

/// Parameter that forces recomputation without touching the cache.
pub const NOCACHE_PARAM: &str = "nocache";

/// Canonical fingerprint of a request.
///
/// The path is trimmed of surrounding whitespace and trailing slashes and
/// lower-cased; parameters are sorted by key with trimmed values. The
/// bypass parameter is left out. JSON encoding keeps separators inside
/// values from colliding.
pub fn fingerprint(path: &str, params: &Params) -> String {
    let path = path.trim().trim_end_matches('/').to_ascii_lowercase();
    let params: Params = params
        .iter()
        .filter(|(key, _)| key.as_str() != NOCACHE_PARAM)
        .map(|(key, value)| (key.clone(), value.trim().to_string()))
        .collect();

    json!([path, params]).to_string()
}

/// Whether the request asks to bypass the cache.
pub fn is_bypass(params: &Params) -> bool {
    params.contains_key(NOCACHE_PARAM)
}

/// Serves stored responses and stores computed ones.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    timeout: Duration,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Return the cached response for the request or compute, store and
    /// return it.
    ///
    /// `compute` runs under the request timeout. Nothing is written when it
    /// fails or times out, when the request bypasses the cache, or when an
    /// ingestion committed while it ran.
    pub async fn get_or_compute<F, Fut>(
        &self,
        path: &str,
        params: &Params,
        window: TimeWindow,
        compute: F,
    ) -> QueryResult<Vec<u8>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = QueryResult<Vec<u8>>>,
    {
        if is_bypass(params) {
            counter!("response_cache_requests_total", "result" => "bypass").increment(1);
            debug!(path, "Cache bypassed");
            return self.run(compute).await;
        }

        let key = fingerprint(path, params);
        if let Some(response) = self.store.get_cached(&key).await? {
            counter!("response_cache_requests_total", "result" => "hit").increment(1);
            debug!(path, bytes = response.len(), "Cache hit");
            return Ok(response);
        }
        counter!("response_cache_requests_total", "result" => "miss").increment(1);

        // Read before computing: an ingestion committed while computing may
        // already have swept this key, so the result must not be stored.
        let generation = self.store.generation().await?;
        let response = self.run(compute).await?;
        let entry = CacheEntry {
            fingerprint: key,
            window,
            response,
        };
        if self.store.put_cached_if_current(&entry, generation).await? {
            debug!(path, bytes = entry.response.len(), "Cached response");
        } else {
            counter!("response_cache_discarded_total").increment(1);
            debug!(path, "Ingestion committed during computation, response not cached");
        }

        Ok(entry.response)
    }

    async fn run<F, Fut>(&self, compute: F) -> QueryResult<Vec<u8>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = QueryResult<Vec<u8>>>,
    {
        match tokio::time::timeout(self.timeout, compute()).await {
            Ok(result) => result,
            Err(_) => {
                counter!("query_timeouts_total").increment(1);
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Query timed out");
                Err(QueryError::Timeout(self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_fingerprint_ignores_parameter_order() {
        let a = params(&[("begin", "2020-01-01"), ("country", "DE")]);
        let b = params(&[("country", "DE"), ("begin", "2020-01-01")]);
        assert_eq!(fingerprint("/api/v2/ozone/geo.json", &a), fingerprint("/api/v2/ozone/geo.json", &b));
    }

    #[test]
    fn test_fingerprint_normalization() {
        let base = fingerprint("/api/v2/ozone/geo.json", &params(&[("country", "DE")]));
        assert_eq!(
            base,
            fingerprint(" /API/v2/ozone/geo.json/ ", &params(&[("country", " DE ")]))
        );
        assert_eq!(
            base,
            fingerprint("/api/v2/ozone/geo.json", &params(&[("country", "DE"), ("nocache", "")]))
        );
        assert_ne!(base, fingerprint("/api/v2/methane/geo.json", &params(&[("country", "DE")])));
    }

    #[test]
    fn test_fingerprint_values_cannot_collide() {
        let a = fingerprint("/p", &params(&[("a", "1&b=2")]));
        let b = fingerprint("/p", &params(&[("a", "1"), ("b", "2")]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_bypass_flag() {
        assert!(is_bypass(&params(&[("nocache", "")])));
        assert!(!is_bypass(&params(&[("country", "DE")])));
    }
}
