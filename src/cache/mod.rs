// src/cache/mod.rs

//! Shared memoization.
//!
//! - [`lru`] is a plain LRU map with per-entry TTL.
//! - [`single_flight`] wraps it with request deduplication.
//!
//! These caches are the only state shared across scheduling runs.

pub mod lru;
pub mod single_flight;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::errors::Result;
use crate::formula::{cook, parse_formula, CookedFormula};

pub use lru::TtlLru;
pub use single_flight::{CacheStats, SingleFlightCache};

/// Content-addressed key: blake3 over formula content and sorted variables.
pub fn formula_cache_key(content: &str, vars: &BTreeMap<String, String>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(content.as_bytes());
    for (name, value) in vars {
        hasher.update(&[0]);
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
        hasher.update(value.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Cache of cooked formulas keyed by content + variables.
#[derive(Debug)]
pub struct FormulaCache {
    inner: SingleFlightCache<String, Arc<CookedFormula>>,
}

impl FormulaCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: SingleFlightCache::new(capacity, ttl),
        }
    }

    /// Parse and cook `content`, or return the shared cooked value if the
    /// same content and variables were cooked recently (or are being
    /// cooked right now).
    pub async fn cook(
        &self,
        content: &str,
        vars: &BTreeMap<String, String>,
    ) -> Result<Arc<CookedFormula>> {
        let key = formula_cache_key(content, vars);
        debug!(key = %key, "formula cache lookup");

        self.inner
            .get_or_compute(key, || async move {
                let formula = parse_formula(content)?;
                Ok(Arc::new(cook(&formula, vars)?))
            })
            .await
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
