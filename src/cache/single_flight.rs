// src/cache/single_flight.rs

//! Memoizing cache with request deduplication.
//!
//! The first caller to miss a key becomes its *leader* and is the only one
//! that computes it. Callers that arrive while the leader is working wait
//! on a `watch` channel and receive the leader's result. Successful values
//! are stored in a [`TtlLru`]; errors are handed to current waiters but
//! never cached.
//!
//! If a leader is dropped mid-computation, its in-flight slot is cleared and
//! one of the waiters takes over as the new leader.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::watch;
use tracing::debug;

use crate::cache::lru::TtlLru;
use crate::errors::{BeadflowError, Result};

type Outcome<V> = std::result::Result<V, String>;

/// Counters for observing cache behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Requests that attached to an in-flight computation.
    pub coalesced: u64,
}

#[derive(Debug)]
struct Inner<K, V> {
    lru: TtlLru<K, V>,
    in_flight: HashMap<K, watch::Receiver<Option<Outcome<V>>>>,
    stats: CacheStats,
}

#[derive(Debug)]
pub struct SingleFlightCache<K, V> {
    inner: Mutex<Inner<K, V>>,
}

enum Role<V> {
    Hit(V),
    Wait(watch::Receiver<Option<Outcome<V>>>),
    Lead(watch::Sender<Option<Outcome<V>>>),
}

impl<K, V> SingleFlightCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                lru: TtlLru::new(capacity, ttl),
                in_flight: HashMap::new(),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Return the cached value for `key`, or compute it exactly once no
    /// matter how many callers ask concurrently.
    pub async fn get_or_compute<F, Fut>(&self, key: K, compute: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let tx = loop {
            match self.acquire(&key) {
                Role::Hit(value) => return Ok(value),
                Role::Lead(tx) => break tx,
                Role::Wait(mut rx) => {
                    let shared = match rx.wait_for(Option::is_some).await {
                        Ok(outcome) => outcome.clone(),
                        Err(_) => {
                            debug!("single-flight leader went away; retrying");
                            continue;
                        }
                    };
                    match shared {
                        Some(Ok(value)) => return Ok(value),
                        Some(Err(message)) => {
                            return Err(BeadflowError::Other(anyhow!(
                                "shared computation failed: {message}"
                            )));
                        }
                        None => continue,
                    }
                }
            }
        };

        let mut guard = FlightGuard {
            cache: self,
            key: Some(key.clone()),
        };

        let result = compute().await;

        {
            let mut inner = self.lock();
            if let Ok(value) = &result {
                inner.lru.insert(key.clone(), value.clone());
            }
            inner.in_flight.remove(&key);
        }
        guard.key = None;

        let shared = match &result {
            Ok(value) => Ok(value.clone()),
            Err(err) => Err(err.to_string()),
        };
        // No receivers left is fine.
        let _ = tx.send(Some(shared));

        result
    }

    /// Cached value without computing.
    pub fn get(&self, key: &K) -> Option<V> {
        self.lock().lru.get(key)
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.lock().lru.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    fn acquire(&self, key: &K) -> Role<V> {
        let mut inner = self.lock();

        if let Some(value) = inner.lru.get(key) {
            inner.stats.hits += 1;
            return Role::Hit(value);
        }

        if let Some(rx) = inner.in_flight.get(key) {
            let rx = rx.clone();
            inner.stats.coalesced += 1;
            return Role::Wait(rx);
        }

        inner.stats.misses += 1;
        let (tx, rx) = watch::channel(None);
        inner.in_flight.insert(key.clone(), rx);
        Role::Lead(tx)
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Clears the in-flight slot if the leader's future is dropped early.
struct FlightGuard<'a, K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    cache: &'a SingleFlightCache<K, V>,
    key: Option<K>,
}

impl<K, V> Drop for FlightGuard<'_, K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.cache.lock().in_flight.remove(&key);
            debug!("single-flight leader dropped before completion");
        }
    }
}
