//! Time-bounded models-list cache with single-flight refresh.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};

use super::error::GatewayError;
use crate::models::generation::ModelDescriptor;

pub const DEFAULT_MODELS_TTL: Duration = Duration::from_secs(3600);

pub type ModelSnapshot = Arc<Vec<ModelDescriptor>>;

/// Source of "now" for freshness checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct CacheEntry {
    snapshot: ModelSnapshot,
    fetched_at: Instant,
}

/// Holds at most one snapshot of an upstream models listing.
///
/// Readers on the fast path only take the read lock. Refreshes are serialized
/// by `refresh_lock`; a caller that waited on the lock while another caller
/// refreshed receives that refresh's outcome instead of fetching again.
pub struct ModelsCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entry: RwLock<Option<CacheEntry>>,
    /// Guards refreshes; holds the error of the last failed refresh, if any.
    refresh_lock: Mutex<Option<GatewayError>>,
    /// Number of completed refresh attempts, successful or not.
    refreshes: AtomicU64,
}

impl ModelsCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entry: RwLock::new(None),
            refresh_lock: Mutex::new(None),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Return the cached snapshot, refreshing through `fetch` when it is
    /// missing, stale, or `force_refresh` is set.
    pub async fn get_or_refresh<F, Fut>(
        &self,
        force_refresh: bool,
        fetch: F,
    ) -> Result<ModelSnapshot, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<ModelDescriptor>, GatewayError>>,
    {
        if !force_refresh {
            if let Some(snapshot) = self.fresh_snapshot().await {
                return Ok(snapshot);
            }
        }

        let seen = self.refreshes.load(Ordering::Acquire);
        let mut last_failure = self.refresh_lock.lock().await;

        if self.refreshes.load(Ordering::Acquire) != seen {
            // Someone else refreshed while we were queued.
            if let Some(err) = last_failure.as_ref() {
                return Err(err.clone());
            }
            if let Some(snapshot) = self.current_snapshot().await {
                return Ok(snapshot);
            }
        }

        if !force_refresh {
            if let Some(snapshot) = self.fresh_snapshot().await {
                return Ok(snapshot);
            }
        }

        let outcome = match fetch().await {
            Ok(models) => {
                let snapshot: ModelSnapshot = Arc::new(models);
                *self.entry.write().await = Some(CacheEntry {
                    snapshot: snapshot.clone(),
                    fetched_at: self.clock.now(),
                });
                *last_failure = None;
                tracing::info!("Refreshed models cache with {} entries", snapshot.len());
                Ok(snapshot)
            }
            Err(e) => {
                *last_failure = Some(e.clone());
                Err(e)
            }
        };
        self.refreshes.fetch_add(1, Ordering::Release);
        outcome
    }

    /// Drop the snapshot so the next read goes to the upstream.
    pub async fn clear(&self) {
        *self.entry.write().await = None;
    }

    async fn fresh_snapshot(&self) -> Option<ModelSnapshot> {
        let entry = self.entry.read().await;
        entry
            .as_ref()
            .filter(|e| self.clock.now().saturating_duration_since(e.fetched_at) < self.ttl)
            .map(|e| e.snapshot.clone())
    }

    async fn current_snapshot(&self) -> Option<ModelSnapshot> {
        self.entry.read().await.as_ref().map(|e| e.snapshot.clone())
    }
}

/// Test clock that only moves when told to.
#[cfg(test)]
pub struct ManualClock {
    base: Instant,
    offset: std::sync::Mutex<Duration>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: std::sync::Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap()
    }
}
