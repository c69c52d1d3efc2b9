//! Memoizing call cache
//!
//! Results of remote calls are stored under a key made of the operation name
//! and a stable rendering of the call arguments. Freshness is decided when an
//! entry is looked up, against the TTL the caller passes for that call:
//!
//! - [`Ttl::Forever`] keeps the entry for the lifetime of the cache
//! - `Ttl::After(d)` serves the entry while it is younger than `d`
//! - `Ttl::After(0)` never serves from the cache and never stores
//!
//! Failed calls are never stored. [`CallCache::clear`] drops every entry of
//! every memoized operation.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::core::error::ConnectorError;

/// How long a cached result stays usable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ttl {
    /// Never expires
    #[default]
    Forever,
    /// Expires once the entry is this old. Zero disables caching.
    After(Duration),
}

impl Ttl {
    /// Always call through, never store
    pub const REFRESH: Ttl = Ttl::After(Duration::ZERO);

    pub fn secs(secs: u64) -> Self {
        Ttl::After(Duration::from_secs(secs))
    }

    pub fn bypasses_cache(&self) -> bool {
        matches!(self, Ttl::After(d) if d.is_zero())
    }

    fn is_fresh(&self, age: Duration) -> bool {
        match self {
            Ttl::Forever => true,
            Ttl::After(limit) => age < *limit,
        }
    }
}

impl From<Duration> for Ttl {
    fn from(d: Duration) -> Self {
        Ttl::After(d)
    }
}

impl From<Option<Duration>> for Ttl {
    fn from(d: Option<Duration>) -> Self {
        d.map(Ttl::After).unwrap_or(Ttl::Forever)
    }
}

impl From<u64> for Ttl {
    fn from(secs: u64) -> Self {
        Ttl::secs(secs)
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ttl::Forever => write!(f, "forever"),
            Ttl::After(d) => write!(f, "{}s", d.as_secs_f64()),
        }
    }
}

/// Parses `""`, `none`, `forever`, plain seconds (`"30"`, `"0.5"`) and
/// numbers with a unit suffix (`ms`, `s`, `m`, `h`, `d`, `w`)
impl FromStr for Ttl {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("none") || s.eq_ignore_ascii_case("forever") {
            return Ok(Ttl::Forever);
        }

        let split = s
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(s.len());
        let (number, unit) = s.split_at(split);
        let number: f64 = number
            .trim()
            .parse()
            .map_err(|_| ConnectorError::Validation(format!("Invalid TTL '{}'", s)))?;

        let seconds = match unit.trim().to_ascii_lowercase().as_str() {
            "ms" => number / 1000.0,
            "" | "s" | "sec" | "secs" => number,
            "m" | "min" | "mins" => number * 60.0,
            "h" | "hr" | "hrs" => number * 3600.0,
            "d" | "day" | "days" => number * 86_400.0,
            "w" | "week" | "weeks" => number * 604_800.0,
            other => {
                return Err(ConnectorError::Validation(format!(
                    "Invalid TTL unit '{}' in '{}'",
                    other, s
                )))
            }
        };

        Duration::try_from_secs_f64(seconds)
            .map(Ttl::After)
            .map_err(|_| ConnectorError::Validation(format!("TTL out of range: '{}'", s)))
    }
}

/// Identity of one memoized call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    operation: String,
    args: String,
}

impl CacheKey {
    pub fn new(operation: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            args: args.into(),
        }
    }

    /// Key from the JSON rendering of `args`, or `None` if they do not serialize
    pub fn from_args<A: Serialize + ?Sized>(operation: impl Into<String>, args: &A) -> Option<Self> {
        json_keyer(args).map(|args| Self::new(operation, args))
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

/// Default keyer: structural equality through the JSON rendering of the arguments
pub fn json_keyer<A: Serialize + ?Sized>(args: &A) -> Option<String> {
    serde_json::to_string(args).ok()
}

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    stored_at: Instant,
}

/// Process-scoped store shared by every memoized call of a connection
#[derive(Default)]
pub struct CallCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl CallCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key` if it is fresh under `ttl`,
    /// otherwise run `fetch` and store its successful result.
    ///
    /// A `None` key means the arguments could not be rendered; the call goes
    /// straight through and nothing is stored.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        key: Option<CacheKey>,
        ttl: Ttl,
        fetch: F,
    ) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = match key {
            Some(key) if !ttl.bypasses_cache() => key,
            Some(key) => {
                debug!("Cache bypass for {} (ttl=0)", key.operation);
                return fetch().await;
            }
            None => {
                debug!("Cache bypass: arguments have no stable key");
                return fetch().await;
            }
        };

        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(&key) {
                if ttl.is_fresh(entry.stored_at.elapsed()) {
                    if let Some(value) = entry.value.downcast_ref::<T>() {
                        debug!("Cache hit for {}", key.operation);
                        return Ok(value.clone());
                    }
                }
            }
        }

        debug!("Cache miss for {} (ttl={})", key.operation, ttl);
        let value = fetch().await?;

        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            CacheEntry {
                value: Arc::new(value.clone()),
                stored_at: Instant::now(),
            },
        );

        Ok(value)
    }

    /// Drop every entry of every memoized operation
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        let dropped = entries.len();
        entries.clear();
        debug!("Cache cleared ({} entries dropped)", dropped);
    }

    /// Drop entries that are stale under `ttl`, returning how many were removed
    pub async fn purge_expired(&self, ttl: Ttl) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !ttl.bypasses_cache() && ttl.is_fresh(entry.stored_at.elapsed()));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Wrap `fetch` so that calls with equal keys (per `keyer`) share one result
    pub fn memoize<K, F>(
        self: &Arc<Self>,
        operation: impl Into<String>,
        ttl: Ttl,
        keyer: K,
        fetch: F,
    ) -> Memoized<K, F> {
        Memoized {
            cache: Arc::clone(self),
            operation: operation.into(),
            ttl,
            keyer,
            fetch,
        }
    }
}

/// A function bound to a [`CallCache`], see [`CallCache::memoize`]
pub struct Memoized<K, F> {
    cache: Arc<CallCache>,
    operation: String,
    ttl: Ttl,
    keyer: K,
    fetch: F,
}

impl<K, F> Memoized<K, F> {
    pub async fn call<A, T, E, Fut>(&self, args: A) -> Result<T, E>
    where
        K: Fn(&A) -> Option<String>,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Clone + Send + Sync + 'static,
    {
        let key = (self.keyer)(&args).map(|rendered| CacheKey::new(self.operation.as_str(), rendered));
        self.cache
            .get_or_fetch(key, self.ttl, || (self.fetch)(args))
            .await
    }
}
