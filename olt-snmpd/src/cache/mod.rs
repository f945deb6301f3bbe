pub mod backend;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use serde::de::DeserializeOwned;
use serde::Serialize;
use self::backend::CacheBackend;

/// The three cached views. Each renders to its own key namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    PortList { board: u8, pon: u8 },
    FreeSlots { board: u8, pon: u8 },
    Detail { board: u8, pon: u8, onu_id: u32 },
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PortList { board, pon } => write!(f, "board_{}_pon_{}", board, pon),
            Self::FreeSlots { board, pon } => write!(f, "board_{}_pon_{}_empty_onu_id", board, pon),
            Self::Detail { board, pon, onu_id } => {
                write!(f, "board_{}_pon_{}_onu_{}", board, pon, onu_id)
            }
        }
    }
}

/// Get-or-compute over a `CacheBackend`.
///
/// The cache is an optimization only: backend faults, backend calls slower
/// than `timeout` and undecodable entries count as misses and are logged,
/// never returned.
#[derive(Clone)]
pub struct ReadThroughCache {
    backend: Arc<dyn CacheBackend>,
    prefix: String,
    timeout: Duration,
}

impl ReadThroughCache {
    pub fn new(backend: Arc<dyn CacheBackend>, prefix: impl Into<String>, timeout: Duration) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            timeout,
        }
    }

    fn render(&self, key: CacheKey) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Serve `key` from the backend, or run `compute`, store its result for
    /// `ttl` and return it. A failed compute is returned as-is and not stored.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: CacheKey,
        ttl: Duration,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let rendered = self.render(key);

        if let Some(value) = self.lookup(&rendered).await {
            tracing::debug!("Cache hit for {}", rendered);
            return Ok(value);
        }
        tracing::debug!("Cache miss for {}", rendered);

        let value = compute().await?;
        self.write(&rendered, &value, ttl).await;
        Ok(value)
    }

    /// Overwrite `key` regardless of what it holds
    pub async fn store<T: Serialize>(&self, key: CacheKey, value: &T, ttl: Duration) {
        let rendered = self.render(key);
        self.write(&rendered, value, ttl).await;
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match tokio::time::timeout(self.timeout, self.backend.get(key)).await {
            Ok(Ok(bytes)) => bytes?,
            Ok(Err(e)) => {
                tracing::warn!("Cache read for {} failed, treating as miss: {}", key, e);
                return None;
            }
            Err(_) => {
                tracing::warn!("Cache read for {} exceeded {:?}, treating as miss", key, self.timeout);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Discarding undecodable cache entry {}: {}", key, e);
                None
            }
        }
    }

    async fn write<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Failed to serialize cache entry {}: {}", key, e);
                return;
            }
        };

        match tokio::time::timeout(self.timeout, self.backend.set(key, bytes, ttl)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Cache write for {} failed: {}", key, e),
            Err(_) => tracing::warn!("Cache write for {} exceeded {:?}, skipped", key, self.timeout),
        }
    }
}
