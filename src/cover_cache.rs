use crate::network::{CoverFetcher, FetchError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

type CoverCell = Arc<OnceCell<Arc<[u8]>>>;

/// Run-scoped memo of cover images keyed by source URL
///
/// One instance lives for one assembly or tagging batch and is passed by
/// reference to whoever needs covers. Entries are never evicted.
///
/// Each URL gets its own async cell, so concurrent callers asking for the
/// same URL wait on a single in-flight fetch instead of starting their own.
/// A failed fetch leaves the cell empty; the next caller fetches again.
pub struct CoverCache {
    fetcher: Arc<dyn CoverFetcher>,
    entries: Mutex<HashMap<String, CoverCell>>,
    fetches: AtomicUsize,
    hits: AtomicUsize,
}

impl CoverCache {
    pub fn new(fetcher: Arc<dyn CoverFetcher>) -> Self {
        CoverCache {
            fetcher,
            entries: Mutex::new(HashMap::new()),
            fetches: AtomicUsize::new(0),
            hits: AtomicUsize::new(0),
        }
    }

    /// Get cover bytes for a URL, fetching them on first use
    pub async fn fetch(&self, url: &str) -> Result<Arc<[u8]>, FetchError> {
        let cell = {
            let mut entries = self.entries.lock().await;
            entries.entry(url.to_string()).or_default().clone()
        };

        if let Some(bytes) = cell.get() {
            debug!("Cover cache hit for {}", url);
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(bytes.clone());
        }

        let fetched_here = AtomicBool::new(false);
        let bytes = cell
            .get_or_try_init(|| async {
                fetched_here.store(true, Ordering::Relaxed);
                debug!("Cover cache miss for {}", url);
                self.fetches.fetch_add(1, Ordering::Relaxed);
                let data = self.fetcher.fetch(url).await?;
                info!("Cached cover ({} bytes) for {}", data.len(), url);
                Ok::<Arc<[u8]>, FetchError>(Arc::from(data))
            })
            .await?;

        if !fetched_here.load(Ordering::Relaxed) {
            // Another caller finished the fetch while we waited on the cell
            self.hits.fetch_add(1, Ordering::Relaxed);
        }

        Ok(bytes.clone())
    }

    /// Check whether a URL has been fetched successfully in this run
    pub async fn contains(&self, url: &str) -> bool {
        let entries = self.entries.lock().await;
        entries
            .get(url)
            .map(|cell| cell.initialized())
            .unwrap_or(false)
    }

    /// Number of fetches handed to the transport
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    pub async fn get_stats(&self) -> CoverCacheStats {
        let entries = self.entries.lock().await;
        CoverCacheStats {
            cached_covers: entries.values().filter(|cell| cell.initialized()).count(),
            total_size_bytes: entries
                .values()
                .filter_map(|cell| cell.get())
                .map(|bytes| bytes.len() as u64)
                .sum(),
            fetches: self.fetches.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
        }
    }
}

/// Cover cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverCacheStats {
    pub cached_covers: usize,
    pub total_size_bytes: u64,
    pub fetches: usize,
    pub hits: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Counts calls and fails for URLs containing "broken"
    struct SlowFetcher {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CoverFetcher for SlowFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if url.contains("broken") {
                return Err(FetchError::Other(format!("cannot fetch {}", url)));
            }
            Ok(url.as_bytes().to_vec())
        }
    }

    fn cache() -> (Arc<SlowFetcher>, CoverCache) {
        let fetcher = Arc::new(SlowFetcher {
            calls: AtomicUsize::new(0),
        });
        let cache = CoverCache::new(fetcher.clone());
        (fetcher, cache)
    }

    #[tokio::test]
    async fn test_second_lookup_is_served_from_cache() {
        let (fetcher, cache) = cache();

        let first = cache.fetch("https://img/a.jpg").await.unwrap();
        let second = cache.fetch("https://img/a.jpg").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.fetch_count(), 1);
        assert!(cache.contains("https://img/a.jpg").await);
    }

    #[tokio::test]
    async fn test_distinct_urls_fetch_separately() {
        let (fetcher, cache) = cache();

        cache.fetch("https://img/a.jpg").await.unwrap();
        cache.fetch("https://img/b.jpg").await.unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        let stats = cache.get_stats().await;
        assert_eq!(stats.cached_covers, 2);
        assert_eq!(stats.hits, 0);
    }

    #[tokio::test]
    async fn test_concurrent_lookups_share_one_fetch() {
        let (fetcher, cache) = cache();

        let results = futures::future::join_all(
            (0..8).map(|_| cache.fetch("https://img/shared.jpg")),
        )
        .await;

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        let expected: Arc<[u8]> = Arc::from(b"https://img/shared.jpg".to_vec());
        for result in results {
            assert_eq!(result.unwrap(), expected);
        }
        assert_eq!(cache.get_stats().await.hits, 7);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let (fetcher, cache) = cache();

        assert!(cache.fetch("https://img/broken.jpg").await.is_err());
        assert!(!cache.contains("https://img/broken.jpg").await);
        assert!(cache.fetch("https://img/broken.jpg").await.is_err());

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }
}
