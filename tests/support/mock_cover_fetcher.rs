use column_press::network::{CoverFetcher, FetchError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-memory cover source for tests
///
/// Serves registered bytes per URL and counts every fetch. Unknown URLs
/// fail, and so does every URL after `fail_all(true)`.
#[derive(Default)]
pub struct MockCoverFetcher {
    covers: Mutex<HashMap<String, Vec<u8>>>,
    failing: Mutex<bool>,
    calls: AtomicUsize,
}

impl MockCoverFetcher {
    #[allow(unused)] // Used in tests
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(unused)]
    pub fn with_cover(self, url: &str, bytes: Vec<u8>) -> Self {
        self.covers
            .lock()
            .unwrap()
            .insert(url.to_string(), bytes);
        self
    }

    #[allow(unused)]
    pub fn fail_all(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    #[allow(unused)]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CoverFetcher for MockCoverFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock().unwrap() {
            return Err(FetchError::Other(format!("mock failure for {}", url)));
        }
        self.covers
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Other(format!("no cover registered for {}", url)))
    }
}
