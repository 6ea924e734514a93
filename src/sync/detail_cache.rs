//! Lazy, memoized per-lead detail enrichment.
//!
//! Each key owns one `tokio::sync::OnceCell`: concurrent callers for the
//! same key share a single in-flight fetch, and a resolved entry is never
//! fetched again. Fetch failure stores the typed fallback so downstream
//! rendering never sees a missing entry. The cache is additive — entries
//! only disappear on a scope reset, which detaches the whole map so late
//! responses land in cells nobody can observe.

use crate::api::{ApiClient, LeadDetail};
use crate::sync::SyncError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

type Entry = Arc<OnceCell<LeadDetail>>;

pub struct EntityDetailCache {
    api: ApiClient,
    /// Shared with the controller; compared against the epoch a caller
    /// captured at issue time to discard stale resolutions.
    epoch: Arc<AtomicU64>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl EntityDetailCache {
    pub fn new(api: ApiClient, epoch: Arc<AtomicU64>) -> Self {
        Self {
            api,
            epoch,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the detail for a key, fetching at most once.
    ///
    /// `epoch` is the scope-epoch token captured when the caller issued
    /// the request; if the scope has been invalidated by the time the
    /// fetch resolves, the result is discarded as [`SyncError::StaleScope`].
    pub async fn get(&self, lead_id: &str, epoch: u64) -> Result<LeadDetail, SyncError> {
        let cell = self.entry(lead_id);

        let api = self.api.clone();
        let key = lead_id.to_string();
        let detail = cell
            .get_or_init(|| async move {
                match api.lead_detail(&key).await {
                    Ok(detail) => detail,
                    Err(e) => {
                        tracing::debug!(lead_id = %key, error = %e, "Detail fetch failed, storing fallback");
                        LeadDetail::fallback(&key)
                    }
                }
            })
            .await
            .clone();

        if self.epoch.load(Ordering::Acquire) != epoch {
            tracing::trace!(lead_id, "Discarding detail resolved under a superseded scope");
            return Err(SyncError::StaleScope);
        }
        Ok(detail)
    }

    /// Seed an entry from data already in memory (an event that carries
    /// the same lead). First write wins; seeding an already-resolved key
    /// is a no-op.
    pub fn seed(&self, detail: LeadDetail) {
        let cell = self.entry(&detail.lead_id);
        let _ = cell.set(detail);
    }

    /// Resolved detail for a key, if any. Pending entries return `None`.
    pub fn peek(&self, lead_id: &str) -> Option<LeadDetail> {
        let entries = self.lock_entries();
        entries.get(lead_id).and_then(|cell| cell.get().cloned())
    }

    /// All resolved entries, keyed by lead id.
    pub fn snapshot(&self) -> HashMap<String, LeadDetail> {
        let entries = self.lock_entries();
        entries
            .iter()
            .filter_map(|(key, cell)| cell.get().map(|d| (key.clone(), d.clone())))
            .collect()
    }

    /// Scope reset: detach every entry. In-flight fetches complete into
    /// detached cells and are never observed.
    pub fn reset(&self) {
        self.lock_entries().clear();
    }

    fn entry(&self, lead_id: &str) -> Entry {
        let mut entries = self.lock_entries();
        entries
            .entry(lead_id.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FALLBACK_DISPLAY_NAME;
    use crate::config::Config;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cache_for(server: &MockServer, epoch: Arc<AtomicU64>) -> EntityDetailCache {
        let config = Config {
            base_url: server.uri(),
            ..Config::default()
        };
        EntityDetailCache::new(ApiClient::new(&config).unwrap(), epoch)
    }

    fn detail_json(id: &str, name: &str) -> serde_json::Value {
        serde_json::json!({
            "lead_id": id,
            "user_display_name": name,
            "phone_opt_in": true
        })
    }

    #[tokio::test]
    async fn test_concurrent_gets_issue_one_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lead-details/L1/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(detail_json("L1", "Ada"))
                    .set_delay(std::time::Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let epoch = Arc::new(AtomicU64::new(0));
        let cache = Arc::new(cache_for(&server, epoch));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            tasks.push(tokio::spawn(async move { cache.get("L1", 0).await }));
        }
        for task in tasks {
            let detail = task.await.unwrap().unwrap();
            assert_eq!(detail.user_display_name, "Ada");
        }
        // MockServer verifies expect(1) on drop
    }

    #[tokio::test]
    async fn test_resolved_entry_not_refetched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lead-details/L1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(detail_json("L1", "Ada")))
            .expect(1)
            .mount(&server)
            .await;

        let cache = cache_for(&server, Arc::new(AtomicU64::new(0)));
        cache.get("L1", 0).await.unwrap();
        let again = cache.get("L1", 0).await.unwrap();
        assert_eq!(again.user_display_name, "Ada");
    }

    #[tokio::test]
    async fn test_failure_stores_typed_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let cache = cache_for(&server, Arc::new(AtomicU64::new(0)));
        let detail = cache.get("L404", 0).await.unwrap();
        assert_eq!(detail.lead_id, "L404");
        assert_eq!(detail.user_display_name, FALLBACK_DISPLAY_NAME);
    }

    #[tokio::test]
    async fn test_stale_epoch_discarded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(detail_json("L1", "Ada")))
            .mount(&server)
            .await;

        let epoch = Arc::new(AtomicU64::new(0));
        let cache = cache_for(&server, Arc::clone(&epoch));

        // Scope invalidated while the request is conceptually in flight
        epoch.store(1, Ordering::Release);
        let result = cache.get("L1", 0).await;
        assert!(matches!(result, Err(SyncError::StaleScope)));
    }

    #[tokio::test]
    async fn test_reset_detaches_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(detail_json("L1", "Ada")))
            .mount(&server)
            .await;

        let cache = cache_for(&server, Arc::new(AtomicU64::new(0)));
        cache.get("L1", 0).await.unwrap();
        assert!(cache.peek("L1").is_some());

        cache.reset();
        assert!(cache.peek("L1").is_none());
        assert!(cache.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_seed_prevents_fetch() {
        // No mock mounted: any network call would 404 into a fallback,
        // so a real fetch is distinguishable from the seeded value.
        let server = MockServer::start().await;
        let cache = cache_for(&server, Arc::new(AtomicU64::new(0)));

        let mut seeded = LeadDetail::fallback("L1");
        seeded.user_display_name = "From memory".to_string();
        cache.seed(seeded);

        let detail = cache.get("L1", 0).await.unwrap();
        assert_eq!(detail.user_display_name, "From memory");
    }

    #[tokio::test]
    async fn test_seed_is_first_write_wins() {
        let server = MockServer::start().await;
        let cache = cache_for(&server, Arc::new(AtomicU64::new(0)));

        let mut first = LeadDetail::fallback("L1");
        first.user_display_name = "First".to_string();
        let mut second = LeadDetail::fallback("L1");
        second.user_display_name = "Second".to_string();

        cache.seed(first);
        cache.seed(second);
        assert_eq!(cache.peek("L1").unwrap().user_display_name, "First");
    }
}
