//! Cursor-based bulk page loading.
//!
//! A [`BulkPageLoader`] walks one paginated collection (leads or events)
//! for one scope. It remembers the server-reported total and the opaque
//! `next` cursor; a failed fetch leaves both untouched, so "load more"
//! can simply be re-invoked by the user — there is no automatic retry.

use crate::api::{ApiClient, FetchError, Page, PagedCollection, Scope};
use std::marker::PhantomData;

#[derive(Clone)]
pub struct BulkPageLoader<T> {
    api: ApiClient,
    scope: Scope,
    total_count: u64,
    next_cursor: Option<String>,
    _collection: PhantomData<fn() -> T>,
}

impl<T: PagedCollection> BulkPageLoader<T> {
    pub fn new(api: ApiClient, scope: Scope) -> Self {
        Self {
            api,
            scope,
            total_count: 0,
            next_cursor: None,
            _collection: PhantomData,
        }
    }

    /// Fetch the first page for this loader's scope.
    pub async fn load_first(&mut self) -> Result<Vec<T>, FetchError> {
        let page = self.api.first_page::<T>(&self.scope).await?;
        Ok(self.commit(page))
    }

    /// Fetch the next page via the stored cursor. Returns `Ok(None)` when
    /// the collection is exhausted (no cursor).
    pub async fn load_more(&mut self) -> Result<Option<Vec<T>>, FetchError> {
        let Some(cursor) = self.next_cursor.clone() else {
            return Ok(None);
        };
        let page = self.api.page_at::<T>(&cursor).await?;
        Ok(Some(self.commit(page)))
    }

    /// State advances only here, after a page fetch succeeded.
    fn commit(&mut self, page: Page<T>) -> Vec<T> {
        self.total_count = page.count;
        self.next_cursor = page.next;
        if !self.has_more() {
            tracing::debug!(collection = T::PATH, total = self.total_count, "Collection exhausted");
        }
        page.results
    }

    /// Server-authoritative total for the collection, independent of how
    /// many records are loaded. Bumped by the delta poller as new events
    /// are merged.
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub(crate) fn add_total(&mut self, n: u64) {
        self.total_count += n;
    }

    /// Whether another page is available. `false` before the first load
    /// and after exhaustion — in both cases the load-more affordance is
    /// disabled.
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiClient, LeadSummary};
    use crate::config::Config;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ApiClient {
        let config = Config {
            base_url: server.uri(),
            ..Config::default()
        };
        ApiClient::new(&config).unwrap()
    }

    fn lead_json(id: &str) -> serde_json::Value {
        serde_json::json!({
            "lead_id": id,
            "business_id": "B1",
            "processed_at": "2026-08-01T10:00:00Z"
        })
    }

    fn page_json(ids: &[&str], count: u64, next: Option<String>) -> serde_json::Value {
        serde_json::json!({
            "count": count,
            "next": next,
            "previous": null,
            "results": ids.iter().map(|id| lead_json(id)).collect::<Vec<_>>()
        })
    }

    #[tokio::test]
    async fn test_load_first_then_more_until_exhausted() {
        let server = MockServer::start().await;
        let page2_url = format!("{}/processed_leads/?page=2", server.uri());

        Mock::given(method("GET"))
            .and(path("/processed_leads/"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page_json(&["C", "D"], 4, None)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/processed_leads/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(page_json(&["A", "B"], 4, Some(page2_url))),
            )
            .mount(&server)
            .await;

        let mut loader = BulkPageLoader::<LeadSummary>::new(client_for(&server), Scope::All);
        assert!(!loader.has_more());

        let first = loader.load_first().await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(loader.total_count(), 4);
        assert!(loader.has_more());

        let second = loader.load_more().await.unwrap().unwrap();
        assert_eq!(second[0].lead_id, "C");
        assert!(!loader.has_more());

        // Exhausted: no further request is issued
        let third = loader.load_more().await.unwrap();
        assert!(third.is_none());
    }

    #[tokio::test]
    async fn test_failed_load_leaves_state_untouched() {
        let server = MockServer::start().await;
        let page2_url = format!("{}/processed_leads/?page=2", server.uri());

        Mock::given(method("GET"))
            .and(path("/processed_leads/"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/processed_leads/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(page_json(&["A"], 3, Some(page2_url.clone()))),
            )
            .mount(&server)
            .await;

        let mut loader = BulkPageLoader::<LeadSummary>::new(client_for(&server), Scope::All);
        loader.load_first().await.unwrap();

        let err = loader.load_more().await.unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus(500)));

        // Cursor and total survive the failure; a manual retry still works
        assert!(loader.has_more());
        assert_eq!(loader.total_count(), 3);
    }

    #[tokio::test]
    async fn test_scope_forwarded_on_first_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/processed_leads/"))
            .and(query_param("business_id", "B9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_json(&[], 0, None)))
            .mount(&server)
            .await;

        let mut loader = BulkPageLoader::<LeadSummary>::new(
            client_for(&server),
            Scope::Business("B9".to_string()),
        );
        let items = loader.load_first().await.unwrap();
        assert!(items.is_empty());
        assert_eq!(loader.total_count(), 0);
    }
}
