//! Mock media manager client for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::remote::{ClientError, MediaItem, MediaManagerClient, SearchCategory, Server};

/// A recorded search command for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSearch {
    pub server_id: String,
    pub category: SearchCategory,
    pub item_ids: Vec<i64>,
}

/// How a server answers list queries.
#[derive(Debug, Clone)]
enum ListBehavior {
    Fail(ClientError),
    /// Never resolves; used to exercise cancellation.
    Hang,
}

/// Mock implementation of [`MediaManagerClient`].
///
/// Provides controllable behavior for testing:
/// - Configurable missing / cutoff lists per server id
/// - Per-server list failures or hangs
/// - Scripted responses for search submissions (default: accepted)
/// - Recorded search commands, in call order
///
/// # Example
///
/// ```rust,ignore
/// use scoutarr_core::testing::{MockMediaClient, fixtures};
///
/// let client = MockMediaClient::new();
/// client.set_missing("radarr", fixtures::movies(1, 5)).await;
/// client
///     .script_searches("radarr", vec![Err(ClientError::RateLimited { retry_after: None }), Ok(())])
///     .await;
///
/// // ... run a cycle ...
///
/// assert_eq!(client.recorded_searches().await.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct MockMediaClient {
    missing: Arc<RwLock<HashMap<String, Vec<MediaItem>>>>,
    cutoff: Arc<RwLock<HashMap<String, Vec<MediaItem>>>>,
    list_behavior: Arc<RwLock<HashMap<String, ListBehavior>>>,
    search_script: Arc<RwLock<HashMap<String, VecDeque<Result<(), ClientError>>>>>,
    searches: Arc<RwLock<Vec<RecordedSearch>>>,
    list_delay: Arc<RwLock<Option<Duration>>>,
    list_calls: AtomicUsize,
}

impl MockMediaClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the missing list returned for a server.
    pub async fn set_missing(&self, server_id: &str, items: Vec<MediaItem>) {
        self.missing
            .write()
            .await
            .insert(server_id.to_string(), items);
    }

    /// Set the cutoff-unmet list returned for a server.
    pub async fn set_cutoff(&self, server_id: &str, items: Vec<MediaItem>) {
        self.cutoff
            .write()
            .await
            .insert(server_id.to_string(), items);
    }

    /// Make both list queries fail for a server.
    pub async fn fail_lists(&self, server_id: &str, error: ClientError) {
        self.list_behavior
            .write()
            .await
            .insert(server_id.to_string(), ListBehavior::Fail(error));
    }

    /// Make both list queries for a server never complete.
    pub async fn hang_lists(&self, server_id: &str) {
        self.list_behavior
            .write()
            .await
            .insert(server_id.to_string(), ListBehavior::Hang);
    }

    /// Delay every list query (tokio timer).
    pub async fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.write().await = Some(delay);
    }

    /// Queue responses for the next search submissions to a server.
    ///
    /// Once the queue is drained, submissions succeed.
    pub async fn script_searches(&self, server_id: &str, responses: Vec<Result<(), ClientError>>) {
        self.search_script
            .write()
            .await
            .entry(server_id.to_string())
            .or_default()
            .extend(responses);
    }

    /// Every search submission received, in call order.
    pub async fn recorded_searches(&self) -> Vec<RecordedSearch> {
        self.searches.read().await.clone()
    }

    /// Search submissions received for one server.
    pub async fn searches_for(&self, server_id: &str) -> Vec<RecordedSearch> {
        self.searches
            .read()
            .await
            .iter()
            .filter(|s| s.server_id == server_id)
            .cloned()
            .collect()
    }

    /// Number of list queries received (missing and cutoff combined).
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    async fn list(
        &self,
        server: &Server,
        source: &RwLock<HashMap<String, Vec<MediaItem>>>,
    ) -> Result<Vec<MediaItem>, ClientError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = *self.list_delay.read().await {
            tokio::time::sleep(delay).await;
        }

        let behavior = self.list_behavior.read().await.get(&server.id).cloned();
        match behavior {
            Some(ListBehavior::Fail(error)) => return Err(error),
            Some(ListBehavior::Hang) => std::future::pending::<()>().await,
            None => {}
        }

        Ok(source
            .read()
            .await
            .get(&server.id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl MediaManagerClient for MockMediaClient {
    async fn list_missing(&self, server: &Server) -> Result<Vec<MediaItem>, ClientError> {
        self.list(server, &self.missing).await
    }

    async fn list_cutoff_unmet(&self, server: &Server) -> Result<Vec<MediaItem>, ClientError> {
        self.list(server, &self.cutoff).await
    }

    async fn trigger_search(
        &self,
        server: &Server,
        category: SearchCategory,
        item_ids: &[i64],
    ) -> Result<(), ClientError> {
        self.searches.write().await.push(RecordedSearch {
            server_id: server.id.clone(),
            category,
            item_ids: item_ids.to_vec(),
        });

        self.search_script
            .write()
            .await
            .get_mut(&server.id)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MediaKind;
    use crate::testing::fixtures;

    #[tokio::test]
    async fn test_lists_default_to_empty() {
        let client = MockMediaClient::new();
        let server = fixtures::server("radarr", MediaKind::MovieManager);

        assert!(client.list_missing(&server).await.unwrap().is_empty());
        assert!(client.list_cutoff_unmet(&server).await.unwrap().is_empty());
        assert_eq!(client.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_scripted_searches_then_success() {
        let client = MockMediaClient::new();
        let server = fixtures::server("radarr", MediaKind::MovieManager);
        client
            .script_searches("radarr", vec![Err(ClientError::Timeout)])
            .await;

        let first = client
            .trigger_search(&server, SearchCategory::MissingMovies, &[1, 2])
            .await;
        let second = client
            .trigger_search(&server, SearchCategory::MissingMovies, &[3])
            .await;

        assert!(matches!(first, Err(ClientError::Timeout)));
        assert!(second.is_ok());

        let searches = client.recorded_searches().await;
        assert_eq!(searches.len(), 2);
        assert_eq!(searches[0].item_ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_failed_lists() {
        let client = MockMediaClient::new();
        let server = fixtures::server("sonarr", MediaKind::EpisodeManager);
        client
            .fail_lists("sonarr", ClientError::Unauthorized("HTTP 401".into()))
            .await;

        assert!(client.list_missing(&server).await.is_err());
        assert!(client.list_cutoff_unmet(&server).await.is_err());
    }
}
