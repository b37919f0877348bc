//! Search submission: plan from detection output, then submit or simulate.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::clock::Clock;
use crate::config::{SearchLimits, TriggerConfig};
use crate::detector::DetectionResults;
use crate::remote::{MediaManagerClient, SearchCategory, Server};

use super::allocation::allocate;
use super::types::{RateLimitNotice, TriggerError, TriggerResult, TriggerResults};

/// One batched submission decided by the allocation step.
#[derive(Debug, Clone)]
struct PlannedSearch {
    server: Server,
    category: SearchCategory,
    item_ids: Vec<i64>,
}

impl PlannedSearch {
    fn succeeded(&self) -> TriggerResult {
        self.outcome(None)
    }

    fn failed(&self, error: String) -> TriggerResult {
        self.outcome(Some(error))
    }

    fn outcome(&self, error: Option<String>) -> TriggerResult {
        TriggerResult {
            server_id: self.server.id.clone(),
            server_name: self.server.name.clone(),
            category: self.category,
            count: self.item_ids.len(),
            item_ids: self.item_ids.clone(),
            success: error.is_none(),
            error,
        }
    }
}

/// Build the submission plan.
///
/// Categories in [`SearchCategory::ALL`] order, servers in detection order.
/// Servers whose detection failed take no part.
fn plan(detection: &DetectionResults, limits: &SearchLimits) -> Result<Vec<PlannedSearch>, TriggerError> {
    let mut seen = HashSet::new();
    for result in &detection.results {
        if !seen.insert(result.server_id.as_str()) {
            return Err(TriggerError::InvalidInput(format!(
                "duplicate server id in detection results: {}",
                result.server_id
            )));
        }
    }

    let mut planned = Vec::new();
    for category in SearchCategory::ALL {
        let eligible: Vec<_> = detection
            .results
            .iter()
            .filter(|r| r.is_success() && r.kind == category.kind())
            .collect();

        let available: Vec<usize> = eligible
            .iter()
            .map(|r| r.items(category.reason()).len())
            .collect();
        let allocation = allocate(&available, limits.for_category(category) as usize);

        for (result, count) in eligible.into_iter().zip(allocation) {
            if count == 0 {
                continue;
            }
            planned.push(PlannedSearch {
                server: result.server.clone(),
                category,
                item_ids: result.items(category.reason())[..count]
                    .iter()
                    .map(|item| item.id)
                    .collect(),
            });
        }
    }

    Ok(planned)
}

/// Decides how many searches to issue per server and issues them.
pub struct SearchTrigger {
    client: Arc<dyn MediaManagerClient>,
    clock: Arc<dyn Clock>,
    config: TriggerConfig,
}

impl SearchTrigger {
    pub fn new(
        client: Arc<dyn MediaManagerClient>,
        clock: Arc<dyn Clock>,
        config: TriggerConfig,
    ) -> Self {
        Self {
            client,
            clock,
            config,
        }
    }

    /// Allocate and submit searches for one cycle.
    ///
    /// Dry-run computes the same plan and reports it as if every submission
    /// succeeded, without calling the remote or waiting. Submission failures
    /// are reported inside the returned [`TriggerResults`].
    pub async fn trigger(
        &self,
        cancel: &CancellationToken,
        detection: &DetectionResults,
        limits: &SearchLimits,
        dry_run: bool,
    ) -> Result<TriggerResults, TriggerError> {
        let planned = plan(detection, limits)?;

        if cancel.is_cancelled() {
            return Err(TriggerError::Aborted {
                partial: Box::new(TriggerResults::from_results(Vec::new(), Vec::new(), dry_run)),
            });
        }

        if dry_run {
            let results = planned.iter().map(PlannedSearch::succeeded).collect();
            return Ok(TriggerResults::from_results(results, Vec::new(), true));
        }

        let mut session = Session::default();
        for search in &planned {
            if let Err(()) = self.submit(cancel, search, &mut session).await {
                return Err(TriggerError::Aborted {
                    partial: Box::new(session.finish()),
                });
            }
        }

        Ok(session.finish())
    }

    /// Submit one planned search, retrying on rate limits.
    ///
    /// `Err(())` means cancellation fired.
    async fn submit(
        &self,
        cancel: &CancellationToken,
        search: &PlannedSearch,
        session: &mut Session,
    ) -> Result<(), ()> {
        let server_id = &search.server.id;

        if session.abandoned.contains(server_id) {
            session.results.push(search.failed(format!(
                "skipped: server abandoned after {} consecutive rate-limited responses",
                self.config.max_consecutive_rate_limits
            )));
            return Ok(());
        }

        let mut after_backoff = false;
        loop {
            if session.calls > 0 && !after_backoff {
                self.pause(cancel, Duration::from_millis(self.config.submission_delay_ms))
                    .await?;
            }
            session.calls += 1;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(()),
                outcome = self.client.trigger_search(&search.server, search.category, &search.item_ids) => outcome,
            };

            match outcome {
                Ok(()) => {
                    session.consecutive.insert(server_id.clone(), 0);
                    session.results.push(search.succeeded());
                    return Ok(());
                }
                Err(e) if e.is_rate_limited() => {
                    let consecutive = session.consecutive.entry(server_id.clone()).or_insert(0);
                    *consecutive += 1;
                    let consecutive = *consecutive;

                    session.rate_limits.push(RateLimitNotice {
                        server_id: server_id.clone(),
                        category: search.category,
                        retry_after: e.retry_after(),
                        consecutive,
                    });

                    if consecutive >= self.config.max_consecutive_rate_limits {
                        session.abandoned.insert(server_id.clone());
                        session.results.push(search.failed(format!(
                            "{}; abandoned after {} consecutive rate-limited responses",
                            e, consecutive
                        )));
                        return Ok(());
                    }

                    let wait = e
                        .retry_after()
                        .unwrap_or(Duration::from_secs(self.config.rate_limit_backoff_secs));
                    debug!(
                        server = %server_id,
                        category = %search.category,
                        consecutive,
                        wait_ms = wait.as_millis() as u64,
                        "Rate limited, backing off"
                    );
                    self.pause(cancel, wait).await?;
                    after_backoff = true;
                }
                Err(e) => {
                    session.consecutive.insert(server_id.clone(), 0);
                    session.results.push(search.failed(e.to_string()));
                    return Ok(());
                }
            }
        }
    }

    async fn pause(&self, cancel: &CancellationToken, duration: Duration) -> Result<(), ()> {
        if duration.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(()),
            _ = self.clock.sleep(duration) => Ok(()),
        }
    }
}

/// Per-call bookkeeping. Rate-limit counters never outlive one trigger call.
#[derive(Default)]
struct Session {
    results: Vec<TriggerResult>,
    rate_limits: Vec<RateLimitNotice>,
    consecutive: HashMap<String, u32>,
    abandoned: HashSet<String>,
    calls: usize,
}

impl Session {
    fn finish(self) -> TriggerResults {
        TriggerResults::from_results(self.results, self.rate_limits, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectionResult;
    use crate::remote::{ClientError, MediaKind};
    use crate::testing::{fixtures, ManualClock, MockMediaClient};

    fn config() -> TriggerConfig {
        TriggerConfig {
            submission_delay_ms: 100,
            rate_limit_backoff_secs: 30,
            max_consecutive_rate_limits: 3,
        }
    }

    fn setup() -> (Arc<MockMediaClient>, Arc<ManualClock>, SearchTrigger) {
        let client = Arc::new(MockMediaClient::new());
        let clock = Arc::new(ManualClock::auto_advance());
        let trigger = SearchTrigger::new(client.clone(), clock.clone(), config());
        (client, clock, trigger)
    }

    fn movies_detection(counts: &[(&str, usize)]) -> DetectionResults {
        DetectionResults::from_results(
            counts
                .iter()
                .enumerate()
                .map(|(n, (id, count))| {
                    let server = fixtures::server(id, MediaKind::MovieManager);
                    DetectionResult::success(&server, fixtures::movies(n as i64 * 1000, *count), Vec::new())
                })
                .collect(),
        )
    }

    fn limits(missing_movies: u32) -> SearchLimits {
        SearchLimits {
            missing_movies,
            missing_episodes: 0,
            cutoff_movies: 0,
            cutoff_episodes: 0,
        }
    }

    #[tokio::test]
    async fn test_proportional_submission_example() {
        let (client, _clock, trigger) = setup();
        let detection = movies_detection(&[("a", 90), ("b", 10), ("c", 0)]);

        let results = trigger
            .trigger(&CancellationToken::new(), &detection, &limits(10), false)
            .await
            .unwrap();

        assert_eq!(results.missing_triggered, 10);
        assert_eq!(results.allocated("a", SearchCategory::MissingMovies), 9);
        assert_eq!(results.allocated("b", SearchCategory::MissingMovies), 1);
        assert_eq!(results.allocated("c", SearchCategory::MissingMovies), 0);

        // One batched call per server, first items in detection order
        let searches = client.recorded_searches().await;
        assert_eq!(searches.len(), 2);
        assert_eq!(searches[0].server_id, "a");
        assert_eq!(searches[0].item_ids, (0..9).collect::<Vec<i64>>());
        assert_eq!(searches[1].server_id, "b");
        assert_eq!(searches[1].item_ids, vec![1000]);
    }

    #[tokio::test]
    async fn test_submission_delay_between_calls() {
        let (_client, clock, trigger) = setup();
        let detection = movies_detection(&[("a", 2), ("b", 2), ("c", 2)]);

        trigger
            .trigger(&CancellationToken::new(), &detection, &limits(10), false)
            .await
            .unwrap();

        assert_eq!(
            clock.recorded_sleeps(),
            vec![Duration::from_millis(100), Duration::from_millis(100)]
        );
    }

    #[tokio::test]
    async fn test_categories_are_independent() {
        let (client, _clock, trigger) = setup();
        let radarr = fixtures::server("radarr", MediaKind::MovieManager);
        let sonarr = fixtures::server("sonarr", MediaKind::EpisodeManager);
        let detection = DetectionResults::from_results(vec![
            DetectionResult::success(&radarr, fixtures::movies(1, 5), fixtures::movies(100, 5)),
            DetectionResult::success(&sonarr, fixtures::episodes(200, 5), fixtures::episodes(300, 5)),
        ]);
        let limits = SearchLimits {
            missing_movies: 2,
            missing_episodes: 3,
            cutoff_movies: 0,
            cutoff_episodes: 1,
        };

        let results = trigger
            .trigger(&CancellationToken::new(), &detection, &limits, false)
            .await
            .unwrap();

        assert_eq!(results.missing_triggered, 5);
        assert_eq!(results.cutoff_triggered, 1);

        let categories: Vec<_> = client
            .recorded_searches()
            .await
            .into_iter()
            .map(|s| (s.server_id, s.category, s.item_ids.len()))
            .collect();
        assert_eq!(
            categories,
            vec![
                ("radarr".to_string(), SearchCategory::MissingMovies, 2),
                ("sonarr".to_string(), SearchCategory::MissingEpisodes, 3),
                ("sonarr".to_string(), SearchCategory::CutoffEpisodes, 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_detection_servers_are_excluded() {
        let (client, _clock, trigger) = setup();
        let ok = fixtures::server("ok", MediaKind::MovieManager);
        let broken = fixtures::server("broken", MediaKind::MovieManager);
        let detection = DetectionResults::from_results(vec![
            DetectionResult::failure(&broken, "Request timeout".to_string()),
            DetectionResult::success(&ok, fixtures::movies(1, 3), Vec::new()),
        ]);

        let results = trigger
            .trigger(&CancellationToken::new(), &detection, &limits(10), false)
            .await
            .unwrap();

        assert_eq!(results.results.len(), 1);
        assert_eq!(results.results[0].server_id, "ok");
        assert_eq!(client.searches_for("broken").await.len(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_matches_live_counts_without_writes() {
        let detection = movies_detection(&[("a", 40), ("b", 7), ("c", 3)]);

        let (live_client, _clock, live) = setup();
        let live_results = live
            .trigger(&CancellationToken::new(), &detection, &limits(12), false)
            .await
            .unwrap();

        let (dry_client, dry_clock, dry) = setup();
        let dry_results = dry
            .trigger(&CancellationToken::new(), &detection, &limits(12), true)
            .await
            .unwrap();

        assert!(dry_results.dry_run);
        assert_eq!(dry_results.missing_triggered, live_results.missing_triggered);
        assert_eq!(dry_results.cutoff_triggered, live_results.cutoff_triggered);
        assert_eq!(dry_results.results, live_results.results);

        assert_eq!(live_client.recorded_searches().await.len(), 3);
        assert!(dry_client.recorded_searches().await.is_empty());
        assert!(dry_clock.recorded_sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_retry_honors_retry_after() {
        let (client, clock, trigger) = setup();
        client
            .script_searches(
                "a",
                vec![Err(ClientError::RateLimited {
                    retry_after: Some(Duration::from_secs(5)),
                })],
            )
            .await;
        let detection = movies_detection(&[("a", 3)]);

        let results = trigger
            .trigger(&CancellationToken::new(), &detection, &limits(10), false)
            .await
            .unwrap();

        assert_eq!(results.failure_count, 0);
        assert_eq!(results.missing_triggered, 3);
        assert_eq!(results.rate_limits.len(), 1);
        assert_eq!(client.recorded_searches().await.len(), 2);
        assert_eq!(clock.recorded_sleeps(), vec![Duration::from_secs(5)]);
    }

    #[tokio::test]
    async fn test_rate_limit_default_backoff() {
        let (client, clock, trigger) = setup();
        client
            .script_searches("a", vec![Err(ClientError::RateLimited { retry_after: None })])
            .await;

        trigger
            .trigger(
                &CancellationToken::new(),
                &movies_detection(&[("a", 1)]),
                &limits(10),
                false,
            )
            .await
            .unwrap();

        assert_eq!(clock.recorded_sleeps(), vec![Duration::from_secs(30)]);
    }

    #[tokio::test]
    async fn test_rate_limit_escalation_abandons_server() {
        let (client, _clock, trigger) = setup();
        let rate_limited = || Err(ClientError::RateLimited { retry_after: None });
        client
            .script_searches("a", vec![rate_limited(), rate_limited(), rate_limited()])
            .await;

        let radarr = fixtures::server("a", MediaKind::MovieManager);
        let other = fixtures::server("b", MediaKind::MovieManager);
        let detection = DetectionResults::from_results(vec![
            DetectionResult::success(&radarr, fixtures::movies(1, 4), fixtures::movies(50, 4)),
            DetectionResult::success(&other, fixtures::movies(100, 4), Vec::new()),
        ]);
        let limits = SearchLimits {
            missing_movies: 20,
            missing_episodes: 0,
            cutoff_movies: 20,
            cutoff_episodes: 0,
        };

        let results = trigger
            .trigger(&CancellationToken::new(), &detection, &limits, false)
            .await
            .unwrap();

        // Three attempts at a/missing-movies, nothing afterwards
        assert_eq!(client.searches_for("a").await.len(), 3);
        assert_eq!(client.searches_for("b").await.len(), 1);

        let a_missing: Vec<_> = results
            .results
            .iter()
            .filter(|r| r.server_id == "a" && r.category == SearchCategory::MissingMovies)
            .collect();
        assert_eq!(a_missing.len(), 1);
        assert!(!a_missing[0].success);

        let a_cutoff: Vec<_> = results
            .results
            .iter()
            .filter(|r| r.server_id == "a" && r.category == SearchCategory::CutoffMovies)
            .collect();
        assert_eq!(a_cutoff.len(), 1);
        assert!(!a_cutoff[0].success);
        assert!(a_cutoff[0].error.as_deref().unwrap().contains("abandoned"));

        assert_eq!(results.failure_count, 2);
        assert_eq!(results.missing_triggered, 4);
        assert_eq!(results.rate_limits.len(), 3);
        assert_eq!(results.rate_limits[2].consecutive, 3);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_counter() {
        let (client, _clock, trigger) = setup();
        let rate_limited = || Err(ClientError::RateLimited { retry_after: None });
        // two limits, success, then two more: never three in a row
        client
            .script_searches(
                "a",
                vec![rate_limited(), rate_limited(), Ok(()), rate_limited(), rate_limited()],
            )
            .await;

        let server = fixtures::server("a", MediaKind::MovieManager);
        let detection = DetectionResults::from_results(vec![DetectionResult::success(
            &server,
            fixtures::movies(1, 2),
            fixtures::movies(10, 2),
        )]);
        let limits = SearchLimits {
            missing_movies: 5,
            missing_episodes: 0,
            cutoff_movies: 5,
            cutoff_episodes: 0,
        };

        let results = trigger
            .trigger(&CancellationToken::new(), &detection, &limits, false)
            .await
            .unwrap();

        assert_eq!(results.failure_count, 0);
        assert_eq!(results.total_triggered(), 4);
        assert_eq!(client.recorded_searches().await.len(), 6);
    }

    #[tokio::test]
    async fn test_other_errors_are_isolated() {
        let (client, _clock, trigger) = setup();
        client
            .script_searches("a", vec![Err(ClientError::Unauthorized("HTTP 401".to_string()))])
            .await;
        let detection = movies_detection(&[("a", 5), ("b", 5)]);

        let results = trigger
            .trigger(&CancellationToken::new(), &detection, &limits(10), false)
            .await
            .unwrap();

        assert_eq!(results.failure_count, 1);
        assert_eq!(results.missing_triggered, 5);
        assert!(results.results[0]
            .error
            .as_deref()
            .unwrap()
            .contains("Authentication rejected"));
        assert!(results.results[1].success);
    }

    #[tokio::test]
    async fn test_duplicate_server_ids_rejected() {
        let (_client, _clock, trigger) = setup();
        let detection = movies_detection(&[("a", 1), ("a", 2)]);

        let err = trigger
            .trigger(&CancellationToken::new(), &detection, &limits(10), false)
            .await
            .unwrap_err();
        assert!(matches!(err, TriggerError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_cancellation_during_backoff_returns_partial() {
        let client = Arc::new(MockMediaClient::new());
        let clock = Arc::new(ManualClock::new());
        let trigger = Arc::new(SearchTrigger::new(client.clone(), clock.clone(), config()));

        client
            .script_searches("b", vec![Err(ClientError::RateLimited { retry_after: None })])
            .await;
        let detection = movies_detection(&[("a", 1), ("b", 1)]);
        let cancel = CancellationToken::new();

        let task = {
            let trigger = Arc::clone(&trigger);
            let cancel = cancel.clone();
            tokio::spawn(async move { trigger.trigger(&cancel, &detection, &limits(10), false).await })
        };

        // submission delay before b
        clock.wait_for_sleepers(1).await;
        clock.advance(Duration::from_millis(100));

        // backoff after b is rate limited
        clock.wait_for_sleepers(1).await;
        cancel.cancel();

        match task.await.unwrap() {
            Err(TriggerError::Aborted { partial }) => {
                assert_eq!(partial.results.len(), 1);
                assert_eq!(partial.results[0].server_id, "a");
                assert_eq!(partial.rate_limits.len(), 1);
            }
            other => panic!("expected abort, got {:?}", other),
        }
        assert_eq!(client.recorded_searches().await.len(), 2);
    }

    #[tokio::test]
    async fn test_already_cancelled() {
        let (client, _clock, trigger) = setup();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = trigger
            .trigger(&cancel, &movies_detection(&[("a", 1)]), &limits(10), false)
            .await
            .unwrap_err();
        assert!(err.is_aborted());
        assert!(client.recorded_searches().await.is_empty());
    }
}
