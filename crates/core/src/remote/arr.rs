//! HTTP client for the v3 API shared by both media manager kinds.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::RemoteConfig;
use crate::metrics;

use super::{ClientError, EpisodeRef, MediaItem, MediaKind, MediaManagerClient, SearchCategory, Server};

/// Hard stop for runaway pagination.
const MAX_PAGES: u32 = 1000;

/// Which wanted list to page through.
#[derive(Debug, Clone, Copy)]
enum WantedList {
    Missing,
    Cutoff,
}

impl WantedList {
    fn path(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Cutoff => "cutoff",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PagedResponse {
    #[serde(default)]
    total_records: u64,
    #[serde(default)]
    records: Vec<WantedRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WantedRecord {
    id: i64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    year: Option<u32>,
    #[serde(default)]
    quality_profile_id: Option<i64>,
    #[serde(default)]
    season_number: Option<u32>,
    #[serde(default)]
    episode_number: Option<u32>,
    #[serde(default)]
    series: Option<SeriesRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeriesRecord {
    title: String,
    #[serde(default)]
    quality_profile_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct QualityProfile {
    id: i64,
    name: String,
}

/// Media manager client speaking the v3 REST API.
pub struct ArrClient {
    client: Client,
    page_size: u32,
}

impl ArrClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClientError::Connection(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            page_size: config.page_size.max(1),
        })
    }

    fn get(&self, server: &Server, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", server.base_url, path))
            .header("X-Api-Key", &server.api_key)
    }

    /// Quality profile id -> name. Failures are logged and yield an empty map.
    async fn quality_profiles(&self, server: &Server) -> HashMap<i64, String> {
        let result = async {
            let response = send(self.get(server, "/api/v3/qualityprofile")).await?;
            response
                .json::<Vec<QualityProfile>>()
                .await
                .map_err(|e| ClientError::Decode(e.to_string()))
        }
        .await;

        match result {
            Ok(profiles) => profiles.into_iter().map(|p| (p.id, p.name)).collect(),
            Err(e) => {
                warn!(server = %server.id, error = %e, "Failed to fetch quality profiles");
                HashMap::new()
            }
        }
    }

    async fn fetch_wanted(
        &self,
        server: &Server,
        list: WantedList,
    ) -> Result<Vec<MediaItem>, ClientError> {
        let profiles = self.quality_profiles(server).await;
        let path = format!("/api/v3/wanted/{}", list.path());

        let mut items = Vec::new();
        let mut page = 1u32;

        loop {
            let mut request = self.get(server, &path).query(&[
                ("page", page.to_string()),
                ("pageSize", self.page_size.to_string()),
                ("monitored", "true".to_string()),
            ]);
            if server.kind == MediaKind::EpisodeManager {
                request = request.query(&[("includeSeries", "true")]);
            }

            let response = send(request).await?;
            let body: PagedResponse = response
                .json()
                .await
                .map_err(|e| ClientError::Decode(e.to_string()))?;

            let received = body.records.len();
            items.extend(
                body.records
                    .into_iter()
                    .map(|r| into_item(r, server.kind, &profiles)),
            );

            debug!(
                server = %server.id,
                list = list.path(),
                page,
                received,
                total = body.total_records,
                "Fetched wanted page"
            );

            if received == 0 || items.len() as u64 >= body.total_records || page >= MAX_PAGES {
                break;
            }
            page += 1;
        }

        Ok(items)
    }
}

#[async_trait]
impl MediaManagerClient for ArrClient {
    async fn list_missing(&self, server: &Server) -> Result<Vec<MediaItem>, ClientError> {
        let started = Instant::now();
        let result = self.fetch_wanted(server, WantedList::Missing).await;
        observe("list_missing", started, result.is_ok());
        result
    }

    async fn list_cutoff_unmet(&self, server: &Server) -> Result<Vec<MediaItem>, ClientError> {
        let started = Instant::now();
        let result = self.fetch_wanted(server, WantedList::Cutoff).await;
        observe("list_cutoff_unmet", started, result.is_ok());
        result
    }

    async fn trigger_search(
        &self,
        server: &Server,
        category: SearchCategory,
        item_ids: &[i64],
    ) -> Result<(), ClientError> {
        let body = search_command(category, item_ids);
        let request = self
            .client
            .post(format!("{}/api/v3/command", server.base_url))
            .header("X-Api-Key", &server.api_key)
            .json(&body);

        let started = Instant::now();
        let result = send(request).await;
        observe("trigger_search", started, result.is_ok());
        result?;

        debug!(
            server = %server.id,
            category = %category,
            items = item_ids.len(),
            "Search command accepted"
        );
        Ok(())
    }
}

fn observe(operation: &str, started: Instant, ok: bool) {
    let status = if ok { "success" } else { "error" };
    metrics::REMOTE_REQUEST_DURATION
        .with_label_values(&[operation, status])
        .observe(started.elapsed().as_secs_f64());
}

/// Command body for a batched search.
fn search_command(category: SearchCategory, item_ids: &[i64]) -> serde_json::Value {
    match category.kind() {
        MediaKind::MovieManager => json!({ "name": "MoviesSearch", "movieIds": item_ids }),
        MediaKind::EpisodeManager => json!({ "name": "EpisodeSearch", "episodeIds": item_ids }),
    }
}

/// Send a request and map transport failures and error statuses.
async fn send(request: RequestBuilder) -> Result<Response, ClientError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Connection(e.to_string())
        }
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(ClientError::Unauthorized(format!("HTTP {}", status)))
        }
        StatusCode::NOT_FOUND => Err(ClientError::NotFound(response.url().path().to_string())),
        StatusCode::TOO_MANY_REQUESTS => Err(ClientError::RateLimited {
            retry_after: parse_retry_after(response.headers()),
        }),
        _ => {
            let body = response.text().await.unwrap_or_default();
            Err(ClientError::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            })
        }
    }
}

/// Parse a `Retry-After` header given in seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn into_item(record: WantedRecord, kind: MediaKind, profiles: &HashMap<i64, String>) -> MediaItem {
    match kind {
        MediaKind::MovieManager => {
            let title = record.title.unwrap_or_default();
            MediaItem {
                id: record.id,
                title: match record.year {
                    Some(year) if year > 0 => format!("{} ({})", title, year),
                    _ => title,
                },
                episode: None,
                quality_profile: record
                    .quality_profile_id
                    .and_then(|id| profiles.get(&id).cloned()),
            }
        }
        MediaKind::EpisodeManager => {
            let season = record.season_number.unwrap_or(0);
            let episode = record.episode_number.unwrap_or(0);
            let (series_title, profile_id) = match record.series {
                Some(series) => (series.title, series.quality_profile_id),
                None => (String::new(), None),
            };
            MediaItem {
                id: record.id,
                title: record
                    .title
                    .unwrap_or_else(|| format!("S{:02}E{:02}", season, episode)),
                episode: Some(EpisodeRef {
                    series_title,
                    season,
                    episode,
                }),
                quality_profile: profile_id.and_then(|id| profiles.get(&id).cloned()),
            }
        }
    }
}
