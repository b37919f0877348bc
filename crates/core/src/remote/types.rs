//! Types for the media manager client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Which kind of library a media manager owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Movie-oriented manager (one file per item).
    MovieManager,
    /// Episode-oriented manager (series / season / episode).
    EpisodeManager,
}

/// Why an item is wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchReason {
    /// Monitored, no file on disk.
    Missing,
    /// On disk, below the quality cutoff.
    Cutoff,
}

/// One of the four independently limited (kind x reason) buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchCategory {
    MissingMovies,
    MissingEpisodes,
    CutoffMovies,
    CutoffEpisodes,
}

impl SearchCategory {
    /// All categories in submission order.
    pub const ALL: [SearchCategory; 4] = [
        SearchCategory::MissingMovies,
        SearchCategory::MissingEpisodes,
        SearchCategory::CutoffMovies,
        SearchCategory::CutoffEpisodes,
    ];

    pub fn new(kind: MediaKind, reason: SearchReason) -> Self {
        match (kind, reason) {
            (MediaKind::MovieManager, SearchReason::Missing) => Self::MissingMovies,
            (MediaKind::EpisodeManager, SearchReason::Missing) => Self::MissingEpisodes,
            (MediaKind::MovieManager, SearchReason::Cutoff) => Self::CutoffMovies,
            (MediaKind::EpisodeManager, SearchReason::Cutoff) => Self::CutoffEpisodes,
        }
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            Self::MissingMovies | Self::CutoffMovies => MediaKind::MovieManager,
            Self::MissingEpisodes | Self::CutoffEpisodes => MediaKind::EpisodeManager,
        }
    }

    pub fn reason(&self) -> SearchReason {
        match self {
            Self::MissingMovies | Self::MissingEpisodes => SearchReason::Missing,
            Self::CutoffMovies | Self::CutoffEpisodes => SearchReason::Cutoff,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingMovies => "missing-movies",
            Self::MissingEpisodes => "missing-episodes",
            Self::CutoffMovies => "cutoff-movies",
            Self::CutoffEpisodes => "cutoff-episodes",
        }
    }
}

impl fmt::Display for SearchCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured remote endpoint, as read by the engine for one cycle.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Server {
    /// Stable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    pub kind: MediaKind,
    /// Base URL without trailing slash.
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub enabled: bool,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Series position of an episodic item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRef {
    pub series_title: String,
    pub season: u32,
    pub episode: u32,
}

/// A wanted item as reported by a media manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Remote numeric ID (movie id or episode id).
    pub id: i64,
    /// Display title.
    pub title: String,
    /// Present for episodic kinds only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<EpisodeRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_profile: Option<String>,
}

/// Errors returned by a media manager client.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("Authentication rejected: {0}")]
    Unauthorized(String),

    #[error("Endpoint not found: {0}")]
    NotFound(String),

    #[error("Rate limited{}", retry_suffix(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request timeout")]
    Timeout,

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Server-supplied retry delay, if this is a rate-limited response that carried one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

fn retry_suffix(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(", retry in {}ms", d.as_millis()))
        .unwrap_or_default()
}

/// Logical operations the engine needs from a media manager.
///
/// Pagination is the implementation's concern: list calls return the full,
/// flattened list in the order the remote reported it.
#[async_trait]
pub trait MediaManagerClient: Send + Sync {
    /// Monitored items with no file.
    async fn list_missing(&self, server: &Server) -> Result<Vec<MediaItem>, ClientError>;

    /// Items on disk below their quality cutoff.
    async fn list_cutoff_unmet(&self, server: &Server) -> Result<Vec<MediaItem>, ClientError>;

    /// Issue one batched search command for the given item ids.
    async fn trigger_search(
        &self,
        server: &Server,
        category: SearchCategory,
        item_ids: &[i64],
    ) -> Result<(), ClientError>;
}
