//! Testing utilities and mock implementations.
//!
//! Provides a mock media manager client, a manually driven clock and
//! fixtures so cycles can be exercised without real servers or real waiting.
//!
//! # Example
//!
//! ```rust,ignore
//! use scoutarr_core::testing::{fixtures, ManualClock, MockMediaClient};
//!
//! let client = MockMediaClient::new();
//! client.set_missing("radarr", fixtures::movies(1, 3)).await;
//!
//! let clock = ManualClock::auto_advance();
//! // Build a SearchTrigger / Automation around them...
//! ```

mod manual_clock;
mod mock_media_client;

pub use manual_clock::ManualClock;
pub use mock_media_client::{MockMediaClient, RecordedSearch};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::config::{MediaServerConfig, SearchLimits};
    use crate::remote::{EpisodeRef, MediaItem, MediaKind, Server};

    /// Create an enabled server pointing at a local URL.
    pub fn server(id: &str, kind: MediaKind) -> Server {
        Server::from(&server_config(id, kind))
    }

    /// Configuration entry for [`server`].
    pub fn server_config(id: &str, kind: MediaKind) -> MediaServerConfig {
        let port = match kind {
            MediaKind::MovieManager => 7878,
            MediaKind::EpisodeManager => 8989,
        };
        MediaServerConfig {
            id: id.to_string(),
            name: id.to_uppercase(),
            kind,
            url: format!("http://{}:{}", id, port),
            api_key: format!("{}-key", id),
            enabled: true,
        }
    }

    /// A single movie item.
    pub fn movie(id: i64, title: &str) -> MediaItem {
        MediaItem {
            id,
            title: title.to_string(),
            episode: None,
            quality_profile: Some("HD-1080p".to_string()),
        }
    }

    /// `count` movies with consecutive ids starting at `first_id`.
    pub fn movies(first_id: i64, count: usize) -> Vec<MediaItem> {
        (0..count as i64)
            .map(|i| movie(first_id + i, &format!("Movie {}", first_id + i)))
            .collect()
    }

    /// `count` episodes of one season with consecutive ids starting at `first_id`.
    pub fn episodes(first_id: i64, count: usize) -> Vec<MediaItem> {
        (0..count as i64)
            .map(|i| MediaItem {
                id: first_id + i,
                title: format!("Episode {}", i + 1),
                episode: Some(EpisodeRef {
                    series_title: "Test Series".to_string(),
                    season: 1,
                    episode: (i + 1) as u32,
                }),
                quality_profile: None,
            })
            .collect()
    }

    /// Limits with the same cap in every category.
    pub fn uniform_limits(limit: u32) -> SearchLimits {
        SearchLimits {
            missing_movies: limit,
            missing_episodes: limit,
            cutoff_movies: limit,
            cutoff_episodes: limit,
        }
    }
}
