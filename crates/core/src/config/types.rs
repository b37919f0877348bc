use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::remote::{MediaKind, SearchCategory, Server};

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
    #[serde(default)]
    pub limits: SearchLimits,
    #[serde(default)]
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub servers: Vec<MediaServerConfig>,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Audit log database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("scoutarr.db")
}

/// Scheduler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Start the scheduler at boot.
    /// When disabled it stays stopped until started through the API.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between the end of one cycle and the start of the next.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval(),
        }
    }
}

fn default_interval() -> u64 {
    900 // 15 minutes
}

fn default_true() -> bool {
    true
}

/// Automation behaviour
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AutomationConfig {
    /// Force every cycle into dry-run (allocation is computed, nothing is submitted).
    #[serde(default)]
    pub dry_run: bool,
}

/// Per-category search caps for one cycle. Zero disables a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct SearchLimits {
    #[serde(default = "default_limit")]
    pub missing_movies: u32,
    #[serde(default = "default_limit")]
    pub missing_episodes: u32,
    #[serde(default = "default_limit")]
    pub cutoff_movies: u32,
    #[serde(default = "default_limit")]
    pub cutoff_episodes: u32,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            missing_movies: default_limit(),
            missing_episodes: default_limit(),
            cutoff_movies: default_limit(),
            cutoff_episodes: default_limit(),
        }
    }
}

impl SearchLimits {
    /// Cap for one category.
    pub fn for_category(&self, category: SearchCategory) -> u32 {
        match category {
            SearchCategory::MissingMovies => self.missing_movies,
            SearchCategory::MissingEpisodes => self.missing_episodes,
            SearchCategory::CutoffMovies => self.cutoff_movies,
            SearchCategory::CutoffEpisodes => self.cutoff_episodes,
        }
    }
}

fn default_limit() -> u32 {
    10
}

/// Search submission pacing and rate-limit handling
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TriggerConfig {
    /// Minimum delay between consecutive search submissions (milliseconds).
    #[serde(default = "default_submission_delay")]
    pub submission_delay_ms: u64,
    /// Backoff when a rate-limited response carries no Retry-After (seconds).
    #[serde(default = "default_backoff")]
    pub rate_limit_backoff_secs: u64,
    /// Consecutive rate-limited responses after which a server is abandoned for the cycle.
    #[serde(default = "default_max_rate_limits")]
    pub max_consecutive_rate_limits: u32,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            submission_delay_ms: default_submission_delay(),
            rate_limit_backoff_secs: default_backoff(),
            max_consecutive_rate_limits: default_max_rate_limits(),
        }
    }
}

fn default_submission_delay() -> u64 {
    100
}

fn default_backoff() -> u64 {
    30
}

fn default_max_rate_limits() -> u32 {
    3
}

/// Remote API client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteConfig {
    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Records requested per page when listing wanted items
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            page_size: default_page_size(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_page_size() -> u32 {
    250
}

/// A configured media manager endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaServerConfig {
    pub id: String,
    pub name: String,
    pub kind: MediaKind,
    /// Base URL (e.g., "http://localhost:7878")
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl From<&MediaServerConfig> for Server {
    fn from(config: &MediaServerConfig) -> Self {
        Server {
            id: config.id.clone(),
            name: config.name.clone(),
            kind: config.kind,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            enabled: config.enabled,
        }
    }
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub automation: AutomationConfig,
    pub limits: SearchLimits,
    pub trigger: TriggerConfig,
    pub remote: RemoteConfig,
    pub servers: Vec<SanitizedMediaServerConfig>,
}

/// Sanitized server entry (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedMediaServerConfig {
    pub id: String,
    pub name: String,
    pub kind: MediaKind,
    pub url: String,
    pub api_key_configured: bool,
    pub enabled: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            scheduler: config.scheduler.clone(),
            automation: config.automation.clone(),
            limits: config.limits,
            trigger: config.trigger.clone(),
            remote: config.remote.clone(),
            servers: config
                .servers
                .iter()
                .map(|s| SanitizedMediaServerConfig {
                    id: s.id.clone(),
                    name: s.name.clone(),
                    kind: s.kind,
                    url: s.url.clone(),
                    api_key_configured: !s.api_key.is_empty(),
                    enabled: s.enabled,
                })
                .collect(),
        }
    }
}
