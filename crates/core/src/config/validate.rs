use std::collections::HashSet;

use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Scheduler interval, page size and rate-limit threshold are positive
/// - Media server ids are unique, URLs are http(s), enabled servers carry an API key
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.scheduler.interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.interval_secs must be greater than 0".to_string(),
        ));
    }

    if config.trigger.max_consecutive_rate_limits == 0 {
        return Err(ConfigError::ValidationError(
            "trigger.max_consecutive_rate_limits must be at least 1".to_string(),
        ));
    }

    if config.remote.page_size == 0 {
        return Err(ConfigError::ValidationError(
            "remote.page_size must be greater than 0".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for server in &config.servers {
        if server.id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "servers[].id cannot be empty".to_string(),
            ));
        }
        if !seen.insert(server.id.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate server id: {}",
                server.id
            )));
        }

        match reqwest::Url::parse(&server.url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => {
                return Err(ConfigError::ValidationError(format!(
                    "server {}: unsupported URL scheme '{}'",
                    server.id,
                    url.scheme()
                )));
            }
            Err(e) => {
                return Err(ConfigError::ValidationError(format!(
                    "server {}: invalid URL '{}': {}",
                    server.id, server.url, e
                )));
            }
        }

        if server.enabled && server.api_key.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "server {}: api_key is required for enabled servers",
                server.id
            )));
        }
    }

    Ok(())
}
