//! Configuration store consumed by the engine at the start of every cycle.

use std::sync::RwLock;

use super::{Config, ConfigError, MediaServerConfig, SearchLimits};
use crate::remote::Server;

/// Source of the server list and search limits.
///
/// Implementations return snapshots: callers never observe edits made after
/// the call returned.
pub trait ConfigStore: Send + Sync {
    /// Enabled servers, in configuration order.
    fn list_enabled_servers(&self) -> Result<Vec<Server>, ConfigError>;

    /// Current per-category search limits.
    fn search_limits(&self) -> Result<SearchLimits, ConfigError>;
}

#[derive(Debug)]
struct StoreState {
    servers: Vec<MediaServerConfig>,
    limits: SearchLimits,
}

/// In-memory configuration store seeded from the loaded [`Config`].
#[derive(Debug)]
pub struct MemoryConfigStore {
    state: RwLock<StoreState>,
}

impl MemoryConfigStore {
    pub fn new(servers: Vec<MediaServerConfig>, limits: SearchLimits) -> Self {
        Self {
            state: RwLock::new(StoreState { servers, limits }),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.servers.clone(), config.limits)
    }

    /// Replace the whole server list.
    pub fn replace_servers(&self, servers: Vec<MediaServerConfig>) -> Result<(), ConfigError> {
        let mut state = self
            .state
            .write()
            .map_err(|e| ConfigError::Unavailable(e.to_string()))?;
        state.servers = servers;
        Ok(())
    }

    /// Replace the search limits.
    pub fn set_limits(&self, limits: SearchLimits) -> Result<(), ConfigError> {
        let mut state = self
            .state
            .write()
            .map_err(|e| ConfigError::Unavailable(e.to_string()))?;
        state.limits = limits;
        Ok(())
    }

    /// Enable or disable a server. Returns false if the id is unknown.
    pub fn set_enabled(&self, server_id: &str, enabled: bool) -> Result<bool, ConfigError> {
        let mut state = self
            .state
            .write()
            .map_err(|e| ConfigError::Unavailable(e.to_string()))?;
        match state.servers.iter_mut().find(|s| s.id == server_id) {
            Some(server) => {
                server.enabled = enabled;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn list_enabled_servers(&self) -> Result<Vec<Server>, ConfigError> {
        let state = self
            .state
            .read()
            .map_err(|e| ConfigError::Unavailable(e.to_string()))?;
        Ok(state
            .servers
            .iter()
            .filter(|s| s.enabled)
            .map(Server::from)
            .collect())
    }

    fn search_limits(&self) -> Result<SearchLimits, ConfigError> {
        let state = self
            .state
            .read()
            .map_err(|e| ConfigError::Unavailable(e.to_string()))?;
        Ok(state.limits)
    }
}
