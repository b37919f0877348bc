//! Detector implementation.

use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::config::ConfigStore;
use crate::remote::{MediaManagerClient, Server};

use super::types::{DetectError, DetectionResult, DetectionResults};

/// Queries every enabled server for missing and cutoff-unmet items.
pub struct Detector {
    config_store: Arc<dyn ConfigStore>,
    client: Arc<dyn MediaManagerClient>,
}

impl Detector {
    pub fn new(config_store: Arc<dyn ConfigStore>, client: Arc<dyn MediaManagerClient>) -> Self {
        Self {
            config_store,
            client,
        }
    }

    /// Run one detection pass.
    ///
    /// The server list is read fresh on every call. Results come back in the
    /// order the list was read, whatever order the servers answered in. An
    /// `Err` means the list itself was unreadable or `cancel` fired; every
    /// server failing is still `Ok`.
    pub async fn detect_all(
        &self,
        cancel: &CancellationToken,
    ) -> Result<DetectionResults, DetectError> {
        if cancel.is_cancelled() {
            return Err(DetectError::Aborted);
        }

        let servers = self.config_store.list_enabled_servers()?;

        // join_all yields outputs in input order
        let work = join_all(servers.iter().map(|server| self.detect_server(server)));

        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DetectError::Aborted),
            results = work => results,
        };

        Ok(DetectionResults::from_results(results))
    }

    async fn detect_server(&self, server: &Server) -> DetectionResult {
        let (missing, cutoff) = tokio::join!(
            self.client.list_missing(server),
            self.client.list_cutoff_unmet(server),
        );

        match (missing, cutoff) {
            (Ok(missing), Ok(cutoff)) => DetectionResult::success(server, missing, cutoff),
            (Err(e), _) | (_, Err(e)) => DetectionResult::failure(server, e.to_string()),
        }
    }
}
