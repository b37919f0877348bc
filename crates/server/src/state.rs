use std::sync::Arc;

use scoutarr_core::{AuditStore, Automation, Config, SanitizedConfig, Scheduler};

/// Shared application state
pub struct AppState {
    config: Config,
    automation: Arc<Automation>,
    scheduler: Scheduler,
    audit_store: Arc<dyn AuditStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        automation: Arc<Automation>,
        scheduler: Scheduler,
        audit_store: Arc<dyn AuditStore>,
    ) -> Self {
        Self {
            config,
            automation,
            scheduler,
            audit_store,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn automation(&self) -> &Automation {
        self.automation.as_ref()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }
}
