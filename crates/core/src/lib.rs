pub mod audit;
pub mod automation;
pub mod clock;
pub mod config;
pub mod detector;
pub mod metrics;
pub mod remote;
pub mod scheduler;
pub mod testing;
pub mod trigger;

pub use audit::{
    create_audit_system, AuditError, AuditEvent, AuditFilter, AuditHandle, AuditRecord,
    AuditStore, AuditWriter, CycleAudit, CycleOutcome, CycleSummary, Page, SqliteAuditStore,
};
pub use automation::{Automation, CycleError, CycleResult};
pub use clock::{Clock, SystemClock};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, ConfigStore,
    MemoryConfigStore, SanitizedConfig, SearchLimits,
};
pub use detector::{DetectError, DetectionResult, DetectionResults, Detector};
pub use remote::{
    ArrClient, ClientError, MediaItem, MediaKind, MediaManagerClient, SearchCategory,
    SearchReason, Server,
};
pub use scheduler::{
    CycleRunner, CycleTrigger, ManualTicket, Scheduler, SchedulerError, SchedulerState,
    SchedulerStatus,
};
pub use trigger::{SearchTrigger, TriggerError, TriggerResult, TriggerResults};
