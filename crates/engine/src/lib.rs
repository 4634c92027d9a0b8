//! Campaign synchronization engine: keeps locally stored campaigns in step
//! with their counterparts on an external advertising platform.

pub mod dispatcher;
pub mod external;
pub mod lease;
pub mod orchestrator;
pub mod reconciliation;
pub mod record;
pub mod repository;
pub mod retry;
pub mod runtime;
pub mod scheduler;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

pub use dispatcher::{JobRunner, SyncJob, TaskDispatcher};
pub use external::{
    AdService, CampaignSpec, CampaignStatusReport, CreatedCampaign, RemoteStatus, ServingStatus,
    SimulatedAdService,
};
pub use lease::LeaseTable;
pub use orchestrator::{SyncOrchestrator, SyncOutcome};
pub use reconciliation::{ReconciliationSweep, SweepReport};
pub use record::{CampaignRecord, CampaignStatus, NewCampaign, MAX_RETRIES};
pub use repository::{CampaignFilter, CampaignRepository, InMemoryCampaignRepository};
pub use retry::RetryPolicy;
pub use runtime::SyncEngine;
pub use scheduler::SweepScheduler;
pub use service::{CampaignService, CampaignStats};
