mod comparator;
mod coordinator;
mod dispatcher;
#[cfg(test)]
pub(crate) mod mock;
mod poller;

pub use comparator::{compute_outstanding, fetch_outstanding};
pub use coordinator::{
    CoordinatorSettings, ExhaustedPolicy, OutcomeStatus, PassReport, ReconciliationCoordinator,
    ReconciliationOutcome, SkipReason, SyncMode,
};
pub use dispatcher::{DispatchAck, JobDispatcher};
pub use poller::{ConvergencePoller, PollPolicy, PollState, PollTransition, StatusSource, SyncJob};
