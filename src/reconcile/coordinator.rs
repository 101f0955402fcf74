use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::comparator::fetch_outstanding;
use super::dispatcher::{DispatchAck, JobDispatcher};
use super::poller::{ConvergencePoller, PollPolicy, PollState, StatusSource};
use crate::credentials::CredentialProvider;
use crate::error::CompareError;
use crate::records::{ContainerRecord, WorkItem, classify_now};
use crate::source::SourceService;
use crate::store::{self, KeyValueStore, TtlCache};
use crate::target::{SyncStatus, TargetError, TargetService};

/// Whether the backend mirrors inline or out of band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Synchronous,
    #[default]
    Asynchronous,
}

/// How a pass resolves when polling runs out of attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExhaustedPolicy {
    /// Assume the job is still running server-side.
    #[default]
    Partial,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    Success,
    Partial,
    Error,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Success => write!(f, "SUCCESS"),
            OutcomeStatus::Partial => write!(f, "PARTIAL"),
            OutcomeStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// The final, timestamped verdict of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    pub pass_id: u64,
    pub target_id: String,
    pub status: OutcomeStatus,
    pub message: Option<String>,
    /// Items still unmirrored after the pass, when a verification diff succeeded.
    pub outstanding: Option<usize>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    NoCredential,
    NoTarget,
    /// A pass for the same target was already in flight; this trigger was coalesced into it.
    AlreadyRunning,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoCredential => write!(f, "not signed in"),
            SkipReason::NoTarget => write!(f, "no target selected"),
            SkipReason::AlreadyRunning => write!(f, "a pass is already running for this target"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PassReport {
    Completed(ReconciliationOutcome),
    Skipped(SkipReason),
}

impl PassReport {
    pub fn outcome(&self) -> Option<&ReconciliationOutcome> {
        match self {
            PassReport::Completed(outcome) => Some(outcome),
            PassReport::Skipped(_) => None,
        }
    }
}

/// Tunables for [`ReconciliationCoordinator`].
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub mode: SyncMode,
    pub poll: PollPolicy,
    pub exhausted_policy: ExhaustedPolicy,
    pub container_ttl: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            mode: SyncMode::default(),
            poll: PollPolicy::default(),
            exhausted_policy: ExhaustedPolicy::default(),
            container_ttl: Duration::from_secs(300),
        }
    }
}

// Status, message and outstanding count, before the pass is stamped.
struct Resolution {
    status: OutcomeStatus,
    message: Option<String>,
    outstanding: Option<usize>,
}

impl Resolution {
    fn error(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Error,
            message: Some(message.into()),
            outstanding: None,
        }
    }

    /// Success when nothing is outstanding, Partial otherwise.
    fn verified(outstanding: usize) -> Self {
        if outstanding == 0 {
            Self {
                status: OutcomeStatus::Success,
                message: None,
                outstanding: Some(0),
            }
        } else {
            Self {
                status: OutcomeStatus::Partial,
                message: Some(format!("{outstanding} item(s) still outstanding")),
                outstanding: Some(outstanding),
            }
        }
    }

    /// The job was accepted or completed but the follow-up diff failed.
    fn unverified() -> Self {
        Self {
            status: OutcomeStatus::Success,
            message: None,
            outstanding: None,
        }
    }
}

/// Status checks for a job started through [`JobDispatcher`].
struct RemoteJob<'a, T> {
    target: &'a T,
    token: &'a str,
    target_id: &'a str,
    job_id: Option<String>,
}

impl<T: TargetService> StatusSource for RemoteJob<'_, T> {
    async fn fetch_status(&self) -> Result<SyncStatus, TargetError> {
        self.target
            .sync_status(self.token, self.target_id, self.job_id.as_deref())
            .await?
            .into_status()
    }
}

/// Removes its target from the in-flight set when the pass ends, however it ends.
struct InFlight<'a> {
    targets: &'a Mutex<HashSet<String>>,
    reconciling: &'a watch::Sender<bool>,
    target_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut targets = self.targets.lock().unwrap_or_else(|p| p.into_inner());
        targets.remove(&self.target_id);
        self.reconciling.send_replace(!targets.is_empty());
    }
}

/// Drives reconciliation passes: dispatch, optional polling, and a verifying
/// diff that picks the final tri-state outcome.
///
/// Exposes the current outstanding items and an `is_reconciling` flag as
/// `watch` channels. Only one pass per target may run at a time, and only the
/// most recently started pass may publish its results.
pub struct ReconciliationCoordinator<T, U> {
    target: T,
    source: U,
    credentials: Arc<dyn CredentialProvider>,
    store: Arc<dyn KeyValueStore>,
    settings: CoordinatorSettings,
    containers: Mutex<TtlCache<Vec<ContainerRecord>>>,
    in_flight: Mutex<HashSet<String>>,
    next_pass: AtomicU64,
    latest_pass: AtomicU64,
    cancel: Mutex<CancellationToken>,
    outstanding: watch::Sender<Vec<WorkItem>>,
    reconciling: watch::Sender<bool>,
    last_outcome: Mutex<Option<ReconciliationOutcome>>,
}

impl<T: TargetService, U: SourceService> ReconciliationCoordinator<T, U> {
    /// Builds a coordinator, restoring the cached outstanding items and last
    /// outcome from `store`.
    pub fn new(
        target: T,
        source: U,
        credentials: Arc<dyn CredentialProvider>,
        store: Arc<dyn KeyValueStore>,
        settings: CoordinatorSettings,
    ) -> Self {
        let cached_items: Vec<WorkItem> =
            store::load(store.as_ref(), store::OUTSTANDING_ITEMS).unwrap_or_default();
        let last_outcome: Option<ReconciliationOutcome> =
            store::load(store.as_ref(), store::LAST_OUTCOME);
        let container_ttl = settings.container_ttl;

        Self {
            target,
            source,
            credentials,
            store,
            settings,
            containers: Mutex::new(TtlCache::new(container_ttl)),
            in_flight: Mutex::new(HashSet::new()),
            next_pass: AtomicU64::new(0),
            latest_pass: AtomicU64::new(0),
            cancel: Mutex::new(CancellationToken::new()),
            outstanding: watch::channel(cached_items).0,
            reconciling: watch::channel(false).0,
            last_outcome: Mutex::new(last_outcome),
        }
    }

    pub fn mode(&self) -> SyncMode {
        self.settings.mode
    }

    pub fn current_outstanding_items(&self) -> Vec<WorkItem> {
        self.outstanding.borrow().clone()
    }

    pub fn watch_outstanding(&self) -> watch::Receiver<Vec<WorkItem>> {
        self.outstanding.subscribe()
    }

    pub fn is_reconciling(&self) -> bool {
        *self.reconciling.borrow()
    }

    pub fn watch_reconciling(&self) -> watch::Receiver<bool> {
        self.reconciling.subscribe()
    }

    pub fn last_outcome(&self) -> Option<ReconciliationOutcome> {
        self.last_outcome
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn last_attempted_at(&self) -> Option<DateTime<Utc>> {
        store::load(self.store.as_ref(), store::LAST_ATTEMPTED_AT)
    }

    pub fn selected_target(&self) -> Option<String> {
        store::load::<String>(self.store.as_ref(), store::SELECTED_TARGET)
            .filter(|t| !t.trim().is_empty())
    }

    /// Persists a new target. The cached outstanding view belonged to the old
    /// target, so it is cleared.
    pub fn select_target(&self, target_id: &str) {
        store::save(self.store.as_ref(), store::SELECTED_TARGET, &target_id);
        if let Err(e) = self.store.remove(&[store::OUTSTANDING_ITEMS]) {
            warn!(error = %e, "failed to clear cached outstanding items");
        }
        self.outstanding.send_replace(Vec::new());
        info!(target_id, "target selected");
    }

    /// Aborts polling in every in-flight pass. Later passes are unaffected.
    pub fn cancel(&self) {
        let mut token = self.cancel.lock().unwrap_or_else(|p| p.into_inner());
        token.cancel();
        *token = CancellationToken::new();
    }

    /// Runs one pass against the selected target in the configured mode.
    pub async fn trigger_reconciliation(&self) -> PassReport {
        match self.selected_target() {
            Some(target_id) => self.reconcile(self.settings.mode, &target_id).await,
            None => {
                info!("reconciliation skipped: no target selected");
                PassReport::Skipped(SkipReason::NoTarget)
            }
        }
    }

    pub async fn reconcile(&self, mode: SyncMode, target_id: &str) -> PassReport {
        let Some(token) = self.credentials.credential() else {
            info!(target_id, "reconciliation skipped: no credential");
            return PassReport::Skipped(SkipReason::NoCredential);
        };

        let Some(_in_flight) = self.begin(target_id) else {
            info!(target_id, "reconciliation already running; trigger coalesced");
            return PassReport::Skipped(SkipReason::AlreadyRunning);
        };

        let pass_id = self.next_pass.fetch_add(1, Ordering::SeqCst) + 1;
        self.latest_pass.fetch_max(pass_id, Ordering::SeqCst);
        store::save(self.store.as_ref(), store::LAST_ATTEMPTED_AT, &Utc::now());
        let cancel = self
            .cancel
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .child_token();

        info!(pass_id, target_id, ?mode, "reconciliation pass started");
        let resolution = match mode {
            SyncMode::Synchronous => self.run_synchronous(&token, target_id, pass_id).await,
            SyncMode::Asynchronous => {
                self.run_asynchronous(&token, target_id, pass_id, cancel)
                    .await
            }
        };

        let outcome = ReconciliationOutcome {
            pass_id,
            target_id: target_id.to_string(),
            status: resolution.status,
            message: resolution.message,
            outstanding: resolution.outstanding,
            completed_at: Utc::now(),
        };
        info!(
            pass_id,
            target_id,
            status = %outcome.status,
            detail = outcome.message.as_deref().unwrap_or(""),
            "reconciliation pass finished"
        );

        if self.is_current(pass_id) {
            store::save(self.store.as_ref(), store::LAST_OUTCOME, &outcome);
            *self.last_outcome.lock().unwrap_or_else(|p| p.into_inner()) = Some(outcome.clone());
        } else {
            debug!(pass_id, "outcome superseded by a newer pass; not published");
        }

        PassReport::Completed(outcome)
    }

    fn begin(&self, target_id: &str) -> Option<InFlight<'_>> {
        let mut targets = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        if !targets.insert(target_id.to_string()) {
            return None;
        }
        self.reconciling.send_replace(true);
        Some(InFlight {
            targets: &self.in_flight,
            reconciling: &self.reconciling,
            target_id: target_id.to_string(),
        })
    }

    fn is_current(&self, pass_id: u64) -> bool {
        self.latest_pass.load(Ordering::SeqCst) == pass_id
    }

    async fn run_synchronous(&self, token: &str, target_id: &str, pass_id: u64) -> Resolution {
        if let Err(resolution) = self.dispatch(token, target_id).await {
            return resolution;
        }

        match self.refresh_outstanding(token, target_id, pass_id).await {
            Ok(outstanding) => Resolution::verified(outstanding),
            Err(_) => Resolution::unverified(),
        }
    }

    async fn run_asynchronous(
        &self,
        token: &str,
        target_id: &str,
        pass_id: u64,
        cancel: CancellationToken,
    ) -> Resolution {
        let workload = self
            .refresh_outstanding(token, target_id, pass_id)
            .await
            .unwrap_or(0);

        let job_id = match self.dispatch(token, target_id).await {
            Ok(job_id) => job_id,
            Err(resolution) => return resolution,
        };

        let job_context = RemoteJob {
            target: &self.target,
            token,
            target_id,
            job_id,
        };
        let poller = ConvergencePoller::new(self.settings.poll.clone(), cancel);
        let job = poller
            .poll_until_terminal(&job_context, target_id, workload)
            .await;

        match job.state {
            PollState::Complete => match self.refresh_outstanding(token, target_id, pass_id).await {
                Ok(outstanding) => Resolution::verified(outstanding),
                Err(_) => Resolution::unverified(),
            },
            PollState::Failed => Resolution::error(
                job.failure
                    .unwrap_or_else(|| "sync job failed".to_string()),
            ),
            PollState::Cancelled => Resolution {
                status: OutcomeStatus::Partial,
                message: Some("polling cancelled; the sync job may still be running".into()),
                outstanding: None,
            },
            // poll_until_terminal only returns terminal states.
            PollState::Exhausted | PollState::Polling => {
                let outstanding = self
                    .refresh_outstanding(token, target_id, pass_id)
                    .await
                    .ok();
                let attempts = job.attempts_made;
                match self.settings.exhausted_policy {
                    ExhaustedPolicy::Partial => Resolution {
                        status: OutcomeStatus::Partial,
                        message: Some(format!(
                            "sync job still running after {attempts} status checks"
                        )),
                        outstanding,
                    },
                    ExhaustedPolicy::Error => Resolution {
                        outstanding,
                        ..Resolution::error(format!(
                            "sync job did not finish within {attempts} status checks"
                        ))
                    },
                }
            }
        }
    }

    /// Starts the job. `Err` carries the Error resolution for a failed or
    /// rejected dispatch.
    async fn dispatch(&self, token: &str, target_id: &str) -> Result<Option<String>, Resolution> {
        match JobDispatcher::new(&self.target).start_job(token, target_id).await {
            Ok(DispatchAck::Accepted { job_id }) => Ok(job_id),
            Ok(DispatchAck::Rejected { message }) => Err(Resolution::error(message)),
            Err(e) => Err(Resolution::error(format!("could not start sync: {e}"))),
        }
    }

    /// Re-diffs source against target and, on success, replaces the
    /// outstanding view wholesale. A failed diff leaves the view untouched.
    async fn refresh_outstanding(
        &self,
        token: &str,
        target_id: &str,
        pass_id: u64,
    ) -> Result<usize, CompareError> {
        let items = self.diff(token, target_id, pass_id).await?;
        let count = items.len();
        self.publish(pass_id, items);
        Ok(count)
    }

    async fn diff(
        &self,
        token: &str,
        target_id: &str,
        pass_id: u64,
    ) -> Result<Vec<WorkItem>, CompareError> {
        let records = match fetch_outstanding(&self.target, token, target_id).await {
            Ok(records) => records,
            Err(e) => {
                warn!(pass_id, target_id, error = %e, "comparison failed; keeping previous view");
                return Err(e);
            }
        };

        let containers = self.containers(token).await;
        let items = classify_now(&records, containers.as_deref());
        debug!(pass_id, outstanding = items.len(), "outstanding items computed");
        Ok(items)
    }

    /// Replaces the view, unless a newer pass has started since `pass_id`.
    fn publish(&self, pass_id: u64, items: Vec<WorkItem>) {
        if self.is_current(pass_id) {
            store::save(self.store.as_ref(), store::OUTSTANDING_ITEMS, &items);
            self.outstanding.send_replace(items);
        }
    }

    /// Upstream containers for labelling, served from the TTL cache when fresh.
    async fn containers(&self, token: &str) -> Option<Vec<ContainerRecord>> {
        let cached = self
            .containers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get();
        if cached.is_some() {
            return cached;
        }

        match self.source.list_containers(token).await {
            Ok(list) => {
                self.containers
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .set(list.clone());
                Some(list)
            }
            Err(e) => {
                warn!(error = %e, "could not load containers; using fallback labels");
                None
            }
        }
    }

    /// Fetches and classifies every upstream record, independent of the target.
    pub async fn list_work_items(&self) -> Result<Vec<WorkItem>, crate::error::MirrorError> {
        let Some(token) = self.credentials.credential() else {
            return Ok(Vec::new());
        };
        let containers = self.source.list_containers(&token).await?;
        let records = self.source.list_records(&token, &containers).await?;
        self.containers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .set(containers.clone());
        Ok(classify_now(&records, Some(&containers)))
    }

    /// Runs one comparison for `target_id` without dispatching anything.
    ///
    /// While a pass is in flight the current view is returned as is and no
    /// comparison runs. The result replaces the view only when `target_id` is
    /// the selected target.
    pub async fn refresh(&self, target_id: &str) -> Result<Vec<WorkItem>, CompareError> {
        if self.is_reconciling() {
            debug!(target_id, "reconciliation in flight; serving the current view");
            return Ok(self.current_outstanding_items());
        }
        let Some(token) = self.credentials.credential() else {
            return Ok(self.current_outstanding_items());
        };

        let pass_id = self.latest_pass.load(Ordering::SeqCst);
        let items = self.diff(&token, target_id, pass_id).await?;
        if self.selected_target().as_deref() == Some(target_id) {
            self.publish(pass_id, items.clone());
        } else {
            debug!(target_id, "target not selected; view left unchanged");
        }
        Ok(items)
    }
}
