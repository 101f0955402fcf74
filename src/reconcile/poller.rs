use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::target::{SyncStatus, TargetError};

/// Backoff and attempt-budget parameters for convergence polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    /// Delay before the second status check.
    pub base_delay_ms: u64,
    /// Cap applied to the doubled delay, before jitter.
    pub max_delay_ms: u64,
    /// Upper bound (exclusive) of the random jitter added to every delay.
    pub jitter_ms: u64,
    pub base_attempts: u32,
    pub min_attempts: u32,
    pub max_attempts: u32,
    /// Workloads strictly above this size poll faster.
    pub large_workload_threshold: usize,
    pub large_workload_scale: f64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            jitter_ms: 500,
            base_attempts: 10,
            min_attempts: 12,
            max_attempts: 25,
            large_workload_threshold: 20,
            large_workload_scale: 0.8,
        }
    }
}

impl PollPolicy {
    /// `base_attempts + ceil(workload / 10)`, clamped to `[min_attempts, max_attempts]`.
    /// Never returns zero.
    pub fn max_attempts_for(&self, workload: usize) -> u32 {
        let extra = u32::try_from(workload.div_ceil(10)).unwrap_or(u32::MAX);
        self.base_attempts
            .saturating_add(extra)
            .max(self.min_attempts)
            .min(self.max_attempts)
            .max(1)
    }

    /// Exponential delay for the given zero-based attempt, capped, without jitter.
    pub fn base_delay_for_attempt(&self, attempt: u32) -> u64 {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }

    /// Full delay: capped exponential plus `jitter`, scaled down for large workloads.
    pub fn delay_for_attempt(&self, attempt: u32, workload: usize, jitter: u64) -> Duration {
        let delay = self.base_delay_for_attempt(attempt).saturating_add(jitter);
        let delay = if workload > self.large_workload_threshold {
            (delay as f64 * self.large_workload_scale).round() as u64
        } else {
            delay
        };
        Duration::from_millis(delay)
    }

    pub fn sample_jitter(&self) -> u64 {
        if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..self.jitter_ms)
        }
    }
}

/// States of one polling run. Everything except `Polling` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollState {
    Polling,
    Complete,
    Failed,
    /// The attempt budget ran out while the job was still pending.
    Exhausted,
    /// Stopped by the caller before a terminal signal arrived.
    Cancelled,
}

impl PollState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PollState::Polling)
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollState::Polling => write!(f, "POLLING"),
            PollState::Complete => write!(f, "COMPLETE"),
            PollState::Failed => write!(f, "FAILED"),
            PollState::Exhausted => write!(f, "EXHAUSTED"),
            PollState::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// What the poll loop should do after one status observation.
#[derive(Debug, Clone, PartialEq)]
pub enum PollTransition {
    Wait(Duration),
    Done(PollState),
}

/// Bookkeeping for one dispatched mirroring job. Lives for a single pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: Uuid,
    pub target_container_id: String,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub next_delay_ms: u64,
    pub state: PollState,
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SyncJob {
    pub fn new(target_container_id: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_container_id: target_container_id.into(),
            attempts_made: 0,
            max_attempts,
            next_delay_ms: 0,
            state: PollState::Polling,
            failure: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Applies one status check to the job and returns what to do next.
    ///
    /// Terminal jobs are left untouched. A malformed or transport-failed check
    /// fails the job just like an explicit `"error"` status.
    pub fn observe(
        &mut self,
        reply: Result<SyncStatus, TargetError>,
        policy: &PollPolicy,
        workload: usize,
        jitter: u64,
    ) -> PollTransition {
        if self.is_terminal() {
            return PollTransition::Done(self.state);
        }

        self.attempts_made += 1;
        match reply {
            Ok(SyncStatus::Complete) => self.finish(PollState::Complete, None),
            Ok(SyncStatus::Error(message)) => self.finish(
                PollState::Failed,
                Some(message.unwrap_or_else(|| "sync job reported an error".to_string())),
            ),
            Err(e) => self.finish(PollState::Failed, Some(e.to_string())),
            Ok(SyncStatus::Pending(_)) if self.attempts_made >= self.max_attempts => {
                self.finish(PollState::Exhausted, None)
            }
            Ok(SyncStatus::Pending(_)) => {
                let delay = policy.delay_for_attempt(self.attempts_made - 1, workload, jitter);
                self.next_delay_ms = delay.as_millis() as u64;
                PollTransition::Wait(delay)
            }
        }
    }

    pub fn cancel(&mut self) {
        if !self.is_terminal() {
            self.state = PollState::Cancelled;
        }
    }

    fn finish(&mut self, state: PollState, failure: Option<String>) -> PollTransition {
        self.state = state;
        self.failure = failure;
        PollTransition::Done(state)
    }
}

/// How the poller reads a job's status. Implementations wrap whatever
/// transport and credentials the job was started with.
#[allow(async_fn_in_trait)]
pub trait StatusSource {
    async fn fetch_status(&self) -> Result<SyncStatus, TargetError>;
}

/// Repeatedly checks a dispatched job until it reports a terminal state, the
/// attempt budget is spent, or the pass is cancelled.
pub struct ConvergencePoller {
    policy: PollPolicy,
    cancel: CancellationToken,
}

impl ConvergencePoller {
    pub fn new(policy: PollPolicy, cancel: CancellationToken) -> Self {
        Self { policy, cancel }
    }

    pub async fn poll_until_terminal<S: StatusSource>(
        &self,
        job_context: &S,
        target_container_id: &str,
        workload: usize,
    ) -> SyncJob {
        let mut job = SyncJob::new(target_container_id, self.policy.max_attempts_for(workload));
        info!(
            job_id = %job.id,
            workload,
            max_attempts = job.max_attempts,
            "polling sync job"
        );

        loop {
            if self.cancel.is_cancelled() {
                job.cancel();
                break;
            }

            let reply = job_context.fetch_status().await;
            if let Err(e) = &reply {
                warn!(job_id = %job.id, error = %e, "status check failed");
            }

            let jitter = self.policy.sample_jitter();
            match job.observe(reply, &self.policy, workload, jitter) {
                PollTransition::Done(_) => break,
                PollTransition::Wait(delay) => {
                    debug!(
                        job_id = %job.id,
                        attempt = job.attempts_made,
                        max_attempts = job.max_attempts,
                        delay_ms = job.next_delay_ms,
                        "sync job still pending"
                    );
                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = self.cancel.cancelled() => {
                            job.cancel();
                            break;
                        }
                    }
                }
            }
        }

        info!(
            job_id = %job.id,
            state = %job.state,
            attempts = job.attempts_made,
            "polling finished"
        );
        job
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn no_jitter() -> PollPolicy {
        PollPolicy {
            jitter_ms: 0,
            ..Default::default()
        }
    }

    enum Reply {
        Pending,
        Complete,
        Error,
        Malformed,
    }

    struct ScriptedStatus {
        replies: Mutex<VecDeque<Reply>>,
        calls: AtomicUsize,
    }

    impl ScriptedStatus {
        fn new(replies: Vec<Reply>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl StatusSource for ScriptedStatus {
        async fn fetch_status(&self) -> Result<SyncStatus, TargetError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Once the script runs out the job stays pending.
            match self.replies.lock().unwrap().pop_front().unwrap_or(Reply::Pending) {
                Reply::Pending => Ok(SyncStatus::Pending("pending".into())),
                Reply::Complete => Ok(SyncStatus::Complete),
                Reply::Error => Ok(SyncStatus::Error(Some("mirror failed".into()))),
                Reply::Malformed => Err(TargetError::Malformed("missing field `status`".into())),
            }
        }
    }

    #[test]
    fn attempt_budget_scales_and_clamps() {
        let policy = PollPolicy::default();
        assert_eq!(policy.max_attempts_for(0), 12);
        assert_eq!(policy.max_attempts_for(50), 15);
        assert_eq!(policy.max_attempts_for(500), 25);
        assert_eq!(policy.max_attempts_for(21), 13);
        assert_eq!(policy.max_attempts_for(usize::MAX), 25);
    }

    #[test]
    fn attempt_budget_is_never_zero() {
        let policy = PollPolicy {
            base_attempts: 0,
            min_attempts: 0,
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(policy.max_attempts_for(0), 1);
    }

    #[test]
    fn base_delays_double_and_cap() {
        let policy = PollPolicy::default();
        let delays: Vec<u64> = (0..8).map(|a| policy.base_delay_for_attempt(a)).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 10_000, 10_000, 10_000, 10_000]);
        assert_eq!(policy.base_delay_for_attempt(200), 10_000);
    }

    #[test]
    fn delays_are_monotonic_and_bounded() {
        let policy = no_jitter();
        let mut previous = 0;
        for attempt in 0..30 {
            let delay = policy.delay_for_attempt(attempt, 0, 0).as_millis() as u64;
            assert!(delay >= previous);
            assert!(delay <= 10_000);
            previous = delay;
        }
    }

    #[test]
    fn large_workloads_scale_delay_by_point_eight() {
        let policy = no_jitter();
        for attempt in 0..6 {
            let plain = policy.delay_for_attempt(attempt, 20, 0).as_millis() as f64;
            let scaled = policy.delay_for_attempt(attempt, 21, 0).as_millis() as f64;
            assert_eq!(scaled, (plain * 0.8).round());
        }
        // Jitter is added before scaling.
        assert_eq!(
            policy.delay_for_attempt(0, 50, 250),
            Duration::from_millis(1000)
        );
    }

    #[test]
    fn jitter_stays_in_range() {
        let policy = PollPolicy::default();
        for _ in 0..200 {
            assert!(policy.sample_jitter() < 500);
        }
        assert_eq!(no_jitter().sample_jitter(), 0);
    }

    #[test]
    fn observe_pending_waits_then_exhausts() {
        let policy = no_jitter();
        let mut job = SyncJob::new("db", 3);
        let pending = || Ok(SyncStatus::Pending("pending".into()));

        assert_eq!(
            job.observe(pending(), &policy, 0, 0),
            PollTransition::Wait(Duration::from_millis(1000))
        );
        assert_eq!(
            job.observe(pending(), &policy, 0, 0),
            PollTransition::Wait(Duration::from_millis(2000))
        );
        assert_eq!(job.next_delay_ms, 2000);
        assert_eq!(
            job.observe(pending(), &policy, 0, 0),
            PollTransition::Done(PollState::Exhausted)
        );
        assert_eq!(job.attempts_made, 3);
    }

    #[test]
    fn terminal_job_ignores_further_observations() {
        let policy = no_jitter();
        let mut job = SyncJob::new("db", 5);
        job.observe(Ok(SyncStatus::Complete), &policy, 0, 0);
        let t = job.observe(Ok(SyncStatus::Error(None)), &policy, 0, 0);
        assert_eq!(t, PollTransition::Done(PollState::Complete));
        assert_eq!(job.attempts_made, 1);
        assert!(job.attempts_made <= job.max_attempts);
    }

    #[test]
    fn observe_error_without_message_gets_default() {
        let mut job = SyncJob::new("db", 5);
        job.observe(Ok(SyncStatus::Error(None)), &no_jitter(), 0, 0);
        assert_eq!(job.state, PollState::Failed);
        assert_eq!(job.failure.as_deref(), Some("sync job reported an error"));
    }

    #[tokio::test(start_paused = true)]
    async fn complete_stops_immediately() {
        let status = ScriptedStatus::new(vec![Reply::Pending, Reply::Complete]);
        let poller = ConvergencePoller::new(no_jitter(), CancellationToken::new());

        let job = poller.poll_until_terminal(&status, "db", 0).await;
        assert_eq!(job.state, PollState::Complete);
        assert_eq!(job.attempts_made, 2);
        assert_eq!(status.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn error_status_fails() {
        let status = ScriptedStatus::new(vec![Reply::Pending, Reply::Pending, Reply::Error]);
        let poller = ConvergencePoller::new(no_jitter(), CancellationToken::new());

        let job = poller.poll_until_terminal(&status, "db", 0).await;
        assert_eq!(job.state, PollState::Failed);
        assert_eq!(job.failure.as_deref(), Some("mirror failed"));
        assert_eq!(status.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_status_fails_instead_of_waiting() {
        let status = ScriptedStatus::new(vec![Reply::Malformed]);
        let poller = ConvergencePoller::new(no_jitter(), CancellationToken::new());

        let job = poller.poll_until_terminal(&status, "db", 0).await;
        assert_eq!(job.state, PollState::Failed);
        assert_eq!(status.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_forever_exhausts_budget() {
        let status = ScriptedStatus::new(vec![]);
        let poller = ConvergencePoller::new(no_jitter(), CancellationToken::new());
        let started = tokio::time::Instant::now();

        let job = poller.poll_until_terminal(&status, "db", 50).await;
        assert_eq!(job.state, PollState::Exhausted);
        assert_eq!(job.max_attempts, 15);
        assert_eq!(job.attempts_made, 15);
        assert_eq!(status.calls(), 15);

        // 14 sleeps, scaled by 0.8 for a workload of 50:
        // 800 + 1600 + 3200 + 6400 + 10 * 8000.
        assert_eq!(started.elapsed(), Duration::from_millis(92_000));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_the_sleep() {
        let status = ScriptedStatus::new(vec![]);
        let cancel = CancellationToken::new();
        let poller = ConvergencePoller::new(no_jitter(), cancel.clone());

        let trigger = async {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            cancel.cancel();
        };
        let (job, _) = tokio::join!(poller.poll_until_terminal(&status, "db", 0), trigger);

        assert_eq!(job.state, PollState::Cancelled);
        assert_eq!(status.calls(), 2);
    }

    #[tokio::test]
    async fn already_cancelled_never_polls() {
        let status = ScriptedStatus::new(vec![Reply::Complete]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let poller = ConvergencePoller::new(no_jitter(), cancel);

        let job = poller.poll_until_terminal(&status, "db", 0).await;
        assert_eq!(job.state, PollState::Cancelled);
        assert_eq!(status.calls(), 0);
    }

    #[test]
    fn poll_state_display() {
        assert_eq!(PollState::Exhausted.to_string(), "EXHAUSTED");
        assert!(!PollState::Polling.is_terminal());
        assert!(PollState::Cancelled.is_terminal());
    }
}
