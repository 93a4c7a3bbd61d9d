//! Sync orchestrator. Keeps the mirror converging on the ledger.
//!
//! Triggers (startup, notifications, identity switches, our own submissions)
//! all funnel into [`SyncOrchestrator::request_resync`]. At most one resync
//! runs at a time. A trigger that arrives while one is running sets a pending
//! flag and returns; when the running resync finishes it starts exactly one
//! more if the flag is set. A burst of N notifications therefore costs at most
//! two resyncs, not N.
//!
//! A running resync is never abandoned for a newer trigger. It reads the
//! current ledger state, which may already be ahead of the event that caused it.
//! The resync loop runs on its own task, so dropping the caller that started
//! it does not stop it either.

use std::future::Future;
use std::sync::Arc;

use tally_gateway::{LedgerError, LedgerGateway, LedgerNotification, TransactionOutcome};
use tally_types::{CandidateId, ElectionAction, ElectionPhase, ElectionSnapshot, RejectReason};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::{ClientConfig, RetryPolicy};
use crate::identity::IdentityBinding;
use crate::mirror::{LedgerReading, StateMirror};
use crate::validator::{self, Decision};
use crate::{aggregate, ActionResult, SyncError};

/// Upper bound on the candidate count a resync will read one by one.
pub const MAX_CANDIDATES: u64 = 1_000;

/// Why a resync was requested. Only used for logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResyncTrigger {
    Startup,
    Notification(LedgerNotification),
    /// The notification receiver fell behind and dropped events.
    Lagged,
    IdentityChanged,
    Submission,
    Manual,
}

/// Result of [`SyncOrchestrator::request_resync`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncReport {
    /// This call ran the resync (and any follow-ups) to completion.
    Applied(Arc<ElectionSnapshot>),
    /// A resync was already running; one follow-up is scheduled after it.
    Coalesced,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum SyncPhase {
    Idle,
    Resyncing,
}

/// Point-in-time view of the orchestrator, for "syncing…" and "stale" indicators.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct SyncStatus {
    pub state: SyncPhase,
    pub pending: bool,
    pub completed_resyncs: u64,
    pub coalesced_triggers: u64,
    /// The last resync failed; the snapshot is the last good one.
    pub degraded: bool,
}

#[derive(Default)]
struct SyncState {
    running: bool,
    pending: bool,
    /// Number of resync runs started so far. The running one, if any, is this number.
    started: u64,
    completed: u64,
    coalesced: u64,
    degraded: bool,
}

/// Outcome of a numbered resync run, published when it finishes.
#[derive(Clone)]
struct RunRecord {
    number: u64,
    result: Result<Arc<ElectionSnapshot>, SyncError>,
}

pub struct SyncOrchestrator<G> {
    shared: Arc<Shared<G>>,
}

/// Everything a resync task needs, owned jointly by the orchestrator and
/// whichever task is currently driving resyncs.
struct Shared<G> {
    gateway: Arc<G>,
    mirror: StateMirror,
    identity: IdentityBinding,
    policy: RetryPolicy,
    state: Mutex<SyncState>,
    runs: watch::Sender<RunRecord>,
}

impl<G: LedgerGateway + 'static> SyncOrchestrator<G> {
    pub fn new(gateway: Arc<G>, identity: IdentityBinding, policy: RetryPolicy) -> Self {
        let (runs, _) = watch::channel(RunRecord {
            number: 0,
            result: Ok(Arc::new(ElectionSnapshot::empty())),
        });
        Self {
            shared: Arc::new(Shared {
                gateway,
                mirror: StateMirror::new(),
                identity,
                policy,
                state: Mutex::new(SyncState::default()),
                runs,
            }),
        }
    }

    pub fn from_config(gateway: Arc<G>, identity: IdentityBinding, config: &ClientConfig) -> Self {
        Self::new(gateway, identity, config.retry_policy())
    }

    pub fn mirror(&self) -> &StateMirror {
        &self.shared.mirror
    }

    pub fn identity(&self) -> &IdentityBinding {
        &self.shared.identity
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.shared.gateway
    }

    /// Shorthand for `mirror().current()`.
    pub fn snapshot(&self) -> Arc<ElectionSnapshot> {
        self.shared.mirror.current()
    }

    /// Push every new snapshot to the UI.
    pub fn subscribe_snapshots(&self) -> watch::Receiver<Arc<ElectionSnapshot>> {
        self.shared.mirror.subscribe()
    }

    pub async fn status(&self) -> SyncStatus {
        let state = self.shared.state.lock().await;
        SyncStatus {
            state: if state.running {
                SyncPhase::Resyncing
            } else {
                SyncPhase::Idle
            },
            pending: state.pending,
            completed_resyncs: state.completed,
            coalesced_triggers: state.coalesced,
            degraded: state.degraded,
        }
    }

    /// Initial fill of the mirror.
    pub async fn start(&self) -> Result<Arc<ElectionSnapshot>, SyncError> {
        self.shared.resync(ResyncTrigger::Startup).await
    }

    /// Ask for a resync without waiting for someone else's.
    ///
    /// If none is running, this call starts it (plus any follow-up requested
    /// meanwhile) and returns the result. Otherwise it only marks the pending
    /// flag and returns [`SyncReport::Coalesced`].
    pub async fn request_resync(&self, trigger: ResyncTrigger) -> Result<SyncReport, SyncError> {
        self.shared.request_resync(trigger).await
    }

    /// Resync and wait until a run that started after this call has finished.
    ///
    /// Use this when the caller needs the mirror to reflect something that just
    /// happened, e.g. its own submission.
    pub async fn resync(&self, trigger: ResyncTrigger) -> Result<Arc<ElectionSnapshot>, SyncError> {
        self.shared.resync(trigger).await
    }

    /// Validate `action` against the current snapshot, submit it if admitted,
    /// then resync no matter what the submission reported.
    pub async fn issue_action(&self, action: ElectionAction) -> ActionResult {
        let shared = &self.shared;
        let Some(signer) = shared.identity.current_identity() else {
            return ActionResult::RejectedBeforeSubmission(RejectReason::NoIdentity);
        };

        let snapshot = shared.mirror.current();
        if snapshot.local_identity.as_ref() != Some(&signer) {
            tracing::info!(%action, "snapshot belongs to another identity, resyncing first");
            if let Err(e) = shared.request_resync(ResyncTrigger::IdentityChanged).await {
                tracing::warn!(error = %e, "resync for new identity failed");
            }
            return ActionResult::RejectedBeforeSubmission(RejectReason::SnapshotStale);
        }

        if let Decision::Reject(reason) = validator::validate(&snapshot, &action) {
            tracing::info!(%action, %reason, "action rejected before submission");
            return ActionResult::RejectedBeforeSubmission(reason);
        }

        tracing::info!(%action, signer = %signer.short(), "submitting action");
        let submitted = tokio::time::timeout(
            shared.policy.call_timeout,
            shared.gateway.submit(&signer, &action),
        )
        .await;
        let result = match submitted {
            Ok(Ok(TransactionOutcome::Confirmed { tx_hash })) => {
                tracing::info!(%action, tx_hash = tx_hash.as_deref().unwrap_or("-"), "action confirmed");
                ActionResult::AdmittedAndConfirmed
            }
            Ok(Ok(TransactionOutcome::Rejected { reason })) | Ok(Err(LedgerError::Rejected(reason))) => {
                tracing::info!(%action, %reason, "ledger rejected action");
                ActionResult::AdmittedButRejected(reason)
            }
            Ok(Err(e)) => {
                tracing::warn!(%action, error = %e, "submission outcome unknown");
                ActionResult::Indeterminate
            }
            Err(_) => {
                tracing::warn!(%action, "submission timed out, outcome unknown");
                ActionResult::Indeterminate
            }
        };

        // The submission's own reply is never the source of truth.
        if let Err(e) = shared.resync(ResyncTrigger::Submission).await {
            tracing::warn!(error = %e, "post-submission resync failed");
        }
        result
    }

    /// Turn notifications and identity switches into resync requests until
    /// `shutdown` fires.
    ///
    /// Notifications are only triggers; their content is never applied.
    pub fn spawn_listener(&self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let mut notifications = shared.gateway.subscribe();
        let mut identity = shared.identity.subscribe();

        tokio::spawn(async move {
            loop {
                let trigger = tokio::select! {
                    biased;
                    _ = shutdown.recv() => break,
                    changed = identity.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        ResyncTrigger::IdentityChanged
                    }
                    received = notifications.recv() => match received {
                        Ok(notification) => ResyncTrigger::Notification(notification),
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!(missed, "notification receiver lagged");
                            ResyncTrigger::Lagged
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::warn!("notification channel closed");
                            break;
                        }
                    },
                };

                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    if let Err(e) = shared.request_resync(trigger).await {
                        tracing::warn!(?trigger, error = %e, "triggered resync failed");
                    }
                });
            }
            tracing::debug!("sync listener stopped");
        })
    }
}

impl<G: LedgerGateway + 'static> Shared<G> {
    async fn request_resync(
        self: &Arc<Self>,
        trigger: ResyncTrigger,
    ) -> Result<SyncReport, SyncError> {
        match self.enter(trigger).await {
            Ticket::Lead(run) => self.lead(run).await.map(SyncReport::Applied),
            Ticket::Follow(_) => Ok(SyncReport::Coalesced),
        }
    }

    async fn resync(self: &Arc<Self>, trigger: ResyncTrigger) -> Result<Arc<ElectionSnapshot>, SyncError> {
        match self.enter(trigger).await {
            Ticket::Lead(run) => self.lead(run).await,
            Ticket::Follow(target) => {
                let mut rx = self.runs.subscribe();
                let record = rx
                    .wait_for(|record| record.number >= target)
                    .await
                    .map(|record| record.result.clone());
                match record {
                    Ok(result) => result,
                    // The sender lives in `self`; it cannot be gone while we borrow it.
                    Err(_) => Ok(self.mirror.current()),
                }
            }
        }
    }

    async fn enter(&self, trigger: ResyncTrigger) -> Ticket {
        let mut state = self.state.lock().await;
        if state.running {
            state.pending = true;
            state.coalesced += 1;
            tracing::debug!(?trigger, "resync already running, coalescing");
            return Ticket::Follow(state.started + 1);
        }
        state.running = true;
        state.started += 1;
        tracing::debug!(?trigger, run = state.started, "resync started");
        Ticket::Lead(state.started)
    }

    /// Drive resyncs from `run` on a task of their own and wait for the result.
    ///
    /// `running` is only cleared by [`drive`](Self::drive), so the loop must
    /// keep going after this caller is dropped.
    async fn lead(self: &Arc<Self>, run: u64) -> Result<Arc<ElectionSnapshot>, SyncError> {
        let shared = Arc::clone(self);
        match tokio::spawn(async move { shared.drive(run).await }).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(SyncError::Ledger(format!("resync task cancelled: {e}"))),
        }
    }

    /// Run resyncs until no follow-up is pending. Returns the last result.
    async fn drive(&self, mut run: u64) -> Result<Arc<ElectionSnapshot>, SyncError> {
        loop {
            let result = self.resync_with_correction().await;
            if let Err(e) = &result {
                tracing::warn!(run, error = %e, "resync failed, keeping last good snapshot");
            }
            self.runs.send_replace(RunRecord {
                number: run,
                result: result.clone(),
            });

            let mut state = self.state.lock().await;
            state.completed += 1;
            state.degraded = result.is_err();
            if state.pending {
                state.pending = false;
                state.started += 1;
                run = state.started;
                tracing::debug!(run, "running coalesced follow-up resync");
                continue;
            }
            state.running = false;
            return result;
        }
    }

    /// One resync, plus one corrective retry if the ledger appeared to regress.
    async fn resync_with_correction(&self) -> Result<Arc<ElectionSnapshot>, SyncError> {
        match self.resync_once().await {
            Err(SyncError::Regression(e)) => {
                tracing::warn!(error = %e, "regression detected, running corrective resync");
                self.resync_once().await
            }
            other => other,
        }
    }

    async fn resync_once(&self) -> Result<Arc<ElectionSnapshot>, SyncError> {
        let reading = self.read_ledger().await?;
        let snapshot = self.mirror.apply_full_resync(reading)?;
        cross_check_winner(&snapshot);
        Ok(snapshot)
    }

    async fn read_ledger(&self) -> Result<LedgerReading, SyncError> {
        let gateway = &*self.gateway;
        let local_identity = self.identity.current_identity();

        let phase = self.with_retry("phase", || gateway.read_phase()).await?;
        let administrator = self
            .with_retry("administrator", || gateway.read_administrator())
            .await?;
        let count = self
            .with_retry("candidate count", || gateway.read_candidate_count())
            .await?;
        if count > MAX_CANDIDATES {
            return Err(SyncError::Ledger(format!(
                "candidate count: ledger reported {count}, limit is {MAX_CANDIDATES}"
            )));
        }

        let mut candidates = Vec::new();
        for id in CandidateId::range(count) {
            let candidate = self
                .with_retry("candidate", move || gateway.read_candidate(id))
                .await?;
            candidates.push(candidate);
        }

        let has_voted = match &local_identity {
            Some(identity) => {
                self.with_retry("voter record", move || gateway.read_has_voted(identity))
                    .await?
            }
            None => false,
        };

        let ledger_winner = if phase == ElectionPhase::Closed && !candidates.is_empty() {
            Some(self.with_retry("winner", || gateway.read_winner()).await?)
        } else {
            None
        };

        Ok(LedgerReading {
            phase,
            administrator,
            candidates,
            local_identity,
            has_voted,
            ledger_winner,
        })
    }

    /// Run one ledger read under the retry policy.
    ///
    /// Transport failures and timeouts are retried with backoff; anything else
    /// is final. Exhausting the attempts yields [`SyncError::Degraded`].
    async fn with_retry<T, F, Fut>(&self, what: &'static str, mut call: F) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let last_error = match tokio::time::timeout(self.policy.call_timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(LedgerError::Transport(e))) => e,
                Ok(Err(e)) => return Err(SyncError::Ledger(format!("{what}: {e}"))),
                Err(_) => format!("timed out after {:?}", self.policy.call_timeout),
            };

            if attempt >= self.policy.max_attempts {
                tracing::warn!(what, attempts = attempt, error = %last_error, "ledger read gave up");
                return Err(SyncError::Degraded {
                    attempts: attempt,
                    last_error: format!("{what}: {last_error}"),
                });
            }

            let delay = self.policy.backoff_for(attempt);
            tracing::debug!(
                what,
                attempt,
                retry_in_ms = delay.as_millis() as u64,
                error = %last_error,
                "ledger read failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

enum Ticket {
    /// Caller runs the resync; carries its run number.
    Lead(u64),
    /// Another call is running; carries the run number that will cover us.
    Follow(u64),
}

fn cross_check_winner(snapshot: &ElectionSnapshot) {
    let Some(reported) = &snapshot.ledger_winner else {
        return;
    };
    let derived = aggregate::winner(snapshot).map(|c| c.id);
    if derived != Some(reported.id) {
        tracing::warn!(
            ledger = %reported.id,
            derived = ?derived,
            "ledger winner disagrees with the tally"
        );
    }
}
