//! Nullable ledger: an in-memory election that behaves like the real one.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tally_gateway::{LedgerError, LedgerGateway, LedgerNotification, TransactionOutcome};
use tally_types::{Candidate, CandidateId, ElectionAction, ElectionPhase, Identity};
use tokio::sync::{broadcast, watch};

/// What happens to the next submissions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SubmitBehavior {
    /// Execute and report the verdict.
    #[default]
    Apply,
    /// Execute, then lose the receipt: the caller sees a transport error.
    ApplyThenLoseReply,
    /// Lose the request before it reaches the ledger.
    LoseRequest,
    /// Never answer. The action is not applied.
    Hang,
}

struct ElectionState {
    phase: ElectionPhase,
    admin: Identity,
    candidates: Vec<Candidate>,
    voters: HashSet<Identity>,
}

/// An in-memory election ledger for testing.
///
/// Thread-safe for use with tokio's multi-threaded runtime.
pub struct NullLedger {
    state: Mutex<ElectionState>,
    /// Errors handed out, one per read, before reads succeed again.
    failing_reads: Mutex<VecDeque<LedgerError>>,
    submit_behavior: Mutex<SubmitBehavior>,
    submissions: Mutex<Vec<(Identity, ElectionAction)>>,
    notifications: broadcast::Sender<LedgerNotification>,
    /// `true` while reads may proceed.
    read_gate: watch::Sender<bool>,
    /// Candidate count to report instead of the real one.
    misreported_count: Mutex<Option<u64>>,
    phase_reads: AtomicU64,
}

impl NullLedger {
    pub fn new(admin: Identity) -> Self {
        let (notifications, _) = broadcast::channel(64);
        let (read_gate, _) = watch::channel(true);
        Self {
            state: Mutex::new(ElectionState {
                phase: ElectionPhase::NotStarted,
                admin,
                candidates: Vec::new(),
                voters: HashSet::new(),
            }),
            failing_reads: Mutex::new(VecDeque::new()),
            submit_behavior: Mutex::new(SubmitBehavior::Apply),
            submissions: Mutex::new(Vec::new()),
            notifications,
            read_gate,
            misreported_count: Mutex::new(None),
            phase_reads: AtomicU64::new(0),
        }
    }

    /// Create with candidates registered in order, all at zero votes.
    pub fn with_candidates(admin: Identity, names: &[&str]) -> Self {
        let ledger = Self::new(admin);
        for name in names {
            ledger.seed_candidate(name, 0);
        }
        ledger
    }

    // ── Setup (silent: no notifications) ───────────────────────────────

    /// Register a candidate with a starting tally. Returns its id.
    pub fn seed_candidate(&self, name: &str, votes: u64) -> CandidateId {
        let mut state = self.state.lock().unwrap();
        let id = CandidateId::new(state.candidates.len() as u64 + 1).unwrap();
        state.candidates.push(Candidate::new(id, name, votes));
        id
    }

    /// Overwrite the phase, bypassing the monotonic rule. Lets tests fake a ledger
    /// (or a lagging replica) that reports an earlier phase.
    pub fn set_phase(&self, phase: ElectionPhase) {
        self.state.lock().unwrap().phase = phase;
    }

    /// Overwrite a candidate's tally, bypassing the vote rules.
    pub fn set_votes(&self, id: CandidateId, votes: u64) {
        let mut state = self.state.lock().unwrap();
        if let Some(c) = state.candidates.iter_mut().find(|c| c.id == id) {
            c.vote_count = votes;
        }
    }

    /// Mark `voter` as having voted without touching any tally.
    pub fn mark_voted(&self, voter: &Identity) {
        self.state.lock().unwrap().voters.insert(voter.clone());
    }

    /// Forget that `voter` has voted. Only useful to fake a regressing replica.
    pub fn unmark_voted(&self, voter: &Identity) {
        self.state.lock().unwrap().voters.remove(voter);
    }

    // ── Scripting ──────────────────────────────────────────────────────

    /// Make the next `n` reads fail with a transport error.
    pub fn fail_next_reads(&self, n: u32) {
        let mut failing = self.failing_reads.lock().unwrap();
        for _ in 0..n {
            failing.push_back(LedgerError::Transport("simulated network failure".into()));
        }
    }

    /// Make the next read fail with `error`, after any already queued.
    pub fn fail_next_read_with(&self, error: LedgerError) {
        self.failing_reads.lock().unwrap().push_back(error);
    }

    /// Report `count` candidates from now on, whatever is registered.
    pub fn misreport_candidate_count(&self, count: u64) {
        *self.misreported_count.lock().unwrap() = Some(count);
    }

    pub fn set_submit_behavior(&self, behavior: SubmitBehavior) {
        *self.submit_behavior.lock().unwrap() = behavior;
    }

    /// Stall every read until [`resume_reads`](Self::resume_reads) is called.
    pub fn pause_reads(&self) {
        self.read_gate.send_replace(false);
    }

    pub fn resume_reads(&self) {
        self.read_gate.send_replace(true);
    }

    /// Publish a notification as the ledger would.
    pub fn notify(&self, notification: LedgerNotification) {
        let _ = self.notifications.send(notification);
    }

    /// Another participant votes. Emits `VoteRecorded` on success.
    pub fn external_vote(&self, voter: &Identity, id: CandidateId) -> Result<(), String> {
        self.execute(voter, &ElectionAction::CastVote(id))?;
        self.notify(LedgerNotification::VoteRecorded);
        Ok(())
    }

    // ── Inspection ─────────────────────────────────────────────────────

    /// How many times the phase has been read. Every full resync reads it once.
    pub fn phase_reads(&self) -> u64 {
        self.phase_reads.load(Ordering::SeqCst)
    }

    /// Every action that reached the ledger, in order.
    pub fn submissions(&self) -> Vec<(Identity, ElectionAction)> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn phase(&self) -> ElectionPhase {
        self.state.lock().unwrap().phase
    }

    pub fn vote_count(&self, id: CandidateId) -> Option<u64> {
        self.state
            .lock()
            .unwrap()
            .candidates
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.vote_count)
    }

    pub fn has_voted(&self, voter: &Identity) -> bool {
        self.state.lock().unwrap().voters.contains(voter)
    }

    // ── Internals ──────────────────────────────────────────────────────

    /// Wait for the read gate, then consume a scripted failure if one is queued.
    async fn begin_read(&self) -> Result<(), LedgerError> {
        let mut gate = self.read_gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        match self.failing_reads.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Apply `action` with the ledger's own rules.
    fn execute(&self, signer: &Identity, action: &ElectionAction) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        let is_admin = *signer == state.admin;
        match action {
            ElectionAction::CastVote(id) => {
                if state.phase != ElectionPhase::Open {
                    return Err("Voting is not active".into());
                }
                if state.voters.contains(signer) {
                    return Err("Already voted".into());
                }
                let candidate = state
                    .candidates
                    .iter_mut()
                    .find(|c| c.id == *id)
                    .ok_or_else(|| "Invalid candidate".to_string())?;
                candidate.vote_count += 1;
                state.voters.insert(signer.clone());
            }
            ElectionAction::StartElection => {
                if !is_admin {
                    return Err("Only admin".into());
                }
                if state.phase != ElectionPhase::NotStarted {
                    return Err("Voting already started".into());
                }
                state.phase = ElectionPhase::Open;
            }
            ElectionAction::EndElection => {
                if !is_admin {
                    return Err("Only admin".into());
                }
                if state.phase != ElectionPhase::Open {
                    return Err("Voting is not active".into());
                }
                state.phase = ElectionPhase::Closed;
            }
            ElectionAction::AddCandidate(name) => {
                if !is_admin {
                    return Err("Only admin".into());
                }
                if state.phase != ElectionPhase::NotStarted {
                    return Err("Cannot add candidates after voting started".into());
                }
                let id = CandidateId::new(state.candidates.len() as u64 + 1).unwrap();
                state.candidates.push(Candidate::new(id, name.clone(), 0));
            }
        }
        Ok(())
    }

    fn notification_for(action: &ElectionAction) -> LedgerNotification {
        match action {
            ElectionAction::CastVote(_) => LedgerNotification::VoteRecorded,
            ElectionAction::StartElection | ElectionAction::EndElection => {
                LedgerNotification::PhaseChanged
            }
            ElectionAction::AddCandidate(_) => LedgerNotification::CandidateAdded,
        }
    }
}

impl LedgerGateway for NullLedger {
    async fn read_phase(&self) -> Result<ElectionPhase, LedgerError> {
        self.phase_reads.fetch_add(1, Ordering::SeqCst);
        self.begin_read().await?;
        Ok(self.state.lock().unwrap().phase)
    }

    async fn read_administrator(&self) -> Result<Identity, LedgerError> {
        self.begin_read().await?;
        Ok(self.state.lock().unwrap().admin.clone())
    }

    async fn read_candidate_count(&self) -> Result<u64, LedgerError> {
        self.begin_read().await?;
        if let Some(count) = *self.misreported_count.lock().unwrap() {
            return Ok(count);
        }
        Ok(self.state.lock().unwrap().candidates.len() as u64)
    }

    async fn read_candidate(&self, id: CandidateId) -> Result<Candidate, LedgerError> {
        self.begin_read().await?;
        self.state
            .lock()
            .unwrap()
            .candidates
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| LedgerError::Rejected("Invalid candidate".into()))
    }

    async fn read_has_voted(&self, identity: &Identity) -> Result<bool, LedgerError> {
        self.begin_read().await?;
        Ok(self.state.lock().unwrap().voters.contains(identity))
    }

    async fn read_winner(&self) -> Result<Candidate, LedgerError> {
        self.begin_read().await?;
        let state = self.state.lock().unwrap();
        if state.phase != ElectionPhase::Closed {
            return Err(LedgerError::Rejected("Voting not ended".into()));
        }
        let mut winner: Option<&Candidate> = None;
        for c in &state.candidates {
            if winner.map_or(true, |w| c.vote_count > w.vote_count) {
                winner = Some(c);
            }
        }
        winner
            .cloned()
            .ok_or_else(|| LedgerError::Rejected("No candidates".into()))
    }

    async fn submit(
        &self,
        signer: &Identity,
        action: &ElectionAction,
    ) -> Result<TransactionOutcome, LedgerError> {
        let behavior = *self.submit_behavior.lock().unwrap();
        match behavior {
            SubmitBehavior::LoseRequest => {
                return Err(LedgerError::Transport("connection reset".into()));
            }
            SubmitBehavior::Hang => return std::future::pending().await,
            _ => {}
        }

        self.submissions
            .lock()
            .unwrap()
            .push((signer.clone(), action.clone()));

        let outcome = match self.execute(signer, action) {
            Ok(()) => {
                self.notify(Self::notification_for(action));
                TransactionOutcome::Confirmed { tx_hash: None }
            }
            Err(reason) => TransactionOutcome::Rejected { reason },
        };

        match behavior {
            SubmitBehavior::ApplyThenLoseReply => Err(LedgerError::Transport(
                "connection reset before receipt".into(),
            )),
            _ => Ok(outcome),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<LedgerNotification> {
        self.notifications.subscribe()
    }
}
