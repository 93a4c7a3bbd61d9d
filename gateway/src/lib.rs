//! Ledger gateway: the only component that talks to the election ledger.
//!
//! The ledger is an external, append-only state machine. This crate exposes it
//! through the [`LedgerGateway`] trait:
//! - typed reads (phase, administrator, candidates, voter record, winner)
//! - transaction submission with a `Confirmed | Rejected` outcome
//! - a broadcast channel of change notifications
//!
//! Notifications carry no data. Consumers treat them as "something changed,
//! re-read" and never as a source of truth; they may arrive late, out of order,
//! duplicated, or not at all.
//!
//! Two implementations live in the workspace: [`RpcLedgerClient`] for a real
//! JSON-RPC endpoint and `tally_nullables::NullLedger` for tests.

pub mod error;
pub mod events;
pub mod rpc;

pub use error::LedgerError;
pub use events::{EventFeed, ReconnectPolicy};
pub use rpc::RpcLedgerClient;

use std::future::Future;

use tally_types::{Candidate, CandidateId, ElectionAction, ElectionPhase, Identity};
use tokio::sync::broadcast;

/// Final outcome of a submitted transaction, once the ledger has decided.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// Included and executed.
    Confirmed { tx_hash: Option<String> },
    /// Reverted by the ledger with a human-readable reason.
    Rejected { reason: String },
}

/// A change notification from the ledger. Only the kind is meaningful.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LedgerNotification {
    /// The election phase moved (start or end).
    PhaseChanged,
    /// Someone's vote was recorded.
    VoteRecorded,
    /// A candidate was registered.
    CandidateAdded,
    /// The notification transport reconnected; anything could have been missed.
    Resubscribed,
}

/// Narrow RPC surface of the election ledger.
///
/// Every call suspends the caller until the ledger answers. Implementations
/// should bound each call with a timeout and report it as
/// [`LedgerError::Transport`].
pub trait LedgerGateway: Send + Sync {
    fn read_phase(&self) -> impl Future<Output = Result<ElectionPhase, LedgerError>> + Send;

    fn read_administrator(&self) -> impl Future<Output = Result<Identity, LedgerError>> + Send;

    fn read_candidate_count(&self) -> impl Future<Output = Result<u64, LedgerError>> + Send;

    fn read_candidate(
        &self,
        id: CandidateId,
    ) -> impl Future<Output = Result<Candidate, LedgerError>> + Send;

    fn read_has_voted(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<bool, LedgerError>> + Send;

    /// Only valid once the election is closed; earlier calls are rejected.
    fn read_winner(&self) -> impl Future<Output = Result<Candidate, LedgerError>> + Send;

    /// Submit `action` signed as `signer` and wait for the ledger's verdict.
    ///
    /// A [`LedgerError::Transport`] here is ambiguous: the transaction may or may
    /// not have been applied.
    fn submit(
        &self,
        signer: &Identity,
        action: &ElectionAction,
    ) -> impl Future<Output = Result<TransactionOutcome, LedgerError>> + Send;

    /// Receive change notifications from now on.
    fn subscribe(&self) -> broadcast::Receiver<LedgerNotification>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(LedgerError::Transport("timeout".into()).is_retryable());
        assert!(!LedgerError::Rejected("Voting not active".into()).is_retryable());
        assert!(!LedgerError::InvalidResponse("bad json".into()).is_retryable());
    }
}
