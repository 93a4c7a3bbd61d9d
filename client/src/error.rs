use tally_types::{CandidateId, ElectionPhase};
use thiserror::Error;

/// A reading that contradicts what the mirror already knows to be true.
///
/// The mirror refuses to apply such a reading. Every variant is a form of
/// regression: the ledger is append-only, so a correct reading can never
/// undo a fact the mirror has already observed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MirrorError {
    #[error("phase regressed from {held} to {observed}")]
    PhaseRegressed {
        held: ElectionPhase,
        observed: ElectionPhase,
    },

    #[error("vote count for candidate {id} dropped from {held} to {observed}")]
    VoteCountDecreased {
        id: CandidateId,
        held: u64,
        observed: u64,
    },

    #[error("voter record for the connected identity reverted to not voted")]
    VoterRecordReverted,

    #[error("candidate list changed after voting started")]
    CandidatesChanged,

    #[error("inconsistent reading: {0}")]
    Inconsistent(&'static str),
}

/// Why a resync did not produce a fresh snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Reads kept failing at the transport layer. The last good snapshot is kept.
    #[error("sync degraded after {attempts} attempts: {last_error}")]
    Degraded { attempts: u32, last_error: String },

    /// The ledger refused a read or returned something we could not decode.
    #[error("ledger refused read: {0}")]
    Ledger(String),

    /// The ledger disagreed with itself even after a corrective resync.
    #[error("regression detected: {0}")]
    Regression(#[from] MirrorError),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("config error: {0}")]
    Config(String),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("ledger error: {0}")]
    Ledger(#[from] tally_gateway::LedgerError),

    #[error("invalid identity: {0}")]
    Identity(#[from] tally_types::TypeError),
}
