//! State-changing requests and the reasons the client refuses them.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::candidate::CandidateId;

/// A state-changing request a participant can make against the election.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionAction {
    /// Cast the local identity's single vote.
    CastVote(CandidateId),
    /// Administrator only: `NotStarted → Open`.
    StartElection,
    /// Administrator only: `Open → Closed`.
    EndElection,
    /// Administrator only, before the election starts.
    AddCandidate(String),
}

impl ElectionAction {
    /// Name of the ledger call this action is submitted as.
    pub fn call_name(&self) -> &'static str {
        match self {
            Self::CastVote(_) => "vote",
            Self::StartElection => "startVoting",
            Self::EndElection => "endVoting",
            Self::AddCandidate(_) => "addCandidate",
        }
    }

    /// Whether only the administrator may submit this action.
    pub fn requires_administrator(&self) -> bool {
        !matches!(self, Self::CastVote(_))
    }
}

impl fmt::Display for ElectionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CastVote(id) => write!(f, "cast vote for candidate {id}"),
            Self::StartElection => f.write_str("start election"),
            Self::EndElection => f.write_str("end election"),
            Self::AddCandidate(name) => write!(f, "add candidate {name:?}"),
        }
    }
}

/// Why the client refused an action before submitting it.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RejectReason {
    #[error("no identity is connected")]
    NoIdentity,

    #[error("voting is not active")]
    ElectionNotOpen,

    #[error("this identity has already voted")]
    AlreadyVoted,

    #[error("candidate {0} does not exist")]
    UnknownCandidate(CandidateId),

    #[error("only the administrator can do this")]
    NotAdministrator,

    #[error("the election is not in the right phase for this action")]
    WrongPhase,

    #[error("candidate name must not be empty")]
    InvalidCandidateName,

    #[error("election state is still loading for the connected identity")]
    SnapshotStale,
}
