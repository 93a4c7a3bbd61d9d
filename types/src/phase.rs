//! The election lifecycle phase.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TypeError;

/// Where the election is in its lifecycle.
///
/// Phases only ever advance `NotStarted → Open → Closed`; the derived `Ord`
/// follows declaration order so "earlier than" is a plain comparison.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ElectionPhase {
    /// Candidates may still be registered; no voting yet.
    #[default]
    NotStarted,
    /// Voting is in progress.
    Open,
    /// Voting has ended and the tally is final.
    Closed,
}

impl ElectionPhase {
    /// Decode the ledger's numeric state index.
    pub fn from_index(index: u8) -> Result<Self, TypeError> {
        match index {
            0 => Ok(Self::NotStarted),
            1 => Ok(Self::Open),
            2 => Ok(Self::Closed),
            other => Err(TypeError::UnknownPhase(other)),
        }
    }

    /// The ledger's numeric state index.
    pub fn index(&self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Open => 1,
            Self::Closed => 2,
        }
    }

    /// Human-readable status label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotStarted => "Not Started",
            Self::Open => "Voting Active",
            Self::Closed => "Ended",
        }
    }

    /// Whether the candidate list may still change.
    pub fn accepts_candidates(&self) -> bool {
        matches!(self, Self::NotStarted)
    }
}

impl fmt::Display for ElectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
