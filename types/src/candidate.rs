//! Candidates and their ledger-assigned identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TypeError;

/// Ledger-assigned candidate identifier. Positive and stable for the lifetime
/// of the election; the ledger numbers candidates `1..=count`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct CandidateId(u64);

impl CandidateId {
    /// The first identifier the ledger hands out.
    pub const FIRST: Self = Self(1);

    pub fn new(raw: u64) -> Result<Self, TypeError> {
        if raw == 0 {
            return Err(TypeError::ZeroCandidateId);
        }
        Ok(Self(raw))
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    /// Every identifier for a ledger holding `count` candidates, in order.
    pub fn range(count: u64) -> impl Iterator<Item = CandidateId> {
        (1..=count).map(CandidateId)
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl TryFrom<u64> for CandidateId {
    type Error = TypeError;

    fn try_from(raw: u64) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<CandidateId> for u64 {
    fn from(id: CandidateId) -> Self {
        id.0
    }
}

/// A candidate as read from the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    /// Immutable after creation.
    pub name: String,
    /// Only ever grows, and only through confirmed vote transactions.
    pub vote_count: u64,
}

impl Candidate {
    pub fn new(id: CandidateId, name: impl Into<String>, vote_count: u64) -> Self {
        Self {
            id,
            name: name.into(),
            vote_count,
        }
    }
}
