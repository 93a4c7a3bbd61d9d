//! The client's mirrored view of the election.

use serde::{Deserialize, Serialize};

use crate::candidate::{Candidate, CandidateId};
use crate::identity::Identity;
use crate::phase::ElectionPhase;

/// A point-in-time copy of the ledger's election state.
///
/// Every snapshot handed out was true of the ledger at some past instant. It may be
/// stale, but it is never assembled from reads that contradict each other.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSnapshot {
    /// Incremented each time a resync is applied. `0` means nothing has been read yet.
    pub revision: u64,
    pub phase: ElectionPhase,
    /// Ordered by identifier.
    pub candidates: Vec<Candidate>,
    /// The identity `local_voter_has_voted` was read for.
    pub local_identity: Option<Identity>,
    pub local_voter_has_voted: bool,
    pub administrator: Option<Identity>,
    /// What the ledger reports as the winner once the election is closed.
    pub ledger_winner: Option<Candidate>,
}

impl ElectionSnapshot {
    /// The value the mirror holds before the first resync.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether any resync has been applied yet.
    pub fn is_loaded(&self) -> bool {
        self.revision > 0
    }

    pub fn candidate(&self, id: CandidateId) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == id)
    }

    /// Whether the local identity is the election administrator.
    pub fn local_is_administrator(&self) -> bool {
        match (&self.local_identity, &self.administrator) {
            (Some(local), Some(admin)) => local == admin,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> CandidateId {
        CandidateId::new(n).unwrap()
    }

    #[test]
    fn empty_snapshot_is_not_loaded() {
        let snap = ElectionSnapshot::empty();
        assert!(!snap.is_loaded());
        assert_eq!(snap.phase, ElectionPhase::NotStarted);
        assert!(snap.candidates.is_empty());
        assert!(!snap.local_is_administrator());
    }

    #[test]
    fn candidate_lookup() {
        let snap = ElectionSnapshot {
            candidates: vec![Candidate::new(id(1), "Alice", 0), Candidate::new(id(2), "Bob", 3)],
            ..ElectionSnapshot::empty()
        };
        assert_eq!(snap.candidate(id(2)).map(|c| c.name.as_str()), Some("Bob"));
        assert!(snap.candidate(id(3)).is_none());
    }

    #[test]
    fn administrator_check_compares_identities() {
        let admin = Identity::from_bytes(&[1; 20]);
        let other = Identity::from_bytes(&[2; 20]);
        let mut snap = ElectionSnapshot {
            administrator: Some(admin.clone()),
            local_identity: Some(other),
            ..ElectionSnapshot::empty()
        };
        assert!(!snap.local_is_administrator());
        snap.local_identity = Some(admin);
        assert!(snap.local_is_administrator());
    }
}
