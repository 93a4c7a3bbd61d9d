//! State mirror: the client's current belief about the election.
//!
//! Readers always see a complete snapshot. A resync builds the next snapshot
//! value off to the side and swaps it in with a single `send_replace`, so a
//! reader holding the previous `Arc` is never affected and nobody can observe
//! a half-applied update.
//!
//! The ledger is append-only, which gives the mirror a set of facts that can
//! only move forward: phase, vote counts, the local voter record and, once
//! voting has started, the candidate list. A reading that moves any of them
//! backwards is refused with a [`MirrorError`] and the held snapshot stays.

use std::sync::Arc;

use tally_types::{Candidate, ElectionPhase, ElectionSnapshot, Identity};
use tokio::sync::watch;

use crate::MirrorError;

/// Everything a full resync read from the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerReading {
    pub phase: ElectionPhase,
    pub administrator: Identity,
    /// Ordered by id.
    pub candidates: Vec<Candidate>,
    /// The identity `has_voted` was read for.
    pub local_identity: Option<Identity>,
    pub has_voted: bool,
    pub ledger_winner: Option<Candidate>,
}

pub struct StateMirror {
    tx: watch::Sender<Arc<ElectionSnapshot>>,
}

impl StateMirror {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(ElectionSnapshot::empty()));
        Self { tx }
    }

    /// The latest complete snapshot. Never blocks on a resync.
    pub fn current(&self) -> Arc<ElectionSnapshot> {
        self.tx.borrow().clone()
    }

    /// Receive every snapshot the mirror swaps in from now on.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ElectionSnapshot>> {
        self.tx.subscribe()
    }

    /// Replace the snapshot with `reading`, or refuse it if it contradicts the
    /// held one. On refusal nothing changes and subscribers are not woken.
    pub fn apply_full_resync(
        &self,
        reading: LedgerReading,
    ) -> Result<Arc<ElectionSnapshot>, MirrorError> {
        let held = self.current();
        if let Err(e) = check_reading(&held, &reading) {
            tracing::warn!(revision = held.revision, error = %e, "refusing ledger reading");
            return Err(e);
        }

        let next = Arc::new(ElectionSnapshot {
            revision: held.revision + 1,
            phase: reading.phase,
            candidates: reading.candidates,
            local_identity: reading.local_identity,
            local_voter_has_voted: reading.has_voted,
            administrator: Some(reading.administrator),
            ledger_winner: reading.ledger_winner,
        });
        self.tx.send_replace(Arc::clone(&next));

        tracing::info!(
            revision = next.revision,
            phase = %next.phase,
            candidates = next.candidates.len(),
            has_voted = next.local_voter_has_voted,
            "mirror updated"
        );
        Ok(next)
    }
}

impl Default for StateMirror {
    fn default() -> Self {
        Self::new()
    }
}

fn check_reading(held: &ElectionSnapshot, reading: &LedgerReading) -> Result<(), MirrorError> {
    if reading.has_voted && reading.phase == ElectionPhase::NotStarted {
        return Err(MirrorError::Inconsistent("voter record set before voting opened"));
    }
    if reading.ledger_winner.is_some() && reading.phase != ElectionPhase::Closed {
        return Err(MirrorError::Inconsistent("winner reported before voting ended"));
    }

    // Nothing to contradict yet.
    if !held.is_loaded() {
        return Ok(());
    }

    if reading.phase < held.phase {
        return Err(MirrorError::PhaseRegressed {
            held: held.phase,
            observed: reading.phase,
        });
    }

    let frozen = !held.phase.accepts_candidates();
    if frozen && held.candidates.len() != reading.candidates.len() {
        return Err(MirrorError::CandidatesChanged);
    }
    for before in &held.candidates {
        let Some(after) = reading.candidates.iter().find(|c| c.id == before.id) else {
            return Err(MirrorError::CandidatesChanged);
        };
        if after.name != before.name {
            return Err(MirrorError::CandidatesChanged);
        }
        if after.vote_count < before.vote_count {
            return Err(MirrorError::VoteCountDecreased {
                id: before.id,
                held: before.vote_count,
                observed: after.vote_count,
            });
        }
    }

    // The record is per identity; a different account may well not have voted.
    if held.local_voter_has_voted
        && !reading.has_voted
        && held.local_identity == reading.local_identity
    {
        return Err(MirrorError::VoterRecordReverted);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_types::CandidateId;

    fn admin() -> Identity {
        Identity::from_bytes(&[0xAD; 20])
    }

    fn me() -> Identity {
        Identity::from_bytes(&[0x01; 20])
    }

    fn candidate(id: u64, name: &str, votes: u64) -> Candidate {
        Candidate::new(CandidateId::new(id).unwrap(), name, votes)
    }

    fn reading(phase: ElectionPhase, votes: &[u64], has_voted: bool) -> LedgerReading {
        let names = ["Alice", "Bob", "Carol"];
        LedgerReading {
            phase,
            administrator: admin(),
            candidates: votes
                .iter()
                .enumerate()
                .map(|(i, v)| candidate(i as u64 + 1, names[i], *v))
                .collect(),
            local_identity: Some(me()),
            has_voted,
            ledger_winner: None,
        }
    }

    #[test]
    fn first_resync_fills_the_snapshot() {
        let mirror = StateMirror::new();
        assert!(!mirror.current().is_loaded());

        let snap = mirror
            .apply_full_resync(reading(ElectionPhase::Open, &[5, 3], false))
            .unwrap();
        assert_eq!(snap.revision, 1);
        assert_eq!(snap.phase, ElectionPhase::Open);
        assert_eq!(snap.administrator, Some(admin()));
        assert_eq!(mirror.current(), snap);
    }

    #[test]
    fn phase_regression_is_refused_and_snapshot_kept() {
        let mirror = StateMirror::new();
        mirror
            .apply_full_resync(reading(ElectionPhase::Closed, &[1, 0], true))
            .unwrap();
        let before = mirror.current();

        let err = mirror
            .apply_full_resync(reading(ElectionPhase::Open, &[1, 0], true))
            .unwrap_err();
        assert_eq!(
            err,
            MirrorError::PhaseRegressed {
                held: ElectionPhase::Closed,
                observed: ElectionPhase::Open
            }
        );
        assert_eq!(mirror.current(), before);
    }

    #[test]
    fn vote_count_cannot_drop() {
        let mirror = StateMirror::new();
        mirror
            .apply_full_resync(reading(ElectionPhase::Open, &[5, 3], false))
            .unwrap();
        let err = mirror
            .apply_full_resync(reading(ElectionPhase::Open, &[4, 3], false))
            .unwrap_err();
        assert!(matches!(err, MirrorError::VoteCountDecreased { held: 5, observed: 4, .. }));
    }

    #[test]
    fn candidates_are_frozen_once_voting_starts() {
        let mirror = StateMirror::new();
        mirror
            .apply_full_resync(reading(ElectionPhase::NotStarted, &[0], false))
            .unwrap();
        // Still registering: growth is fine.
        mirror
            .apply_full_resync(reading(ElectionPhase::NotStarted, &[0, 0], false))
            .unwrap();
        mirror
            .apply_full_resync(reading(ElectionPhase::Open, &[0, 0], false))
            .unwrap();
        assert_eq!(
            mirror.apply_full_resync(reading(ElectionPhase::Open, &[0, 0, 0], false)),
            Err(MirrorError::CandidatesChanged)
        );
    }

    #[test]
    fn voter_record_is_write_once_per_identity() {
        let mirror = StateMirror::new();
        mirror
            .apply_full_resync(reading(ElectionPhase::Open, &[1], true))
            .unwrap();
        assert_eq!(
            mirror.apply_full_resync(reading(ElectionPhase::Open, &[1], false)),
            Err(MirrorError::VoterRecordReverted)
        );

        // A different account has its own record.
        let mut other = reading(ElectionPhase::Open, &[1], false);
        other.local_identity = Some(Identity::from_bytes(&[0x02; 20]));
        let snap = mirror.apply_full_resync(other).unwrap();
        assert!(!snap.local_voter_has_voted);
    }

    #[test]
    fn internally_inconsistent_readings_are_refused() {
        let mirror = StateMirror::new();
        assert!(matches!(
            mirror.apply_full_resync(reading(ElectionPhase::NotStarted, &[0], true)),
            Err(MirrorError::Inconsistent(_))
        ));

        let mut early_winner = reading(ElectionPhase::Open, &[2], false);
        early_winner.ledger_winner = Some(candidate(1, "Alice", 2));
        assert!(matches!(
            mirror.apply_full_resync(early_winner),
            Err(MirrorError::Inconsistent(_))
        ));
        assert!(!mirror.current().is_loaded());
    }

    #[tokio::test]
    async fn subscribers_see_swapped_snapshots_only() {
        let mirror = StateMirror::new();
        let mut rx = mirror.subscribe();

        mirror
            .apply_full_resync(reading(ElectionPhase::Open, &[0, 0], false))
            .unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().revision, 1);

        let _ = mirror.apply_full_resync(reading(ElectionPhase::NotStarted, &[0, 0], false));
        assert!(!rx.has_changed().unwrap());
    }
}
