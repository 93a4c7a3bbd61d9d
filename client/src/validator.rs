//! Pre-submission checks.
//!
//! Advisory only: the ledger re-checks everything when the transaction lands.
//! A rejection here saves a round-trip; an admission promises nothing.

use tally_types::{ElectionAction, ElectionPhase, ElectionSnapshot, RejectReason};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Admit,
    Reject(RejectReason),
}

impl Decision {
    pub fn is_admit(&self) -> bool {
        matches!(self, Self::Admit)
    }
}

/// Decide whether `action` is worth submitting given what `snapshot` says.
///
/// The caller is `snapshot.local_identity`. Checks run in a fixed order and the
/// first failure wins.
pub fn validate(snapshot: &ElectionSnapshot, action: &ElectionAction) -> Decision {
    match check(snapshot, action) {
        Ok(()) => Decision::Admit,
        Err(reason) => Decision::Reject(reason),
    }
}

fn check(snapshot: &ElectionSnapshot, action: &ElectionAction) -> Result<(), RejectReason> {
    if snapshot.local_identity.is_none() {
        return Err(RejectReason::NoIdentity);
    }
    if action.requires_administrator() && !snapshot.local_is_administrator() {
        return Err(RejectReason::NotAdministrator);
    }

    match action {
        ElectionAction::CastVote(id) => {
            require_phase(snapshot, ElectionPhase::Open, RejectReason::ElectionNotOpen)?;
            if snapshot.local_voter_has_voted {
                return Err(RejectReason::AlreadyVoted);
            }
            if snapshot.candidate(*id).is_none() {
                return Err(RejectReason::UnknownCandidate(*id));
            }
        }
        ElectionAction::StartElection => {
            require_phase(snapshot, ElectionPhase::NotStarted, RejectReason::WrongPhase)?;
        }
        ElectionAction::EndElection => {
            require_phase(snapshot, ElectionPhase::Open, RejectReason::WrongPhase)?;
        }
        ElectionAction::AddCandidate(name) => {
            require_phase(snapshot, ElectionPhase::NotStarted, RejectReason::WrongPhase)?;
            if name.trim().is_empty() {
                return Err(RejectReason::InvalidCandidateName);
            }
        }
    }
    Ok(())
}

fn require_phase(
    snapshot: &ElectionSnapshot,
    phase: ElectionPhase,
    otherwise: RejectReason,
) -> Result<(), RejectReason> {
    if snapshot.phase == phase {
        Ok(())
    } else {
        Err(otherwise)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_types::{Candidate, CandidateId, Identity};

    fn admin() -> Identity {
        Identity::from_bytes(&[0xAD; 20])
    }

    fn voter() -> Identity {
        Identity::from_bytes(&[0x01; 20])
    }

    fn id(n: u64) -> CandidateId {
        CandidateId::new(n).unwrap()
    }

    fn snapshot(phase: ElectionPhase, caller: Option<Identity>) -> ElectionSnapshot {
        ElectionSnapshot {
            revision: 1,
            phase,
            candidates: vec![Candidate::new(id(1), "Alice", 0), Candidate::new(id(2), "Bob", 0)],
            local_identity: caller,
            local_voter_has_voted: false,
            administrator: Some(admin()),
            ledger_winner: None,
        }
    }

    #[test]
    fn vote_requires_open_phase() {
        let snap = snapshot(ElectionPhase::NotStarted, Some(voter()));
        assert_eq!(
            validate(&snap, &ElectionAction::CastVote(id(1))),
            Decision::Reject(RejectReason::ElectionNotOpen)
        );
        let snap = snapshot(ElectionPhase::Closed, Some(voter()));
        assert_eq!(
            validate(&snap, &ElectionAction::CastVote(id(1))),
            Decision::Reject(RejectReason::ElectionNotOpen)
        );
    }

    #[test]
    fn vote_checks_record_then_candidate() {
        let mut snap = snapshot(ElectionPhase::Open, Some(voter()));
        assert!(validate(&snap, &ElectionAction::CastVote(id(2))).is_admit());
        assert_eq!(
            validate(&snap, &ElectionAction::CastVote(id(9))),
            Decision::Reject(RejectReason::UnknownCandidate(id(9)))
        );

        snap.local_voter_has_voted = true;
        assert_eq!(
            validate(&snap, &ElectionAction::CastVote(id(9))),
            Decision::Reject(RejectReason::AlreadyVoted)
        );
    }

    #[test]
    fn administrator_actions() {
        let snap = snapshot(ElectionPhase::NotStarted, Some(voter()));
        assert_eq!(
            validate(&snap, &ElectionAction::StartElection),
            Decision::Reject(RejectReason::NotAdministrator)
        );

        let snap = snapshot(ElectionPhase::NotStarted, Some(admin()));
        assert!(validate(&snap, &ElectionAction::StartElection).is_admit());
        assert_eq!(
            validate(&snap, &ElectionAction::EndElection),
            Decision::Reject(RejectReason::WrongPhase)
        );

        let snap = snapshot(ElectionPhase::Open, Some(admin()));
        assert!(validate(&snap, &ElectionAction::EndElection).is_admit());
        assert_eq!(
            validate(&snap, &ElectionAction::StartElection),
            Decision::Reject(RejectReason::WrongPhase)
        );
    }

    #[test]
    fn non_admin_is_told_about_role_before_phase() {
        let snap = snapshot(ElectionPhase::Closed, Some(voter()));
        assert_eq!(
            validate(&snap, &ElectionAction::EndElection),
            Decision::Reject(RejectReason::NotAdministrator)
        );
    }

    #[test]
    fn add_candidate_rules() {
        let snap = snapshot(ElectionPhase::NotStarted, Some(admin()));
        assert!(validate(&snap, &ElectionAction::AddCandidate("Carol".into())).is_admit());
        assert_eq!(
            validate(&snap, &ElectionAction::AddCandidate("   ".into())),
            Decision::Reject(RejectReason::InvalidCandidateName)
        );

        let snap = snapshot(ElectionPhase::Open, Some(admin()));
        assert_eq!(
            validate(&snap, &ElectionAction::AddCandidate("Carol".into())),
            Decision::Reject(RejectReason::WrongPhase)
        );
    }

    #[test]
    fn no_identity_is_checked_first() {
        let snap = snapshot(ElectionPhase::Open, None);
        for action in [
            ElectionAction::CastVote(id(1)),
            ElectionAction::StartElection,
            ElectionAction::EndElection,
            ElectionAction::AddCandidate("Carol".into()),
        ] {
            assert_eq!(validate(&snap, &action), Decision::Reject(RejectReason::NoIdentity));
        }
    }

    #[test]
    fn case_of_the_admin_address_does_not_matter() {
        let upper = Identity::parse("0xADADADADADADADADADADADADADADADADADADADAD").unwrap();
        let snap = snapshot(ElectionPhase::NotStarted, Some(upper));
        assert!(validate(&snap, &ElectionAction::StartElection).is_admit());
    }
}
