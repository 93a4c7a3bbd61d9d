use proptest::prelude::*;

use tally_client::{aggregate, validate, LedgerReading, MirrorError, StateMirror};
use tally_types::{
    Candidate, CandidateId, ElectionAction, ElectionPhase, ElectionSnapshot, Identity,
};

fn phase(index: u8) -> ElectionPhase {
    ElectionPhase::from_index(index).unwrap()
}

fn snapshot(phase: ElectionPhase, votes: &[u64], has_voted: bool, admin: bool) -> ElectionSnapshot {
    let me = Identity::from_bytes(&[1; 20]);
    ElectionSnapshot {
        revision: 1,
        phase,
        candidates: votes
            .iter()
            .enumerate()
            .map(|(i, v)| Candidate::new(CandidateId::new(i as u64 + 1).unwrap(), format!("C{i}"), *v))
            .collect(),
        local_identity: Some(me.clone()),
        local_voter_has_voted: has_voted,
        administrator: Some(if admin { me } else { Identity::from_bytes(&[2; 20]) }),
        ledger_winner: None,
    }
}

fn action_strategy() -> impl Strategy<Value = ElectionAction> {
    prop_oneof![
        (0u64..12).prop_map(|n| ElectionAction::CastVote(
            CandidateId::new(n + 1).unwrap()
        )),
        Just(ElectionAction::StartElection),
        Just(ElectionAction::EndElection),
        "[ a-z]{0,8}".prop_map(ElectionAction::AddCandidate),
    ]
}

proptest! {
    /// The total is the sum of the individual tallies.
    #[test]
    fn total_is_sum_of_counts(votes in prop::collection::vec(0u64..1_000_000, 0..20)) {
        let snap = snapshot(ElectionPhase::Open, &votes, false, false);
        prop_assert_eq!(aggregate::total_votes(&snap), votes.iter().sum::<u64>());
    }

    /// Shares are in [0, 1], all zero with no votes, and add up to one otherwise.
    #[test]
    fn percentages_are_well_formed(votes in prop::collection::vec(0u64..10_000, 1..20)) {
        let snap = snapshot(ElectionPhase::Open, &votes, false, false);
        let shares: Vec<f64> = snap
            .candidates
            .iter()
            .map(|c| aggregate::percentage(&snap, c.id))
            .collect();
        prop_assert!(shares.iter().all(|s| (0.0..=1.0).contains(s)));
        if aggregate::total_votes(&snap) == 0 {
            prop_assert!(shares.iter().all(|s| *s == 0.0));
        } else {
            prop_assert!((shares.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }

    /// The leader has the top tally and the lowest id among those tied for it.
    #[test]
    fn leader_is_lowest_id_among_max(votes in prop::collection::vec(0u64..5, 1..12)) {
        let snap = snapshot(ElectionPhase::Closed, &votes, false, false);
        let max = *votes.iter().max().unwrap();
        let first_max = votes.iter().position(|v| *v == max).unwrap() as u64 + 1;
        let leader = aggregate::leader(&snap).unwrap();
        prop_assert_eq!(leader.vote_count, max);
        prop_assert_eq!(leader.id.get(), first_max);
        prop_assert_eq!(aggregate::winner(&snap).map(|c| c.id), Some(leader.id));
    }

    /// Validation depends only on its inputs and leaves the snapshot untouched.
    #[test]
    fn validate_is_pure(
        phase_index in 0u8..3,
        votes in prop::collection::vec(0u64..10, 0..6),
        has_voted in any::<bool>(),
        admin in any::<bool>(),
        action in action_strategy(),
    ) {
        let snap = snapshot(phase(phase_index), &votes, has_voted, admin);
        let before = snap.clone();
        let first = validate(&snap, &action);
        let second = validate(&snap, &action);
        prop_assert_eq!(first, second);
        prop_assert_eq!(snap, before);
    }

    /// Whatever order phase readings arrive in, the mirror never moves backwards,
    /// and every refused reading is reported as a regression.
    #[test]
    fn mirror_phase_is_monotonic(indices in prop::collection::vec(0u8..3, 1..20)) {
        let mirror = StateMirror::new();
        let admin = Identity::from_bytes(&[9; 20]);
        let mut highest: Option<ElectionPhase> = None;

        for index in indices {
            let observed = phase(index);
            let result = mirror.apply_full_resync(LedgerReading {
                phase: observed,
                administrator: admin.clone(),
                candidates: Vec::new(),
                local_identity: None,
                has_voted: false,
                ledger_winner: None,
            });
            match highest {
                Some(held) if observed < held => {
                    let is_regression = matches!(result, Err(MirrorError::PhaseRegressed { .. }));
                    prop_assert!(is_regression);
                }
                _ => {
                    prop_assert!(result.is_ok());
                    highest = Some(observed);
                }
            }
            prop_assert_eq!(Some(mirror.current().phase), highest);
        }
    }
}
