use proptest::prelude::*;

use tally_types::{CandidateId, ElectionPhase, Identity};

proptest! {
    /// Identity equality ignores the casing of the hex payload.
    #[test]
    fn identity_is_case_insensitive(bytes in prop::array::uniform20(0u8..)) {
        let lower = format!("0x{}", hex::encode(bytes));
        let upper = format!("0x{}", hex::encode_upper(bytes));
        prop_assert_eq!(Identity::parse(&lower).unwrap(), Identity::parse(&upper).unwrap());
    }

    /// Any payload that is not exactly 20 bytes is rejected.
    #[test]
    fn identity_rejects_wrong_lengths(bytes in prop::collection::vec(0u8.., 0..40usize)) {
        prop_assume!(bytes.len() != 20);
        let raw = format!("0x{}", hex::encode(&bytes));
        prop_assert!(Identity::parse(&raw).is_err());
    }

    /// Phase ordering agrees with the ledger's numeric index.
    #[test]
    fn phase_order_matches_index(a in 0u8..3, b in 0u8..3) {
        let pa = ElectionPhase::from_index(a).unwrap();
        let pb = ElectionPhase::from_index(b).unwrap();
        prop_assert_eq!(pa < pb, a < b);
    }

    /// Candidate ids produced for a ledger count are exactly 1..=count.
    #[test]
    fn candidate_range_covers_count(count in 0u64..500) {
        let ids: Vec<CandidateId> = CandidateId::range(count).collect();
        prop_assert_eq!(ids.len() as u64, count);
        prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(ids.iter().all(|id| id.get() >= 1 && id.get() <= count));
    }
}
