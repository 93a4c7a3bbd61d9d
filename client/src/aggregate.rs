//! Derived read-only values over a snapshot.
//!
//! Every function here is a pure function of its [`ElectionSnapshot`] argument.

use serde::Serialize;
use tally_types::{Candidate, CandidateId, ElectionPhase, ElectionSnapshot};

/// Sum of all tallies, saturating at `u64::MAX`.
pub fn total_votes(snapshot: &ElectionSnapshot) -> u64 {
    snapshot
        .candidates
        .iter()
        .fold(0u64, |total, c| total.saturating_add(c.vote_count))
}

/// Share of the vote for `id` in `[0, 1]`. Zero when nobody has voted or the
/// candidate is unknown.
pub fn percentage(snapshot: &ElectionSnapshot, id: CandidateId) -> f64 {
    let total = total_votes(snapshot);
    if total == 0 {
        return 0.0;
    }
    snapshot
        .candidate(id)
        .map_or(0.0, |c| c.vote_count as f64 / total as f64)
}

/// Candidate with the most votes. Ties go to the lowest id.
pub fn leader(snapshot: &ElectionSnapshot) -> Option<&Candidate> {
    snapshot
        .candidates
        .iter()
        .max_by(|a, b| a.vote_count.cmp(&b.vote_count).then(b.id.cmp(&a.id)))
}

/// The leader of the final tally, once voting has ended.
pub fn winner(snapshot: &ElectionSnapshot) -> Option<&Candidate> {
    if snapshot.phase == ElectionPhase::Closed {
        leader(snapshot)
    } else {
        None
    }
}

/// One line of the results table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SummaryRow {
    pub id: CandidateId,
    pub name: String,
    pub votes: u64,
    pub fraction: f64,
    /// `fraction` as a percentage, rounded to one decimal.
    pub percentage: f64,
}

/// Everything a results view needs, in one serializable value.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ElectionSummary {
    pub revision: u64,
    pub phase: ElectionPhase,
    pub phase_label: &'static str,
    pub total_candidates: usize,
    pub total_votes: u64,
    pub rows: Vec<SummaryRow>,
    pub leader: Option<CandidateId>,
    pub winner: Option<CandidateId>,
    pub has_voted: bool,
    pub is_administrator: bool,
}

pub fn summarize(snapshot: &ElectionSnapshot) -> ElectionSummary {
    let rows = snapshot
        .candidates
        .iter()
        .map(|c| {
            let fraction = percentage(snapshot, c.id);
            SummaryRow {
                id: c.id,
                name: c.name.clone(),
                votes: c.vote_count,
                fraction,
                percentage: (fraction * 1000.0).round() / 10.0,
            }
        })
        .collect();

    ElectionSummary {
        revision: snapshot.revision,
        phase: snapshot.phase,
        phase_label: snapshot.phase.label(),
        total_candidates: snapshot.candidates.len(),
        total_votes: total_votes(snapshot),
        rows,
        leader: leader(snapshot).map(|c| c.id),
        winner: winner(snapshot).map(|c| c.id),
        has_voted: snapshot.local_voter_has_voted,
        is_administrator: snapshot.local_is_administrator(),
    }
}
