//! Human-readable output.

use std::fmt::Write;

use tally_client::{ActionResult, ElectionSummary, SyncStatus};
use tally_types::CandidateId;

pub fn summary(summary: &ElectionSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Election: {} (revision {})", summary.phase_label, summary.revision);

    let width = summary.rows.iter().map(|r| r.name.len()).max().unwrap_or(0);
    for row in &summary.rows {
        let _ = writeln!(
            out,
            "  {:>4}  {:<width$}  {:>6} votes  {:>5.1}%",
            row.id.to_string(),
            row.name,
            row.votes,
            row.percentage,
        );
    }
    let _ = writeln!(
        out,
        "Total: {} votes across {} candidates",
        summary.total_votes, summary.total_candidates
    );

    let name_of = |id: CandidateId| {
        summary
            .rows
            .iter()
            .find(|r| r.id == id)
            .map(|r| format!("{} {}", r.id, r.name))
            .unwrap_or_else(|| id.to_string())
    };
    match (summary.winner, summary.leader) {
        (Some(winner), _) => {
            let _ = writeln!(out, "Winner: {}", name_of(winner));
        }
        (None, Some(leader)) if summary.total_votes > 0 => {
            let _ = writeln!(out, "Leading: {}", name_of(leader));
        }
        _ => {}
    }

    if summary.is_administrator {
        let _ = writeln!(out, "You are the administrator.");
    }
    if summary.has_voted {
        let _ = writeln!(out, "You have voted.");
    }
    out
}

pub fn sync_status(status: &SyncStatus) -> String {
    let mut out = format!(
        "Sync: {} resyncs, {} coalesced triggers",
        status.completed_resyncs, status.coalesced_triggers
    );
    if status.degraded {
        out.push_str(" (stale: last resync failed)");
    }
    out
}

pub fn action(result: &ActionResult) -> String {
    match result {
        ActionResult::AdmittedAndConfirmed => "Confirmed.".to_string(),
        other => {
            let mut text = other.to_string();
            if let Some(first) = text.get_mut(0..1) {
                first.make_ascii_uppercase();
            }
            text.push('.');
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_client::aggregate;
    use tally_types::{Candidate, ElectionPhase, ElectionSnapshot, RejectReason};

    #[test]
    fn renders_closed_election() {
        let snapshot = ElectionSnapshot {
            revision: 4,
            phase: ElectionPhase::Closed,
            candidates: vec![
                Candidate::new(CandidateId::new(1).unwrap(), "Alice", 2),
                Candidate::new(CandidateId::new(2).unwrap(), "Bob", 1),
            ],
            ..ElectionSnapshot::empty()
        };
        let text = summary(&aggregate::summarize(&snapshot));
        assert!(text.starts_with("Election: Ended (revision 4)"));
        assert!(text.contains("Alice"));
        assert!(text.contains("66.7%"));
        assert!(text.contains("Winner: #1 Alice"));
        assert!(!text.contains("You have voted"));
    }

    #[test]
    fn renders_action_results() {
        assert_eq!(action(&ActionResult::AdmittedAndConfirmed), "Confirmed.");
        assert_eq!(
            action(&ActionResult::RejectedBeforeSubmission(RejectReason::AlreadyVoted)),
            "Not submitted: this identity has already voted."
        );
    }
}
