use serde::Serialize;
use std::fmt;
use tally_types::RejectReason;

/// What became of a user action, as reported to the UI.
///
/// Raw transport diagnostics never appear here; they go to the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "reason", rename_all = "snake_case")]
pub enum ActionResult {
    /// The ledger executed the transaction.
    AdmittedAndConfirmed,
    /// Submitted, and the ledger refused it. Carries the ledger's reason.
    AdmittedButRejected(String),
    /// Never submitted: the local snapshot already rules it out.
    RejectedBeforeSubmission(RejectReason),
    /// Submitted, but the reply was lost. The post-submission resync tells the
    /// truth; read the snapshot instead of guessing.
    Indeterminate,
}

impl ActionResult {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::AdmittedAndConfirmed)
    }
}

impl fmt::Display for ActionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AdmittedAndConfirmed => f.write_str("confirmed"),
            Self::AdmittedButRejected(reason) => write!(f, "rejected by ledger: {reason}"),
            Self::RejectedBeforeSubmission(reason) => write!(f, "not submitted: {reason}"),
            Self::Indeterminate => f.write_str("outcome unknown, check the refreshed state"),
        }
    }
}
