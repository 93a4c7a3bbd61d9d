use thiserror::Error;

/// Failure of a single ledger call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Network failure or timeout. Transient; the caller may retry.
    #[error("ledger transport failed: {0}")]
    Transport(String),

    /// The ledger refused the call. Authoritative; retrying will not help.
    #[error("ledger rejected the request: {0}")]
    Rejected(String),

    /// The ledger answered with something we could not decode.
    #[error("invalid response from ledger: {0}")]
    InvalidResponse(String),
}

impl LedgerError {
    /// Whether the same call may succeed if repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
