//! Errors raised while constructing fundamental types.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("candidate identifiers start at 1")]
    ZeroCandidateId,

    #[error("unknown election phase index {0}")]
    UnknownPhase(u8),
}
