//! Fundamental types for the election client.
//!
//! This crate defines the data model shared across every other crate in the workspace:
//! ledger identities, candidates, the election phase, the mirrored snapshot, and the
//! actions a participant can request.

pub mod action;
pub mod candidate;
pub mod error;
pub mod identity;
pub mod phase;
pub mod snapshot;

pub use action::{ElectionAction, RejectReason};
pub use candidate::{Candidate, CandidateId};
pub use error::TypeError;
pub use identity::Identity;
pub use phase::ElectionPhase;
pub use snapshot::ElectionSnapshot;
