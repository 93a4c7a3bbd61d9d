//! Client-side synchronization layer for a ledger-backed election.
//!
//! The ledger owns the truth. This crate keeps a local, always-consistent
//! mirror of it and decides which user actions are worth submitting:
//!
//! - [`IdentityBinding`]: the account the client acts as
//! - [`StateMirror`]: the latest complete [`ElectionSnapshot`](tally_types::ElectionSnapshot)
//! - [`validator`]: advisory pre-submission checks
//! - [`aggregate`]: tallies, shares, leader and winner derived from a snapshot
//! - [`SyncOrchestrator`]: coalesced resyncs, retries and action submission

pub mod aggregate;
pub mod config;
pub mod error;
pub mod identity;
pub mod mirror;
pub mod orchestrator;
pub mod outcome;
pub mod validator;

pub use aggregate::{ElectionSummary, SummaryRow};
pub use config::{ClientConfig, RetryPolicy};
pub use error::{ClientError, MirrorError, SyncError};
pub use identity::IdentityBinding;
pub use mirror::{LedgerReading, StateMirror};
pub use orchestrator::{ResyncTrigger, SyncOrchestrator, SyncPhase, SyncReport, SyncStatus};
pub use outcome::ActionResult;
pub use validator::{validate, Decision};
