//! Nullable infrastructure for deterministic testing.
//!
//! Inspired by the "A-frame architecture" pattern: the ledger is abstracted behind
//! the `LedgerGateway` trait and this crate provides an in-memory implementation that:
//! - Enforces the same rules as the real ledger
//! - Can be scripted to drop replies, fail reads, or stall mid-resync
//! - Never touches the network
//!
//! Usage: hand a `NullLedger` to the client where a real gateway would go.

pub mod ledger;

pub use ledger::{NullLedger, SubmitBehavior};
