//! Shared utilities for the tally election client.

pub mod logging;

pub use logging::{init_tracing, init_tracing_with, LogFormat};
