//! HTTP server for the liveness endpoint and graceful shutdown handling.
//!
//! The health interface is liveness only: it reports that the process
//! is alive, never the reconciliation backlog or error state.

mod health;
pub mod shutdown;

pub use health::run_health_server;
pub use shutdown::{shutdown_channel, wait_for_signal, ShutdownController, ShutdownSignal};

#[cfg(test)]
#[path = "health_test.rs"]
mod health_tests;

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;
