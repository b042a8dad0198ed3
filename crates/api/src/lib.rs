//! labstream API server library.
//!
//! Exposes the core building blocks (config, state, error handling,
//! routes, WebSocket infrastructure, the run orchestrator) so integration
//! tests and the binary entrypoint can both access them.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod response;
pub mod routes;
pub mod state;
pub mod ws;
