//! Headless console client for the labstream server.
//!
//! Provides the WebSocket driver ([`client`], [`reconnect`]), the HTTP
//! wrapper for starting runs and reading history ([`api`]), and the
//! stream reducer that folds progress events into one coherent run view
//! ([`reducer`], [`session`]). Rendering is someone else's job; this
//! crate only reconstructs state.

pub mod api;
pub mod client;
pub mod reconnect;
pub mod reducer;
pub mod session;

pub use client::{ConsoleClient, ConsoleConnection};
pub use reducer::RunView;
pub use session::{RunSession, StartOutcome};
