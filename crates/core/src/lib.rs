//! Domain logic for the labstream run pipeline.
//!
//! Everything in this crate is pure with respect to the transport layer:
//! run lifecycle types, the job catalog seam, the streaming child-process
//! runner, and the bounded run history cache. The HTTP/WebSocket surface
//! lives in `labstream-api`; the console client in `labstream-client`.

pub mod history;
pub mod job;
pub mod run;
pub mod runner;
pub mod types;
