//! trainlet-board: Multiplexing visualization dispatcher
//!
//! The board serves every run's visualization backend behind one endpoint.
//! Requests addressed to `/{job_id}/...` are forwarded to a per-job backend
//! handler, built lazily on first access and cached by job id. Liveness is
//! tracked only through explicit heartbeats; a background sweeper evicts
//! sessions that have gone quiet.

pub mod backend;
pub mod cache;
pub mod request;
pub mod rest;

pub use backend::{BackendFactory, BackendHandler, LogdirBackend, LogdirBackendFactory};
pub use cache::HandlerCache;
pub use request::{BackendRequest, BackendResponse};
pub use rest::create_router;
