//! trainlet-agent: Agent runtime for trainlet
//!
//! An agent polls the shared queue, claims runs assigned to it, drives the
//! training executor, and finalizes run state. It exposes a small HTTP
//! surface for health, status, and cooperative cancellation, and keeps an
//! independent heartbeat loop alive while training blocks.

pub mod executor;
pub mod heartbeat;
pub mod manager;
pub mod progress;
pub mod rest;

pub use executor::{CommandExecutor, TrainingExecutor, TrainingProgress};
pub use manager::AgentManager;
pub use progress::ProgressTracker;
pub use rest::create_router;
