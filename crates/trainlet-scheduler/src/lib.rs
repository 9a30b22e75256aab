//! trainlet-scheduler: Queue claiming and GPU reservation
//!
//! This crate fronts the resource store with the two scheduling operations:
//! - Claiming the next eligible run for an agent
//! - Reserving and releasing GPU indices

pub mod gpu_allocator;
pub mod scheduler;

pub use gpu_allocator::GpuAllocator;
pub use scheduler::Scheduler;
