//! Background services.

pub mod scheduler;

pub use scheduler::Scheduler;
