//! batsrv - Battery chain supervisor service
//!
//! Supervises a daisy chain of multi-cell battery-monitor ICs on a single
//! shared bus: discovers the live chain length by probing, polls per-cell
//! voltages and temperatures on a fixed interval, and bridges per-device
//! gas-gauge transactions through the same bus lock. The latest readings
//! are served over a small HTTP API.

pub mod api;
pub mod chain;
pub mod config;
pub mod error;
pub mod logging;
pub mod services;

use std::sync::Arc;

use chain::ChainSupervisor;

pub use error::{BatSrvError, Result};

/// Service information
pub const SERVICE_NAME: &str = "batsrv";
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared state handed to API handlers.
pub struct AppState {
    pub supervisor: Arc<ChainSupervisor>,
}

impl AppState {
    pub fn new(supervisor: Arc<ChainSupervisor>) -> Self {
        Self { supervisor }
    }
}
