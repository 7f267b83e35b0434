//! Chain supervision: adapter trait, discovery, measurement cycle,
//! readings store and the aux gauge bridge.

pub mod adapter;
pub mod discovery;
pub mod gauge;
pub mod mock;
pub mod readings;
pub mod sim;
pub mod supervisor;

use std::sync::Arc;

use crate::config::ChainConfig;
use crate::error::{BatSrvError, Result};

pub use adapter::{BankTemperatures, BankVoltages, ChainAdapter};
pub use discovery::ChainHandle;
pub use readings::{BankReadings, ReadingsSnapshot, ReadingsStore};
pub use supervisor::{ChainStatus, ChainSupervisor, CycleOutcome};

/// Cells monitored per bank; the reference hardware is an 18-cell
/// monitor IC.
pub const CELLS_PER_BANK: usize = 18;
/// Thermistor inputs per bank.
pub const TEMPS_PER_BANK: usize = 18;

/// Build the configured chain driver.
///
/// Hardware drivers live out of tree and register under their own names;
/// this build knows `sim` only.
pub fn build_adapter(chain: &ChainConfig) -> Result<Arc<dyn ChainAdapter>> {
    match chain.driver.as_str() {
        "sim" => Ok(Arc::new(sim::SimulatedChain::new(chain.sim_banks))),
        other => Err(BatSrvError::config(format!("unknown chain driver: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_adapter_sim() {
        let chain = ChainConfig::default();
        assert!(build_adapter(&chain).is_ok());
    }

    #[test]
    fn test_build_adapter_unknown_driver() {
        let mut chain = ChainConfig::default();
        chain.driver = "spi9000".to_string();
        let err = build_adapter(&chain).unwrap_err();
        assert!(matches!(err, BatSrvError::Config(_)));
    }
}
