//! Abstract bus operations for a chain of battery-monitor ICs.
//!
//! The supervisor never touches frames or checksums; it drives the chain
//! through this trait. Hardware drivers implement it against the real
//! bus, `SimulatedChain` fakes it for development and `MockChain` scripts
//! it for tests.

use std::fmt;

use async_trait::async_trait;

use crate::chain::{CELLS_PER_BANK, TEMPS_PER_BANK};
use crate::error::Result;

/// One bank's cell voltages from a chain-wide scan, in volts.
#[derive(Debug, Clone, PartialEq)]
pub struct BankVoltages {
    pub cells: [f32; CELLS_PER_BANK],
}

impl BankVoltages {
    /// Sum of all cell voltages in this bank.
    pub fn total(&self) -> f32 {
        self.cells.iter().sum()
    }
}

/// One bank's temperature scan, in degrees Celsius.
///
/// A slot reads `None` when that sensor failed to convert; one bad
/// thermistor must not blank out its neighbours.
#[derive(Debug, Clone, PartialEq)]
pub struct BankTemperatures {
    pub sensors: [Option<f32>; TEMPS_PER_BANK],
    /// Internal reference voltage reported alongside the scan.
    pub ref_volts: f32,
    /// Sum-of-cells voltage measured by the IC itself.
    pub sum_of_cells: f32,
}

/// Bus operations the supervisor needs from a chain driver.
///
/// All chain-wide calls take the length the caller believes is live; the
/// driver addresses every device up to that position. Aux calls bridge a
/// single device's secondary sensor bus. Implementations own their
/// transport-level timeouts; the supervisor imposes none.
#[async_trait]
pub trait ChainAdapter: Send + Sync + fmt::Debug {
    /// Test whether a chain of `length` devices answers on the bus.
    async fn probe(&self, length: usize) -> Result<()>;

    /// Configure a chain of `length` devices for measurement.
    async fn initialise(&self, length: usize) -> Result<()>;

    /// Scan cell voltages across all `length` banks.
    async fn measure_voltages(&self, length: usize) -> Result<Vec<BankVoltages>>;

    /// Scan temperature sensors across all `length` banks.
    async fn measure_temperatures(&self, length: usize) -> Result<Vec<BankTemperatures>>;

    /// Read the register pair `reg`, `reg + 1` on `device`'s aux bus as one
    /// big-endian 16-bit word.
    async fn read_aux(&self, device: usize, addr: u8, reg: u8) -> Result<u16>;

    /// Read a single byte register on `device`'s aux bus.
    async fn read_aux_byte(&self, device: usize, addr: u8, reg: u8) -> Result<u8>;

    /// Write a single byte register on `device`'s aux bus.
    async fn write_aux(&self, device: usize, addr: u8, reg: u8, value: u8) -> Result<()>;
}
