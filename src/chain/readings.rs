//! Published measurement snapshots and the store they live in.
//!
//! A snapshot is immutable once built; publication swaps the `Arc` behind
//! a short-lived write lock, so API readers never wait on the bus lock or
//! see a half-written cycle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::chain::adapter::{BankTemperatures, BankVoltages};
use crate::chain::{CELLS_PER_BANK, TEMPS_PER_BANK};

/// Readings for one bank: cell voltages plus the temperature scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankReadings {
    /// Cell voltages in volts.
    pub cells: [f32; CELLS_PER_BANK],
    /// Host-side sum of `cells`; the IC's own measurement of the same
    /// quantity arrives as `sum_of_cells` with the temperature scan.
    pub total_volts: f32,
    /// Sensor temperatures in degrees Celsius; `null` where the slot
    /// failed to read.
    pub temperatures: [Option<f32>; TEMPS_PER_BANK],
    /// IC reference voltage, absent when the temperature scan failed.
    pub ref_volts: Option<f32>,
    /// IC-measured sum of cells, absent when the temperature scan failed.
    pub sum_of_cells: Option<f32>,
}

/// One full chain measurement, published atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingsSnapshot {
    pub captured_at: DateTime<Utc>,
    pub banks: Vec<BankReadings>,
}

impl ReadingsSnapshot {
    /// Build a snapshot from a voltage scan and an optional temperature
    /// scan. `temps: None` means the whole temperature pass failed after
    /// retry; every slot is then reported absent while the voltages stand.
    pub fn assemble(volts: Vec<BankVoltages>, temps: Option<Vec<BankTemperatures>>) -> Self {
        let banks = volts
            .into_iter()
            .enumerate()
            .map(|(i, bank)| {
                let scan = temps.as_ref().and_then(|t| t.get(i));
                BankReadings {
                    cells: bank.cells,
                    total_volts: bank.total(),
                    temperatures: scan.map_or([None; TEMPS_PER_BANK], |s| s.sensors),
                    ref_volts: scan.map(|s| s.ref_volts),
                    sum_of_cells: scan.map(|s| s.sum_of_cells),
                }
            })
            .collect();

        Self {
            captured_at: Utc::now(),
            banks,
        }
    }
}

/// Last-known-good snapshot holder.
///
/// `None` until the first successful cycle. A failed cycle leaves the
/// previous snapshot in place for display; staleness shows up through
/// the status endpoint, not here.
#[derive(Debug, Default)]
pub struct ReadingsStore {
    current: RwLock<Option<Arc<ReadingsSnapshot>>>,
}

impl ReadingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the published snapshot wholesale.
    pub fn publish(&self, snapshot: ReadingsSnapshot) {
        *self.current.write() = Some(Arc::new(snapshot));
    }

    /// The latest published snapshot, if any cycle has succeeded yet.
    pub fn latest(&self) -> Option<Arc<ReadingsSnapshot>> {
        self.current.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voltage_banks(n: usize) -> Vec<BankVoltages> {
        (0..n)
            .map(|b| {
                let mut cells = [0.0; CELLS_PER_BANK];
                for (c, cell) in cells.iter_mut().enumerate() {
                    *cell = 3.6 + b as f32 * 0.01 + c as f32 * 0.001;
                }
                BankVoltages { cells }
            })
            .collect()
    }

    fn temperature_banks(n: usize) -> Vec<BankTemperatures> {
        (0..n)
            .map(|b| BankTemperatures {
                sensors: [Some(20.0 + b as f32); TEMPS_PER_BANK],
                ref_volts: 3.0,
                sum_of_cells: 66.0,
            })
            .collect()
    }

    #[test]
    fn test_assemble_full_scan() {
        let snapshot = ReadingsSnapshot::assemble(voltage_banks(3), Some(temperature_banks(3)));
        assert_eq!(snapshot.banks.len(), 3);
        assert_eq!(snapshot.banks[1].temperatures[0], Some(21.0));
        assert_eq!(snapshot.banks[2].ref_volts, Some(3.0));
        assert_eq!(snapshot.banks[0].sum_of_cells, Some(66.0));

        let bank = &snapshot.banks[0];
        let summed: f32 = bank.cells.iter().sum();
        assert!((bank.total_volts - summed).abs() < 1e-4);
    }

    #[test]
    fn test_assemble_without_temperatures() {
        let snapshot = ReadingsSnapshot::assemble(voltage_banks(2), None);
        assert_eq!(snapshot.banks.len(), 2);
        for bank in &snapshot.banks {
            assert!(bank.temperatures.iter().all(|t| t.is_none()));
            assert_eq!(bank.ref_volts, None);
            assert_eq!(bank.sum_of_cells, None);
            // Voltages still present
            assert!(bank.cells[0] > 3.5);
        }
    }

    #[test]
    fn test_store_starts_empty() {
        let store = ReadingsStore::new();
        assert!(store.latest().is_none());
    }

    #[test]
    fn test_store_publish_replaces_wholesale() {
        let store = ReadingsStore::new();
        store.publish(ReadingsSnapshot::assemble(voltage_banks(2), None));
        let first = store.latest().unwrap();
        assert_eq!(first.banks.len(), 2);

        store.publish(ReadingsSnapshot::assemble(
            voltage_banks(3),
            Some(temperature_banks(3)),
        ));
        let second = store.latest().unwrap();
        assert_eq!(second.banks.len(), 3);
        // Earlier readers keep their Arc unchanged
        assert_eq!(first.banks.len(), 2);
    }

    #[test]
    fn test_snapshot_serializes_absent_slots_as_null() {
        let snapshot = ReadingsSnapshot::assemble(voltage_banks(1), None);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json["banks"][0]["temperatures"][0].is_null());
        assert!(json["banks"][0]["cells"][0].is_number());
        assert!(json["banks"][0]["total_volts"].is_number());
    }
}
