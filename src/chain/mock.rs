//! Scripted chain driver for tests.
//!
//! Probe, initialise and scan outcomes are queued per call; an empty
//! queue means "succeed" for everything except probes, where it means
//! the chain has ended. Every bus call lands in a shared log, and the
//! driver tracks whether two calls were ever in flight at once so tests
//! can assert the supervisor serializes bus access.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::chain::adapter::{BankTemperatures, BankVoltages, ChainAdapter};
use crate::chain::{CELLS_PER_BANK, TEMPS_PER_BANK};
use crate::error::{BatSrvError, Result};

/// One recorded bus transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainCall {
    Probe(usize),
    Initialise(usize),
    MeasureVoltages(usize),
    MeasureTemperatures(usize),
    ReadAux { device: usize, addr: u8, reg: u8 },
    ReadAuxByte { device: usize, addr: u8, reg: u8 },
    WriteAux { device: usize, addr: u8, reg: u8, value: u8 },
}

#[derive(Debug, Default)]
struct MockChainState {
    probe_results: VecDeque<bool>,
    initialise_results: VecDeque<bool>,
    voltage_results: VecDeque<bool>,
    temperature_results: VecDeque<bool>,
    fail_aux: bool,
    aux_registers: HashMap<(usize, u8, u8), u16>,
    calls: Vec<ChainCall>,
    in_flight: usize,
    overlap_detected: bool,
}

/// Chain driver whose every outcome is scripted by the test.
#[derive(Debug, Clone, Default)]
pub struct MockChain {
    state: Arc<Mutex<MockChainState>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue probe outcomes, one per probe call. Once the queue is empty
    /// further probes fail, ending the discovery run.
    pub fn script_probes(&self, results: &[bool]) {
        self.state.lock().probe_results.extend(results);
    }

    /// Queue initialise outcomes. Empty queue means success.
    pub fn script_initialise(&self, results: &[bool]) {
        self.state.lock().initialise_results.extend(results);
    }

    /// Queue voltage scan outcomes. Empty queue means success.
    pub fn script_voltages(&self, results: &[bool]) {
        self.state.lock().voltage_results.extend(results);
    }

    /// Queue temperature scan outcomes. Empty queue means success.
    pub fn script_temperatures(&self, results: &[bool]) {
        self.state.lock().temperature_results.extend(results);
    }

    /// Make every aux transaction fail until cleared.
    pub fn set_fail_aux(&self, fail: bool) {
        self.state.lock().fail_aux = fail;
    }

    /// Seed an aux register word for `read_aux` to return.
    pub fn set_aux_register(&self, device: usize, addr: u8, reg: u8, value: u16) {
        self.state.lock().aux_registers.insert((device, addr, reg), value);
    }

    /// Current value of an aux register, if one was seeded or written.
    pub fn aux_register(&self, device: usize, addr: u8, reg: u8) -> Option<u16> {
        self.state.lock().aux_registers.get(&(device, addr, reg)).copied()
    }

    /// Every bus call so far, in order.
    pub fn calls(&self) -> Vec<ChainCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Whether two bus calls were ever in flight at the same time.
    pub fn overlap_detected(&self) -> bool {
        self.state.lock().overlap_detected
    }

    fn begin(&self, call: ChainCall) {
        let mut state = self.state.lock();
        state.calls.push(call);
        state.in_flight += 1;
        if state.in_flight > 1 {
            state.overlap_detected = true;
        }
    }

    fn end(&self) {
        self.state.lock().in_flight -= 1;
    }

    fn synth_voltages(length: usize) -> Vec<BankVoltages> {
        (0..length)
            .map(|b| {
                let mut cells = [0.0; CELLS_PER_BANK];
                for (c, cell) in cells.iter_mut().enumerate() {
                    *cell = 3.6 + b as f32 * 0.01 + c as f32 * 0.001;
                }
                BankVoltages { cells }
            })
            .collect()
    }

    fn synth_temperatures(length: usize) -> Vec<BankTemperatures> {
        (0..length)
            .map(|b| BankTemperatures {
                sensors: [Some(20.0 + b as f32); TEMPS_PER_BANK],
                ref_volts: 3.0,
                sum_of_cells: 3.7 * CELLS_PER_BANK as f32,
            })
            .collect()
    }
}

#[async_trait]
impl ChainAdapter for MockChain {
    async fn probe(&self, length: usize) -> Result<()> {
        self.begin(ChainCall::Probe(length));
        tokio::task::yield_now().await;
        let ok = self.state.lock().probe_results.pop_front().unwrap_or(false);
        self.end();
        if ok {
            Ok(())
        } else {
            Err(BatSrvError::bus(format!("no acknowledge at length {length}")))
        }
    }

    async fn initialise(&self, length: usize) -> Result<()> {
        self.begin(ChainCall::Initialise(length));
        tokio::task::yield_now().await;
        let ok = self.state.lock().initialise_results.pop_front().unwrap_or(true);
        self.end();
        if ok {
            Ok(())
        } else {
            Err(BatSrvError::bus("configuration refused"))
        }
    }

    async fn measure_voltages(&self, length: usize) -> Result<Vec<BankVoltages>> {
        self.begin(ChainCall::MeasureVoltages(length));
        tokio::task::yield_now().await;
        let ok = self.state.lock().voltage_results.pop_front().unwrap_or(true);
        self.end();
        if ok {
            Ok(Self::synth_voltages(length))
        } else {
            Err(BatSrvError::bus("voltage conversion failed"))
        }
    }

    async fn measure_temperatures(&self, length: usize) -> Result<Vec<BankTemperatures>> {
        self.begin(ChainCall::MeasureTemperatures(length));
        tokio::task::yield_now().await;
        let ok = self.state.lock().temperature_results.pop_front().unwrap_or(true);
        self.end();
        if ok {
            Ok(Self::synth_temperatures(length))
        } else {
            Err(BatSrvError::bus("temperature conversion failed"))
        }
    }

    async fn read_aux(&self, device: usize, addr: u8, reg: u8) -> Result<u16> {
        self.begin(ChainCall::ReadAux { device, addr, reg });
        tokio::task::yield_now().await;
        let result = {
            let state = self.state.lock();
            if state.fail_aux {
                Err(BatSrvError::bus("aux bus not responding"))
            } else {
                Ok(state.aux_registers.get(&(device, addr, reg)).copied().unwrap_or(0))
            }
        };
        self.end();
        result
    }

    async fn read_aux_byte(&self, device: usize, addr: u8, reg: u8) -> Result<u8> {
        self.begin(ChainCall::ReadAuxByte { device, addr, reg });
        tokio::task::yield_now().await;
        let result = {
            let state = self.state.lock();
            if state.fail_aux {
                Err(BatSrvError::bus("aux bus not responding"))
            } else {
                Ok((state.aux_registers.get(&(device, addr, reg)).copied().unwrap_or(0) & 0xFF)
                    as u8)
            }
        };
        self.end();
        result
    }

    async fn write_aux(&self, device: usize, addr: u8, reg: u8, value: u8) -> Result<()> {
        self.begin(ChainCall::WriteAux { device, addr, reg, value });
        tokio::task::yield_now().await;
        let result = {
            let mut state = self.state.lock();
            if state.fail_aux {
                Err(BatSrvError::bus("aux bus not responding"))
            } else {
                state.aux_registers.insert((device, addr, reg), u16::from(value));
                Ok(())
            }
        };
        self.end();
        result
    }
}
