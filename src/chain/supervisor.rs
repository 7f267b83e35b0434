//! The chain supervisor: owns the bus, the chain handle and the
//! measurement cycle.
//!
//! One `tokio::sync::Mutex` guards the bus and the handle together, so
//! discovery, chain-wide scans and aux-bus transactions can never
//! interleave at the bus level. Published snapshots and status metadata
//! sit outside that lock; readers never wait on a cycle in progress.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::chain::adapter::ChainAdapter;
use crate::chain::discovery::{self, ChainHandle};
use crate::chain::gauge::{self, GaugeRegister};
use crate::chain::readings::{ReadingsSnapshot, ReadingsStore};
use crate::config::{AuxConfig, ChainConfig, InitFailurePolicy};
use crate::error::{BatSrvError, Result};

/// What a single scheduler tick accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Bus empty; nothing to measure.
    NoDevices,
    /// Snapshot published covering this many banks.
    Published { banks: usize },
    /// Measurement or initialisation fault absorbed; the chain is
    /// dropped so the next cycle rediscovers.
    Fault,
}

/// Observable chain state for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChainStatus {
    pub chain_length: usize,
    pub error_count: u64,
    pub discovered_at: Option<DateTime<Utc>>,
    pub last_fault: Option<String>,
    pub last_capture: Option<DateTime<Utc>>,
}

/// Bus-and-handle state behind the supervisor lock.
#[derive(Debug, Default)]
struct ChainState {
    handle: Option<ChainHandle>,
}

/// Lock-free mirror of the handle for status readers.
#[derive(Debug, Default, Clone)]
struct ChainMeta {
    length: usize,
    discovered_at: Option<DateTime<Utc>>,
    last_fault: Option<String>,
}

/// Supervises one chain of battery-monitor devices on one bus.
#[derive(Debug)]
pub struct ChainSupervisor {
    adapter: Arc<dyn ChainAdapter>,
    /// Guards the bus and the chain handle together.
    state: Mutex<ChainState>,
    store: ReadingsStore,
    meta: RwLock<ChainMeta>,
    /// Measurement failures since start. Monotonic, never cleared.
    error_count: AtomicU64,
    max_chain_length: usize,
    on_init_failure: InitFailurePolicy,
    aux: AuxConfig,
}

impl ChainSupervisor {
    pub fn new(adapter: Arc<dyn ChainAdapter>, chain: &ChainConfig, aux: AuxConfig) -> Self {
        Self {
            adapter,
            state: Mutex::new(ChainState::default()),
            store: ReadingsStore::new(),
            meta: RwLock::new(ChainMeta::default()),
            error_count: AtomicU64::new(0),
            max_chain_length: chain.max_chain_length,
            on_init_failure: chain.on_init_failure,
            aux,
        }
    }

    /// Run one measurement cycle: discover if needed, scan voltages, scan
    /// temperatures, publish. Each scan gets exactly one immediate retry;
    /// a second failure of either scan drops the chain so the next cycle
    /// rediscovers from scratch. A temperature fault still publishes the
    /// voltages it has, with every temperature slot absent.
    ///
    /// Returns `Err` only for an initialisation failure under the `exit`
    /// policy; every other fault is absorbed here.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let mut state = self.state.lock().await;

        if state.handle.is_none() {
            match discovery::discover(self.adapter.as_ref(), self.max_chain_length).await {
                Ok(Some(handle)) => self.install_handle(&mut state, handle),
                Ok(None) => {
                    debug!("no devices on chain");
                    return Ok(CycleOutcome::NoDevices);
                },
                Err(e) => {
                    self.note_fault(&e);
                    return match self.on_init_failure {
                        InitFailurePolicy::Exit => Err(e),
                        InitFailurePolicy::Retry => {
                            warn!("initialisation failed, will rediscover next tick: {}", e);
                            Ok(CycleOutcome::Fault)
                        },
                    };
                },
            }
        }

        let Some(length) = state.handle.as_ref().map(|h| h.length) else {
            return Ok(CycleOutcome::NoDevices);
        };

        let adapter = self.adapter.as_ref();

        let volts = match retry_once("voltage scan", || adapter.measure_voltages(length)).await {
            Ok(v) => v,
            Err(e) => {
                self.error_count.fetch_add(1, Ordering::Relaxed);
                self.note_fault(&e);
                self.clear_handle(&mut state);
                error!("voltage scan failed twice, dropping chain for rediscovery: {}", e);
                return Ok(CycleOutcome::Fault);
            },
        };

        let temps = match retry_once("temperature scan", || adapter.measure_temperatures(length))
            .await
        {
            Ok(t) => t,
            Err(e) => {
                self.error_count.fetch_add(1, Ordering::Relaxed);
                self.note_fault(&e);
                self.clear_handle(&mut state);
                error!(
                    "temperature scan failed twice, publishing voltages only and dropping chain for rediscovery: {}",
                    e
                );
                self.store.publish(ReadingsSnapshot::assemble(volts, None));
                return Ok(CycleOutcome::Fault);
            },
        };

        let snapshot = ReadingsSnapshot::assemble(volts, Some(temps));
        let banks = snapshot.banks.len();
        self.store.publish(snapshot);
        debug!(banks, "snapshot published");
        Ok(CycleOutcome::Published { banks })
    }

    /// Raw 16-bit aux-bus read on one device. Holds the bus lock for the
    /// whole transaction.
    pub async fn aux_read(&self, device: usize, addr: u8, reg: u8) -> Result<u16> {
        let state = self.state.lock().await;
        Self::check_device(&state, device)?;
        self.adapter.read_aux(device, addr, reg).await
    }

    /// Raw single-byte aux-bus read on one device.
    pub async fn aux_read_byte(&self, device: usize, addr: u8, reg: u8) -> Result<u8> {
        let state = self.state.lock().await;
        Self::check_device(&state, device)?;
        self.adapter.read_aux_byte(device, addr, reg).await
    }

    /// Raw single-byte aux-bus write on one device.
    pub async fn aux_write(&self, device: usize, addr: u8, reg: u8, value: u8) -> Result<()> {
        let state = self.state.lock().await;
        Self::check_device(&state, device)?;
        self.adapter.write_aux(device, addr, reg, value).await
    }

    /// Gauge pack voltage in volts for one device.
    pub async fn aux_voltage(&self, device: usize) -> Result<f32> {
        let state = self.state.lock().await;
        Self::check_device(&state, device)?;
        let raw = self
            .adapter
            .read_aux(device, self.aux.gauge_address, GaugeRegister::VoltageMsb.addr())
            .await?;
        Ok(gauge::voltage_from_raw(raw))
    }

    /// Gauge sense current in amps for one device.
    pub async fn aux_current(&self, device: usize) -> Result<f32> {
        let state = self.state.lock().await;
        Self::check_device(&state, device)?;
        let raw = self
            .adapter
            .read_aux(device, self.aux.gauge_address, GaugeRegister::CurrentMsb.addr())
            .await?;
        Ok(gauge::current_from_raw(raw, self.aux.sense_resistor_ohms))
    }

    /// Gauge accumulated charge in mAh for one device.
    pub async fn aux_charge(&self, device: usize) -> Result<f32> {
        let state = self.state.lock().await;
        Self::check_device(&state, device)?;
        let raw = self
            .adapter
            .read_aux(device, self.aux.gauge_address, GaugeRegister::ChargeMsb.addr())
            .await?;
        Ok(gauge::charge_from_raw(
            raw,
            self.aux.sense_resistor_ohms,
            self.aux.prescaler,
        ))
    }

    /// Gauge die temperature in degrees Celsius for one device.
    pub async fn aux_temperature(&self, device: usize) -> Result<f32> {
        let state = self.state.lock().await;
        Self::check_device(&state, device)?;
        let raw = self
            .adapter
            .read_aux(device, self.aux.gauge_address, GaugeRegister::TemperatureMsb.addr())
            .await?;
        Ok(gauge::temperature_from_raw(raw))
    }

    /// Latest published snapshot, if any cycle has succeeded.
    pub fn latest(&self) -> Option<Arc<ReadingsSnapshot>> {
        self.store.latest()
    }

    /// Current chain state for the status endpoint. Never touches the
    /// bus lock.
    pub fn status(&self) -> ChainStatus {
        let meta = self.meta.read().clone();
        ChainStatus {
            chain_length: meta.length,
            error_count: self.error_count.load(Ordering::Relaxed),
            discovered_at: meta.discovered_at,
            last_fault: meta.last_fault,
            last_capture: self.store.latest().map(|s| s.captured_at),
        }
    }

    /// Measurement failures since process start.
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Configured aux gauge address, the default for raw aux requests.
    pub fn gauge_address(&self) -> u8 {
        self.aux.gauge_address
    }

    fn check_device(state: &ChainState, device: usize) -> Result<()> {
        match &state.handle {
            None => Err(BatSrvError::NoDevices),
            Some(h) if device >= h.length => Err(BatSrvError::out_of_range(device, h.length)),
            Some(_) => Ok(()),
        }
    }

    fn install_handle(&self, state: &mut ChainState, handle: ChainHandle) {
        {
            let mut meta = self.meta.write();
            meta.length = handle.length;
            meta.discovered_at = Some(handle.discovered_at);
        }
        state.handle = Some(handle);
    }

    fn clear_handle(&self, state: &mut ChainState) {
        state.handle = None;
        self.meta.write().length = 0;
    }

    fn note_fault(&self, err: &BatSrvError) {
        self.meta.write().last_fault = Some(err.to_string());
    }
}

/// Run `op`, and on failure run it exactly once more. The bounded retry
/// absorbs one-off bus glitches; anything worse is the caller's problem.
async fn retry_once<T, Fut>(what: &str, op: impl Fn() -> Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(first) => {
            warn!("{} failed, retrying once: {}", what, first);
            op().await
        },
    }
}
