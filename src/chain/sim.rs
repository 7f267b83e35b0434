//! Simulated chain driver for development without hardware.
//!
//! Presents a fixed number of banks with plausible, lightly jittered
//! readings, and a writable per-device gauge register file seeded so the
//! derived aux quantities decode to sane values. Selected with
//! `chain.driver: sim`.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;

use crate::chain::adapter::{BankTemperatures, BankVoltages, ChainAdapter};
use crate::chain::gauge::GaugeRegister;
use crate::chain::{CELLS_PER_BANK, TEMPS_PER_BANK};
use crate::error::{BatSrvError, Result};

/// ~66.6 V pack voltage, an 18s pack at nominal cell voltage.
const SIM_VOLTAGE_RAW: u16 = 0xF0CF;
/// ~+0.5 A charge current at the nominal 50 mOhm shunt.
const SIM_CURRENT_RAW: u16 = 0xB1B0;
/// ~25 C die temperature.
const SIM_TEMPERATURE_RAW: u16 = 0x95AA;
/// Coulomb accumulator midpoint, the gauge's power-on value.
const SIM_CHARGE_RAW: u16 = 0x7FFF;
/// Auto ADC mode, prescaler M = 4096, ALCC off.
const SIM_CONTROL: u8 = 0xF8;

/// Fake chain of `banks` devices with a gauge behind each one.
///
/// The register file is keyed by device and register only; the simulated
/// aux bus carries a single gauge per device, so the bus address is
/// accepted but not decoded.
#[derive(Debug)]
pub struct SimulatedChain {
    banks: usize,
    registers: Mutex<HashMap<(usize, u8), u8>>,
}

impl SimulatedChain {
    pub fn new(banks: usize) -> Self {
        let mut registers = HashMap::new();
        for device in 0..banks {
            seed_word(&mut registers, device, GaugeRegister::VoltageMsb.addr(), SIM_VOLTAGE_RAW);
            seed_word(&mut registers, device, GaugeRegister::CurrentMsb.addr(), SIM_CURRENT_RAW);
            seed_word(
                &mut registers,
                device,
                GaugeRegister::TemperatureMsb.addr(),
                SIM_TEMPERATURE_RAW,
            );
            seed_word(&mut registers, device, GaugeRegister::ChargeMsb.addr(), SIM_CHARGE_RAW);
            registers.insert((device, GaugeRegister::Control.addr()), SIM_CONTROL);
        }
        Self {
            banks,
            registers: Mutex::new(registers),
        }
    }
}

fn seed_word(registers: &mut HashMap<(usize, u8), u8>, device: usize, msb: u8, value: u16) {
    registers.insert((device, msb), (value >> 8) as u8);
    registers.insert((device, msb + 1), (value & 0xFF) as u8);
}

#[async_trait]
impl ChainAdapter for SimulatedChain {
    async fn probe(&self, length: usize) -> Result<()> {
        if length <= self.banks {
            Ok(())
        } else {
            Err(BatSrvError::bus(format!(
                "no acknowledge beyond {} devices",
                self.banks
            )))
        }
    }

    async fn initialise(&self, _length: usize) -> Result<()> {
        Ok(())
    }

    async fn measure_voltages(&self, length: usize) -> Result<Vec<BankVoltages>> {
        let mut rng = rand::thread_rng();
        Ok((0..length)
            .map(|_| {
                let mut cells = [0.0; CELLS_PER_BANK];
                for cell in &mut cells {
                    *cell = 3.70 + rng.gen_range(-0.04..0.04);
                }
                BankVoltages { cells }
            })
            .collect())
    }

    async fn measure_temperatures(&self, length: usize) -> Result<Vec<BankTemperatures>> {
        let mut rng = rand::thread_rng();
        Ok((0..length)
            .map(|_| {
                let mut sensors = [None; TEMPS_PER_BANK];
                for slot in &mut sensors {
                    *slot = Some(22.0 + rng.gen_range(-4.0..6.0));
                }
                BankTemperatures {
                    sensors,
                    ref_volts: 3.0 + rng.gen_range(-0.02..0.02),
                    sum_of_cells: 66.6 + rng.gen_range(-0.5..0.5),
                }
            })
            .collect())
    }

    async fn read_aux(&self, device: usize, _addr: u8, reg: u8) -> Result<u16> {
        let registers = self.registers.lock();
        let msb = registers.get(&(device, reg)).copied().unwrap_or(0);
        let lsb = registers.get(&(device, reg.wrapping_add(1))).copied().unwrap_or(0);
        Ok((u16::from(msb) << 8) | u16::from(lsb))
    }

    async fn read_aux_byte(&self, device: usize, _addr: u8, reg: u8) -> Result<u8> {
        Ok(self.registers.lock().get(&(device, reg)).copied().unwrap_or(0))
    }

    async fn write_aux(&self, device: usize, _addr: u8, reg: u8, value: u8) -> Result<()> {
        self.registers.lock().insert((device, reg), value);
        Ok(())
    }
}
