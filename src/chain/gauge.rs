//! Register map and unit conversions for the LTC2944-class coulomb
//! counter reachable over each device's aux bus.
//!
//! All 16-bit quantities sit in MSB/LSB register pairs and are read as a
//! single big-endian word from the MSB address. Conversion factors are
//! the datasheet full-scale ratios; current and charge additionally scale
//! with the board's sense resistor and the programmed prescaler.

/// Gauge register addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GaugeRegister {
    /// Status: alert and overflow flags.
    Status = 0x00,
    /// Control: ADC mode, prescaler M, ALCC pin configuration.
    Control = 0x01,
    /// Accumulated charge, MSB. LSB = qLSB (see [`charge_from_raw`]).
    ChargeMsb = 0x02,
    ChargeLsb = 0x03,
    /// Pack voltage, MSB. Full scale 70.8 V.
    VoltageMsb = 0x08,
    VoltageLsb = 0x09,
    /// Sense current, MSB. Full scale +-64.4 mV across the shunt.
    CurrentMsb = 0x0E,
    CurrentLsb = 0x0F,
    /// Die temperature, MSB. Full scale 510 K.
    TemperatureMsb = 0x14,
    TemperatureLsb = 0x15,
}

impl GaugeRegister {
    pub fn addr(self) -> u8 {
        self as u8
    }
}

/// Full-scale pack voltage in volts.
const VOLTAGE_FULL_SCALE: f32 = 70.8;
/// Full-scale sense voltage across the shunt, in volts.
const SENSE_FULL_SCALE: f32 = 0.0644;
/// Full-scale temperature in kelvin.
const TEMPERATURE_FULL_SCALE: f32 = 510.0;
/// Charge LSB at the nominal 50 mOhm shunt and M = 4096, in mAh.
const CHARGE_LSB_NOMINAL_MAH: f32 = 0.340;
const NOMINAL_SENSE_RESISTOR_OHMS: f32 = 0.050;
const NOMINAL_PRESCALER: f32 = 4096.0;

/// Pack voltage in volts from the raw voltage word.
pub fn voltage_from_raw(raw: u16) -> f32 {
    VOLTAGE_FULL_SCALE * f32::from(raw) / 65535.0
}

/// Signed sense current in amps from the raw current word.
///
/// Mid-scale (0x7FFF) is zero; above it charges, below it discharges.
pub fn current_from_raw(raw: u16, sense_resistor_ohms: f32) -> f32 {
    let offset = f32::from(raw) - 32767.0;
    (SENSE_FULL_SCALE / sense_resistor_ohms) * offset / 32767.0
}

/// Die temperature in degrees Celsius from the raw temperature word.
pub fn temperature_from_raw(raw: u16) -> f32 {
    TEMPERATURE_FULL_SCALE * f32::from(raw) / 65535.0 - 273.15
}

/// Accumulated charge in mAh from the raw charge word.
pub fn charge_from_raw(raw: u16, sense_resistor_ohms: f32, prescaler: u16) -> f32 {
    let qlsb = CHARGE_LSB_NOMINAL_MAH
        * (NOMINAL_SENSE_RESISTOR_OHMS / sense_resistor_ohms)
        * (f32::from(prescaler) / NOMINAL_PRESCALER);
    qlsb * f32::from(raw)
}
