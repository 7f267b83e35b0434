//! Request and response shapes for the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BatSrvError, Result};

/// Register returned by raw aux reads when the request names none.
pub const DEFAULT_AUX_REGISTER: u8 = 0x1A;

/// Query parameters shared by the aux routes.
///
/// Numeric fields accept decimal or `0x`-prefixed hex. Everything
/// arrives as a string so malformed values produce the service's error
/// shape instead of the extractor's plain-text rejection.
#[derive(Debug, Default, Deserialize)]
pub struct AuxQuery {
    /// Device index on the chain.
    pub sensor: Option<String>,
    /// Aux bus address; defaults to the configured gauge address.
    pub addr: Option<String>,
    pub reg: Option<String>,
    pub value: Option<String>,
}

impl AuxQuery {
    pub fn device(&self) -> Result<usize> {
        let raw = self
            .sensor
            .as_deref()
            .ok_or_else(|| BatSrvError::invalid_input("missing sensor parameter"))?;
        let value = parse_number("sensor", raw)?;
        usize::try_from(value)
            .map_err(|_| BatSrvError::invalid_input(format!("sensor out of range: {value}")))
    }

    pub fn addr_or(&self, default: u8) -> Result<u8> {
        match self.addr.as_deref() {
            None => Ok(default),
            Some(raw) => parse_byte("addr", raw),
        }
    }

    pub fn reg_or(&self, default: u8) -> Result<u8> {
        match self.reg.as_deref() {
            None => Ok(default),
            Some(raw) => parse_byte("reg", raw),
        }
    }

    pub fn reg_required(&self) -> Result<u8> {
        let raw = self
            .reg
            .as_deref()
            .ok_or_else(|| BatSrvError::invalid_input("missing reg parameter"))?;
        parse_byte("reg", raw)
    }

    pub fn value_required(&self) -> Result<u8> {
        let raw = self
            .value
            .as_deref()
            .ok_or_else(|| BatSrvError::invalid_input("missing value parameter"))?;
        parse_byte("value", raw)
    }
}

fn parse_number(field: &str, raw: &str) -> Result<u64> {
    let raw = raw.trim();
    let parsed = if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        raw.parse::<u64>()
    };
    parsed.map_err(|_| BatSrvError::invalid_input(format!("invalid {field}: {raw}")))
}

fn parse_byte(field: &str, raw: &str) -> Result<u8> {
    let value = parse_number(field, raw)?;
    u8::try_from(value)
        .map_err(|_| BatSrvError::invalid_input(format!("{field} out of byte range: {value}")))
}

/// Raw 16-bit aux read result.
#[derive(Debug, Serialize)]
pub struct AuxValueResponse {
    pub device: usize,
    pub register: u8,
    pub value: u16,
}

/// Raw single-byte aux read result.
#[derive(Debug, Serialize)]
pub struct AuxByteResponse {
    pub device: usize,
    pub register: u8,
    pub value: u8,
}

/// Derived physical quantity from the gauge.
#[derive(Debug, Serialize)]
pub struct AuxQuantityResponse {
    pub device: usize,
    pub quantity: &'static str,
    pub value: f32,
    pub unit: &'static str,
}

/// Aux write confirmation.
#[derive(Debug, Serialize)]
pub struct WriteResponse {
    pub success: bool,
    pub message: String,
}

/// Service status payload.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub chain_length: usize,
    pub error_count: u64,
    pub discovered_at: Option<DateTime<Utc>>,
    pub last_fault: Option<String>,
    pub last_capture: Option<DateTime<Utc>>,
}
