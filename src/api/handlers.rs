//! HTTP handlers over the chain supervisor.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Html;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use crate::api::models::{
    AuxByteResponse, AuxQuantityResponse, AuxQuery, AuxValueResponse, StatusResponse,
    WriteResponse, DEFAULT_AUX_REGISTER,
};
use crate::chain::ReadingsSnapshot;
use crate::error::{BatSrvError, Result};
use crate::{AppState, SERVICE_NAME, SERVICE_VERSION};

type SharedState = State<Arc<AppState>>;

/// `GET /` - latest readings snapshot.
///
/// Serves whatever the measurement loop last published. Before the
/// first successful cycle there is nothing to serve and the route
/// answers 503.
pub async fn latest_readings(State(state): SharedState) -> Result<Json<ReadingsSnapshot>> {
    match state.supervisor.latest() {
        Some(snapshot) => Ok(Json(snapshot.as_ref().clone())),
        None => Err(BatSrvError::NoDevices),
    }
}

/// `GET /version` - small HTML identification page.
pub async fn version_page() -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Battery Chain Supervisor</title></head>\n\
         <body>\n<h1>Battery Chain Supervisor</h1>\n<p>{SERVICE_NAME} version {SERVICE_VERSION}</p>\n\
         </body>\n</html>\n"
    ))
}

/// `GET /health` - liveness probe.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": SERVICE_VERSION,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// `GET /status` - chain and fault counters.
pub async fn service_status(State(state): SharedState) -> Json<StatusResponse> {
    let status = state.supervisor.status();
    Json(StatusResponse {
        service: SERVICE_NAME,
        version: SERVICE_VERSION,
        chain_length: status.chain_length,
        error_count: status.error_count,
        discovered_at: status.discovered_at,
        last_fault: status.last_fault,
        last_capture: status.last_capture,
    })
}

/// `GET /aux/read` - raw 16-bit register read from a device's gauge.
pub async fn aux_read(
    State(state): SharedState,
    Query(query): Query<AuxQuery>,
) -> Result<Json<AuxValueResponse>> {
    let device = query.device()?;
    let addr = query.addr_or(state.supervisor.gauge_address())?;
    let register = query.reg_or(DEFAULT_AUX_REGISTER)?;
    let value = state.supervisor.aux_read(device, addr, register).await?;
    Ok(Json(AuxValueResponse {
        device,
        register,
        value,
    }))
}

/// `GET /aux/readbyte` - raw single-byte register read.
pub async fn aux_read_byte(
    State(state): SharedState,
    Query(query): Query<AuxQuery>,
) -> Result<Json<AuxByteResponse>> {
    let device = query.device()?;
    let addr = query.addr_or(state.supervisor.gauge_address())?;
    let register = query.reg_or(DEFAULT_AUX_REGISTER)?;
    let value = state
        .supervisor
        .aux_read_byte(device, addr, register)
        .await?;
    Ok(Json(AuxByteResponse {
        device,
        register,
        value,
    }))
}

/// `GET /aux/write` - single-byte register write.
///
/// Unlike the read routes, `reg` and `value` are mandatory.
pub async fn aux_write(
    State(state): SharedState,
    Query(query): Query<AuxQuery>,
) -> Result<Json<WriteResponse>> {
    let device = query.device()?;
    let addr = query.addr_or(state.supervisor.gauge_address())?;
    let register = query.reg_required()?;
    let value = query.value_required()?;
    state
        .supervisor
        .aux_write(device, addr, register, value)
        .await?;
    Ok(Json(WriteResponse {
        success: true,
        message: format!("wrote {value:#04x} to register {register:#04x} on device {device}"),
    }))
}

/// `GET /aux/current` - battery current in amps, positive charging.
pub async fn aux_current(
    State(state): SharedState,
    Query(query): Query<AuxQuery>,
) -> Result<Json<AuxQuantityResponse>> {
    let device = query.device()?;
    let value = state.supervisor.aux_current(device).await?;
    Ok(Json(AuxQuantityResponse {
        device,
        quantity: "current",
        value,
        unit: "A",
    }))
}

/// `GET /aux/voltage` - pack voltage at the gauge in volts.
pub async fn aux_voltage(
    State(state): SharedState,
    Query(query): Query<AuxQuery>,
) -> Result<Json<AuxQuantityResponse>> {
    let device = query.device()?;
    let value = state.supervisor.aux_voltage(device).await?;
    Ok(Json(AuxQuantityResponse {
        device,
        quantity: "voltage",
        value,
        unit: "V",
    }))
}

/// `GET /aux/charge` - accumulated charge in milliamp-hours.
pub async fn aux_charge(
    State(state): SharedState,
    Query(query): Query<AuxQuery>,
) -> Result<Json<AuxQuantityResponse>> {
    let device = query.device()?;
    let value = state.supervisor.aux_charge(device).await?;
    Ok(Json(AuxQuantityResponse {
        device,
        quantity: "charge",
        value,
        unit: "mAh",
    }))
}

/// `GET /aux/temperature` - gauge die temperature in degrees Celsius.
pub async fn aux_temperature(
    State(state): SharedState,
    Query(query): Query<AuxQuery>,
) -> Result<Json<AuxQuantityResponse>> {
    let device = query.device()?;
    let value = state.supervisor.aux_temperature(device).await?;
    Ok(Json(AuxQuantityResponse {
        device,
        quantity: "temperature",
        value,
        unit: "degC",
    }))
}
