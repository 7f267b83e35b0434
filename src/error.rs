//! Error handling for the battery chain supervisor.
//!
//! One error type covers the service: chain-level faults, aux-bus
//! transaction errors and the plumbing around config and IO. Handlers
//! return it directly; the `IntoResponse` impl maps variants onto HTTP
//! statuses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for the service
pub type Result<T> = std::result::Result<T, BatSrvError>;

/// Battery supervisor error type
#[derive(Error, Debug, Clone)]
pub enum BatSrvError {
    /// No monitoring devices discovered on the chain
    #[error("No Devices")]
    NoDevices,

    /// Device index outside the discovered chain
    #[error("Address out of range: {0}")]
    AddressOutOfRange(String),

    /// Bus transaction failure (probe, scan or aux traffic)
    #[error("Bus error: {0}")]
    Bus(String),

    /// Chain found but could not be configured
    #[error("Initialisation error: {0}")]
    Init(String),

    /// Malformed request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input/Output operation errors
    #[error("IO error: {0}")]
    Io(String),

    /// General internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

// Conversion from std::io::Error
impl From<std::io::Error> for BatSrvError {
    fn from(err: std::io::Error) -> Self {
        BatSrvError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for BatSrvError {
    fn from(err: serde_json::Error) -> Self {
        BatSrvError::Internal(format!("JSON error: {err}"))
    }
}

// Conversion from serde_yaml::Error
impl From<serde_yaml::Error> for BatSrvError {
    fn from(err: serde_yaml::Error) -> Self {
        BatSrvError::Config(format!("YAML error: {err}"))
    }
}

// Conversion from figment::Error
impl From<figment::Error> for BatSrvError {
    fn from(err: figment::Error) -> Self {
        BatSrvError::Config(err.to_string())
    }
}

// Helper methods for creating errors
impl BatSrvError {
    pub fn bus(msg: impl Into<String>) -> Self {
        BatSrvError::Bus(msg.into())
    }

    pub fn init(msg: impl Into<String>) -> Self {
        BatSrvError::Init(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        BatSrvError::Config(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        BatSrvError::InvalidInput(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        BatSrvError::Internal(msg.into())
    }

    pub fn out_of_range(device: usize, chain_length: usize) -> Self {
        BatSrvError::AddressOutOfRange(format!(
            "device {device} not on chain of length {chain_length}"
        ))
    }
}

// HTTP response conversion for Axum
impl IntoResponse for BatSrvError {
    fn into_response(self) -> Response {
        let status = match &self {
            BatSrvError::NoDevices => StatusCode::SERVICE_UNAVAILABLE,
            BatSrvError::AddressOutOfRange(_) | BatSrvError::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            },
            BatSrvError::Bus(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}
