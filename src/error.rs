//! # Packet Forwarder Error Handling
//!
//! This module defines the FwdError enum, which represents the different
//! error types that can occur in the pktfwd-rs crate.

use thiserror::Error;

use crate::jit::JitError;

/// Represents the different error types that can occur in the forwarder.
#[derive(Debug, Error)]
pub enum FwdError {
    /// Indicates an error returned by the concentrator HAL.
    #[error("Concentrator error: {0}")]
    Hal(String),

    /// Indicates a socket-level I/O error.
    #[error("Socket error: {0}")]
    Socket(#[from] std::io::Error),

    /// Indicates the server address could not be resolved.
    #[error("Cannot resolve server address: {0}")]
    AddressResolution(String),

    /// Indicates a malformed or truncated UDP datagram.
    #[error("Invalid datagram: {0}")]
    Datagram(String),

    /// Indicates a JSON encode or decode failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Indicates a TX request with missing or inconsistent fields.
    #[error("Invalid txpk: {0}")]
    TxRequest(String),

    /// Indicates a GPS frame that could not be decoded.
    #[error("GPS frame error: {0}")]
    GpsFrame(String),

    /// Indicates an error on the GPS serial line.
    #[error("Serial port error: {0}")]
    SerialPort(String),

    /// Indicates a scheduling rejection from the JIT queue.
    #[error("Scheduling rejected: {0}")]
    Jit(#[from] JitError),

    /// Indicates a class-B request while the time reference is stale.
    #[error("GPS time reference not valid")]
    GpsUnlocked,

    /// Indicates a malformed or incomplete configuration file.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A catch-all error for uncategorized cases.
    #[error("Other error: {0}")]
    Other(String),
}
