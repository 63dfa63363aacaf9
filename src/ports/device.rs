//! Device control seam.
//!
//! Everything the rest of the crate knows about talking to a HELO goes
//! through [`DeviceControl`]. The HTTP adapter and the simulator implement
//! it; application tests mock it.

use crate::domain::param::{Descriptor, ParamReading};
use crate::domain::replicator::UnknownCode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure taxonomy for device interaction.
///
/// `Connect` and `Timeout` are transient and worth retrying; everything else
/// is permanent for the request that produced it.
#[derive(Debug)]
pub enum DeviceError {
    /// Could not reach the device at all.
    Connect(String),
    /// The device did not answer within the request timeout.
    Timeout,
    /// The device answered with a non-success HTTP status.
    Status { code: u16 },
    /// The body was not the JSON shape the firmware documents.
    Decode(String),
    /// The exchange succeeded but violated the parameter protocol
    /// (wrong descriptor shape, unknown enum code, rejected argument).
    Protocol(String),
    /// A commanded state was not observed within the verify deadline.
    Verify { paramid: String, expected: String },
}

impl DeviceError {
    pub fn is_transient(&self) -> bool {
        match self {
            DeviceError::Connect(_) | DeviceError::Timeout => true,
            // Gateway-style statuses come from flaky device webservers
            DeviceError::Status { code } => matches!(code, 502 | 503),
            _ => false,
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Connect(e) => write!(f, "Connection failed: {}", e),
            DeviceError::Timeout => write!(f, "Device did not respond in time"),
            DeviceError::Status { code } => {
                let detail = match code {
                    400 => "bad request - check parameter name and value",
                    401 => "authentication required - device has a password set",
                    403 => "access forbidden",
                    404 => "parameter not found on this device",
                    409 => "conflict - device is busy with another operation",
                    _ => "unexpected HTTP status",
                };
                write!(f, "Device returned {}: {}", code, detail)
            }
            DeviceError::Decode(e) => write!(f, "Unreadable device response: {}", e),
            DeviceError::Protocol(e) => write!(f, "Protocol violation: {}", e),
            DeviceError::Verify { paramid, expected } => {
                write!(f, "{} never reached {} within the deadline", paramid, expected)
            }
        }
    }
}

impl std::error::Error for DeviceError {}

impl From<UnknownCode> for DeviceError {
    fn from(err: UnknownCode) -> Self {
        DeviceError::Protocol(err.to_string())
    }
}

impl From<serde_json::Error> for DeviceError {
    fn from(err: serde_json::Error) -> Self {
        DeviceError::Decode(err.to_string())
    }
}

/// One line of the device's internal log (`logwatch.tmpl`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub message: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceControl: Send + Sync {
    /// Read one parameter (`config?action=get`).
    async fn get_param(&self, paramid: &str) -> Result<ParamReading, DeviceError>;

    /// Write one parameter (`config?action=set`). The adapter is responsible
    /// for percent-encoding the value.
    async fn set_param(&self, paramid: &str, value: &str) -> Result<ParamReading, DeviceError>;

    /// Fetch (or serve from cache) the descriptor for a parameter.
    async fn descriptor(&self, paramid: &str) -> Result<Descriptor, DeviceError>;

    /// Fetch the device's internal log.
    async fn fetch_logs(&self) -> Result<Vec<LogEntry>, DeviceError>;

    /// Cheap liveness check with a short timeout.
    async fn probe(&self) -> Result<(), DeviceError>;
}

// Shared handles forward to the inner device, so services can hold the
// same device without caring who owns it.
#[async_trait]
impl<T> DeviceControl for std::sync::Arc<T>
where
    T: DeviceControl + ?Sized,
{
    async fn get_param(&self, paramid: &str) -> Result<ParamReading, DeviceError> {
        (**self).get_param(paramid).await
    }

    async fn set_param(&self, paramid: &str, value: &str) -> Result<ParamReading, DeviceError> {
        (**self).set_param(paramid, value).await
    }

    async fn descriptor(&self, paramid: &str) -> Result<Descriptor, DeviceError> {
        (**self).descriptor(paramid).await
    }

    async fn fetch_logs(&self) -> Result<Vec<LogEntry>, DeviceError> {
        (**self).fetch_logs().await
    }

    async fn probe(&self) -> Result<(), DeviceError> {
        (**self).probe().await
    }
}

/// Builds a [`DeviceControl`] for a base URL. Lets the fleet layer open
/// device connections without naming a concrete adapter.
pub trait DeviceFactory: Send + Sync {
    type Device: DeviceControl + 'static;

    fn connect(&self, base_url: &str) -> Self::Device;
}
