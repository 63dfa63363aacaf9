use crate::domain::replicator::{MediaState, ReplicatorState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncoderId(pub Uuid);

impl EncoderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EncoderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EncoderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Encoder {
    pub id: EncoderId,
    pub name: String,
    /// Complete URL to the device, e.g. `http://192.168.0.3`.
    pub base_url: String,
}

impl Encoder {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: EncoderId::new(),
            name: name.into(),
            base_url: base_url.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Online,
    Offline,
    Errored,
    Unknown,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionState::Online => "online",
            ConnectionState::Offline => "offline",
            ConnectionState::Errored => "errored",
            ConnectionState::Unknown => "unknown",
        };
        write!(f, "{}", text)
    }
}

/// One poll cycle's observation of a device.
///
/// Fields the device did not answer for stay `None`; absence is not an error
/// and never counts against health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub stream_state: ReplicatorState,
    pub record_state: ReplicatorState,
    pub media_state: Option<MediaState>,
    pub temperature_c: Option<f64>,
    pub dropped_frames: Option<i64>,
    pub network_bandwidth_kbps: Option<i64>,
    pub link_errors: Option<i64>,
    pub taken_at: DateTime<Utc>,
}

impl DeviceSnapshot {
    pub fn new(stream_state: ReplicatorState, record_state: ReplicatorState) -> Self {
        Self {
            stream_state,
            record_state,
            media_state: None,
            temperature_c: None,
            dropped_frames: None,
            network_bandwidth_kbps: None,
            link_errors: None,
            taken_at: Utc::now(),
        }
    }
}

/// Fleet-wide status buckets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetSummary {
    pub total: usize,
    pub online: usize,
    pub streaming: usize,
    pub offline: usize,
    /// No successful poll within the staleness window.
    pub stale: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_ids_are_unique() {
        let a = Encoder::new("rack-1", "http://192.168.0.3");
        let b = Encoder::new("rack-1", "http://192.168.0.3");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_snapshot_serializes_without_absent_fields_failing() {
        let snapshot = DeviceSnapshot::new(ReplicatorState::Idle, ReplicatorState::Idle);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["stream_state"], "idle");
        assert!(json["temperature_c"].is_null());

        let back: DeviceSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back.stream_state, ReplicatorState::Idle);
        assert!(back.temperature_c.is_none());
    }
}
