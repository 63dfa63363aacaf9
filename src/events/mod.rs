use crate::domain::encoder::EncoderId;
use crate::domain::health::HealthIssue;
use crate::domain::replicator::{ReplicatorState, Transition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod hub;
pub mod listener;

/// State-transition broadcast payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeviceEvent {
    StreamStateChanged {
        encoder_id: EncoderId,
        transition: Transition,
        state: ReplicatorState,
        at: DateTime<Utc>,
    },
    RecordStateChanged {
        encoder_id: EncoderId,
        transition: Transition,
        state: ReplicatorState,
        at: DateTime<Utc>,
    },
    ConnectionLost {
        encoder_id: EncoderId,
        at: DateTime<Utc>,
    },
    ConnectionRestored {
        encoder_id: EncoderId,
        at: DateTime<Utc>,
    },
    HealthAlert {
        encoder_id: EncoderId,
        issue: HealthIssue,
        at: DateTime<Utc>,
    },
    RemediationAttempted {
        encoder_id: EncoderId,
        action: String,
        success: bool,
        at: DateTime<Utc>,
    },
}

impl DeviceEvent {
    pub fn encoder_id(&self) -> EncoderId {
        match self {
            DeviceEvent::StreamStateChanged { encoder_id, .. }
            | DeviceEvent::RecordStateChanged { encoder_id, .. }
            | DeviceEvent::ConnectionLost { encoder_id, .. }
            | DeviceEvent::ConnectionRestored { encoder_id, .. }
            | DeviceEvent::HealthAlert { encoder_id, .. }
            | DeviceEvent::RemediationAttempted { encoder_id, .. } => *encoder_id,
        }
    }
}
