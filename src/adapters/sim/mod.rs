//! Simulated HELO.
//!
//! A parameter store plus just enough replicator behavior to exercise the
//! control and monitoring paths: a command write moves the channel into its
//! transitional state, and the *next* read of the state parameter observes
//! the settled outcome. That models the settle lag of real hardware.

use crate::domain::param::{self, Descriptor, EnumEntry, ParamReading, ParamType};
use crate::domain::replicator::{MediaState, ReplicatorCommand, ReplicatorState};
use crate::ports::device::{DeviceControl, DeviceError, LogEntry};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

pub mod http;

pub use http::router;

struct ChannelSim {
    current: ReplicatorState,
    /// Settled state the next read of the state parameter will land on.
    settle_to: Option<ReplicatorState>,
}

impl ChannelSim {
    fn idle() -> Self {
        Self {
            current: ReplicatorState::Idle,
            settle_to: None,
        }
    }

    fn observe(&mut self) -> i64 {
        let code = self.current.code();
        if let Some(next) = self.settle_to.take() {
            self.current = next;
        }
        code
    }
}

struct SimInner {
    params: HashMap<String, Value>,
    stream: ChannelSim,
    record: ChannelSim,
    /// Recall result waiting to settle after a register recall write.
    recall_pending: bool,
    logs: Vec<LogEntry>,
}

pub struct SimDevice {
    name: String,
    inner: Mutex<SimInner>,
    fail_budget: AtomicU32,
    requests: AtomicU64,
}

impl SimDevice {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut params = HashMap::new();
        params.insert(param::SYSTEM_NAME.to_string(), json!(name.clone()));
        params.insert(param::FILENAME_PREFIX.to_string(), json!("clip"));
        params.insert(param::MEDIA_STATE.to_string(), json!(0));
        params.insert(param::SYSTEM_TEMPERATURE.to_string(), json!(45.0));
        params.insert(param::DROPPED_FRAMES.to_string(), json!(0));
        params.insert(param::NETWORK_BANDWIDTH.to_string(), json!(5000));
        params.insert(param::NETWORK_LINK_ERROR_COUNT.to_string(), json!(0));
        params.insert(param::STREAMING_PROFILE_SEL.to_string(), json!(0));
        params.insert(param::RECORDING_PROFILE_SEL.to_string(), json!(0));
        params.insert(param::REGISTER_RECALL.to_string(), json!(0));
        params.insert(param::REGISTER_RECALL_RESULT.to_string(), json!(0));
        params.insert(param::VIDEO_GEOMETRY.to_string(), json!("1920x1080"));
        params.insert(param::FRAME_RATE.to_string(), json!("30"));
        params.insert(param::VIDEO_BIT_RATE.to_string(), json!(10000));

        let inner = SimInner {
            params,
            stream: ChannelSim::idle(),
            record: ChannelSim::idle(),
            recall_pending: false,
            logs: vec![log_entry("INFO", "System booted")],
        };
        Self {
            name,
            inner: Mutex::new(inner),
            fail_budget: AtomicU32::new(0),
            requests: AtomicU64::new(0),
        }
    }

    /// Make the next `n` wire requests fail with 503.
    pub fn fail_next(&self, n: u32) {
        self.fail_budget.store(n, Ordering::SeqCst);
    }

    /// Wire requests served so far (including injected failures).
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    /// Push a metric value, e.g. to trip health thresholds in tests.
    pub fn set_metric(&self, paramid: &str, value: Value) {
        self.inner
            .lock()
            .unwrap()
            .params
            .insert(paramid.to_string(), value);
    }

    /// Drive a channel straight into `Failed`, as a crashed replicator would.
    pub fn inject_stream_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.stream.current = ReplicatorState::Failed;
        inner.stream.settle_to = None;
        inner.logs.push(log_entry("ERROR", "Replicator: stream fault"));
    }

    pub(crate) fn count_request(&self) -> bool {
        self.requests.fetch_add(1, Ordering::SeqCst);
        loop {
            let budget = self.fail_budget.load(Ordering::SeqCst);
            if budget == 0 {
                return true;
            }
            if self
                .fail_budget
                .compare_exchange(budget, budget - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return false;
            }
        }
    }

    pub fn read_param(&self, paramid: &str) -> Result<ParamReading, DeviceError> {
        let mut inner = self.inner.lock().unwrap();
        let value = match paramid {
            param::REPLICATOR_STREAM_STATE => json!(inner.stream.observe()),
            param::REPLICATOR_RECORD_STATE => json!(inner.record.observe()),
            param::REGISTER_RECALL_RESULT => {
                let value = inner.params[param::REGISTER_RECALL_RESULT].clone();
                if inner.recall_pending {
                    // Settles to Success after the poller has seen it pending
                    inner.recall_pending = false;
                    inner
                        .params
                        .insert(param::REGISTER_RECALL_RESULT.to_string(), json!(1));
                }
                value
            }
            other => inner
                .params
                .get(other)
                .cloned()
                .ok_or(DeviceError::Status { code: 404 })?,
        };
        drop(inner);

        let value_name = value
            .as_i64()
            .and_then(|code| descriptor_for(paramid).text_for(code).map(String::from));
        Ok(ParamReading {
            paramid: paramid.to_string(),
            value,
            value_name,
        })
    }

    pub fn write_param(&self, paramid: &str, value: &str) -> Result<ParamReading, DeviceError> {
        match paramid {
            param::REPLICATOR_COMMAND => {
                let code: i64 = value
                    .parse()
                    .map_err(|_| DeviceError::Status { code: 400 })?;
                self.apply_command(code)?;
            }
            param::REGISTER_RECALL => {
                let mut inner = self.inner.lock().unwrap();
                inner
                    .params
                    .insert(param::REGISTER_RECALL.to_string(), json!(value));
                inner
                    .params
                    .insert(param::REGISTER_RECALL_RESULT.to_string(), json!(0));
                inner.recall_pending = true;
                let message = format!("Preset recall requested: {}", value);
                inner.logs.push(log_entry("INFO", &message));
            }
            other => {
                let mut inner = self.inner.lock().unwrap();
                if !inner.params.contains_key(other) {
                    return Err(DeviceError::Status { code: 404 });
                }
                // Numeric params keep numeric JSON, everything else is text
                let stored = value
                    .parse::<i64>()
                    .map(|n| json!(n))
                    .unwrap_or_else(|_| json!(value));
                inner.params.insert(other.to_string(), stored);
            }
        }
        self.read_param(paramid)
    }

    fn apply_command(&self, code: i64) -> Result<(), DeviceError> {
        let command = match code {
            1 => ReplicatorCommand::StartRecording,
            2 => ReplicatorCommand::StopRecording,
            3 => ReplicatorCommand::StartStreaming,
            4 => ReplicatorCommand::StopStreaming,
            5 => ReplicatorCommand::Shutdown,
            _ => return Err(DeviceError::Status { code: 400 }),
        };

        let mut inner = self.inner.lock().unwrap();
        let media_locked = inner.params[param::MEDIA_STATE].as_i64()
            == Some(MediaState::DataLan.code());

        let (channel, starting) = match command {
            ReplicatorCommand::StartStreaming => (&mut inner.stream, true),
            ReplicatorCommand::StopStreaming => (&mut inner.stream, false),
            ReplicatorCommand::StartRecording => (&mut inner.record, true),
            ReplicatorCommand::StopRecording => (&mut inner.record, false),
            ReplicatorCommand::Shutdown => {
                inner.stream = ChannelSim::idle();
                inner.record = ChannelSim::idle();
                inner.logs.push(log_entry("INFO", "Replicator: shutdown"));
                return Ok(());
            }
        };

        if starting {
            if media_locked {
                // Media is exposed over the LAN; the replicator cannot run
                channel.current = ReplicatorState::Failed;
                channel.settle_to = None;
            } else {
                channel.current = ReplicatorState::Starting;
                channel.settle_to = Some(ReplicatorState::Active);
            }
        } else {
            channel.current = ReplicatorState::Stopping;
            channel.settle_to = Some(ReplicatorState::Idle);
        }
        let message = format!("Replicator: command {:?}", command);
        inner.logs.push(log_entry("INFO", &message));
        Ok(())
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.inner.lock().unwrap().logs.clone()
    }

    pub fn identity(&self) -> Value {
        json!({ "device": "AJA HELO", "name": self.name })
    }
}

fn log_entry(level: &str, message: &str) -> LogEntry {
    LogEntry {
        timestamp: Utc::now().to_rfc3339(),
        level: level.to_string(),
        message: message.to_string(),
    }
}

fn enum_descriptor(paramid: &str, entries: &[(i64, &str)]) -> Descriptor {
    Descriptor {
        paramid: Some(paramid.to_string()),
        param_type: ParamType::Enum,
        enum_values: entries
            .iter()
            .map(|&(value, text)| EnumEntry {
                value: json!(value),
                text: text.to_string(),
            })
            .collect(),
        default_value: Some(json!(0)),
    }
}

/// Static descriptor table matching real HELO firmware texts.
pub fn descriptor_for(paramid: &str) -> Descriptor {
    match paramid {
        param::REPLICATOR_STREAM_STATE => enum_descriptor(
            paramid,
            &[
                (0, "Idle"),
                (1, "Starting"),
                (2, "Streaming"),
                (3, "Stopping"),
                (4, "Failed"),
            ],
        ),
        param::REPLICATOR_RECORD_STATE => enum_descriptor(
            paramid,
            &[
                (0, "Idle"),
                (1, "Starting"),
                (2, "Recording"),
                (3, "Stopping"),
                (4, "Failed"),
            ],
        ),
        param::REPLICATOR_COMMAND => enum_descriptor(
            paramid,
            &[
                (1, "Start Recording"),
                (2, "Stop Recording"),
                (3, "Start Streaming"),
                (4, "Stop Streaming"),
                (5, "Shutdown"),
            ],
        ),
        param::MEDIA_STATE => {
            enum_descriptor(paramid, &[(0, "Record-Stream"), (1, "Data-LAN")])
        }
        param::REGISTER_RECALL_RESULT => {
            enum_descriptor(paramid, &[(0, "None"), (1, "Success"), (2, "Failed")])
        }
        param::SYSTEM_NAME | param::FILENAME_PREFIX => Descriptor {
            paramid: Some(paramid.to_string()),
            param_type: ParamType::String,
            enum_values: vec![],
            default_value: None,
        },
        _ => Descriptor {
            paramid: Some(paramid.to_string()),
            param_type: ParamType::Integer,
            enum_values: vec![],
            default_value: Some(json!(0)),
        },
    }
}

// In-process implementation of the port, for application-level tests that
// do not need a socket.
#[async_trait]
impl DeviceControl for SimDevice {
    async fn get_param(&self, paramid: &str) -> Result<ParamReading, DeviceError> {
        self.read_param(paramid)
    }

    async fn set_param(&self, paramid: &str, value: &str) -> Result<ParamReading, DeviceError> {
        self.write_param(paramid, value)
    }

    async fn descriptor(&self, paramid: &str) -> Result<Descriptor, DeviceError> {
        Ok(descriptor_for(paramid))
    }

    async fn fetch_logs(&self) -> Result<Vec<LogEntry>, DeviceError> {
        Ok(self.logs())
    }

    async fn probe(&self) -> Result<(), DeviceError> {
        Ok(())
    }
}
