//! Device parameter model.
//!
//! A HELO exposes every setting and status value as a parameter identified by
//! a vendor "eParamID" string key. Enumerated parameters map integer codes to
//! human-readable text through a descriptor the device itself serves.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Well-known parameter ids.
pub const REPLICATOR_COMMAND: &str = "eParamID_ReplicatorCommand";
pub const REPLICATOR_STREAM_STATE: &str = "eParamID_ReplicatorStreamState";
pub const REPLICATOR_RECORD_STATE: &str = "eParamID_ReplicatorRecordState";
pub const MEDIA_STATE: &str = "eParamID_MediaState";
pub const STREAMING_PROFILE_SEL: &str = "eParamID_StreamingProfileSel";
pub const RECORDING_PROFILE_SEL: &str = "eParamID_RecordingProfileSel";
pub const FILENAME_PREFIX: &str = "eParamID_FilenamePrefix";
pub const REGISTER_RECALL: &str = "eParamID_RegisterRecall";
pub const REGISTER_RECALL_RESULT: &str = "eParamID_RegisterRecallResult";
pub const SYSTEM_TEMPERATURE: &str = "eParamID_SystemTemperature";
pub const NETWORK_LINK_ERROR_COUNT: &str = "eParamID_NetworkLinkErrorCount";
pub const DROPPED_FRAMES: &str = "eParamID_DroppedFrames";
pub const NETWORK_BANDWIDTH: &str = "eParamID_NetworkBandwidth";
pub const SYSTEM_NAME: &str = "eParamID_SystemName";
pub const VIDEO_GEOMETRY: &str = "eParamID_VideoGeometry";
pub const FRAME_RATE: &str = "eParamID_FrameRate";
pub const VIDEO_BIT_RATE: &str = "eParamID_VideoBitRate";

// Firmware is inconsistent about numeric encoding: the same parameter may
// come back as a JSON number or as a decimal string.
fn loose_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loose_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// One `config?action=get` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamReading {
    pub paramid: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_name: Option<String>,
}

impl ParamReading {
    pub fn as_i64(&self) -> Option<i64> {
        loose_i64(&self.value)
    }

    pub fn as_f64(&self) -> Option<f64> {
        loose_f64(&self.value)
    }

    pub fn as_text(&self) -> Option<&str> {
        self.value.as_str()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Enum,
    Data,
}

/// One legal value/text pair of an enumerated parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumEntry {
    pub value: Value,
    pub text: String,
}

impl EnumEntry {
    pub fn code(&self) -> Option<i64> {
        loose_i64(&self.value)
    }
}

/// Everything the device knows about a parameter, excluding its current value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paramid: Option<String>,
    pub param_type: ParamType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<EnumEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl Descriptor {
    pub fn is_enum(&self) -> bool {
        self.param_type == ParamType::Enum
    }

    /// Map an integer code to its descriptor text.
    pub fn text_for(&self, code: i64) -> Option<&str> {
        self.enum_values
            .iter()
            .find(|entry| entry.code() == Some(code))
            .map(|entry| entry.text.as_str())
    }
}

/// Descriptors are firmware-static, so one fetch per parameter is enough.
#[derive(Debug, Default)]
pub struct DescriptorCache {
    inner: HashMap<String, Descriptor>,
}

impl DescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, paramid: &str) -> Option<&Descriptor> {
        self.inner.get(paramid)
    }

    pub fn insert(&mut self, paramid: impl Into<String>, descriptor: Descriptor) {
        self.inner.insert(paramid.into(), descriptor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reading_accepts_numeric_value() {
        let reading: ParamReading = serde_json::from_value(json!({
            "paramid": REPLICATOR_STREAM_STATE,
            "name": "Replicator Stream State",
            "value": 2
        }))
        .unwrap();
        assert_eq!(reading.as_i64(), Some(2));
    }

    #[test]
    fn test_reading_accepts_string_encoded_value() {
        let reading: ParamReading = serde_json::from_value(json!({
            "paramid": REPLICATOR_STREAM_STATE,
            "value": "2",
            "value_name": "Streaming"
        }))
        .unwrap();
        assert_eq!(reading.as_i64(), Some(2));
        assert_eq!(reading.value_name.as_deref(), Some("Streaming"));
    }

    #[test]
    fn test_reading_rejects_non_numeric_text() {
        let reading: ParamReading = serde_json::from_value(json!({
            "paramid": FILENAME_PREFIX,
            "value": "interview_cam1"
        }))
        .unwrap();
        assert_eq!(reading.as_i64(), None);
        assert_eq!(reading.as_text(), Some("interview_cam1"));
    }

    #[test]
    fn test_descriptor_maps_code_to_text() {
        let descriptor: Descriptor = serde_json::from_value(json!({
            "paramid": REPLICATOR_STREAM_STATE,
            "param_type": "enum",
            "enum_values": [
                {"value": 0, "text": "Idle"},
                {"value": "2", "text": "Streaming"}
            ]
        }))
        .unwrap();
        assert!(descriptor.is_enum());
        assert_eq!(descriptor.text_for(0), Some("Idle"));
        // String-encoded entry values resolve the same way
        assert_eq!(descriptor.text_for(2), Some("Streaming"));
        assert_eq!(descriptor.text_for(9), None);
    }

    #[test]
    fn test_descriptor_without_enum_values() {
        let descriptor: Descriptor = serde_json::from_value(json!({
            "param_type": "string"
        }))
        .unwrap();
        assert!(!descriptor.is_enum());
        assert_eq!(descriptor.text_for(0), None);
    }

    #[test]
    fn test_cache_round_trip() {
        let mut cache = DescriptorCache::new();
        assert!(cache.get(MEDIA_STATE).is_none());
        cache.insert(
            MEDIA_STATE,
            Descriptor {
                paramid: Some(MEDIA_STATE.to_string()),
                param_type: ParamType::Enum,
                enum_values: vec![],
                default_value: None,
            },
        );
        assert!(cache.get(MEDIA_STATE).is_some());
    }
}
