//! Replicator command and state model.
//!
//! The replicator is the HELO subsystem that streams and records. It is
//! driven by writing a command code to `eParamID_ReplicatorCommand` and
//! observed by reading the per-channel state parameters.

use crate::domain::param;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Command codes accepted by `eParamID_ReplicatorCommand`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicatorCommand {
    StartRecording,
    StopRecording,
    StartStreaming,
    StopStreaming,
    Shutdown,
}

impl ReplicatorCommand {
    pub fn code(self) -> i64 {
        match self {
            ReplicatorCommand::StartRecording => 1,
            ReplicatorCommand::StopRecording => 2,
            ReplicatorCommand::StartStreaming => 3,
            ReplicatorCommand::StopStreaming => 4,
            ReplicatorCommand::Shutdown => 5,
        }
    }
}

/// The two replicator channels share one command parameter but report state
/// through separate parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Stream,
    Record,
}

impl Channel {
    pub fn state_param(self) -> &'static str {
        match self {
            Channel::Stream => param::REPLICATOR_STREAM_STATE,
            Channel::Record => param::REPLICATOR_RECORD_STATE,
        }
    }

    /// Substring the descriptor text carries while the channel is active.
    pub fn active_text(self) -> &'static str {
        match self {
            Channel::Stream => "Streaming",
            Channel::Record => "Recording",
        }
    }

    pub fn start_command(self) -> ReplicatorCommand {
        match self {
            Channel::Stream => ReplicatorCommand::StartStreaming,
            Channel::Record => ReplicatorCommand::StartRecording,
        }
    }

    pub fn stop_command(self) -> ReplicatorCommand {
        match self {
            Channel::Stream => ReplicatorCommand::StopStreaming,
            Channel::Record => ReplicatorCommand::StopRecording,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Stream => write!(f, "stream"),
            Channel::Record => write!(f, "record"),
        }
    }
}

/// Raised when a device reports a state code outside the known table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownCode(pub i64);

impl fmt::Display for UnknownCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown state code {}", self.0)
    }
}

impl std::error::Error for UnknownCode {}

/// Per-channel replicator state. Code 2 is the only code that means the
/// channel is actually streaming/recording; 1 and 3 are transitional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicatorState {
    Idle,
    Starting,
    Active,
    Stopping,
    Failed,
}

impl ReplicatorState {
    pub fn code(self) -> i64 {
        match self {
            ReplicatorState::Idle => 0,
            ReplicatorState::Starting => 1,
            ReplicatorState::Active => 2,
            ReplicatorState::Stopping => 3,
            ReplicatorState::Failed => 4,
        }
    }

    pub fn is_active(self) -> bool {
        self == ReplicatorState::Active
    }

    /// Transitional states resolve on their own; settled ones do not.
    pub fn is_settled(self) -> bool {
        !matches!(self, ReplicatorState::Starting | ReplicatorState::Stopping)
    }
}

impl TryFrom<i64> for ReplicatorState {
    type Error = UnknownCode;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(ReplicatorState::Idle),
            1 => Ok(ReplicatorState::Starting),
            2 => Ok(ReplicatorState::Active),
            3 => Ok(ReplicatorState::Stopping),
            4 => Ok(ReplicatorState::Failed),
            other => Err(UnknownCode(other)),
        }
    }
}

impl fmt::Display for ReplicatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ReplicatorState::Idle => "idle",
            ReplicatorState::Starting => "starting",
            ReplicatorState::Active => "active",
            ReplicatorState::Stopping => "stopping",
            ReplicatorState::Failed => "failed",
        };
        write!(f, "{}", text)
    }
}

/// Media access mode (`eParamID_MediaState`). In `DataLan` the media is
/// exposed over the network and the replicator cannot run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaState {
    RecordStream,
    DataLan,
}

impl MediaState {
    pub fn code(self) -> i64 {
        match self {
            MediaState::RecordStream => 0,
            MediaState::DataLan => 1,
        }
    }
}

impl TryFrom<i64> for MediaState {
    type Error = UnknownCode;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(MediaState::RecordStream),
            1 => Ok(MediaState::DataLan),
            other => Err(UnknownCode(other)),
        }
    }
}

/// Outcome reported through `eParamID_RegisterRecallResult` after a preset
/// recall request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecallResult {
    None,
    Success,
    Failed,
}

impl TryFrom<i64> for RecallResult {
    type Error = UnknownCode;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(RecallResult::None),
            1 => Ok(RecallResult::Success),
            2 => Ok(RecallResult::Failed),
            other => Err(UnknownCode(other)),
        }
    }
}

/// Observed change between two polls of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    WentActive,
    WentIdle,
    WentFailed,
}

/// Classify the change between two observed states.
///
/// Transitional targets (Starting/Stopping) are not reported; the device may
/// also skip them entirely between two polls, so classification only looks at
/// the settled target. Repeat observations are not transitions.
pub fn classify(prev: ReplicatorState, next: ReplicatorState) -> Option<Transition> {
    if prev == next {
        return None;
    }
    match next {
        ReplicatorState::Active => Some(Transition::WentActive),
        ReplicatorState::Failed => Some(Transition::WentFailed),
        ReplicatorState::Idle => Some(Transition::WentIdle),
        ReplicatorState::Starting | ReplicatorState::Stopping => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_codes_match_vendor_table() {
        assert_eq!(ReplicatorCommand::StartRecording.code(), 1);
        assert_eq!(ReplicatorCommand::StopRecording.code(), 2);
        assert_eq!(ReplicatorCommand::StartStreaming.code(), 3);
        assert_eq!(ReplicatorCommand::StopStreaming.code(), 4);
        assert_eq!(ReplicatorCommand::Shutdown.code(), 5);
    }

    #[test]
    fn test_state_round_trip() {
        for state in [
            ReplicatorState::Idle,
            ReplicatorState::Starting,
            ReplicatorState::Active,
            ReplicatorState::Stopping,
            ReplicatorState::Failed,
        ] {
            assert_eq!(ReplicatorState::try_from(state.code()), Ok(state));
        }
    }

    #[test]
    fn test_unknown_code_is_error_not_panic() {
        let err = ReplicatorState::try_from(9).unwrap_err();
        assert_eq!(err, UnknownCode(9));
        assert!(err.to_string().contains('9'));
    }

    #[test]
    fn test_only_code_two_is_active() {
        assert!(ReplicatorState::Active.is_active());
        assert!(!ReplicatorState::Starting.is_active());
        assert!(!ReplicatorState::Stopping.is_active());
        assert!(!ReplicatorState::Idle.is_active());
        assert!(!ReplicatorState::Failed.is_active());
    }

    #[test]
    fn test_transitional_states_are_not_settled() {
        assert!(!ReplicatorState::Starting.is_settled());
        assert!(!ReplicatorState::Stopping.is_settled());
        assert!(ReplicatorState::Idle.is_settled());
        assert!(ReplicatorState::Active.is_settled());
        assert!(ReplicatorState::Failed.is_settled());
    }

    #[test]
    fn test_channel_wiring() {
        assert_eq!(
            Channel::Stream.start_command(),
            ReplicatorCommand::StartStreaming
        );
        assert_eq!(
            Channel::Record.stop_command(),
            ReplicatorCommand::StopRecording
        );
        assert_eq!(Channel::Stream.state_param(), param::REPLICATOR_STREAM_STATE);
        assert_eq!(Channel::Record.active_text(), "Recording");
    }

    #[test]
    fn test_classify_reports_settled_targets() {
        use ReplicatorState::*;
        assert_eq!(classify(Idle, Active), Some(Transition::WentActive));
        assert_eq!(classify(Starting, Active), Some(Transition::WentActive));
        assert_eq!(classify(Active, Idle), Some(Transition::WentIdle));
        assert_eq!(classify(Starting, Failed), Some(Transition::WentFailed));
        assert_eq!(classify(Active, Failed), Some(Transition::WentFailed));
    }

    #[test]
    fn test_classify_ignores_transitional_and_repeat() {
        use ReplicatorState::*;
        assert_eq!(classify(Idle, Starting), None);
        assert_eq!(classify(Active, Stopping), None);
        assert_eq!(classify(Failed, Failed), None);
        assert_eq!(classify(Active, Active), None);
    }

    #[test]
    fn test_recall_result_codes() {
        assert_eq!(RecallResult::try_from(0), Ok(RecallResult::None));
        assert_eq!(RecallResult::try_from(1), Ok(RecallResult::Success));
        assert_eq!(RecallResult::try_from(2), Ok(RecallResult::Failed));
        assert!(RecallResult::try_from(3).is_err());
    }
}
