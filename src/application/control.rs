//! Command orchestration: write a command, wait for the device to settle,
//! verify the observed state.
//!
//! The HELO acknowledges command writes immediately but its replicator takes
//! a couple of seconds to move, so every mutating operation here is
//! command -> settle delay -> poll until the expected state shows up.

use crate::domain::param;
use crate::domain::replicator::{
    Channel, MediaState, RecallResult, ReplicatorCommand, ReplicatorState,
};
use crate::domain::validation::{StreamSettings, ValidationReport};
use crate::ports::device::{DeviceControl, DeviceError};
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_VERIFY_DEADLINE: Duration = Duration::from_secs(10);
pub const DEFAULT_VERIFY_INTERVAL: Duration = Duration::from_millis(500);

pub struct ControlService<D> {
    device: D,
    settle_delay: Duration,
    verify_deadline: Duration,
    verify_interval: Duration,
}

impl<D> ControlService<D>
where
    D: DeviceControl,
{
    pub fn new(device: D) -> Self {
        Self::with_timing(
            device,
            DEFAULT_SETTLE_DELAY,
            DEFAULT_VERIFY_DEADLINE,
            DEFAULT_VERIFY_INTERVAL,
        )
    }

    pub fn with_timing(
        device: D,
        settle_delay: Duration,
        verify_deadline: Duration,
        verify_interval: Duration,
    ) -> Self {
        Self {
            device,
            settle_delay,
            verify_deadline,
            verify_interval,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub async fn start_streaming(&self) -> Result<(), DeviceError> {
        self.drive(Channel::Stream, true).await
    }

    pub async fn stop_streaming(&self) -> Result<(), DeviceError> {
        self.drive(Channel::Stream, false).await
    }

    pub async fn start_recording(&self) -> Result<(), DeviceError> {
        self.drive(Channel::Record, true).await
    }

    pub async fn stop_recording(&self) -> Result<(), DeviceError> {
        self.drive(Channel::Record, false).await
    }

    /// Is the channel actually streaming/recording right now? Interpreted
    /// through the device's own descriptor text and cross-checked against
    /// the known state code.
    pub async fn verify_streaming(&self) -> Result<bool, DeviceError> {
        self.verify_channel(Channel::Stream).await
    }

    pub async fn verify_recording(&self) -> Result<bool, DeviceError> {
        self.verify_channel(Channel::Record).await
    }

    pub async fn set_filename_prefix(&self, prefix: &str) -> Result<(), DeviceError> {
        self.device
            .set_param(param::FILENAME_PREFIX, prefix)
            .await
            .map(|_| ())
    }

    pub async fn select_streaming_profile(&self, index: u8) -> Result<(), DeviceError> {
        self.select_profile(param::STREAMING_PROFILE_SEL, index).await
    }

    pub async fn select_recording_profile(&self, index: u8) -> Result<(), DeviceError> {
        self.select_profile(param::RECORDING_PROFILE_SEL, index).await
    }

    /// Recall preset register `n` and wait for the device to report how it
    /// went.
    pub async fn recall_preset(&self, n: u8) -> Result<RecallResult, DeviceError> {
        if !(1..=20).contains(&n) {
            return Err(DeviceError::Protocol(format!(
                "preset register {} outside 1..=20",
                n
            )));
        }

        self.device
            .set_param(param::REGISTER_RECALL, &n.to_string())
            .await?;

        let deadline = Instant::now() + self.verify_deadline;
        loop {
            let code = self.read_code(param::REGISTER_RECALL_RESULT).await?;
            let result = RecallResult::try_from(code)?;
            if result != RecallResult::None {
                tracing::info!(preset = n, ?result, "preset recall finished");
                return Ok(result);
            }
            if Instant::now() >= deadline {
                return Err(DeviceError::Verify {
                    paramid: param::REGISTER_RECALL_RESULT.to_string(),
                    expected: "a recall result".to_string(),
                });
            }
            tokio::time::sleep(self.verify_interval).await;
        }
    }

    /// Validate settings and, when they hold, push them to the device.
    /// A report with hard issues is returned without touching the device.
    pub async fn configure_stream(
        &self,
        settings: &StreamSettings,
    ) -> Result<ValidationReport, DeviceError> {
        let report = settings.validate();
        if !report.valid {
            tracing::warn!(issues = report.issues.len(), "stream settings rejected");
            return Ok(report);
        }
        for warning in &report.warnings {
            tracing::warn!(?warning, "stream settings warning");
        }

        self.device
            .set_param(param::VIDEO_GEOMETRY, &settings.resolution)
            .await?;
        self.device
            .set_param(param::FRAME_RATE, &settings.fps.to_string())
            .await?;
        let kbps = settings.bitrate_bps / 1000;
        self.device
            .set_param(param::VIDEO_BIT_RATE, &kbps.to_string())
            .await?;
        Ok(report)
    }

    pub async fn media_state(&self) -> Result<MediaState, DeviceError> {
        let code = self.read_code(param::MEDIA_STATE).await?;
        Ok(MediaState::try_from(code)?)
    }

    pub async fn set_media_state(&self, state: MediaState) -> Result<(), DeviceError> {
        self.device
            .set_param(param::MEDIA_STATE, &state.code().to_string())
            .await?;
        let observed = self.media_state().await?;
        if observed != state {
            return Err(DeviceError::Verify {
                paramid: param::MEDIA_STATE.to_string(),
                expected: format!("{:?}", state),
            });
        }
        Ok(())
    }

    async fn drive(&self, channel: Channel, start: bool) -> Result<(), DeviceError> {
        let command = if start {
            channel.start_command()
        } else {
            channel.stop_command()
        };
        let expected = if start {
            ReplicatorState::Active
        } else {
            ReplicatorState::Idle
        };

        tracing::info!(%channel, ?command, "sending replicator command");
        self.send_command(command).await?;
        tokio::time::sleep(self.settle_delay).await;
        self.await_state(channel, expected).await
    }

    async fn send_command(&self, command: ReplicatorCommand) -> Result<(), DeviceError> {
        self.device
            .set_param(param::REPLICATOR_COMMAND, &command.code().to_string())
            .await
            .map(|_| ())
    }

    async fn await_state(
        &self,
        channel: Channel,
        expected: ReplicatorState,
    ) -> Result<(), DeviceError> {
        let paramid = channel.state_param();
        let deadline = Instant::now() + self.verify_deadline;
        loop {
            let code = self.read_code(paramid).await?;
            let state = ReplicatorState::try_from(code)?;
            if state == expected {
                tracing::info!(%channel, %state, "replicator settled");
                return Ok(());
            }
            // A failed replicator will not reach the target on its own
            if state == ReplicatorState::Failed || Instant::now() >= deadline {
                return Err(DeviceError::Verify {
                    paramid: paramid.to_string(),
                    expected: expected.to_string(),
                });
            }
            tokio::time::sleep(self.verify_interval).await;
        }
    }

    async fn verify_channel(&self, channel: Channel) -> Result<bool, DeviceError> {
        let paramid = channel.state_param();
        let code = self.read_code(paramid).await?;
        let descriptor = self.device.descriptor(paramid).await?;
        if !descriptor.is_enum() {
            return Err(DeviceError::Protocol(format!(
                "{} descriptor is not an enum",
                paramid
            )));
        }
        let text = descriptor.text_for(code).ok_or_else(|| {
            DeviceError::Protocol(format!("{} has no descriptor entry for code {}", paramid, code))
        })?;

        let active_by_text = text.contains(channel.active_text());
        let active_by_code = ReplicatorState::try_from(code)?.is_active();
        if active_by_text != active_by_code {
            return Err(DeviceError::Protocol(format!(
                "{} descriptor text {:?} disagrees with code {}",
                paramid, text, code
            )));
        }
        Ok(active_by_code)
    }

    async fn select_profile(&self, paramid: &str, index: u8) -> Result<(), DeviceError> {
        if index > 9 {
            return Err(DeviceError::Protocol(format!(
                "profile index {} outside 0..=9",
                index
            )));
        }
        self.device
            .set_param(paramid, &index.to_string())
            .await
            .map(|_| ())
    }

    async fn read_code(&self, paramid: &str) -> Result<i64, DeviceError> {
        let reading = self.device.get_param(paramid).await?;
        reading.as_i64().ok_or_else(|| {
            DeviceError::Decode(format!("{} value is not numeric: {}", paramid, reading.value))
        })
    }
}
