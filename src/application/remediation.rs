//! Automatic reaction to error transitions.
//!
//! Consumes error events and applies the remediation map: restart a failed
//! stream, force the media state back to Record-Stream when the LAN mode
//! blocks the replicator, and re-probe a lost connection. Attempts are
//! bounded per device and issue so a broken box does not get hammered.

use crate::application::control::ControlService;
use crate::domain::encoder::EncoderId;
use crate::domain::replicator::{MediaState, Transition};
use crate::events::hub::EventHub;
use crate::events::DeviceEvent;
use crate::ports::device::{DeviceControl, DeviceFactory};
use crate::ports::registry::EncoderRegistry;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

const ISSUE_STREAM_FAILED: &str = "stream_failed";
const ISSUE_CONNECTION_LOST: &str = "connection_lost";

#[derive(Debug, Clone)]
pub struct RemediationTuning {
    pub max_attempts: u32,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub settle_delay: Duration,
    pub verify_deadline: Duration,
    pub verify_interval: Duration,
}

impl Default for RemediationTuning {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            settle_delay: crate::application::control::DEFAULT_SETTLE_DELAY,
            verify_deadline: crate::application::control::DEFAULT_VERIFY_DEADLINE,
            verify_interval: crate::application::control::DEFAULT_VERIFY_INTERVAL,
        }
    }
}

pub struct RemediationService<C, R> {
    connector: C,
    registry: Arc<R>,
    hub: Arc<EventHub>,
    tuning: RemediationTuning,
    attempts: Mutex<HashMap<(EncoderId, &'static str), u32>>,
}

impl<C, R> RemediationService<C, R>
where
    C: DeviceFactory,
    R: EncoderRegistry,
{
    pub fn new(connector: C, registry: Arc<R>, hub: Arc<EventHub>) -> Self {
        Self::with_tuning(connector, registry, hub, RemediationTuning::default())
    }

    pub fn with_tuning(
        connector: C,
        registry: Arc<R>,
        hub: Arc<EventHub>,
        tuning: RemediationTuning,
    ) -> Self {
        Self {
            connector,
            registry,
            hub,
            tuning,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub async fn handle(&self, event: DeviceEvent) {
        match event {
            DeviceEvent::StreamStateChanged {
                encoder_id,
                transition: Transition::WentFailed,
                ..
            } => self.remediate_stream_failure(encoder_id).await,
            DeviceEvent::ConnectionLost { encoder_id, .. } => {
                self.remediate_connection(encoder_id).await
            }
            // A recovered device earns a fresh attempt budget
            DeviceEvent::StreamStateChanged {
                encoder_id,
                transition: Transition::WentActive,
                ..
            }
            | DeviceEvent::ConnectionRestored { encoder_id, .. } => {
                self.reset_attempts(encoder_id).await
            }
            _ => {}
        }
    }

    async fn remediate_stream_failure(&self, encoder_id: EncoderId) {
        if !self.take_attempt(encoder_id, ISSUE_STREAM_FAILED).await {
            return;
        }
        let Some(control) = self.control_for(encoder_id).await else {
            return;
        };

        // A replicator stuck in Data-LAN mode cannot restart; fix that first
        match control.media_state().await {
            Ok(MediaState::DataLan) => {
                let success = control.set_media_state(MediaState::RecordStream).await.is_ok();
                self.publish_outcome(encoder_id, "force_media_record_stream", success);
                if !success {
                    return;
                }
            }
            Ok(MediaState::RecordStream) => {}
            Err(e) => {
                tracing::warn!(encoder = %encoder_id, error = %e, "media state unreadable");
            }
        }

        if let Err(e) = control.stop_streaming().await {
            tracing::debug!(encoder = %encoder_id, error = %e, "stop before restart failed");
        }
        let success = match control.start_streaming().await {
            Ok(()) => control.verify_streaming().await.unwrap_or(false),
            Err(e) => {
                tracing::warn!(encoder = %encoder_id, error = %e, "stream restart failed");
                false
            }
        };
        self.publish_outcome(encoder_id, "restart_stream", success);
    }

    async fn remediate_connection(&self, encoder_id: EncoderId) {
        if !self.take_attempt(encoder_id, ISSUE_CONNECTION_LOST).await {
            return;
        }
        let Some(control) = self.control_for(encoder_id).await else {
            return;
        };

        let mut success = false;
        for attempt in 1..=self.tuning.reconnect_attempts {
            match control.device().probe().await {
                Ok(()) => {
                    // Back on the network; check what the replicator is up to
                    match control.verify_streaming().await {
                        Ok(active) => {
                            tracing::info!(
                                encoder = %encoder_id,
                                streaming = active,
                                "device reachable again"
                            );
                        }
                        Err(e) => {
                            tracing::warn!(encoder = %encoder_id, error = %e, "reachable but state unreadable");
                        }
                    }
                    success = true;
                    break;
                }
                Err(e) => {
                    tracing::debug!(encoder = %encoder_id, attempt, error = %e, "reconnect probe failed");
                }
            }
            tokio::time::sleep(self.tuning.reconnect_delay).await;
        }
        self.publish_outcome(encoder_id, "reconnect", success);
    }

    async fn control_for(&self, encoder_id: EncoderId) -> Option<ControlService<C::Device>> {
        match self.registry.get(encoder_id).await {
            Ok(Some(encoder)) => Some(ControlService::with_timing(
                self.connector.connect(&encoder.base_url),
                self.tuning.settle_delay,
                self.tuning.verify_deadline,
                self.tuning.verify_interval,
            )),
            Ok(None) => {
                tracing::warn!(encoder = %encoder_id, "event for unregistered encoder");
                None
            }
            Err(e) => {
                tracing::error!(encoder = %encoder_id, error = %e, "registry lookup failed");
                None
            }
        }
    }

    async fn take_attempt(&self, encoder_id: EncoderId, issue: &'static str) -> bool {
        let mut attempts = self.attempts.lock().await;
        let count = attempts.entry((encoder_id, issue)).or_insert(0);
        if *count >= self.tuning.max_attempts {
            tracing::warn!(
                encoder = %encoder_id,
                issue,
                attempts = *count,
                "remediation budget exhausted"
            );
            return false;
        }
        *count += 1;
        true
    }

    async fn reset_attempts(&self, encoder_id: EncoderId) {
        self.attempts
            .lock()
            .await
            .retain(|(id, _), _| *id != encoder_id);
    }

    fn publish_outcome(&self, encoder_id: EncoderId, action: &str, success: bool) {
        if success {
            tracing::info!(encoder = %encoder_id, action, "remediation succeeded");
        } else {
            tracing::warn!(encoder = %encoder_id, action, "remediation failed");
        }
        self.hub.publish(DeviceEvent::RemediationAttempted {
            encoder_id,
            action: action.to_string(),
            success,
            at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryRegistry;
    use crate::adapters::sim::SimDevice;
    use crate::domain::encoder::Encoder;
    use crate::domain::param;
    use crate::domain::replicator::ReplicatorState;
    use crate::ports::device::DeviceError;
    use crate::domain::param::{Descriptor, ParamReading};
    use crate::ports::device::LogEntry;
    use async_trait::async_trait;
    use tokio::sync::broadcast::error::TryRecvError;

    enum TestDevice {
        Live(Arc<SimDevice>),
        Dead,
    }

    #[async_trait]
    impl DeviceControl for TestDevice {
        async fn get_param(&self, paramid: &str) -> Result<ParamReading, DeviceError> {
            match self {
                TestDevice::Live(sim) => sim.get_param(paramid).await,
                TestDevice::Dead => Err(DeviceError::Connect("no route".into())),
            }
        }

        async fn set_param(&self, paramid: &str, value: &str) -> Result<ParamReading, DeviceError> {
            match self {
                TestDevice::Live(sim) => sim.set_param(paramid, value).await,
                TestDevice::Dead => Err(DeviceError::Connect("no route".into())),
            }
        }

        async fn descriptor(&self, paramid: &str) -> Result<Descriptor, DeviceError> {
            match self {
                TestDevice::Live(sim) => sim.descriptor(paramid).await,
                TestDevice::Dead => Err(DeviceError::Connect("no route".into())),
            }
        }

        async fn fetch_logs(&self) -> Result<Vec<LogEntry>, DeviceError> {
            match self {
                TestDevice::Live(sim) => sim.fetch_logs().await,
                TestDevice::Dead => Err(DeviceError::Connect("no route".into())),
            }
        }

        async fn probe(&self) -> Result<(), DeviceError> {
            match self {
                TestDevice::Live(sim) => sim.probe().await,
                TestDevice::Dead => Err(DeviceError::Connect("no route".into())),
            }
        }
    }

    struct OneDevice(Option<Arc<SimDevice>>);

    impl DeviceFactory for OneDevice {
        type Device = TestDevice;

        fn connect(&self, _base_url: &str) -> TestDevice {
            match &self.0 {
                Some(sim) => TestDevice::Live(sim.clone()),
                None => TestDevice::Dead,
            }
        }
    }

    fn fast_tuning() -> RemediationTuning {
        RemediationTuning {
            max_attempts: 3,
            reconnect_attempts: 2,
            reconnect_delay: Duration::from_millis(1),
            settle_delay: Duration::from_millis(1),
            verify_deadline: Duration::from_millis(200),
            verify_interval: Duration::from_millis(1),
        }
    }

    async fn rig(
        sim: Option<Arc<SimDevice>>,
    ) -> (
        RemediationService<OneDevice, MemoryRegistry>,
        Encoder,
        Arc<EventHub>,
    ) {
        let registry = Arc::new(MemoryRegistry::new());
        let hub = Arc::new(EventHub::new());
        let encoder = Encoder::new("rig", "http://sim");
        registry.add(encoder.clone()).await.unwrap();
        let service = RemediationService::with_tuning(
            OneDevice(sim),
            registry,
            hub.clone(),
            fast_tuning(),
        );
        (service, encoder, hub)
    }

    fn stream_failed(encoder_id: EncoderId) -> DeviceEvent {
        DeviceEvent::StreamStateChanged {
            encoder_id,
            transition: Transition::WentFailed,
            state: ReplicatorState::Failed,
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_stream_failure_restarts_streaming() {
        let sim = Arc::new(SimDevice::new("rig"));
        sim.inject_stream_failure();
        let (service, encoder, hub) = rig(Some(sim.clone())).await;
        let mut rx = hub.subscribe();

        service.handle(stream_failed(encoder.id)).await;

        match rx.try_recv().unwrap() {
            DeviceEvent::RemediationAttempted {
                action, success, ..
            } => {
                assert_eq!(action, "restart_stream");
                assert!(success);
            }
            other => panic!("unexpected event {:?}", other),
        }
        // Settled back to streaming
        sim.read_param(param::REPLICATOR_STREAM_STATE).unwrap();
        let state = sim.read_param(param::REPLICATOR_STREAM_STATE).unwrap();
        assert_eq!(state.as_i64(), Some(ReplicatorState::Active.code()));
    }

    #[tokio::test]
    async fn test_media_lan_is_fixed_before_restart() {
        let sim = Arc::new(SimDevice::new("rig"));
        sim.set_metric(param::MEDIA_STATE, serde_json::json!(1));
        sim.inject_stream_failure();
        let (service, encoder, hub) = rig(Some(sim.clone())).await;
        let mut rx = hub.subscribe();

        service.handle(stream_failed(encoder.id)).await;

        match rx.try_recv().unwrap() {
            DeviceEvent::RemediationAttempted { action, success, .. } => {
                assert_eq!(action, "force_media_record_stream");
                assert!(success);
            }
            other => panic!("unexpected event {:?}", other),
        }
        match rx.try_recv().unwrap() {
            DeviceEvent::RemediationAttempted { action, success, .. } => {
                assert_eq!(action, "restart_stream");
                assert!(success);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_attempt_budget_is_enforced() {
        let (service, encoder, hub) = rig(None).await;
        let mut rx = hub.subscribe();

        for _ in 0..5 {
            service.handle(stream_failed(encoder.id)).await;
        }

        let mut outcomes = 0;
        while let Ok(event) = rx.try_recv() {
            assert!(matches!(
                event,
                DeviceEvent::RemediationAttempted { success: false, .. }
            ));
            outcomes += 1;
        }
        assert_eq!(outcomes, 3);
    }

    #[tokio::test]
    async fn test_recovery_resets_the_budget() {
        let (service, encoder, hub) = rig(None).await;
        for _ in 0..3 {
            service.handle(stream_failed(encoder.id)).await;
        }

        service
            .handle(DeviceEvent::StreamStateChanged {
                encoder_id: encoder.id,
                transition: Transition::WentActive,
                state: ReplicatorState::Active,
                at: Utc::now(),
            })
            .await;

        let mut rx = hub.subscribe();
        service.handle(stream_failed(encoder.id)).await;
        assert!(matches!(
            rx.try_recv().unwrap(),
            DeviceEvent::RemediationAttempted { .. }
        ));
    }

    #[tokio::test]
    async fn test_connection_lost_probes_until_reachable() {
        let sim = Arc::new(SimDevice::new("rig"));
        let (service, encoder, hub) = rig(Some(sim)).await;
        let mut rx = hub.subscribe();

        service
            .handle(DeviceEvent::ConnectionLost {
                encoder_id: encoder.id,
                at: Utc::now(),
            })
            .await;

        match rx.try_recv().unwrap() {
            DeviceEvent::RemediationAttempted { action, success, .. } => {
                assert_eq!(action, "reconnect");
                assert!(success);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_reconnect_reports_failure() {
        let (service, encoder, hub) = rig(None).await;
        let mut rx = hub.subscribe();

        service
            .handle(DeviceEvent::ConnectionLost {
                encoder_id: encoder.id,
                at: Utc::now(),
            })
            .await;

        match rx.try_recv().unwrap() {
            DeviceEvent::RemediationAttempted { action, success, .. } => {
                assert_eq!(action, "reconnect");
                assert!(!success);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_irrelevant_events_are_ignored() {
        let (service, encoder, hub) = rig(None).await;
        let mut rx = hub.subscribe();

        service
            .handle(DeviceEvent::HealthAlert {
                encoder_id: encoder.id,
                issue: crate::domain::health::HealthIssue::ReplicatorFailed,
                at: Utc::now(),
            })
            .await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }
}
