//! Per-device polling observer.
//!
//! Reads the watched parameters on a fixed interval, stores the snapshot,
//! classifies state transitions, counts consecutive transport failures, and
//! publishes events for anything another part of the system should react to.

use crate::domain::encoder::{ConnectionState, DeviceSnapshot, Encoder};
use crate::domain::health::{HealthThresholds, HealthIssue};
use crate::domain::param;
use crate::domain::replicator::{classify, Channel, MediaState, ReplicatorState};
use crate::events::hub::EventHub;
use crate::events::DeviceEvent;
use crate::ports::device::{DeviceControl, DeviceError};
use crate::ports::registry::EncoderRegistry;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_OFFLINE_THRESHOLD: u32 = 3;

pub struct MonitorService<D, R> {
    encoder: Encoder,
    device: D,
    registry: Arc<R>,
    hub: Arc<EventHub>,
    thresholds: HealthThresholds,
    poll_interval: Duration,
    offline_threshold: u32,
    cancel: CancellationToken,

    prev_stream: Option<ReplicatorState>,
    prev_record: Option<ReplicatorState>,
    consecutive_failures: u32,
    last_connection: Option<ConnectionState>,
    active_issues: HashSet<&'static str>,
}

impl<D, R> MonitorService<D, R>
where
    D: DeviceControl,
    R: EncoderRegistry,
{
    pub fn new(
        encoder: Encoder,
        device: D,
        registry: Arc<R>,
        hub: Arc<EventHub>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            encoder,
            device,
            registry,
            hub,
            thresholds: HealthThresholds::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            offline_threshold: DEFAULT_OFFLINE_THRESHOLD,
            cancel,
            prev_stream: None,
            prev_record: None,
            consecutive_failures: 0,
            last_connection: None,
            active_issues: HashSet::new(),
        }
    }

    pub fn with_tuning(
        mut self,
        thresholds: HealthThresholds,
        poll_interval: Duration,
        offline_threshold: u32,
    ) -> Self {
        self.thresholds = thresholds;
        self.poll_interval = poll_interval;
        self.offline_threshold = offline_threshold;
        self
    }

    pub async fn run(mut self) {
        let cancel = self.cancel.clone();
        tracing::info!(encoder = %self.encoder.name, "monitor started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.poll_once() => {}
            }
        }
        tracing::info!(encoder = %self.encoder.name, "monitor stopped");
    }

    /// One poll cycle. Public so supervisors and tests can drive it without
    /// the timer.
    pub async fn poll_once(&mut self) {
        match self.poll_device().await {
            Ok(snapshot) => self.on_observation(snapshot).await,
            Err(e) => self.on_transport_failure(e).await,
        }
    }

    async fn poll_device(&self) -> Result<DeviceSnapshot, DeviceError> {
        // One round trip per parameter, issued concurrently
        let (stream, record, media, temperature, dropped, bandwidth, link_errors) = futures::join!(
            self.device.get_param(param::REPLICATOR_STREAM_STATE),
            self.device.get_param(param::REPLICATOR_RECORD_STATE),
            self.device.get_param(param::MEDIA_STATE),
            self.device.get_param(param::SYSTEM_TEMPERATURE),
            self.device.get_param(param::DROPPED_FRAMES),
            self.device.get_param(param::NETWORK_BANDWIDTH),
            self.device.get_param(param::NETWORK_LINK_ERROR_COUNT),
        );

        // The two replicator states are mandatory; everything else a device
        // may simply not report
        let stream_state = Self::required_state(stream, param::REPLICATOR_STREAM_STATE)?;
        let record_state = Self::required_state(record, param::REPLICATOR_RECORD_STATE)?;

        let mut snapshot = DeviceSnapshot::new(stream_state, record_state);
        snapshot.media_state = media
            .ok()
            .and_then(|r| r.as_i64())
            .and_then(|code| MediaState::try_from(code).ok());
        snapshot.temperature_c = temperature.ok().and_then(|r| r.as_f64());
        snapshot.dropped_frames = dropped.ok().and_then(|r| r.as_i64());
        snapshot.network_bandwidth_kbps = bandwidth.ok().and_then(|r| r.as_i64());
        snapshot.link_errors = link_errors.ok().and_then(|r| r.as_i64());
        Ok(snapshot)
    }

    fn required_state(
        reading: Result<crate::domain::param::ParamReading, DeviceError>,
        paramid: &str,
    ) -> Result<ReplicatorState, DeviceError> {
        let reading = reading?;
        let code = reading.as_i64().ok_or_else(|| {
            DeviceError::Decode(format!("{} value is not numeric: {}", paramid, reading.value))
        })?;
        Ok(ReplicatorState::try_from(code)?)
    }

    async fn on_observation(&mut self, snapshot: DeviceSnapshot) {
        let was_offline = self.consecutive_failures >= self.offline_threshold;
        self.consecutive_failures = 0;
        if was_offline {
            self.hub.publish(DeviceEvent::ConnectionRestored {
                encoder_id: self.encoder.id,
                at: Utc::now(),
            });
            tracing::info!(encoder = %self.encoder.name, "connection restored");
        }

        self.publish_transitions(&snapshot);

        let report = self.thresholds.evaluate(&snapshot);
        let connection = if report.healthy {
            ConnectionState::Online
        } else {
            ConnectionState::Errored
        };
        self.set_connection(connection).await;

        if let Err(e) = self
            .registry
            .record_snapshot(self.encoder.id, snapshot)
            .await
        {
            tracing::error!(encoder = %self.encoder.name, error = %e, "snapshot not stored");
        }

        // Alert once per issue onset; a persisting issue stays quiet until
        // it clears and comes back
        let current: HashSet<&'static str> = report.issues.iter().map(HealthIssue::label).collect();
        for issue in report.issues {
            if self.active_issues.insert(issue.label()) {
                tracing::warn!(encoder = %self.encoder.name, ?issue, "health alert");
                self.hub.publish(DeviceEvent::HealthAlert {
                    encoder_id: self.encoder.id,
                    issue,
                    at: Utc::now(),
                });
            }
        }
        self.active_issues.retain(|label| current.contains(label));

        for warning in report.warnings {
            tracing::warn!(encoder = %self.encoder.name, ?warning, "health warning");
        }
    }

    fn publish_transitions(&mut self, snapshot: &DeviceSnapshot) {
        if let Some(prev) = self.prev_stream {
            if let Some(transition) = classify(prev, snapshot.stream_state) {
                tracing::info!(
                    encoder = %self.encoder.name,
                    channel = %Channel::Stream,
                    ?transition,
                    "state transition"
                );
                self.hub.publish(DeviceEvent::StreamStateChanged {
                    encoder_id: self.encoder.id,
                    transition,
                    state: snapshot.stream_state,
                    at: Utc::now(),
                });
            }
        }
        if let Some(prev) = self.prev_record {
            if let Some(transition) = classify(prev, snapshot.record_state) {
                tracing::info!(
                    encoder = %self.encoder.name,
                    channel = %Channel::Record,
                    ?transition,
                    "state transition"
                );
                self.hub.publish(DeviceEvent::RecordStateChanged {
                    encoder_id: self.encoder.id,
                    transition,
                    state: snapshot.record_state,
                    at: Utc::now(),
                });
            }
        }
        self.prev_stream = Some(snapshot.stream_state);
        self.prev_record = Some(snapshot.record_state);
    }

    async fn on_transport_failure(&mut self, error: DeviceError) {
        self.consecutive_failures += 1;
        if self.consecutive_failures == self.offline_threshold {
            tracing::error!(
                encoder = %self.encoder.name,
                failures = self.consecutive_failures,
                error = %error,
                "device marked offline"
            );
            self.set_connection(ConnectionState::Offline).await;
            self.hub.publish(DeviceEvent::ConnectionLost {
                encoder_id: self.encoder.id,
                at: Utc::now(),
            });
        } else {
            tracing::warn!(
                encoder = %self.encoder.name,
                failures = self.consecutive_failures,
                error = %error,
                "poll failed"
            );
        }
    }

    async fn set_connection(&mut self, state: ConnectionState) {
        if self.last_connection == Some(state) {
            return;
        }
        self.last_connection = Some(state);
        if let Err(e) = self
            .registry
            .set_connection_state(self.encoder.id, state)
            .await
        {
            tracing::error!(encoder = %self.encoder.name, error = %e, "connection state not stored");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryRegistry;
    use crate::adapters::sim::SimDevice;
    use crate::domain::param;
    use crate::domain::param::ParamReading;
    use crate::domain::param::Descriptor;
    use crate::ports::device::LogEntry;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::broadcast::error::TryRecvError;

    /// Forwards to the simulator, or fails every call while tripped.
    struct FlakyDevice {
        inner: Arc<SimDevice>,
        down: AtomicBool,
    }

    impl FlakyDevice {
        fn new(inner: Arc<SimDevice>) -> Arc<Self> {
            Arc::new(Self {
                inner,
                down: AtomicBool::new(false),
            })
        }

        fn set_down(&self, down: bool) {
            self.down.store(down, Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), DeviceError> {
            if self.down.load(Ordering::SeqCst) {
                Err(DeviceError::Connect("link down".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl DeviceControl for FlakyDevice {
        async fn get_param(&self, paramid: &str) -> Result<ParamReading, DeviceError> {
            self.check()?;
            self.inner.get_param(paramid).await
        }

        async fn set_param(&self, paramid: &str, value: &str) -> Result<ParamReading, DeviceError> {
            self.check()?;
            self.inner.set_param(paramid, value).await
        }

        async fn descriptor(&self, paramid: &str) -> Result<Descriptor, DeviceError> {
            self.check()?;
            self.inner.descriptor(paramid).await
        }

        async fn fetch_logs(&self) -> Result<Vec<LogEntry>, DeviceError> {
            self.check()?;
            self.inner.fetch_logs().await
        }

        async fn probe(&self) -> Result<(), DeviceError> {
            self.check()?;
            self.inner.probe().await
        }
    }

    struct Rig {
        sim: Arc<SimDevice>,
        flaky: Arc<FlakyDevice>,
        registry: Arc<MemoryRegistry>,
        hub: Arc<EventHub>,
        encoder: Encoder,
        monitor: MonitorService<Arc<FlakyDevice>, MemoryRegistry>,
    }

    async fn rig() -> Rig {
        let sim = Arc::new(SimDevice::new("rig"));
        let flaky = FlakyDevice::new(sim.clone());
        let registry = Arc::new(MemoryRegistry::new());
        let hub = Arc::new(EventHub::new());
        let encoder = Encoder::new("rig", "http://sim");
        registry.add(encoder.clone()).await.unwrap();

        let monitor = MonitorService::new(
            encoder.clone(),
            flaky.clone(),
            registry.clone(),
            hub.clone(),
            CancellationToken::new(),
        )
        .with_tuning(HealthThresholds::default(), Duration::from_millis(5), 3);

        Rig {
            sim,
            flaky,
            registry,
            hub,
            encoder,
            monitor,
        }
    }

    #[tokio::test]
    async fn test_first_poll_stores_snapshot_and_marks_online() {
        let mut r = rig().await;
        r.monitor.poll_once().await;

        let snapshot = r
            .registry
            .latest_snapshot(r.encoder.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.stream_state, ReplicatorState::Idle);
        assert_eq!(snapshot.temperature_c, Some(45.0));
        assert_eq!(
            r.registry.connection_state(r.encoder.id).await.unwrap(),
            ConnectionState::Online
        );
    }

    #[tokio::test]
    async fn test_transition_to_streaming_publishes_event() {
        let mut r = rig().await;
        let mut rx = r.hub.subscribe();

        r.monitor.poll_once().await;
        r.sim.write_param(param::REPLICATOR_COMMAND, "3").unwrap();
        r.monitor.poll_once().await; // observes Starting, not a transition
        r.monitor.poll_once().await; // observes Streaming

        match rx.try_recv().unwrap() {
            DeviceEvent::StreamStateChanged {
                transition, state, ..
            } => {
                assert_eq!(transition, crate::domain::replicator::Transition::WentActive);
                assert_eq!(state, ReplicatorState::Active);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_three_failures_mark_offline_once() {
        let mut r = rig().await;
        let mut rx = r.hub.subscribe();
        r.flaky.set_down(true);

        for _ in 0..5 {
            r.monitor.poll_once().await;
        }

        assert_eq!(
            r.registry.connection_state(r.encoder.id).await.unwrap(),
            ConnectionState::Offline
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            DeviceEvent::ConnectionLost { .. }
        ));
        // No repeat while it stays down
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_recovery_publishes_connection_restored() {
        let mut r = rig().await;
        r.flaky.set_down(true);
        for _ in 0..3 {
            r.monitor.poll_once().await;
        }
        let mut rx = r.hub.subscribe();
        r.flaky.set_down(false);
        r.monitor.poll_once().await;

        assert!(matches!(
            rx.try_recv().unwrap(),
            DeviceEvent::ConnectionRestored { .. }
        ));
        assert_eq!(
            r.registry.connection_state(r.encoder.id).await.unwrap(),
            ConnectionState::Online
        );
    }

    #[tokio::test]
    async fn test_failures_below_threshold_publish_nothing() {
        let mut r = rig().await;
        let mut rx = r.hub.subscribe();
        r.flaky.set_down(true);
        r.monitor.poll_once().await;
        r.monitor.poll_once().await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_health_alert_fires_once_per_onset() {
        let mut r = rig().await;
        let mut rx = r.hub.subscribe();

        r.sim.set_metric(param::SYSTEM_TEMPERATURE, json!(85.0));
        r.monitor.poll_once().await;
        r.monitor.poll_once().await; // still hot, no re-alert

        assert!(matches!(
            rx.try_recv().unwrap(),
            DeviceEvent::HealthAlert {
                issue: HealthIssue::Overheating { .. },
                ..
            }
        ));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(
            r.registry.connection_state(r.encoder.id).await.unwrap(),
            ConnectionState::Errored
        );

        // Clears, then comes back: that is a new onset
        r.sim.set_metric(param::SYSTEM_TEMPERATURE, json!(45.0));
        r.monitor.poll_once().await;
        r.sim.set_metric(param::SYSTEM_TEMPERATURE, json!(85.0));
        r.monitor.poll_once().await;
        assert!(matches!(
            rx.try_recv().unwrap(),
            DeviceEvent::HealthAlert { .. }
        ));
    }

    #[tokio::test]
    async fn test_registry_failure_does_not_stop_polling() {
        use crate::ports::registry::MockEncoderRegistry;

        let sim = Arc::new(SimDevice::new("rig"));
        let mut registry = MockEncoderRegistry::new();
        registry
            .expect_set_connection_state()
            .times(1)
            .returning(|_, _| Ok(()));
        // Storage rejects every snapshot; the monitor logs and keeps going
        registry
            .expect_record_snapshot()
            .times(2)
            .returning(|_, _| Err("storage offline".into()));

        let mut monitor = MonitorService::new(
            Encoder::new("rig", "http://sim"),
            sim,
            Arc::new(registry),
            Arc::new(EventHub::new()),
            CancellationToken::new(),
        );
        monitor.poll_once().await;
        monitor.poll_once().await;
    }

    #[tokio::test]
    async fn test_cancelled_monitor_stops() {
        let r = rig().await;
        let cancel = CancellationToken::new();
        let monitor = MonitorService::new(
            r.encoder.clone(),
            r.flaky.clone(),
            r.registry.clone(),
            r.hub.clone(),
            cancel.clone(),
        )
        .with_tuning(HealthThresholds::default(), Duration::from_millis(2), 3);

        let handle = tokio::spawn(monitor.run());
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor did not stop")
            .unwrap();
    }
}
