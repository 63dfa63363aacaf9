//! Fleet supervision: one monitor task per encoder, summary aggregation,
//! and probe-based discovery of candidate hosts.

use crate::domain::encoder::{ConnectionState, Encoder, EncoderId, FleetSummary};
use crate::domain::health::HealthThresholds;
use crate::domain::param;
use crate::events::hub::EventHub;
use crate::ports::device::{DeviceControl, DeviceFactory};
use crate::ports::registry::EncoderRegistry;
use crate::application::monitor::{
    MonitorService, DEFAULT_OFFLINE_THRESHOLD, DEFAULT_POLL_INTERVAL,
};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_STALENESS_WINDOW: Duration = Duration::from_secs(300);
pub const DEFAULT_PROBE_CONCURRENCY: usize = 8;

pub struct FleetService<C, R> {
    connector: C,
    registry: Arc<R>,
    hub: Arc<EventHub>,
    thresholds: HealthThresholds,
    poll_interval: Duration,
    offline_threshold: u32,
    staleness_window: Duration,
    probe_concurrency: usize,
    monitors: Mutex<HashMap<EncoderId, CancellationToken>>,
    shutdown: CancellationToken,
}

impl<C, R> FleetService<C, R>
where
    C: DeviceFactory,
    R: EncoderRegistry + 'static,
{
    pub fn new(connector: C, registry: Arc<R>, hub: Arc<EventHub>) -> Self {
        Self {
            connector,
            registry,
            hub,
            thresholds: HealthThresholds::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            offline_threshold: DEFAULT_OFFLINE_THRESHOLD,
            staleness_window: DEFAULT_STALENESS_WINDOW,
            probe_concurrency: DEFAULT_PROBE_CONCURRENCY,
            monitors: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_tuning(
        mut self,
        thresholds: HealthThresholds,
        poll_interval: Duration,
        offline_threshold: u32,
        staleness_window: Duration,
    ) -> Self {
        self.thresholds = thresholds;
        self.poll_interval = poll_interval;
        self.offline_threshold = offline_threshold;
        self.staleness_window = staleness_window;
        self
    }

    pub fn registry(&self) -> &Arc<R> {
        &self.registry
    }

    pub fn hub(&self) -> &Arc<EventHub> {
        &self.hub
    }

    /// Open a control handle for one encoder.
    pub fn device_for(&self, encoder: &Encoder) -> C::Device {
        self.connector.connect(&encoder.base_url)
    }

    /// Register an encoder and start watching it.
    pub async fn register(
        &self,
        name: &str,
        base_url: &str,
    ) -> Result<Encoder, Box<dyn Error + Send + Sync>> {
        let encoder = Encoder::new(name, base_url);
        self.registry.add(encoder.clone()).await?;
        self.watch(encoder.clone()).await;
        Ok(encoder)
    }

    /// Spawn a monitor for an already-registered encoder.
    pub async fn watch(&self, encoder: Encoder) {
        let mut monitors = self.monitors.lock().await;
        if monitors.contains_key(&encoder.id) {
            return;
        }
        let cancel = self.shutdown.child_token();
        monitors.insert(encoder.id, cancel.clone());
        drop(monitors);

        let device = self.connector.connect(&encoder.base_url);
        let monitor = MonitorService::new(
            encoder,
            device,
            self.registry.clone(),
            self.hub.clone(),
            cancel,
        )
        .with_tuning(
            self.thresholds.clone(),
            self.poll_interval,
            self.offline_threshold,
        );
        tokio::spawn(monitor.run());
    }

    /// Stop watching an encoder. Returns whether a monitor was running.
    pub async fn unwatch(&self, id: EncoderId) -> bool {
        let mut monitors = self.monitors.lock().await;
        match monitors.remove(&id) {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every monitor.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.monitors.lock().await.clear();
    }

    pub async fn summary(&self) -> Result<FleetSummary, Box<dyn Error + Send + Sync>> {
        let encoders = self.registry.list().await?;
        let mut summary = FleetSummary {
            total: encoders.len(),
            ..Default::default()
        };
        let stale_after =
            chrono::Duration::from_std(self.staleness_window).unwrap_or(chrono::Duration::zero());

        for encoder in encoders {
            match self.registry.connection_state(encoder.id).await? {
                ConnectionState::Online | ConnectionState::Errored => summary.online += 1,
                ConnectionState::Offline => summary.offline += 1,
                ConnectionState::Unknown => {}
            }
            match self.registry.latest_snapshot(encoder.id).await? {
                Some(snapshot) => {
                    if snapshot.stream_state.is_active() {
                        summary.streaming += 1;
                    }
                    if chrono::Utc::now() - snapshot.taken_at > stale_after {
                        summary.stale += 1;
                    }
                }
                None => summary.stale += 1,
            }
        }
        Ok(summary)
    }

    /// Probe candidate base URLs and register the ones that answer.
    /// Already-registered URLs are skipped.
    pub async fn discover(
        &self,
        hosts: &[String],
    ) -> Result<Vec<Encoder>, Box<dyn Error + Send + Sync>> {
        let known: HashSet<String> = self
            .registry
            .list()
            .await?
            .into_iter()
            .map(|e| e.base_url)
            .collect();
        let gate = Arc::new(Semaphore::new(self.probe_concurrency));

        let probes = hosts
            .iter()
            .filter(|host| !known.contains(host.as_str()))
            .map(|host| {
                let gate = gate.clone();
                async move {
                    let _permit = gate.acquire().await.ok()?;
                    let device = self.connector.connect(host);
                    if let Err(e) = device.probe().await {
                        tracing::debug!(host = %host, error = %e, "probe failed");
                        return None;
                    }
                    // A live device reports its configured system name
                    let name = match device.get_param(param::SYSTEM_NAME).await {
                        Ok(reading) => reading
                            .as_text()
                            .map(String::from)
                            .unwrap_or_else(|| host.clone()),
                        Err(_) => host.clone(),
                    };
                    Some((host.clone(), name))
                }
            });

        let mut found = Vec::new();
        for hit in futures::future::join_all(probes).await.into_iter().flatten() {
            let (host, name) = hit;
            tracing::info!(host = %host, name = %name, "discovered encoder");
            found.push(self.register(&name, &host).await?);
        }
        Ok(found)
    }
}
