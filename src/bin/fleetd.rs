//! Fleetd Binary - HELO fleet daemon
//!
//! This is the main entry point for fleet operation. It wires up:
//! - The HTTP device adapter and in-memory registry
//! - Monitors for configured and discovered encoders
//! - The remediation listener on the event hub
//! - The operator HTTP facade

use helofleet::adapters::api::{self, ApiState};
use helofleet::adapters::helo::{HeloConnector, RetryPolicy};
use helofleet::adapters::memory::MemoryRegistry;
use helofleet::application::fleet::FleetService;
use helofleet::application::remediation::RemediationService;
use helofleet::config::FleetConfig;
use helofleet::domain::health::HealthThresholds;
use helofleet::events;
use helofleet::events::hub::EventHub;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let config = FleetConfig::from_env();

    tracing_subscriber::fmt::init();

    // 1. Adapters
    let connector = HeloConnector::new(
        config.request_timeout,
        config.probe_timeout,
        RetryPolicy::default(),
    );
    let registry = Arc::new(MemoryRegistry::new());

    // 2. Event hub
    let hub = Arc::new(EventHub::new());

    // 3. Fleet service with configured encoders
    let fleet = Arc::new(
        FleetService::new(connector.clone(), registry.clone(), hub.clone()).with_tuning(
            HealthThresholds::default(),
            config.poll_interval,
            config.offline_threshold,
            config.staleness_window,
        ),
    );
    for (name, url) in &config.devices {
        match fleet.register(name, url).await {
            Ok(encoder) => println!("Watching {} at {}", encoder.name, encoder.base_url),
            Err(e) => eprintln!("Failed to register {}: {:?}", name, e),
        }
    }

    // 4. Discovery sweep over candidate hosts
    if !config.discover_hosts.is_empty() {
        match fleet.discover(&config.discover_hosts).await {
            Ok(found) => println!("Discovered {} encoder(s)", found.len()),
            Err(e) => eprintln!("Discovery failed: {:?}", e),
        }
    }

    // 5. Remediation listener on the event hub
    let shutdown = CancellationToken::new();
    let remediation = Arc::new(RemediationService::new(
        connector,
        registry.clone(),
        hub.clone(),
    ));
    events::listener::start(hub.clone(), remediation, shutdown.clone());

    // 6. Operator HTTP facade
    let state = Arc::new(ApiState::new(fleet.clone()));
    let app = api::router(state);

    // 7. Start Server
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.addr, config.port))
        .await
        .expect("Failed to bind TCP listener");
    println!("Listening at {}:{}", config.addr, config.port);
    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
