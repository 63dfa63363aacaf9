//! Helo_sim Binary - Simulated HELO device
//!
//! Serves the firmware's wire surface (`/config`, `/descriptors`,
//! `/logwatch.tmpl`) for development without hardware.

use helofleet::adapters::sim::{router, SimDevice};
use helofleet::config::SimConfig;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = SimConfig::from_env();

    tracing_subscriber::fmt::init();

    let sim = Arc::new(SimDevice::new(config.name.clone()));
    let app = router(sim);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.addr, config.port))
        .await
        .expect("Failed to bind TCP listener");
    println!(
        "Simulated HELO '{}' listening at {}:{}",
        config.name, config.addr, config.port
    );
    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
