//! Configuration for the daemon and the simulator.

use std::env;
use std::time::Duration;

fn env_secs(var: &str, default: u64) -> Duration {
    Duration::from_secs(
        env::var(var)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default),
    )
}

/// Configuration for the `fleetd` daemon.
#[derive(Clone, Debug)]
pub struct FleetConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Encoders to register at boot, `name=base_url` pairs
    pub devices: Vec<(String, String)>,
    /// Candidate base URLs to probe at boot
    pub discover_hosts: Vec<String>,
    /// Delay between device polls
    pub poll_interval: Duration,
    /// Consecutive poll failures before an encoder counts as offline
    pub offline_threshold: u32,
    /// Age after which the latest snapshot counts as stale
    pub staleness_window: Duration,
    /// Per-request timeout against devices
    pub request_timeout: Duration,
    /// Timeout for liveness probes
    pub probe_timeout: Duration,
}

impl FleetConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            addr: env::var("ADDR").unwrap_or_else(|_| String::from("127.0.0.1")),
            port: env::var("PORT").unwrap_or_else(|_| String::from("8080")),
            devices: env::var("HELO_DEVICES")
                .map(|v| parse_devices(&v))
                .unwrap_or_default(),
            discover_hosts: env::var("HELO_DISCOVER")
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
            poll_interval: env_secs("POLL_INTERVAL_SECS", 5),
            offline_threshold: env::var("OFFLINE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            staleness_window: env_secs("STALENESS_WINDOW_SECS", 300),
            request_timeout: env_secs("REQUEST_TIMEOUT_SECS", 30),
            probe_timeout: env_secs("PROBE_TIMEOUT_SECS", 2),
        }
    }
}

/// Configuration for the `helo_sim` binary.
#[derive(Clone, Debug)]
pub struct SimConfig {
    pub addr: String,
    pub port: String,
    /// System name the simulated device reports
    pub name: String,
}

impl SimConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            addr: env::var("SIM_ADDR").unwrap_or_else(|_| String::from("127.0.0.1")),
            port: env::var("SIM_PORT").unwrap_or_else(|_| String::from("8990")),
            name: env::var("SIM_NAME").unwrap_or_else(|_| String::from("helo-sim")),
        }
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_devices(value: &str) -> Vec<(String, String)> {
    parse_list(value)
        .into_iter()
        .filter_map(|entry| {
            let (name, url) = entry.split_once('=')?;
            Some((name.trim().to_string(), url.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_devices() {
        let devices = parse_devices("rack-1=http://192.168.0.3, rack-2=http://192.168.0.4");
        assert_eq!(
            devices,
            vec![
                ("rack-1".to_string(), "http://192.168.0.3".to_string()),
                ("rack-2".to_string(), "http://192.168.0.4".to_string()),
            ]
        );
    }

    #[test]
    fn test_malformed_device_entries_are_dropped() {
        let devices = parse_devices("rack-1=http://192.168.0.3,garbage,,");
        assert_eq!(devices.len(), 1);
    }

    #[test]
    fn test_parse_list_trims_and_skips_empties() {
        assert_eq!(
            parse_list(" http://a , ,http://b"),
            vec!["http://a".to_string(), "http://b".to_string()]
        );
    }
}
