use crate::domain::encoder::DeviceSnapshot;
use serde::{Deserialize, Serialize};

/// Alert thresholds for one device.
#[derive(Debug, Clone)]
pub struct HealthThresholds {
    pub temperature_critical_c: f64,
    pub temperature_warning_c: f64,
    pub max_dropped_frames: i64,
    pub max_link_errors: i64,
    pub min_bandwidth_kbps: i64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            temperature_critical_c: 80.0,
            temperature_warning_c: 75.0,
            max_dropped_frames: 10,
            max_link_errors: 10,
            min_bandwidth_kbps: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthIssue {
    Overheating { temperature_c: f64 },
    RunningHot { temperature_c: f64 },
    DroppedFrames { count: i64 },
    LinkErrors { count: i64 },
    BandwidthAnomaly { kbps: i64 },
    ReplicatorFailed,
}

impl HealthIssue {
    /// Stable label used for alert de-duplication.
    pub fn label(&self) -> &'static str {
        match self {
            HealthIssue::Overheating { .. } => "overheating",
            HealthIssue::RunningHot { .. } => "running_hot",
            HealthIssue::DroppedFrames { .. } => "dropped_frames",
            HealthIssue::LinkErrors { .. } => "link_errors",
            HealthIssue::BandwidthAnomaly { .. } => "bandwidth_anomaly",
            HealthIssue::ReplicatorFailed => "replicator_failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub issues: Vec<HealthIssue>,
    pub warnings: Vec<HealthIssue>,
}

impl HealthThresholds {
    /// Evaluate one snapshot. Parameters the device did not report are
    /// skipped rather than flagged.
    pub fn evaluate(&self, snapshot: &DeviceSnapshot) -> HealthReport {
        let mut issues = Vec::new();
        let mut warnings = Vec::new();

        if let Some(temperature_c) = snapshot.temperature_c {
            if temperature_c > self.temperature_critical_c {
                issues.push(HealthIssue::Overheating { temperature_c });
            } else if temperature_c > self.temperature_warning_c {
                warnings.push(HealthIssue::RunningHot { temperature_c });
            }
        }

        if let Some(count) = snapshot.dropped_frames {
            if count > self.max_dropped_frames {
                issues.push(HealthIssue::DroppedFrames { count });
            }
        }

        if let Some(count) = snapshot.link_errors {
            if count > self.max_link_errors {
                issues.push(HealthIssue::LinkErrors { count });
            }
        }

        if let Some(kbps) = snapshot.network_bandwidth_kbps {
            if kbps < self.min_bandwidth_kbps {
                issues.push(HealthIssue::BandwidthAnomaly { kbps });
            }
        }

        if snapshot.stream_state == crate::domain::replicator::ReplicatorState::Failed
            || snapshot.record_state == crate::domain::replicator::ReplicatorState::Failed
        {
            issues.push(HealthIssue::ReplicatorFailed);
        }

        HealthReport {
            healthy: issues.is_empty(),
            issues,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::replicator::ReplicatorState;

    fn snapshot() -> DeviceSnapshot {
        DeviceSnapshot::new(ReplicatorState::Active, ReplicatorState::Idle)
    }

    #[test]
    fn test_empty_snapshot_is_healthy() {
        let report = HealthThresholds::default().evaluate(&snapshot());
        assert!(report.healthy);
        assert!(report.issues.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_critical_temperature_is_an_issue() {
        let mut snap = snapshot();
        snap.temperature_c = Some(83.5);
        let report = HealthThresholds::default().evaluate(&snap);
        assert!(!report.healthy);
        assert_eq!(
            report.issues,
            vec![HealthIssue::Overheating { temperature_c: 83.5 }]
        );
    }

    #[test]
    fn test_warm_temperature_is_only_a_warning() {
        let mut snap = snapshot();
        snap.temperature_c = Some(77.0);
        let report = HealthThresholds::default().evaluate(&snap);
        assert!(report.healthy);
        assert_eq!(
            report.warnings,
            vec![HealthIssue::RunningHot { temperature_c: 77.0 }]
        );
    }

    #[test]
    fn test_threshold_boundaries_are_exclusive() {
        let mut snap = snapshot();
        snap.temperature_c = Some(80.0);
        snap.dropped_frames = Some(10);
        snap.link_errors = Some(10);
        snap.network_bandwidth_kbps = Some(100);
        let report = HealthThresholds::default().evaluate(&snap);
        // 80.0 is not above critical, 10 is not above the counters,
        // 100 kbps is not below the floor
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_multiple_issues_accumulate() {
        let mut snap = snapshot();
        snap.dropped_frames = Some(42);
        snap.link_errors = Some(17);
        snap.network_bandwidth_kbps = Some(12);
        let report = HealthThresholds::default().evaluate(&snap);
        assert!(!report.healthy);
        assert_eq!(report.issues.len(), 3);
    }

    #[test]
    fn test_failed_replicator_flags_issue() {
        let snap = DeviceSnapshot::new(ReplicatorState::Failed, ReplicatorState::Idle);
        let report = HealthThresholds::default().evaluate(&snap);
        assert!(report.issues.contains(&HealthIssue::ReplicatorFailed));
    }
}
