//! Stream settings validation.
//!
//! Run before any configure-and-start sequence. All validators run; a report
//! collects every finding instead of stopping at the first.

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const LEGAL_RESOLUTIONS: [&str; 4] = ["1920x1080", "1280x720", "854x480", "640x360"];
pub const LEGAL_FRAME_RATES: [f64; 7] = [24.0, 25.0, 29.97, 30.0, 50.0, 59.94, 60.0];
pub const MIN_BITRATE_BPS: u64 = 1_000_000;
pub const MAX_BITRATE_BPS: u64 = 20_000_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSettings {
    /// `WIDTHxHEIGHT`, e.g. `1920x1080`.
    pub resolution: String,
    pub fps: f64,
    pub bitrate_bps: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    MalformedResolution { given: String },
    UnsupportedResolution { given: String },
    NonStandardFrameRate { given: f64, closest: f64 },
    BitrateOutOfRange { given: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl StreamSettings {
    pub fn validate(&self) -> ValidationReport {
        let mut issues = Vec::new();
        let mut warnings = Vec::new();

        // Pattern is static, construction cannot fail
        let shape = Regex::new(r"^\d{3,4}x\d{3,4}$").unwrap();
        if !shape.is_match(&self.resolution) {
            issues.push(ValidationIssue::MalformedResolution {
                given: self.resolution.clone(),
            });
        } else if !LEGAL_RESOLUTIONS.contains(&self.resolution.as_str()) {
            issues.push(ValidationIssue::UnsupportedResolution {
                given: self.resolution.clone(),
            });
        }

        if !LEGAL_FRAME_RATES.iter().any(|&r| (r - self.fps).abs() < 1e-6) {
            // Off-spec rates work on the device, so this is only a warning
            let closest = LEGAL_FRAME_RATES
                .iter()
                .copied()
                .min_by(|a, b| {
                    (a - self.fps)
                        .abs()
                        .partial_cmp(&(b - self.fps).abs())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .unwrap_or(30.0);
            warnings.push(ValidationIssue::NonStandardFrameRate {
                given: self.fps,
                closest,
            });
        }

        if !(MIN_BITRATE_BPS..=MAX_BITRATE_BPS).contains(&self.bitrate_bps) {
            issues.push(ValidationIssue::BitrateOutOfRange {
                given: self.bitrate_bps,
            });
        }

        ValidationReport {
            valid: issues.is_empty(),
            issues,
            warnings,
        }
    }
}

/// Rule-of-thumb rate: pixels x fps x 0.1 bits per pixel, clamped to the
/// encoder's legal range.
pub fn recommended_bitrate(resolution: &str, fps: f64) -> Option<u64> {
    let (width, height) = resolution.split_once('x')?;
    let width: u64 = width.parse().ok()?;
    let height: u64 = height.parse().ok()?;
    let raw = (width as f64 * height as f64 * fps * 0.1) as u64;
    Some(raw.clamp(MIN_BITRATE_BPS, MAX_BITRATE_BPS))
}
