//! Rule-based risk scoring.
//!
//! A deterministic weighted sum over fixed thresholds, not a trained
//! model. Every contributing factor is recorded in the breakdown under its
//! own name so the total is auditable.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enrichment::{LocationBehavior, LoginBehavior, NetworkBehavior};
use crate::features::{TouchGestureSummary, TypingSummary};
use crate::utils::timestamp_to_datetime;

/// Pressure std-dev above which touch input reads as inconsistent
const PRESSURE_STD_DEV_THRESHOLD: f64 = 0.5;
/// Gesture-duration std-dev (ms) above which timing reads as erratic
const DURATION_STD_DEV_THRESHOLD_MS: f64 = 100.0;
const HESITATION_COUNT_THRESHOLD: usize = 5;
const RAPID_TOUCH_COUNT_THRESHOLD: usize = 10;

const PRESSURE_WEIGHT: f64 = 0.2;
const TIMING_WEIGHT: f64 = 0.3;
const HESITATION_WEIGHT: f64 = 0.3;
const RAPID_TOUCH_WEIGHT: f64 = 0.2;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFlags {
    pub is_vpn_detected: bool,
    pub is_high_risk_country: bool,
    pub is_known_location: bool,
    pub is_known_network: bool,
}

// One immutable risk assessment per session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskScoreResult {
    pub session_id: String,
    pub total_score: f64, // 0.0 to 1.0
    pub breakdown: BTreeMap<String, f64>,
    pub flags: RiskFlags,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RiskScorer;

impl RiskScorer {
    pub fn new() -> Self {
        RiskScorer
    }

    /// Score one session. Pure and total: the same inputs always produce
    /// the same result, and the total never leaves [0, 1].
    #[allow(clippy::too_many_arguments)]
    pub fn score(
        &self,
        session_id: &str,
        timestamp_ms: i64,
        touch: &TouchGestureSummary,
        _typing: &TypingSummary,
        location: &LocationBehavior,
        network: &NetworkBehavior,
        _login: &LoginBehavior,
    ) -> RiskScoreResult {
        let mut breakdown = BTreeMap::new();
        let mut total: f64 = 0.0;

        if touch.pressure_std_dev > PRESSURE_STD_DEV_THRESHOLD {
            breakdown.insert("pressure_inconsistency".to_string(), PRESSURE_WEIGHT);
            total += PRESSURE_WEIGHT;
        }
        if touch.gesture_duration_std_dev > DURATION_STD_DEV_THRESHOLD_MS {
            breakdown.insert("timing_variation".to_string(), TIMING_WEIGHT);
            total += TIMING_WEIGHT;
        }
        if touch.hesitation_count > HESITATION_COUNT_THRESHOLD {
            breakdown.insert("hesitation".to_string(), HESITATION_WEIGHT);
            total += HESITATION_WEIGHT;
        }
        if touch.rapid_touch_count > RAPID_TOUCH_COUNT_THRESHOLD {
            breakdown.insert("rapid_touch".to_string(), RAPID_TOUCH_WEIGHT);
            total += RAPID_TOUCH_WEIGHT;
        }

        RiskScoreResult {
            session_id: session_id.to_string(),
            total_score: total.min(1.0),
            breakdown,
            flags: RiskFlags {
                is_vpn_detected: location.is_vpn_detected,
                is_high_risk_country: location.is_high_risk_country,
                is_known_location: location.is_known_location,
                is_known_network: network.is_known_network,
            },
            timestamp: timestamp_to_datetime(timestamp_ms),
        }
    }
}
