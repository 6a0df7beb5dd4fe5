use serde::{Deserialize, Serialize};

use crate::telemetry::TouchGesture;
use crate::utils::stats::{mean, std_dev};

/// Consecutive-gesture gap above which the user is considered hesitating (ms)
const HESITATION_GAP_MS: i64 = 1000;
/// Consecutive-gesture gap below which touches count as rapid (ms)
const RAPID_TOUCH_GAP_MS: i64 = 100;

// Aggregated touch statistics for one session
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TouchGestureSummary {
    pub session_id: String,
    pub gesture_count: usize,
    pub avg_pressure: f64,
    pub pressure_std_dev: f64,
    pub avg_touch_area: f64,
    pub touch_area_std_dev: f64,
    pub avg_gesture_duration: f64,
    pub gesture_duration_std_dev: f64,
    // Swipe/scroll gestures only
    pub avg_velocity: f64,
    pub velocity_std_dev: f64,
    pub swipe_accuracy: f64,
    pub hesitation_count: usize,
    pub rapid_touch_count: usize,
    pub session_duration_ms: i64,
}

/// Summarize a session's touch gestures.
///
/// Malformed records (non-positive pressure, area or duration, non-finite
/// values) are dropped from the corresponding averages instead of failing
/// the extraction. Empty input yields the all-zero summary.
pub fn summarize_touch(gestures: &[TouchGesture], session_id: &str) -> TouchGestureSummary {
    let mut summary = TouchGestureSummary {
        session_id: session_id.to_string(),
        ..TouchGestureSummary::default()
    };

    if gestures.is_empty() {
        return summary;
    }
    summary.gesture_count = gestures.len();

    // Defensive filters against malformed collector records
    let pressures: Vec<f64> = gestures
        .iter()
        .map(|g| g.pressure)
        .filter(|p| p.is_finite() && *p > 0.0)
        .collect();
    let areas: Vec<f64> = gestures
        .iter()
        .map(|g| g.touch_area)
        .filter(|a| a.is_finite() && *a > 0.0)
        .collect();
    let durations: Vec<f64> = gestures
        .iter()
        .map(|g| g.duration_ms)
        .filter(|d| d.is_finite() && *d > 0.0)
        .collect();

    summary.avg_pressure = mean(&pressures);
    summary.pressure_std_dev = std_dev(&pressures);
    summary.avg_touch_area = mean(&areas);
    summary.touch_area_std_dev = std_dev(&areas);
    summary.avg_gesture_duration = mean(&durations);
    summary.gesture_duration_std_dev = std_dev(&durations);

    // Velocity and accuracy only make sense for moving gestures
    let moving: Vec<&TouchGesture> = gestures
        .iter()
        .filter(|g| g.gesture_type.is_moving())
        .collect();

    let velocities: Vec<f64> = moving
        .iter()
        .map(|g| g.velocity)
        .filter(|v| v.is_finite())
        .collect();
    summary.avg_velocity = mean(&velocities);
    summary.velocity_std_dev = std_dev(&velocities);

    // Swipe accuracy: how far the reported path deviates from the
    // straight line between start and end points
    let deviations: Vec<f64> = moving
        .iter()
        .filter(|g| g.distance.is_finite())
        .map(|g| {
            let expected =
                ((g.end_x - g.start_x).powi(2) + (g.end_y - g.start_y).powi(2)).sqrt();
            (expected - g.distance).abs()
        })
        .collect();
    summary.swipe_accuracy = mean(&deviations);

    // Gap analysis needs a deterministic timeline: stable sort keeps the
    // original order for equal timestamps
    let mut ordered: Vec<&TouchGesture> = gestures.iter().collect();
    ordered.sort_by_key(|g| g.timestamp_ms);

    for pair in ordered.windows(2) {
        let gap = pair[1].timestamp_ms - pair[0].timestamp_ms;
        if gap > HESITATION_GAP_MS {
            summary.hesitation_count += 1;
        } else if gap < RAPID_TOUCH_GAP_MS {
            summary.rapid_touch_count += 1;
        }
    }

    if ordered.len() >= 2 {
        summary.session_duration_ms =
            ordered[ordered.len() - 1].timestamp_ms - ordered[0].timestamp_ms;
    }

    summary
}
