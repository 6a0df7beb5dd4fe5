use serde::{Deserialize, Serialize};

use crate::telemetry::Keystroke;
use crate::utils::stats::{mean, std_dev};

/// Consecutive-keystroke gap above which the pause counts as long (ms)
const LONG_PAUSE_GAP_MS: i64 = 2000;

// Aggregated keystroke statistics for one session
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TypingSummary {
    pub input_type: String,
    pub keystroke_count: usize,
    pub avg_dwell_time: f64,
    pub dwell_time_std_dev: f64,
    pub avg_flight_time: f64,
    pub flight_time_std_dev: f64,
    // Keystrokes per minute over the observed span
    pub typing_speed: f64,
    // Fraction of keystrokes that are corrections
    pub error_rate: f64,
    pub long_pause_count: usize,
}

fn is_correction(character: &str) -> bool {
    matches!(character, "\u{8}" | "\u{7f}")
        || character.eq_ignore_ascii_case("backspace")
        || character.eq_ignore_ascii_case("delete")
        || character.eq_ignore_ascii_case("del")
}

/// Summarize a session's keystrokes for one input context.
///
/// Mirrors `summarize_touch`: total, defensive against malformed records,
/// all-zero summary on empty input.
pub fn summarize_typing(keystrokes: &[Keystroke], input_type: &str) -> TypingSummary {
    let mut summary = TypingSummary {
        input_type: input_type.to_string(),
        ..TypingSummary::default()
    };

    if keystrokes.is_empty() {
        return summary;
    }
    summary.keystroke_count = keystrokes.len();

    let dwell_times: Vec<f64> = keystrokes
        .iter()
        .map(|k| k.dwell_time_ms)
        .filter(|d| d.is_finite() && *d > 0.0)
        .collect();
    let flight_times: Vec<f64> = keystrokes
        .iter()
        .map(|k| k.flight_time_ms)
        .filter(|f| f.is_finite() && *f > 0.0)
        .collect();

    summary.avg_dwell_time = mean(&dwell_times);
    summary.dwell_time_std_dev = std_dev(&dwell_times);
    summary.avg_flight_time = mean(&flight_times);
    summary.flight_time_std_dev = std_dev(&flight_times);

    let corrections = keystrokes
        .iter()
        .filter(|k| is_correction(&k.character))
        .count();
    summary.error_rate = corrections as f64 / keystrokes.len() as f64;

    let mut timestamps: Vec<i64> = keystrokes.iter().map(|k| k.timestamp_ms).collect();
    timestamps.sort();

    for pair in timestamps.windows(2) {
        if pair[1] - pair[0] > LONG_PAUSE_GAP_MS {
            summary.long_pause_count += 1;
        }
    }

    let span_ms = timestamps[timestamps.len() - 1] - timestamps[0];
    if span_ms > 0 {
        summary.typing_speed = keystrokes.len() as f64 / (span_ms as f64 / 60_000.0);
    }

    summary
}
