//! Long-lived per-user behavioral profile.
//!
//! The profile is the only mutable shared state in the engine. It is stored
//! as one versioned document per user so the frequency tables, the last
//! known location and the baselines always change together under a single
//! compare-and-swap write.

pub mod postgres;
pub mod repository;
pub mod store;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::features::{TouchGestureSummary, TypingSummary};

/// Frequency tables keep only the K highest-count entries
pub const MAX_FREQUENCY_ENTRIES: usize = 10;

// One counter in a top-K frequency table
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyEntry {
    pub count: u64,
    // Used to break count ties at the trim boundary: a just-visited
    // entry is never evicted by an older one with an equal count
    pub last_incremented_ms: i64,
}

// The single most recent location, overwritten on every session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LastKnownLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub city: String,
    pub country: String,
    pub timestamp_ms: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TouchBaseline {
    pub avg_pressure: f64,
    pub avg_touch_area: f64,
    pub avg_gesture_duration: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TypingBaseline {
    pub avg_dwell_time: f64,
    pub avg_flight_time: f64,
    pub avg_typing_speed: f64,
    pub avg_error_rate: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoginBaseline {
    pub login_count: u64,
    // Hour of day ("00".."23") -> observed login count
    pub hour_histogram: BTreeMap<String, u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskBaseline {
    pub session_count: u64,
    pub avg_risk_score: f64,
    pub max_risk_score: f64,
}

// Long-lived behavioral aggregate, keyed by user id
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserBehavioralProfile {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub frequent_locations: BTreeMap<String, FrequencyEntry>,
    pub frequent_networks: BTreeMap<String, FrequencyEntry>,
    pub last_known_location: Option<LastKnownLocation>,
    pub touch_baseline: TouchBaseline,
    pub typing_baseline: TypingBaseline,
    pub login_baseline: LoginBaseline,
    pub risk_baseline: RiskBaseline,
}

impl UserBehavioralProfile {
    // Lazily created on the first session for a user, all-zero defaults
    pub fn new_default(user_id: &str) -> Self {
        let now = Utc::now();
        UserBehavioralProfile {
            user_id: user_id.to_string(),
            created_at: now,
            last_updated: now,
            frequent_locations: BTreeMap::new(),
            frequent_networks: BTreeMap::new(),
            last_known_location: None,
            touch_baseline: TouchBaseline::default(),
            typing_baseline: TypingBaseline::default(),
            login_baseline: LoginBaseline::default(),
            risk_baseline: RiskBaseline::default(),
        }
    }

    /// A location is known when its city has been counted before
    pub fn knows_location(&self, city: &str) -> bool {
        self.frequent_locations
            .get(city)
            .map(|e| e.count > 0)
            .unwrap_or(false)
    }

    pub fn knows_network(&self, network_key: &str) -> bool {
        self.frequent_networks
            .get(network_key)
            .map(|e| e.count > 0)
            .unwrap_or(false)
    }

    /// Fold one session's summaries into the running baselines.
    ///
    /// Weighted running average, same 0.7/0.3 blend for every field.
    pub fn observe_session(
        &mut self,
        touch: &TouchGestureSummary,
        typing: &TypingSummary,
        login_hour: Option<u32>,
        risk_score: f64,
    ) {
        if touch.gesture_count > 0 {
            self.touch_baseline.avg_pressure =
                blend(self.touch_baseline.avg_pressure, touch.avg_pressure);
            self.touch_baseline.avg_touch_area =
                blend(self.touch_baseline.avg_touch_area, touch.avg_touch_area);
            self.touch_baseline.avg_gesture_duration = blend(
                self.touch_baseline.avg_gesture_duration,
                touch.avg_gesture_duration,
            );
        }

        if typing.keystroke_count > 0 {
            self.typing_baseline.avg_dwell_time =
                blend(self.typing_baseline.avg_dwell_time, typing.avg_dwell_time);
            self.typing_baseline.avg_flight_time =
                blend(self.typing_baseline.avg_flight_time, typing.avg_flight_time);
            self.typing_baseline.avg_typing_speed =
                blend(self.typing_baseline.avg_typing_speed, typing.typing_speed);
            self.typing_baseline.avg_error_rate =
                blend(self.typing_baseline.avg_error_rate, typing.error_rate);
        }

        if let Some(hour) = login_hour {
            self.login_baseline.login_count += 1;
            *self
                .login_baseline
                .hour_histogram
                .entry(format!("{:02}", hour))
                .or_insert(0) += 1;
        }

        self.risk_baseline.session_count += 1;
        self.risk_baseline.avg_risk_score =
            blend(self.risk_baseline.avg_risk_score, risk_score);
        if risk_score > self.risk_baseline.max_risk_score {
            self.risk_baseline.max_risk_score = risk_score;
        }
    }
}

fn blend(old: f64, new: f64) -> f64 {
    old * 0.7 + new * 0.3
}

/// Increment `key` in a frequency table and trim it back to the top
/// `MAX_FREQUENCY_ENTRIES` by count, most-recently-incremented wins ties.
pub fn increment_and_trim(
    table: &mut BTreeMap<String, FrequencyEntry>,
    key: &str,
    observed_at_ms: i64,
) {
    let entry = table.entry(key.to_string()).or_default();
    entry.count += 1;
    entry.last_incremented_ms = observed_at_ms;

    if table.len() <= MAX_FREQUENCY_ENTRIES {
        return;
    }

    let mut entries: Vec<(String, FrequencyEntry)> = std::mem::take(table).into_iter().collect();
    entries.sort_by(|a, b| {
        b.1.count
            .cmp(&a.1.count)
            .then(b.1.last_incremented_ms.cmp(&a.1.last_incremented_ms))
    });
    entries.truncate(MAX_FREQUENCY_ENTRIES);
    table.extend(entries);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_is_all_zero() {
        let profile = UserBehavioralProfile::new_default("u-1");
        assert!(profile.frequent_locations.is_empty());
        assert!(profile.frequent_networks.is_empty());
        assert!(profile.last_known_location.is_none());
        assert_eq!(profile.touch_baseline, TouchBaseline::default());
        assert_eq!(profile.typing_baseline, TypingBaseline::default());
        assert_eq!(profile.login_baseline.login_count, 0);
        assert_eq!(profile.risk_baseline.session_count, 0);
    }

    #[test]
    fn table_never_exceeds_ten_entries() {
        let mut table = BTreeMap::new();
        for i in 0..50 {
            increment_and_trim(&mut table, &format!("city-{}", i), i);
        }
        assert!(table.len() <= MAX_FREQUENCY_ENTRIES);
    }

    #[test]
    fn highest_count_entry_always_survives() {
        let mut table = BTreeMap::new();
        for _ in 0..20 {
            increment_and_trim(&mut table, "home", 0);
        }
        for i in 0..30 {
            increment_and_trim(&mut table, &format!("city-{}", i), 100 + i);
        }
        assert!(table.contains_key("home"));
        assert_eq!(table["home"].count, 20);
    }

    #[test]
    fn tie_at_boundary_evicts_the_older_entry() {
        let mut table = BTreeMap::new();
        // ten entries, all count 1, at increasing times
        for i in 0..10 {
            increment_and_trim(&mut table, &format!("city-{}", i), i);
        }
        // the eleventh ties on count but is newer than city-0
        increment_and_trim(&mut table, "fresh", 100);
        assert_eq!(table.len(), MAX_FREQUENCY_ENTRIES);
        assert!(table.contains_key("fresh"));
        assert!(!table.contains_key("city-0"));
    }

    #[test]
    fn knows_location_requires_positive_count() {
        let mut profile = UserBehavioralProfile::new_default("u-1");
        assert!(!profile.knows_location("Paris"));
        increment_and_trim(&mut profile.frequent_locations, "Paris", 1000);
        assert!(profile.knows_location("Paris"));
    }

    #[test]
    fn observe_session_updates_baselines_and_histogram() {
        let mut profile = UserBehavioralProfile::new_default("u-1");
        let touch = TouchGestureSummary {
            gesture_count: 3,
            avg_pressure: 1.0,
            ..TouchGestureSummary::default()
        };
        let typing = TypingSummary::default();

        profile.observe_session(&touch, &typing, Some(13), 0.5);
        assert!((profile.touch_baseline.avg_pressure - 0.3).abs() < 1e-12);
        assert_eq!(profile.login_baseline.login_count, 1);
        assert_eq!(profile.login_baseline.hour_histogram["13"], 1);
        assert_eq!(profile.risk_baseline.session_count, 1);
        assert_eq!(profile.risk_baseline.max_risk_score, 0.5);
        // empty typing summary leaves the typing baseline untouched
        assert_eq!(profile.typing_baseline, TypingBaseline::default());
    }
}
