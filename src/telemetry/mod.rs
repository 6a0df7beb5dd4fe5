//! Session telemetry input model.
//!
//! One `SessionTelemetry` record is produced per user interaction session by
//! the mobile collector and consumed exactly once by the pipeline. The schema
//! is optional-safe: absent event arrays deserialize as empty lists, absent
//! signals as `None`, never as errors.

use serde::{Deserialize, Serialize};
use std::fmt;

// Raw telemetry for one session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionTelemetry {
    pub session_id: String,
    // Absent for anonymous sessions
    #[serde(default)]
    pub user_id: Option<String>,
    pub timestamp_ms: i64,
    #[serde(default)]
    pub touch_gestures: Vec<TouchGesture>,
    #[serde(default)]
    pub keystrokes: Vec<Keystroke>,
    #[serde(default)]
    pub login: Option<LoginContext>,
    #[serde(default)]
    pub location: Option<LocationSignal>,
    #[serde(default)]
    pub network: Option<NetworkSignal>,
    #[serde(default)]
    pub device: Option<DeviceSignal>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureType {
    Tap,
    Swipe,
    Scroll,
    LongPress,
    Pinch,
    #[serde(other)]
    Other,
}

impl GestureType {
    /// Velocity and accuracy statistics are only meaningful for moving gestures
    pub fn is_moving(self) -> bool {
        matches!(self, GestureType::Swipe | GestureType::Scroll)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TouchGesture {
    pub gesture_type: GestureType,
    pub pressure: f64,   // 0.0 to 1.0
    pub touch_area: f64, // px^2
    pub duration_ms: f64,
    pub velocity: f64, // px/s, swipe/scroll only
    pub start_x: f64,
    pub start_y: f64,
    pub end_x: f64,
    pub end_y: f64,
    pub distance: f64, // reported traveled distance in px
    pub timestamp_ms: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Keystroke {
    pub character: String,
    pub dwell_time_ms: f64,  // key held down
    pub flight_time_ms: f64, // since previous key
    pub pressure: f64,
    pub timestamp_ms: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoginContext {
    pub method: String, // "password", "biometric", "pin", ...
    #[serde(default)]
    pub failed_attempts: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocationSignal {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64, // reported accuracy radius in meters
    #[serde(default)]
    pub altitude: Option<f64>,
    pub timestamp_ms: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkSignal {
    pub name: String,         // SSID or carrier name
    pub network_type: String, // "wifi", "cellular", ...
    #[serde(default)]
    pub signal_strength: Option<i32>,
}

impl NetworkSignal {
    /// Composite identifier used as the frequency-table key
    pub fn network_key(&self) -> String {
        format!("{}_{}", self.name, self.network_type)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceSignal {
    pub device_id: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub os_version: Option<String>,
    #[serde(default)]
    pub is_rooted: bool,
}

/// A non-fatal problem found while inspecting incoming telemetry.
///
/// Issues are logged by the orchestrator; malformed records are skipped by
/// the defensive filters in the feature extractors rather than rejected.
#[derive(Clone, Debug)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

// Sanity checks on incoming telemetry
pub fn validate(telemetry: &SessionTelemetry) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if telemetry.session_id.is_empty() {
        issues.push(ValidationIssue {
            field: "session_id".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    if let Some(location) = &telemetry.location {
        if !(-90.0..=90.0).contains(&location.latitude) {
            issues.push(ValidationIssue {
                field: "location.latitude".to_string(),
                message: format!("{} outside [-90, 90]", location.latitude),
            });
        }
        if !(-180.0..=180.0).contains(&location.longitude) {
            issues.push(ValidationIssue {
                field: "location.longitude".to_string(),
                message: format!("{} outside [-180, 180]", location.longitude),
            });
        }
        if !location.accuracy.is_finite() {
            issues.push(ValidationIssue {
                field: "location.accuracy".to_string(),
                message: "must be finite".to_string(),
            });
        }
    }

    for (i, gesture) in telemetry.touch_gestures.iter().enumerate() {
        let finite = gesture.pressure.is_finite()
            && gesture.touch_area.is_finite()
            && gesture.duration_ms.is_finite()
            && gesture.velocity.is_finite()
            && gesture.distance.is_finite();
        if !finite {
            issues.push(ValidationIssue {
                field: format!("touch_gestures[{}]", i),
                message: "contains non-finite values".to_string(),
            });
        }
    }

    for (i, keystroke) in telemetry.keystrokes.iter().enumerate() {
        if !keystroke.dwell_time_ms.is_finite() || !keystroke.flight_time_ms.is_finite() {
            issues.push(ValidationIssue {
                field: format!("keystrokes[{}]", i),
                message: "contains non-finite timing".to_string(),
            });
        }
    }

    issues
}
