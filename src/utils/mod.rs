pub mod logging;
pub mod metrics;
pub mod stats;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

/// Generates a unique ID for persisted records
pub fn generate_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4())
}

/// Converts a timestamp in milliseconds to a DateTime<Utc>
pub fn timestamp_to_datetime(timestamp_ms: i64) -> DateTime<Utc> {
    match Utc.timestamp_millis_opt(timestamp_ms).single() {
        Some(dt) => dt,
        // Fallback to current time if timestamp is out of range
        None => Utc::now(),
    }
}

/// Current wall-clock time as epoch milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
