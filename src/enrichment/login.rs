//! Login-context enrichment against the profile's hour-of-day baseline.

use chrono::Timelike;
use serde::{Deserialize, Serialize};

use crate::profile::UserBehavioralProfile;
use crate::telemetry::LoginContext;
use crate::utils::timestamp_to_datetime;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoginBehavior {
    pub login_hour: u32,
    pub is_usual_hour: bool,
    pub failed_attempts: u32,
    pub method: String,
}

impl LoginBehavior {
    pub fn unknown() -> Self {
        LoginBehavior {
            login_hour: 0,
            is_usual_hour: false,
            failed_attempts: 0,
            method: "unknown".to_string(),
        }
    }
}

/// Pure derivation; the profile is the baseline read before this session
/// was folded in.
pub fn derive_login(
    login: Option<&LoginContext>,
    profile: Option<&UserBehavioralProfile>,
    timestamp_ms: i64,
) -> LoginBehavior {
    let context = match login {
        Some(context) => context,
        None => return LoginBehavior::unknown(),
    };

    let hour = timestamp_to_datetime(timestamp_ms).hour();
    let is_usual_hour = profile
        .map(|p| {
            p.login_baseline
                .hour_histogram
                .get(&format!("{:02}", hour))
                .map(|count| *count > 0)
                .unwrap_or(false)
        })
        .unwrap_or(false);

    LoginBehavior {
        login_hour: hour,
        is_usual_hour,
        failed_attempts: context.failed_attempts,
        method: context.method.clone(),
    }
}
