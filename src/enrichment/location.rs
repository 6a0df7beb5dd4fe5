//! Location enrichment: reverse geocoding, travel-velocity anomaly
//! detection and profile-backed known-location checks.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use lazy_static::lazy_static;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::enrichment::geocoding::{GeocodedPlace, GeocodingProvider, UNKNOWN_PLACE};
use crate::error::EnrichmentError;
use crate::profile::repository::ProfileRepository;
use crate::profile::{LastKnownLocation, UserBehavioralProfile};
use crate::telemetry::LocationSignal;
use crate::utils::stats::{haversine_km, velocity_kmh};

/// Velocity beyond which travel between two logins is physically impossible
const IMPOSSIBLE_TRAVEL_KMH: f64 = 1000.0;
/// Velocity that is possible by plane but unusual between app sessions
const FAST_TRAVEL_KMH: f64 = 500.0;
/// Reported GPS accuracy under 1 m is better than phone hardware delivers
const SUSPICIOUS_PRECISION_M: f64 = 1.0;
/// Reported accuracy above 1 km carries almost no location information
const VAGUE_ACCURACY_M: f64 = 1000.0;
/// Altitude beyond commercial flight ceilings
const EXTREME_ALTITUDE_M: f64 = 10000.0;

const VPN_CONFIDENCE_DETECTED: f64 = 0.8;
const VPN_CONFIDENCE_CLEAR: f64 = 0.1;

lazy_static! {
    static ref HIGH_RISK_COUNTRIES: HashSet<&'static str> = {
        let mut set = HashSet::new();
        set.insert("north korea");
        set.insert("iran");
        set.insert("syria");
        set.insert("sudan");
        set.insert("cuba");
        set.insert("myanmar");
        set.insert("afghanistan");
        set
    };
}

// Location signals derived for one session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationBehavior {
    pub city: String,
    pub country: String,
    pub distance_from_last_km: f64,
    pub travel_velocity_kmh: f64,
    pub location_spoofing_risk: f64, // 0.0 to 1.0
    pub is_vpn_detected: bool,
    pub vpn_confidence: f64,
    pub is_high_risk_country: bool,
    pub is_known_location: bool,
}

impl LocationBehavior {
    /// Documented fallback when enrichment fails entirely
    pub fn unknown() -> Self {
        LocationBehavior {
            city: UNKNOWN_PLACE.to_string(),
            country: UNKNOWN_PLACE.to_string(),
            distance_from_last_km: 0.0,
            travel_velocity_kmh: 0.0,
            location_spoofing_risk: 0.0,
            is_vpn_detected: false,
            vpn_confidence: VPN_CONFIDENCE_CLEAR,
            is_high_risk_country: false,
            is_known_location: false,
        }
    }
}

pub fn is_high_risk_country(country: &str) -> bool {
    HIGH_RISK_COUNTRIES.contains(country.to_lowercase().as_str())
}

pub struct LocationEnricher {
    geocoder: Arc<dyn GeocodingProvider>,
    profiles: Arc<ProfileRepository>,
    geocode_timeout: Duration,
}

impl LocationEnricher {
    pub fn new(
        geocoder: Arc<dyn GeocodingProvider>,
        profiles: Arc<ProfileRepository>,
        geocode_timeout: Duration,
    ) -> Self {
        LocationEnricher {
            geocoder,
            profiles,
            geocode_timeout,
        }
    }

    /// Enrich one location signal.
    ///
    /// The geocoding call degrades to "Unknown" on its own; a profile READ
    /// failure is returned as an error so the orchestrator can substitute
    /// the full default. The profile WRITE at the end is best-effort: an
    /// exhausted compare-and-swap retry drops the frequency update without
    /// failing the session.
    pub async fn enrich(
        &self,
        signal: &LocationSignal,
        user_id: Option<&str>,
    ) -> Result<LocationBehavior, EnrichmentError> {
        let place = self.geocode_or_unknown(signal).await;

        // Read-through profile access; anonymous sessions have no baseline
        let profile: Option<UserBehavioralProfile> = match user_id {
            Some(user) => Some(self.profiles.get_or_create(user).await?),
            None => None,
        };

        let mut distance_km = 0.0;
        let mut velocity = 0.0;
        if let Some(last) = profile.as_ref().and_then(|p| p.last_known_location.as_ref()) {
            distance_km = haversine_km(
                last.latitude,
                last.longitude,
                signal.latitude,
                signal.longitude,
            );
            velocity = velocity_kmh(distance_km, signal.timestamp_ms - last.timestamp_ms);
        }

        // Fixed spoofing penalties, summed and capped
        let mut spoofing_risk: f64 = 0.0;
        if velocity > IMPOSSIBLE_TRAVEL_KMH {
            spoofing_risk += 0.4;
        }
        if velocity > FAST_TRAVEL_KMH {
            spoofing_risk += 0.2;
        }
        if signal.accuracy < SUSPICIOUS_PRECISION_M {
            spoofing_risk += 0.2;
        }
        if signal.accuracy > VAGUE_ACCURACY_M {
            spoofing_risk += 0.1;
        }
        if let Some(altitude) = signal.altitude {
            if altitude.abs() > EXTREME_ALTITUDE_M {
                spoofing_risk += 0.1;
            }
        }
        spoofing_risk = spoofing_risk.min(1.0);

        // Impossible travel against the last known location is the VPN
        // proxy signal; there is no IP-level inspection here
        let is_vpn_detected = velocity > IMPOSSIBLE_TRAVEL_KMH;
        let vpn_confidence = if is_vpn_detected {
            VPN_CONFIDENCE_DETECTED
        } else {
            VPN_CONFIDENCE_CLEAR
        };

        let behavior = LocationBehavior {
            city: place.city.clone(),
            country: place.country.clone(),
            distance_from_last_km: distance_km,
            travel_velocity_kmh: velocity,
            location_spoofing_risk: spoofing_risk,
            is_vpn_detected,
            vpn_confidence,
            is_high_risk_country: is_high_risk_country(&place.country),
            is_known_location: profile
                .as_ref()
                .map(|p| p.knows_location(&place.city))
                .unwrap_or(false),
        };

        // Frequency table and last known location change in one write
        if let Some(user) = user_id {
            let last_known = LastKnownLocation {
                latitude: signal.latitude,
                longitude: signal.longitude,
                city: place.city.clone(),
                country: place.country,
                timestamp_ms: signal.timestamp_ms,
            };
            if let Err(e) = self
                .profiles
                .record_location_observation(user, &place.city, last_known)
                .await
            {
                warn!(
                    "dropping location frequency update for user {}: {}",
                    user, e
                );
                metrics::counter!("profile_updates_dropped_total", 1);
            }
        }

        Ok(behavior)
    }

    async fn geocode_or_unknown(&self, signal: &LocationSignal) -> GeocodedPlace {
        let lookup = self
            .geocoder
            .reverse_geocode(signal.latitude, signal.longitude);

        match tokio::time::timeout(self.geocode_timeout, lookup).await {
            Ok(Ok(place)) => place,
            Ok(Err(e)) => {
                warn!("reverse geocoding failed, using Unknown: {}", e);
                metrics::counter!("geocoding_failures_total", 1);
                GeocodedPlace::unknown()
            }
            Err(_) => {
                let e = EnrichmentError::Timeout(self.geocode_timeout);
                warn!("reverse geocoding failed, using Unknown: {}", e);
                metrics::counter!("geocoding_failures_total", 1);
                GeocodedPlace::unknown()
            }
        }
    }
}
