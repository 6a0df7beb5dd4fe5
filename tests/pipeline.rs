//! End-to-end pipeline tests with stubbed collaborators.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use risk_engine::config::Settings;
use risk_engine::enrichment::{GeocodedPlace, GeocodingProvider};
use risk_engine::error::{EnrichmentError, PipelineError, StoreError};
use risk_engine::pipeline::SessionOrchestrator;
use risk_engine::profile::store::{
    DocumentStore, InMemoryDocumentStore, PROFILES_COLLECTION, SESSIONS_COLLECTION,
};
use risk_engine::profile::UserBehavioralProfile;
use risk_engine::telemetry::{
    GestureType, Keystroke, LocationSignal, LoginContext, NetworkSignal, SessionTelemetry,
    TouchGesture,
};

struct StubGeocoder {
    place: Option<GeocodedPlace>,
}

#[async_trait]
impl GeocodingProvider for StubGeocoder {
    async fn reverse_geocode(
        &self,
        _latitude: f64,
        _longitude: f64,
    ) -> Result<GeocodedPlace, EnrichmentError> {
        match &self.place {
            Some(place) => Ok(place.clone()),
            None => Err(EnrichmentError::Geocoding("stubbed outage".to_string())),
        }
    }
}

/// Store whose session-record writes always fail, to exercise the fatal path
struct FailingSessionStore {
    inner: InMemoryDocumentStore,
}

#[async_trait]
impl DocumentStore for FailingSessionStore {
    async fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<risk_engine::profile::store::VersionedDocument>, StoreError> {
        self.inner.get(collection, key).await
    }

    async fn insert_new(
        &self,
        collection: &str,
        key: &str,
        body: Value,
    ) -> Result<(), StoreError> {
        if collection == SESSIONS_COLLECTION {
            return Err(StoreError::Backend("session store unavailable".to_string()));
        }
        self.inner.insert_new(collection, key, body).await
    }

    async fn put_versioned(
        &self,
        collection: &str,
        key: &str,
        body: Value,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        self.inner
            .put_versioned(collection, key, body, expected_version)
            .await
    }
}

fn orchestrator_with(
    place: Option<GeocodedPlace>,
    store: Arc<dyn DocumentStore>,
) -> SessionOrchestrator {
    SessionOrchestrator::new(
        Arc::new(StubGeocoder { place }),
        store,
        &Settings::default(),
    )
}

fn paris() -> GeocodedPlace {
    GeocodedPlace {
        city: "Paris".to_string(),
        country: "France".to_string(),
    }
}

fn tap(timestamp_ms: i64) -> TouchGesture {
    TouchGesture {
        gesture_type: GestureType::Tap,
        pressure: 0.5,
        touch_area: 42.0,
        duration_ms: 18.0,
        velocity: 0.0,
        start_x: 10.0,
        start_y: 10.0,
        end_x: 10.0,
        end_y: 10.0,
        distance: 0.0,
        timestamp_ms,
    }
}

fn full_session(session_id: &str, user_id: &str) -> SessionTelemetry {
    SessionTelemetry {
        session_id: session_id.to_string(),
        user_id: Some(user_id.to_string()),
        timestamp_ms: 1_700_000_000_000,
        touch_gestures: vec![tap(0), tap(60), tap(200)],
        keystrokes: vec![
            Keystroke {
                character: "a".to_string(),
                dwell_time_ms: 70.0,
                flight_time_ms: 120.0,
                pressure: 0.4,
                timestamp_ms: 0,
            },
            Keystroke {
                character: "b".to_string(),
                dwell_time_ms: 65.0,
                flight_time_ms: 140.0,
                pressure: 0.5,
                timestamp_ms: 300,
            },
        ],
        login: Some(LoginContext {
            method: "password".to_string(),
            failed_attempts: 0,
        }),
        location: Some(LocationSignal {
            latitude: 48.8566,
            longitude: 2.3522,
            accuracy: 12.0,
            altitude: Some(35.0),
            timestamp_ms: 1_700_000_000_000,
        }),
        network: Some(NetworkSignal {
            name: "HomeWifi".to_string(),
            network_type: "wifi".to_string(),
            signal_strength: Some(-48),
        }),
        device: None,
    }
}

async fn stored_profile(store: &dyn DocumentStore, user_id: &str) -> UserBehavioralProfile {
    let doc = store
        .get(PROFILES_COLLECTION, user_id)
        .await
        .unwrap()
        .expect("profile should exist");
    serde_json::from_value(doc.body).unwrap()
}

#[tokio::test]
async fn full_pipeline_persists_record_and_updates_profile() {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let orchestrator = orchestrator_with(Some(paris()), store.clone());

    let record = orchestrator
        .process_session(full_session("s-1", "u-1"))
        .await
        .unwrap();

    assert_eq!(record.session_id, "s-1");
    assert_eq!(record.location_behavior.city, "Paris");
    assert_eq!(record.network_behavior.network_key, "HomeWifi_wifi");
    assert!(record.risk.total_score >= 0.0 && record.risk.total_score <= 1.0);

    // the calculated record is persisted under the session id
    let persisted = store.get(SESSIONS_COLLECTION, "s-1").await.unwrap();
    assert!(persisted.is_some());

    // the profile picked up the observation
    let profile = stored_profile(store.as_ref(), "u-1").await;
    assert_eq!(profile.frequent_locations["Paris"].count, 1);
    assert_eq!(profile.frequent_networks["HomeWifi_wifi"].count, 1);
    assert_eq!(profile.risk_baseline.session_count, 1);
    let last = profile.last_known_location.expect("last location recorded");
    assert_eq!(last.city, "Paris");
}

#[tokio::test]
async fn geocoder_outage_degrades_but_still_scores_and_persists() {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let orchestrator = orchestrator_with(None, store.clone());

    let record = orchestrator
        .process_session(full_session("s-1", "u-1"))
        .await
        .unwrap();

    assert_eq!(record.location_behavior.city, "Unknown");
    assert!(!record.risk.flags.is_vpn_detected);
    assert!(store.get(SESSIONS_COLLECTION, "s-1").await.unwrap().is_some());
}

#[tokio::test]
async fn persistence_failure_is_fatal_for_the_session() {
    let store: Arc<dyn DocumentStore> = Arc::new(FailingSessionStore {
        inner: InMemoryDocumentStore::new(),
    });
    let orchestrator = orchestrator_with(Some(paris()), store.clone());

    let result = orchestrator.process_session(full_session("s-1", "u-1")).await;
    match result {
        Err(PipelineError::Persistence { session_id, .. }) => assert_eq!(session_id, "s-1"),
        other => panic!("expected persistence error, got {:?}", other.map(|r| r.session_id)),
    }
}

#[tokio::test]
async fn resubmission_counts_frequencies_twice_but_record_is_append_only() {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let orchestrator = orchestrator_with(Some(paris()), store.clone());

    orchestrator
        .process_session(full_session("s-1", "u-1"))
        .await
        .unwrap();

    // the same payload again: frequency counters move, the record does not
    let second = orchestrator.process_session(full_session("s-1", "u-1")).await;
    assert!(matches!(second, Err(PipelineError::Persistence { .. })));

    let profile = stored_profile(store.as_ref(), "u-1").await;
    assert_eq!(profile.frequent_locations["Paris"].count, 2);
    assert_eq!(profile.frequent_networks["HomeWifi_wifi"].count, 2);
}

#[tokio::test]
async fn brand_new_user_gets_an_all_zero_profile() {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let orchestrator = orchestrator_with(Some(paris()), store.clone());

    let mut session = full_session("s-1", "u-new");
    session.location = None;
    session.network = None;
    session.login = None;
    session.touch_gestures.clear();
    session.keystrokes.clear();

    orchestrator.process_session(session).await.unwrap();

    let profile = stored_profile(store.as_ref(), "u-new").await;
    assert!(profile.frequent_locations.is_empty());
    assert!(profile.frequent_networks.is_empty());
    assert!(profile.last_known_location.is_none());
    assert_eq!(profile.touch_baseline.avg_pressure, 0.0);
    assert_eq!(profile.typing_baseline.avg_dwell_time, 0.0);
    assert_eq!(profile.login_baseline.login_count, 0);
    // the empty session still counted toward the risk baseline
    assert_eq!(profile.risk_baseline.session_count, 1);
}

#[tokio::test]
async fn anonymous_sessions_score_without_creating_profiles() {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let orchestrator = orchestrator_with(Some(paris()), store.clone());

    let mut session = full_session("s-anon", "ignored");
    session.user_id = None;

    let record = orchestrator.process_session(session).await.unwrap();
    assert_eq!(record.user_id, None);
    assert!(!record.location_behavior.is_known_location);
    assert!(store.get(SESSIONS_COLLECTION, "s-anon").await.unwrap().is_some());
    assert!(store
        .get(PROFILES_COLLECTION, "ignored")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn empty_telemetry_scores_zero_risk() {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let orchestrator = orchestrator_with(Some(paris()), store.clone());

    let session = SessionTelemetry {
        session_id: "s-empty".to_string(),
        user_id: None,
        timestamp_ms: 1_700_000_000_000,
        touch_gestures: Vec::new(),
        keystrokes: Vec::new(),
        login: None,
        location: None,
        network: None,
        device: None,
    };

    let record = orchestrator.process_session(session).await.unwrap();
    assert_eq!(record.risk.total_score, 0.0);
    assert!(record.risk.breakdown.is_empty());
    assert_eq!(record.touch_summary.gesture_count, 0);
    assert_eq!(record.typing_summary.keystroke_count, 0);
    assert_eq!(record.location_behavior.city, "Unknown");
}
