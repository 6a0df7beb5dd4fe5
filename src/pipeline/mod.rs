//! Session orchestrator: the pipeline entry point.
//!
//! Extract -> EnrichLocation -> EnrichNetwork -> Score -> Persist, strictly
//! in order. Enrichment failures are substituted with their documented
//! defaults so a risk assessment is always produced; only persistence of
//! the final record is fatal for a session.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::enrichment::{
    derive_login, GeocodingProvider, LocationBehavior, LocationEnricher, LoginBehavior,
    NetworkBehavior, NetworkEnricher,
};
use crate::error::PipelineError;
use crate::features::{summarize_touch, summarize_typing, TouchGestureSummary, TypingSummary};
use crate::profile::repository::ProfileRepository;
use crate::profile::store::{DocumentStore, SESSIONS_COLLECTION};
use crate::scoring::{RiskScoreResult, RiskScorer};
use crate::telemetry::{self, DeviceSignal, SessionTelemetry};

// The full calculated record persisted per session, append-only
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalculatedSession {
    pub record_id: String,
    pub session_id: String,
    pub user_id: Option<String>,
    pub timestamp_ms: i64,
    pub touch_summary: TouchGestureSummary,
    pub typing_summary: TypingSummary,
    pub location_behavior: LocationBehavior,
    pub network_behavior: NetworkBehavior,
    pub login_behavior: LoginBehavior,
    pub device: Option<DeviceSignal>,
    pub risk: RiskScoreResult,
    pub processed_at: DateTime<Utc>,
}

pub struct SessionOrchestrator {
    location_enricher: LocationEnricher,
    network_enricher: NetworkEnricher,
    profiles: Arc<ProfileRepository>,
    store: Arc<dyn DocumentStore>,
    scorer: RiskScorer,
}

impl SessionOrchestrator {
    /// Collaborators are injected explicitly; nothing is reached through
    /// ambient state.
    pub fn new(
        geocoder: Arc<dyn GeocodingProvider>,
        store: Arc<dyn DocumentStore>,
        settings: &Settings,
    ) -> Self {
        let profiles = Arc::new(ProfileRepository::new(
            store.clone(),
            settings.profile.max_cas_retries,
            settings.profile.backoff_base(),
        ));

        SessionOrchestrator {
            location_enricher: LocationEnricher::new(
                geocoder,
                profiles.clone(),
                settings.geocoding.timeout(),
            ),
            network_enricher: NetworkEnricher::new(profiles.clone()),
            profiles,
            store,
            scorer: RiskScorer::new(),
        }
    }

    /// Process one session's telemetry end to end.
    ///
    /// Returns the persisted record, or `PipelineError::Persistence` when
    /// the final write fails (the caller retries the whole submission; no
    /// partial record is ever written).
    pub async fn process_session(
        &self,
        session: SessionTelemetry,
    ) -> Result<CalculatedSession, PipelineError> {
        let started = Instant::now();
        let user_id = session.user_id.as_deref();

        for issue in telemetry::validate(&session) {
            warn!("telemetry issue in session {}: {}", session.session_id, issue);
        }

        // Feature extraction is pure and never fails
        let touch_summary = summarize_touch(&session.touch_gestures, &session.session_id);
        let input_type = session
            .login
            .as_ref()
            .map(|l| l.method.as_str())
            .unwrap_or("free_text");
        let typing_summary = summarize_typing(&session.keystrokes, input_type);

        // Enrichment degrades to defaults rather than aborting
        let location_behavior = match &session.location {
            Some(signal) => match self.location_enricher.enrich(signal, user_id).await {
                Ok(behavior) => behavior,
                Err(e) => {
                    warn!(
                        "location enrichment failed for session {}, using defaults: {}",
                        session.session_id, e
                    );
                    metrics::counter!("enrichment_fallbacks_total", 1);
                    LocationBehavior::unknown()
                }
            },
            None => LocationBehavior::unknown(),
        };

        let network_behavior = match &session.network {
            Some(signal) => match self.network_enricher.enrich(signal, user_id).await {
                Ok(behavior) => behavior,
                Err(e) => {
                    warn!(
                        "network enrichment failed for session {}, using defaults: {}",
                        session.session_id, e
                    );
                    metrics::counter!("enrichment_fallbacks_total", 1);
                    NetworkBehavior::unknown()
                }
            },
            None => NetworkBehavior::unknown(),
        };

        let login_behavior = match user_id {
            Some(user) => match self.profiles.get_or_create(user).await {
                Ok(profile) => {
                    derive_login(session.login.as_ref(), Some(&profile), session.timestamp_ms)
                }
                Err(e) => {
                    warn!(
                        "profile read failed for session {}, using login defaults: {}",
                        session.session_id, e
                    );
                    derive_login(session.login.as_ref(), None, session.timestamp_ms)
                }
            },
            None => derive_login(session.login.as_ref(), None, session.timestamp_ms),
        };

        let risk = self.scorer.score(
            &session.session_id,
            session.timestamp_ms,
            &touch_summary,
            &typing_summary,
            &location_behavior,
            &network_behavior,
            &login_behavior,
        );

        let record = CalculatedSession {
            record_id: crate::utils::generate_id("calc"),
            session_id: session.session_id.clone(),
            user_id: session.user_id.clone(),
            timestamp_ms: session.timestamp_ms,
            touch_summary,
            typing_summary,
            location_behavior,
            network_behavior,
            login_behavior,
            device: session.device.clone(),
            risk,
            processed_at: Utc::now(),
        };

        // Only the final, complete record is ever written
        self.persist(&record).await?;

        // Fold the session into the profile baselines, best-effort
        if let Some(user) = user_id {
            let touch = record.touch_summary.clone();
            let typing = record.typing_summary.clone();
            let login_hour = session.login.as_ref().map(|_| record.login_behavior.login_hour);
            let score = record.risk.total_score;
            if let Err(e) = self
                .profiles
                .mutate(user, move |profile| {
                    profile.observe_session(&touch, &typing, login_hour, score);
                })
                .await
            {
                warn!(
                    "dropping baseline update for user {} after session {}: {}",
                    user, record.session_id, e
                );
                metrics::counter!("profile_updates_dropped_total", 1);
            }
        }

        let elapsed = started.elapsed();
        metrics::counter!("sessions_processed_total", 1);
        metrics::histogram!("session_processing_duration_seconds", elapsed.as_secs_f64());
        info!(
            "session {} scored {:.2} ({} factors) in {:?}",
            record.session_id,
            record.risk.total_score,
            record.risk.breakdown.len(),
            elapsed
        );

        Ok(record)
    }

    async fn persist(&self, record: &CalculatedSession) -> Result<(), PipelineError> {
        let body = serde_json::to_value(record).map_err(|e| PipelineError::Persistence {
            session_id: record.session_id.clone(),
            source: e.into(),
        })?;

        self.store
            .insert_new(SESSIONS_COLLECTION, &record.session_id, body)
            .await
            .map_err(|e| PipelineError::Persistence {
                session_id: record.session_id.clone(),
                source: e,
            })
    }
}
