//! Network enrichment: known-network membership keyed by the composite
//! `name_type` identifier. Structurally the location enricher without the
//! distance/velocity component.

use std::sync::Arc;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::EnrichmentError;
use crate::profile::repository::{FrequencyTable, ProfileRepository};
use crate::telemetry::NetworkSignal;

// Network signals derived for one session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkBehavior {
    pub network_key: String,
    pub network_type: String,
    pub is_known_network: bool,
}

impl NetworkBehavior {
    /// Documented fallback when enrichment fails entirely
    pub fn unknown() -> Self {
        NetworkBehavior {
            network_key: "unknown".to_string(),
            network_type: "unknown".to_string(),
            is_known_network: false,
        }
    }
}

pub struct NetworkEnricher {
    profiles: Arc<ProfileRepository>,
}

impl NetworkEnricher {
    pub fn new(profiles: Arc<ProfileRepository>) -> Self {
        NetworkEnricher { profiles }
    }

    /// Enrich one network signal and count its use in the profile.
    ///
    /// Same error discipline as the location enricher: profile read
    /// failures propagate, the frequency write is best-effort.
    pub async fn enrich(
        &self,
        signal: &NetworkSignal,
        user_id: Option<&str>,
    ) -> Result<NetworkBehavior, EnrichmentError> {
        let network_key = signal.network_key();

        let is_known_network = match user_id {
            Some(user) => {
                let profile = self.profiles.get_or_create(user).await?;
                profile.knows_network(&network_key)
            }
            None => false,
        };

        if let Some(user) = user_id {
            if let Err(e) = self
                .profiles
                .increment_frequency(
                    user,
                    FrequencyTable::Networks,
                    &network_key,
                    crate::utils::now_ms(),
                )
                .await
            {
                warn!(
                    "dropping network frequency update for user {}: {}",
                    user, e
                );
                metrics::counter!("profile_updates_dropped_total", 1);
            }
        }

        Ok(NetworkBehavior {
            network_key,
            network_type: signal.network_type.clone(),
            is_known_network,
        })
    }
}
