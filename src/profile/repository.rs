//! Read-modify-write access to user profiles under optimistic versioning.
//!
//! Every mutation follows the same discipline: load the versioned profile
//! document, apply the change in memory, compare-and-swap it back, and on a
//! version conflict retry the whole sequence with exponential backoff. No
//! external call is ever made inside the loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, warn};

use crate::error::StoreError;
use crate::profile::store::{DocumentStore, PROFILES_COLLECTION};
use crate::profile::{increment_and_trim, LastKnownLocation, UserBehavioralProfile};

/// Which top-K table a frequency increment targets
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrequencyTable {
    Locations,
    Networks,
}

impl FrequencyTable {
    pub fn name(self) -> &'static str {
        match self {
            FrequencyTable::Locations => "frequent_locations",
            FrequencyTable::Networks => "frequent_networks",
        }
    }
}

pub struct ProfileRepository {
    store: Arc<dyn DocumentStore>,
    max_retries: u32,
    backoff_base: Duration,
}

impl ProfileRepository {
    pub fn new(store: Arc<dyn DocumentStore>, max_retries: u32, backoff_base: Duration) -> Self {
        ProfileRepository {
            store,
            max_retries,
            backoff_base,
        }
    }

    /// Fetch a user's profile, creating the all-zero default on first call.
    ///
    /// Idempotent: a concurrent first-writer wins and the loser re-reads
    /// the stored document.
    pub async fn get_or_create(
        &self,
        user_id: &str,
    ) -> Result<UserBehavioralProfile, StoreError> {
        Ok(self.load_or_create(user_id).await?.0)
    }

    async fn load_or_create(
        &self,
        user_id: &str,
    ) -> Result<(UserBehavioralProfile, u64), StoreError> {
        loop {
            if let Some(doc) = self.store.get(PROFILES_COLLECTION, user_id).await? {
                let profile: UserBehavioralProfile = serde_json::from_value(doc.body)?;
                return Ok((profile, doc.version));
            }

            let profile = UserBehavioralProfile::new_default(user_id);
            let body = serde_json::to_value(&profile)?;
            match self.store.insert_new(PROFILES_COLLECTION, user_id, body).await {
                Ok(()) => {
                    debug!("created default behavioral profile for user {}", user_id);
                    return Ok((profile, 1));
                }
                // Another session created it first; read theirs
                Err(StoreError::Duplicate { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Apply `apply` to the user's profile under compare-and-swap, retrying
    /// on version conflicts with exponential backoff. `apply` may run more
    /// than once and must not perform I/O.
    pub async fn mutate<F>(
        &self,
        user_id: &str,
        mut apply: F,
    ) -> Result<UserBehavioralProfile, StoreError>
    where
        F: FnMut(&mut UserBehavioralProfile),
    {
        let mut attempt: u32 = 0;
        loop {
            let (mut profile, version) = self.load_or_create(user_id).await?;
            apply(&mut profile);
            profile.last_updated = Utc::now();

            let body = serde_json::to_value(&profile)?;
            match self
                .store
                .put_versioned(PROFILES_COLLECTION, user_id, body, version)
                .await
            {
                Ok(_) => return Ok(profile),
                Err(StoreError::Conflict { .. }) if attempt < self.max_retries => {
                    attempt += 1;
                    // Exponential backoff, capped so a long retry chain
                    // never sleeps for minutes
                    let delay = self.backoff_base * 2u32.saturating_pow((attempt - 1).min(6));
                    warn!(
                        "profile update conflict for user {} (attempt {}/{}), retrying in {:?}",
                        user_id, attempt, self.max_retries, delay
                    );
                    metrics::counter!("profile_update_conflicts_total", 1);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Increment one key in a frequency table and re-trim it to the top 10.
    pub async fn increment_frequency(
        &self,
        user_id: &str,
        table: FrequencyTable,
        key: &str,
        observed_at_ms: i64,
    ) -> Result<(), StoreError> {
        self.mutate(user_id, |profile| {
            let target = match table {
                FrequencyTable::Locations => &mut profile.frequent_locations,
                FrequencyTable::Networks => &mut profile.frequent_networks,
            };
            increment_and_trim(target, key, observed_at_ms);
        })
        .await?;
        debug!("incremented {} '{}' for user {}", table.name(), key, user_id);
        Ok(())
    }

    /// Record one location observation: bump the city's frequency counter
    /// and overwrite the last known location in the same write, so the two
    /// never disagree.
    pub async fn record_location_observation(
        &self,
        user_id: &str,
        city: &str,
        last_known: LastKnownLocation,
    ) -> Result<(), StoreError> {
        let observed_at_ms = last_known.timestamp_ms;
        self.mutate(user_id, move |profile| {
            increment_and_trim(&mut profile.frequent_locations, city, observed_at_ms);
            profile.last_known_location = Some(last_known.clone());
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::store::InMemoryDocumentStore;
    use crate::profile::MAX_FREQUENCY_ENTRIES;

    fn repository() -> ProfileRepository {
        ProfileRepository::new(
            Arc::new(InMemoryDocumentStore::new()),
            5,
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let repo = repository();
        let first = repo.get_or_create("u-1").await.unwrap();
        let second = repo.get_or_create("u-1").await.unwrap();
        assert_eq!(first.user_id, second.user_id);
        assert_eq!(second.risk_baseline.session_count, 0);
        assert!(second.frequent_locations.is_empty());
    }

    #[tokio::test]
    async fn increment_frequency_persists() {
        let repo = repository();
        repo.increment_frequency("u-1", FrequencyTable::Locations, "Paris", 10)
            .await
            .unwrap();
        repo.increment_frequency("u-1", FrequencyTable::Locations, "Paris", 20)
            .await
            .unwrap();

        let profile = repo.get_or_create("u-1").await.unwrap();
        assert_eq!(profile.frequent_locations["Paris"].count, 2);
        assert_eq!(profile.frequent_locations["Paris"].last_incremented_ms, 20);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_lose_no_updates() {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let repo_a = Arc::new(ProfileRepository::new(
            store.clone(),
            50,
            Duration::from_millis(1),
        ));
        let repo_b = Arc::new(ProfileRepository::new(
            store,
            50,
            Duration::from_millis(1),
        ));

        let task_a = {
            let repo = repo_a.clone();
            tokio::spawn(async move {
                for i in 0..20 {
                    repo.increment_frequency("u-1", FrequencyTable::Networks, "home_wifi", i)
                        .await
                        .unwrap();
                }
            })
        };
        let task_b = {
            let repo = repo_b.clone();
            tokio::spawn(async move {
                for i in 0..20 {
                    repo.increment_frequency("u-1", FrequencyTable::Networks, "home_wifi", i)
                        .await
                        .unwrap();
                }
            })
        };
        task_a.await.unwrap();
        task_b.await.unwrap();

        let profile = repo_a.get_or_create("u-1").await.unwrap();
        assert_eq!(profile.frequent_networks["home_wifi"].count, 40);
    }

    #[tokio::test]
    async fn location_observation_updates_table_and_last_known_together() {
        let repo = repository();
        let last_known = LastKnownLocation {
            latitude: 48.85,
            longitude: 2.35,
            city: "Paris".to_string(),
            country: "France".to_string(),
            timestamp_ms: 5000,
        };
        repo.record_location_observation("u-1", "Paris", last_known.clone())
            .await
            .unwrap();

        let profile = repo.get_or_create("u-1").await.unwrap();
        assert_eq!(profile.frequent_locations["Paris"].count, 1);
        assert_eq!(profile.last_known_location, Some(last_known));
    }

    #[tokio::test]
    async fn frequency_table_stays_bounded_through_repository() {
        let repo = repository();
        for i in 0..30 {
            repo.increment_frequency("u-1", FrequencyTable::Locations, &format!("c{}", i), i)
                .await
                .unwrap();
        }
        let profile = repo.get_or_create("u-1").await.unwrap();
        assert!(profile.frequent_locations.len() <= MAX_FREQUENCY_ENTRIES);
    }
}
