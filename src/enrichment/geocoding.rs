//! Reverse-geocoding collaborator: coordinates -> city/country.
//!
//! The provider is injected as a trait object so tests can stub it. The
//! HTTP implementation talks to a `/reverse?lat=..&lon=..` endpoint; the
//! cache wrapper keeps a bounded LRU of recent lookups so repeated logins
//! from the same place do not hit the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::EnrichmentError;

/// Placeholder used whenever the provider cannot resolve a coordinate
pub const UNKNOWN_PLACE: &str = "Unknown";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeocodedPlace {
    pub city: String,
    pub country: String,
}

impl GeocodedPlace {
    pub fn unknown() -> Self {
        GeocodedPlace {
            city: UNKNOWN_PLACE.to_string(),
            country: UNKNOWN_PLACE.to_string(),
        }
    }
}

#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    async fn reverse_geocode(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<GeocodedPlace, EnrichmentError>;
}

// Wire format of the reverse-geocoding endpoint
#[derive(Deserialize)]
struct ReverseGeocodeResponse {
    #[serde(default)]
    city: String,
    #[serde(default)]
    country: String,
}

pub struct HttpGeocodingProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGeocodingProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build geocoding HTTP client")?;

        Ok(HttpGeocodingProvider {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl GeocodingProvider for HttpGeocodingProvider {
    async fn reverse_geocode(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<GeocodedPlace, EnrichmentError> {
        let url = format!(
            "{}/reverse?lat={}&lon={}",
            self.base_url, latitude, longitude
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EnrichmentError::Geocoding(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EnrichmentError::Geocoding(format!(
                "geocoding service returned {}",
                response.status()
            )));
        }

        let body: ReverseGeocodeResponse = response
            .json()
            .await
            .map_err(|e| EnrichmentError::Geocoding(e.to_string()))?;

        Ok(GeocodedPlace {
            city: if body.city.is_empty() {
                UNKNOWN_PLACE.to_string()
            } else {
                body.city
            },
            country: if body.country.is_empty() {
                UNKNOWN_PLACE.to_string()
            } else {
                body.country
            },
        })
    }
}

struct CacheEntry {
    place: GeocodedPlace,
    cached_at: Instant,
    last_access: Instant,
}

/// Bounded LRU cache with TTL in front of a geocoding provider.
///
/// Keys are coordinates rounded to 4 decimal places (~11 m), so jittery GPS
/// fixes from the same spot share an entry. Only successful lookups are
/// cached; failures always retry the inner provider.
pub struct CachedGeocoder {
    inner: Arc<dyn GeocodingProvider>,
    entries: Mutex<HashMap<String, CacheEntry>>,
    max_entries: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedGeocoder {
    pub fn new(inner: Arc<dyn GeocodingProvider>, max_entries: usize, ttl: Duration) -> Self {
        CachedGeocoder {
            inner,
            entries: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// (hits, misses) since construction
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    fn cache_key(latitude: f64, longitude: f64) -> String {
        format!("{:.4},{:.4}", latitude, longitude)
    }

    fn lookup(&self, key: &str) -> Option<GeocodedPlace> {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(entry) if entry.cached_at.elapsed() < self.ttl => {
                entry.last_access = Instant::now();
                Some(entry.place.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn insert(&self, key: String, place: GeocodedPlace) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            // Evict the least recently used entry
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }
        let now = Instant::now();
        entries.insert(
            key,
            CacheEntry {
                place,
                cached_at: now,
                last_access: now,
            },
        );
    }
}

#[async_trait]
impl GeocodingProvider for CachedGeocoder {
    async fn reverse_geocode(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<GeocodedPlace, EnrichmentError> {
        let key = Self::cache_key(latitude, longitude);

        if let Some(place) = self.lookup(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("geocode cache hit for {}", key);
            return Ok(place);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let place = self.inner.reverse_geocode(latitude, longitude).await?;
        self.insert(key, place.clone());
        Ok(place)
    }
}
