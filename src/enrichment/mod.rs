//! Session enrichment with external and profile-backed signals.
//!
//! Every enricher degrades to a documented default instead of aborting the
//! pipeline: a session always gets a risk assessment, even a degraded one.

pub mod geocoding;
pub mod location;
pub mod login;
pub mod network;

pub use geocoding::{CachedGeocoder, GeocodedPlace, GeocodingProvider, HttpGeocodingProvider};
pub use location::{LocationBehavior, LocationEnricher};
pub use login::{derive_login, LoginBehavior};
pub use network::{NetworkBehavior, NetworkEnricher};
