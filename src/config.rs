use anyhow::{Context, Result};
use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Duration;

/// Engine configuration, layered defaults -> config file -> environment
#[derive(Clone, Debug)]
pub struct Settings {
    pub log_level: String,
    pub metrics_port: Option<u16>,
    pub geocoding: GeocodingSettings,
    pub profile: ProfileSettings,
    pub database: Option<DatabaseSettings>,
}

#[derive(Clone, Debug)]
pub struct GeocodingSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    pub cache_size: usize,
    pub cache_ttl_secs: u64,
}

impl GeocodingSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Clone, Debug)]
pub struct ProfileSettings {
    pub max_cas_retries: u32,
    pub backoff_base_ms: u64,
}

impl ProfileSettings {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

#[derive(Clone, Debug)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            log_level: "info".to_string(),
            metrics_port: None,
            geocoding: GeocodingSettings {
                base_url: "http://localhost:8100".to_string(),
                timeout_secs: 3,
                cache_size: 1000,
                cache_ttl_secs: 3600,
            },
            profile: ProfileSettings {
                max_cas_retries: 5,
                backoff_base_ms: 25,
            },
            database: None,
        }
    }
}

/// Load configuration from defaults, an optional config file and the
/// environment (highest precedence)
pub fn load_config() -> Result<Settings> {
    dotenv::dotenv().ok();

    let mut config = Settings::default();

    if let Ok(path) = env::var("CONFIG_FILE") {
        load_from_file(&mut config, Path::new(&path))?;
    }

    load_from_env(&mut config);

    Ok(config)
}

fn apply(config: &mut Settings, key: &str, value: &str) {
    match key {
        "LOG_LEVEL" => config.log_level = value.to_string(),
        "METRICS_PORT" => {
            if let Ok(port) = value.parse() {
                config.metrics_port = Some(port);
            }
        }
        "GEOCODING_URL" => config.geocoding.base_url = value.to_string(),
        "GEOCODING_TIMEOUT_SECS" => {
            if let Ok(secs) = value.parse() {
                config.geocoding.timeout_secs = secs;
            }
        }
        "GEOCODE_CACHE_SIZE" => {
            if let Ok(size) = value.parse() {
                config.geocoding.cache_size = size;
            }
        }
        "GEOCODE_CACHE_TTL_SECS" => {
            if let Ok(secs) = value.parse() {
                config.geocoding.cache_ttl_secs = secs;
            }
        }
        "PROFILE_MAX_RETRIES" => {
            if let Ok(retries) = value.parse() {
                config.profile.max_cas_retries = retries;
            }
        }
        "PROFILE_BACKOFF_BASE_MS" => {
            if let Ok(ms) = value.parse() {
                config.profile.backoff_base_ms = ms;
            }
        }
        "DATABASE_URL" => {
            let max_connections = config
                .database
                .as_ref()
                .map(|db| db.max_connections)
                .unwrap_or(5);
            config.database = Some(DatabaseSettings {
                url: value.to_string(),
                max_connections,
            });
        }
        "DATABASE_MAX_CONNECTIONS" => {
            if let Ok(max) = value.parse() {
                if let Some(db) = config.database.as_mut() {
                    db.max_connections = max;
                }
            }
        }
        _ => {}
    }
}

/// Override configuration from environment variables
fn load_from_env(config: &mut Settings) {
    const KEYS: &[&str] = &[
        "LOG_LEVEL",
        "METRICS_PORT",
        "GEOCODING_URL",
        "GEOCODING_TIMEOUT_SECS",
        "GEOCODE_CACHE_SIZE",
        "GEOCODE_CACHE_TTL_SECS",
        "PROFILE_MAX_RETRIES",
        "DATABASE_URL",
        "PROFILE_BACKOFF_BASE_MS",
        "DATABASE_MAX_CONNECTIONS",
    ];

    for key in KEYS {
        if let Ok(value) = env::var(key) {
            apply(config, key, &value);
        }
    }
}

/// Load configuration from a KEY=VALUE file
fn load_from_file(config: &mut Settings, path: &Path) -> Result<()> {
    let file = File::open(path).context("Failed to open configuration file")?;
    let reader = BufReader::new(file);

    for line in reader.lines() {
        let line = line.context("Failed to read line from configuration file")?;
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(index) = line.find('=') {
            let key = line[..index].trim();
            let value = line[index + 1..].trim();
            apply(config, key, value);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Settings::default();
        assert_eq!(config.geocoding.timeout_secs, 3);
        assert_eq!(config.geocoding.cache_size, 1000);
        assert_eq!(config.profile.max_cas_retries, 5);
        assert!(config.database.is_none());
    }

    #[test]
    fn apply_parses_known_keys() {
        let mut config = Settings::default();
        apply(&mut config, "GEOCODING_TIMEOUT_SECS", "7");
        apply(&mut config, "DATABASE_URL", "postgres://localhost/risk");
        apply(&mut config, "DATABASE_MAX_CONNECTIONS", "12");
        apply(&mut config, "METRICS_PORT", "9109");

        assert_eq!(config.geocoding.timeout_secs, 7);
        let db = config.database.unwrap();
        assert_eq!(db.url, "postgres://localhost/risk");
        assert_eq!(db.max_connections, 12);
        assert_eq!(config.metrics_port, Some(9109));
    }

    #[test]
    fn malformed_numbers_keep_previous_value() {
        let mut config = Settings::default();
        apply(&mut config, "PROFILE_MAX_RETRIES", "not-a-number");
        assert_eq!(config.profile.max_cas_retries, 5);
    }
}
