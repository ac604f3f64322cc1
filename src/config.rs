// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use std::path::PathBuf;
use std::time::Duration;

/// Process configuration, read once at startup and passed down
/// explicitly. No module-level globals.
#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub cache_duration: Duration,
    pub crowd_validation_timeout_secs: i64,
    pub crowd_validations_file: PathBuf,
}

impl Config {
    pub fn from_env() -> Config {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(5000);
        let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| ".".to_string()));
        let cache_duration = Duration::from_secs(
            std::env::var("CACHE_DURATION")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(300),
        );
        let crowd_validation_timeout_secs = std::env::var("CROWD_VALIDATION_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(7200);
        let crowd_validations_file = data_dir.join("crowd_validations.json");

        Config {
            host,
            port,
            data_dir,
            cache_duration,
            crowd_validation_timeout_secs,
            crowd_validations_file,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        // env vars are unset in the test environment unless a caller set
        // them, so just sanity-check the fallback values hold together
        let config = Config::from_env();
        assert!(config.port > 0);
        assert!(config.cache_duration.as_secs() > 0);
        assert!(
            config
                .crowd_validations_file
                .to_string_lossy()
                .ends_with("crowd_validations.json")
        );
    }
}
