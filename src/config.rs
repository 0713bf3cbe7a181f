//! Process configuration, read once at startup and failed fast on if
//! anything required is missing or malformed.

use crate::scheduler;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub metrics_collection_interval: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL is required")]
    MissingDatabaseUrl,
    #[error("PORT is not a valid port number: {0}")]
    InvalidPort(String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match std::env::var("PORT") {
            Ok(value) => value.parse().map_err(|_| ConfigError::InvalidPort(value))?,
            Err(_) => 5000,
        };

        let database_url = std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        let metrics_collection_interval = std::env::var("METRICS_COLLECTION_INTERVAL")
            .unwrap_or_else(|_| "EVERY_5_MINUTES".to_string());
        let metrics_collection_interval = scheduler::resolve_interval(&metrics_collection_interval);

        Ok(Self { port, database_url, metrics_collection_interval })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_collection_interval_label() {
        assert_eq!(
            scheduler::resolve_interval("EVERY_5_MINUTES"),
            scheduler::EVERY_5_MINUTES
        );
    }
}
