use crate::anomaly::ForestConfig;
use crate::errors::{Error, Result};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub http_addr: String,
    pub forest: ForestConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://digital_twin.db?mode=rwc".to_string(),
            db_max_connections: 5,
            http_addr: "0.0.0.0:8000".to_string(),
            forest: ForestConfig::default(),
        }
    }
}

impl Config {
    /// Loads settings from the environment (and `.env`, if present).
    ///
    /// Unparseable values fall back to their defaults; a forest setting that
    /// parses but makes no sense is an error.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            db_max_connections: parse_or(
                lookup("DB_MAX_CONNECTIONS"),
                defaults.db_max_connections,
            ),
            http_addr: lookup("HTTP_ADDR").unwrap_or(defaults.http_addr),
            forest: ForestConfig {
                n_trees: parse_or(lookup("FOREST_TREES"), defaults.forest.n_trees),
                max_samples: parse_or(lookup("FOREST_MAX_SAMPLES"), defaults.forest.max_samples),
                contamination: parse_or(
                    lookup("FOREST_CONTAMINATION"),
                    defaults.forest.contamination,
                ),
                seed: lookup("FOREST_SEED").and_then(|s| s.parse().ok()),
            },
        };

        if config.db_max_connections == 0 {
            return Err(Error::Config("DB_MAX_CONNECTIONS must be positive".to_string()));
        }
        config.forest.check()?;
        Ok(config)
    }

    /// Database URL with any credentials stripped, for logging.
    pub fn redacted_database_url(&self) -> &str {
        self.database_url
            .rsplit_once('@')
            .map_or(self.database_url.as_str(), |(_, host)| host)
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}
