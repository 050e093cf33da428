use std::env;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://stellar_fees.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self::with_database_url(DEFAULT_DATABASE_URL)
    }
}

impl Config {
    /// Default pool settings pointed at `database_url`.
    pub fn with_database_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key lookup. Unset keys fall back to defaults;
    /// set but malformed values are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|_| format!("DB_MAX_CONNECTIONS must be a valid number, got '{}'", raw))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        if max_connections == 0 {
            return Err("DB_MAX_CONNECTIONS must be at least 1".to_string());
        }

        let busy_timeout_ms = match lookup("DB_BUSY_TIMEOUT_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| format!("DB_BUSY_TIMEOUT_MS must be a valid number, got '{}'", raw))?,
            None => DEFAULT_BUSY_TIMEOUT_MS,
        };

        Ok(Self {
            database_url,
            max_connections,
            busy_timeout_ms,
        })
    }
}
