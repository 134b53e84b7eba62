use std::time::Duration;

/// Default horizon applied when a request is created without `expires_at`.
pub const DEFAULT_USER_INPUT_TTL_SECS: u64 = 24 * 60 * 60;
pub const MAX_USER_INPUT_TTL_SECS: u64 = 365 * 24 * 60 * 60;
pub const DEFAULT_EXPIRY_SWEEP_SECS: u64 = 60;
pub const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has invalid value '{value}': expected {expected}")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Process configuration, read once at start-up.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub database_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    /// Shared secret for `/api/v1/internal/*`; internal routes refuse every call while unset.
    pub internal_api_token: Option<String>,
    pub user_input_ttl: Duration,
    /// `None` disables the background sweep; expiry is then detected lazily only.
    pub expiry_sweep_interval: Option<Duration>,
    pub require_https: bool,
    /// Browser origins allowed by CORS, trimmed and de-duplicated.
    pub cors_origins: Vec<String>,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let port = parse_or(&lookup, "PORT", 3000u16, "a TCP port")?;
        let db_max_connections =
            parse_or(&lookup, "HANDOFF_DB_MAX_CONNECTIONS", 20u32, "a positive integer")?;

        let internal_api_token = lookup("HANDOFF_INTERNAL_API_TOKEN").and_then(|v| {
            let trimmed = v.trim().to_string();
            (!trimmed.is_empty()).then_some(trimmed)
        });

        let ttl_secs = parse_or(
            &lookup,
            "HANDOFF_USER_INPUT_TTL_SECS",
            DEFAULT_USER_INPUT_TTL_SECS,
            "a number of seconds",
        )?;
        if ttl_secs == 0 || ttl_secs > MAX_USER_INPUT_TTL_SECS {
            return Err(ConfigError::Invalid {
                name: "HANDOFF_USER_INPUT_TTL_SECS",
                value: ttl_secs.to_string(),
                expected: "between 1 and 31536000 seconds",
            });
        }

        let sweep_secs = parse_or(
            &lookup,
            "HANDOFF_EXPIRY_SWEEP_SECS",
            DEFAULT_EXPIRY_SWEEP_SECS,
            "a number of seconds",
        )?;

        let require_https = lookup("HANDOFF_REQUIRE_HTTPS")
            .map(|v| v == "true")
            .unwrap_or(false);

        let cors_origins = parse_origins(
            &lookup("HANDOFF_CORS_ORIGINS").unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string()),
        );

        Ok(Self {
            database_url,
            port,
            db_max_connections,
            internal_api_token,
            user_input_ttl: Duration::from_secs(ttl_secs),
            expiry_sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
            require_https,
            cors_origins,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            value: raw,
            expected,
        }),
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    let mut origins: Vec<String> = Vec::new();
    for origin in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !origins.iter().any(|o| o == origin) {
            origins.push(origin.to_string());
        }
    }
    origins
}
