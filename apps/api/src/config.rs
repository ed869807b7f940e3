//! API configuration module.
//!
//! Configuration is loaded from environment variables (a `.env` file is read
//! first by `main`) with fallback to defaults.

use std::env;
use std::path::PathBuf;

use sgir_core::Percent;

/// Default signing key. Usable for development only; `load` warns about it.
pub const DEV_SECRET_KEY: &str = "sgir-dev-secret-change-in-production";

/// API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Signs session tokens (JWT HS256)
    pub secret_key: String,

    /// Accepted `Host` header values; `*` accepts any
    pub allowed_hosts: Vec<String>,

    /// Verbose logging
    pub debug: bool,

    /// Origins allowed by the CORS layer
    pub cors_allowed_origins: Vec<String>,

    /// Shared secret of the integrations façade. `None` rejects every call.
    pub webhook_api_key: Option<String>,

    /// Rate of the informational tax estimate in day stats
    pub default_tax_pct: Percent,

    /// Suggested tip in the pending-payment queue
    pub default_tip_suggestion_pct: Percent,

    /// Longest reservation window
    pub reservation_max_minutes: i64,

    /// Grace after `reserved_for` before a reservation is a no-show
    pub reservation_noshow_grace_minutes: i64,

    /// SQLite database file
    pub database_path: PathBuf,

    /// HTTP listen port
    pub http_port: u16,

    /// Sessions idle for longer than this are dropped
    pub session_idle_minutes: i64,

    /// Liveness cache TTL in seconds (never above 60)
    pub work_day_cache_secs: u64,

    /// Argon2 memory cost for new credential hashes, in KiB
    pub argon2_memory_kib: u32,
}

impl ApiConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup. Missing keys take defaults.
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let config = ApiConfig {
            secret_key: var("SGIR_SECRET_KEY", DEV_SECRET_KEY),

            allowed_hosts: split_list(&var("SGIR_ALLOWED_HOSTS", "*")),

            debug: var("SGIR_DEBUG", "false")
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SGIR_DEBUG".to_string()))?,

            cors_allowed_origins: split_list(&var("SGIR_CORS_ALLOWED_ORIGINS", "")),

            webhook_api_key: lookup("SGIR_WEBHOOK_API_KEY").filter(|k| !k.trim().is_empty()),

            default_tax_pct: parse_percent("SGIR_DEFAULT_TAX_PCT", &var("SGIR_DEFAULT_TAX_PCT", "0"))?,

            default_tip_suggestion_pct: parse_percent(
                "SGIR_DEFAULT_TIP_SUGGESTION_PCT",
                &var("SGIR_DEFAULT_TIP_SUGGESTION_PCT", "10"),
            )?,

            reservation_max_minutes: var("SGIR_RESERVATION_MAX_MINUTES", "120")
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SGIR_RESERVATION_MAX_MINUTES".to_string()))?,

            reservation_noshow_grace_minutes: var("SGIR_RESERVATION_NOSHOW_GRACE_MINUTES", "15")
                .parse()
                .map_err(|_| {
                    ConfigError::InvalidValue("SGIR_RESERVATION_NOSHOW_GRACE_MINUTES".to_string())
                })?,

            database_path: PathBuf::from(var("SGIR_DATABASE_PATH", "./sgir.db")),

            http_port: var("SGIR_HTTP_PORT", "8080")
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SGIR_HTTP_PORT".to_string()))?,

            session_idle_minutes: var("SGIR_SESSION_IDLE_MINUTES", "480")
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SGIR_SESSION_IDLE_MINUTES".to_string()))?,

            work_day_cache_secs: var("SGIR_WORK_DAY_CACHE_SECS", "60")
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue("SGIR_WORK_DAY_CACHE_SECS".to_string()))?
                .min(60),

            argon2_memory_kib: var("SGIR_ARGON2_MEMORY_KIB", "19456")
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SGIR_ARGON2_MEMORY_KIB".to_string()))?,
        };

        if config.secret_key.trim().is_empty() {
            return Err(ConfigError::MissingRequired("SGIR_SECRET_KEY".to_string()));
        }
        if config.reservation_max_minutes < 1 {
            return Err(ConfigError::InvalidValue("SGIR_RESERVATION_MAX_MINUTES".to_string()));
        }
        if config.reservation_noshow_grace_minutes < 0 {
            return Err(ConfigError::InvalidValue(
                "SGIR_RESERVATION_NOSHOW_GRACE_MINUTES".to_string(),
            ));
        }
        if config.session_idle_minutes < 1 {
            return Err(ConfigError::InvalidValue("SGIR_SESSION_IDLE_MINUTES".to_string()));
        }

        Ok(config)
    }

    /// True when the development signing key is in use.
    pub fn uses_dev_secret(&self) -> bool {
        self.secret_key == DEV_SECRET_KEY
    }

    /// True when `host` (port stripped) may address this server.
    pub fn host_allowed(&self, host: &str) -> bool {
        let name = host.rsplit_once(':').map_or(host, |(name, _)| name);
        self.allowed_hosts
            .iter()
            .any(|h| h == "*" || h.eq_ignore_ascii_case(name))
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_percent(key: &str, raw: &str) -> Result<Percent, ConfigError> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))?;
    if !(0.0..=100.0).contains(&value) {
        return Err(ConfigError::InvalidValue(key.to_string()));
    }
    Ok(Percent::from_percentage(value))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
