use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set. Please ensure it is defined in your .env file.")]
    MissingVar(&'static str),

    #[error("{name} must be {expected}, got {value:?}")]
    InvalidVar {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub environment: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub request_timeout: Duration,
    pub session_idle_ttl: Duration,
    pub otel_service_name: String,
    pub otel_exporter_endpoint: String,
}

impl Config {
    /// Loads `.env` (if any) and reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(|name| env::var(name).ok())
    }

    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let gemini_api_key = lookup("GEMINI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingVar("GEMINI_API_KEY"))?;

        let port = var_or("APP_PORT", "8080");
        let port = port.parse().map_err(|_| ConfigError::InvalidVar {
            name: "APP_PORT",
            expected: "a port number",
            value: port,
        })?;

        let timeout_secs = var_or("GEMINI_TIMEOUT_SECS", "60");
        let request_timeout = match timeout_secs.parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                return Err(ConfigError::InvalidVar {
                    name: "GEMINI_TIMEOUT_SECS",
                    expected: "a positive number of seconds",
                    value: timeout_secs,
                });
            }
        };

        let ttl_secs = var_or("SESSION_IDLE_TTL_SECS", "3600");
        let session_idle_ttl = match ttl_secs.parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                return Err(ConfigError::InvalidVar {
                    name: "SESSION_IDLE_TTL_SECS",
                    expected: "a positive number of seconds",
                    value: ttl_secs,
                });
            }
        };

        Ok(Self {
            port,
            environment: var_or("APP_ENVIRONMENT", "development"),
            gemini_api_key,
            gemini_model: var_or("GEMINI_MODEL", "gemini-1.5-flash"),
            gemini_base_url: var_or(
                "GEMINI_BASE_URL",
                "https://generativelanguage.googleapis.com",
            ),
            request_timeout,
            session_idle_ttl,
            otel_service_name: var_or("OTEL_SERVICE_NAME", "strategic-insights"),
            otel_exporter_endpoint: var_or(
                "OTEL_EXPORTER_OTLP_ENDPOINT",
                "http://localhost:4317",
            ),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
