use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::assessment::aggregator::AssessmentStyle;
use crate::interview::machine::EmptyResponsePolicy;

/// Which key-value backend holds usage credits and handoff records.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreBackend {
    Memory,
    File(PathBuf),
    Redis(String),
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    /// Speech features report "unavailable" when this is unset.
    pub deepgram_api_key: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub store_backend: StoreBackend,
    pub free_trial_credits: u32,
    pub auto_advance: Duration,
    pub remote_timeout: Duration,
    /// Open sessions with no client contact for this long are torn down.
    pub session_idle_timeout: Duration,
    /// Closed sessions stay readable this long.
    pub session_closed_grace: Duration,
    pub session_sweep_every: Duration,
    pub empty_response_policy: EmptyResponsePolicy,
    pub assessment_style: AssessmentStyle,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let store_backend = match optional_env("STORE_BACKEND")
            .unwrap_or_else(|| "file".to_string())
            .as_str()
        {
            "memory" => StoreBackend::Memory,
            "file" => StoreBackend::File(PathBuf::from(
                optional_env("STORE_DIR").unwrap_or_else(|| "./data".to_string()),
            )),
            "redis" => StoreBackend::Redis(require_env("REDIS_URL")?),
            other => bail!("STORE_BACKEND must be memory, file or redis (got '{other}')"),
        };

        let session_sweep_every = Duration::from_secs(parse_env("SESSION_SWEEP_SECS", 30)?);
        if session_sweep_every.is_zero() {
            bail!("SESSION_SWEEP_SECS must be at least 1");
        }

        Ok(Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            deepgram_api_key: optional_env("DEEPGRAM_API_KEY"),
            port: parse_env("PORT", 8080)?,
            rust_log: optional_env("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            store_backend,
            free_trial_credits: parse_env("FREE_TRIAL_CREDITS", 3)?,
            auto_advance: Duration::from_secs(parse_env("AUTO_ADVANCE_SECS", 4)?),
            remote_timeout: Duration::from_secs(parse_env("REMOTE_TIMEOUT_SECS", 60)?),
            session_idle_timeout: Duration::from_secs(parse_env("SESSION_IDLE_TIMEOUT_SECS", 1800)?),
            session_closed_grace: Duration::from_secs(parse_env("SESSION_CLOSED_GRACE_SECS", 120)?),
            session_sweep_every,
            empty_response_policy: optional_env("EMPTY_RESPONSE_POLICY")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or_default(),
            assessment_style: optional_env("ASSESSMENT_STYLE")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or_default(),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number (got '{raw}')")),
        None => Ok(default),
    }
}
